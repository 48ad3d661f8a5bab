//! Run configuration files
//!
//! A run is a stream description plus a number of steps, stored as JSON:
//!
//! ```json
//! {
//!   "steps": 1000,
//!   "stream": { "kind": "drift", "policy": "smooth", "drift_period": 500.0, "seed": 1 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::drift::DriftConfig;
use crate::error::{Error, Result};
use crate::partition::PartitionConfig;
use crate::sequence::SequenceConfig;
use crate::streams::{NoiseConfig, PermutedConfig, RobustnessConfig, VanillaConfig};

/// Which stream a run drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamSpec {
    Drift(DriftConfig),
    Partition(PartitionConfig),
    Vanilla(VanillaConfig),
    Robustness(RobustnessConfig),
    Noise(NoiseConfig),
    Permuted(PermutedConfig),
    Sequence(SequenceConfig),
    /// Drift processes restarted every `change_freq` steps with segment seeds
    DriftSequence {
        #[serde(default)]
        drift: DriftConfig,
        change_freq: u64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl StreamSpec {
    /// Name of the stream kind
    pub fn kind(&self) -> &'static str {
        match self {
            StreamSpec::Drift(_) => "drift",
            StreamSpec::Partition(_) => "partition",
            StreamSpec::Vanilla(_) => "vanilla",
            StreamSpec::Robustness(_) => "robustness",
            StreamSpec::Noise(_) => "noise",
            StreamSpec::Permuted(_) => "permuted",
            StreamSpec::Sequence(_) => "sequence",
            StreamSpec::DriftSequence { .. } => "drift_sequence",
        }
    }
}

impl Default for StreamSpec {
    fn default() -> Self {
        StreamSpec::Drift(DriftConfig::default())
    }
}

/// A stream description and how long to drive it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of `step()` calls
    #[serde(default = "default_steps")]
    pub steps: u64,
    pub stream: StreamSpec,
}

fn default_steps() -> u64 {
    1000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            stream: StreamSpec::default(),
        }
    }
}

impl RunConfig {
    /// Parse a run configuration from JSON
    ///
    /// Unknown names, missing fields and wrongly typed values are
    /// configuration errors; malformed JSON stays a JSON error.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            if e.is_data() {
                Error::config(e.to_string())
            } else {
                Error::JsonError(e)
            }
        })
    }

    /// Load a run configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
