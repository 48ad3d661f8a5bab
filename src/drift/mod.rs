//! Drifting Regression Streams
//!
//! A 16-dimensional input vector is split into 4 fast coordinates, redrawn every
//! step, and 12 slow coordinates whose evolution follows a drift policy. The
//! target is a fixed (or periodically redrawn) random network of the input.
//!
//! # Policies
//!
//! - `stationary` - slow coordinates are redrawn every step
//! - `smooth` - exponential moving average with `beta = 1 - 1/period`
//! - `discrete_periodic` - all slow coordinates redrawn every `change_freq` steps
//! - `discrete_single_coordinate` - one slow coordinate redrawn every `change_freq` steps

mod process;

pub use process::{DriftProcess, NUM_FAST, NUM_SLOW};

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::target::TargetKind;

/// How the slow coordinates change over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum PolicyKind {
    #[default]
    Stationary,
    Smooth,
    DiscretePeriodic,
    DiscreteSingleCoordinate,
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stationary" => Ok(PolicyKind::Stationary),
            "smooth" => Ok(PolicyKind::Smooth),
            "discrete_periodic" | "discrete" => Ok(PolicyKind::DiscretePeriodic),
            "discrete_single_coordinate" | "discrete_single" => {
                Ok(PolicyKind::DiscreteSingleCoordinate)
            }
            other => Err(Error::config(format!("unknown drift policy '{}'", other))),
        }
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::Stationary => "stationary",
            PolicyKind::Smooth => "smooth",
            PolicyKind::DiscretePeriodic => "discrete_periodic",
            PolicyKind::DiscreteSingleCoordinate => "discrete_single_coordinate",
        };
        f.write_str(name)
    }
}

/// Per-step distribution of freshly drawn coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum InputDistribution {
    /// Standard normal
    #[default]
    Gaussian,
    /// Uniform over {-1, +1}
    Rademacher,
}

impl InputDistribution {
    /// Draw `n` independent values
    pub fn sample<R: Rng + ?Sized>(self, n: usize, rng: &mut R) -> Array1<f64> {
        match self {
            InputDistribution::Gaussian => Array1::random_using(n, StandardNormal, rng),
            InputDistribution::Rademacher => {
                Array1::from_shape_fn(n, |_| if rng.gen::<bool>() { 1.0 } else { -1.0 })
            }
        }
    }
}

impl FromStr for InputDistribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" | "normal" => Ok(InputDistribution::Gaussian),
            "rademacher" => Ok(InputDistribution::Rademacher),
            other => Err(Error::config(format!("unknown input distribution '{}'", other))),
        }
    }
}

impl TryFrom<String> for InputDistribution {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

/// Configuration for a [`DriftProcess`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Drift policy for the slow coordinates
    pub policy: PolicyKind,
    /// Distribution of freshly drawn values
    pub distribution: InputDistribution,
    /// Target network variant
    pub target: TargetKind,
    /// Force the slow coordinates to zero (implied by `ltu_network_4input`)
    pub zero_slow_inputs: bool,
    /// Redraw the target network every `change_freq` steps
    pub change_target: bool,
    /// Steps between discrete changes
    pub change_freq: Option<u64>,
    /// Time scale of the smooth policy
    pub drift_period: Option<f64>,
    /// Random seed
    pub seed: Option<u64>,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Stationary,
            distribution: InputDistribution::Gaussian,
            target: TargetKind::ReluNetwork,
            zero_slow_inputs: false,
            change_target: false,
            change_freq: None,
            drift_period: None,
            seed: None,
        }
    }
}

/// Validated drift policy with its parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftPolicy {
    Stationary,
    Smooth { beta: f64 },
    DiscretePeriodic { change_freq: u64 },
    DiscreteSingleCoordinate { change_freq: u64 },
}

/// Everything a [`DriftProcess`] needs except its seed, already validated
#[derive(Debug, Clone, PartialEq)]
pub struct DriftSettings {
    pub policy: DriftPolicy,
    pub distribution: InputDistribution,
    pub target: TargetKind,
    pub zero_slow_inputs: bool,
    pub retarget_freq: Option<u64>,
}

impl DriftSettings {
    /// Validate a configuration
    pub fn from_config(config: &DriftConfig) -> Result<Self> {
        let change_freq = match config.change_freq {
            Some(0) => return Err(Error::config("change_freq must be at least 1")),
            freq => freq,
        };

        let policy = match config.policy {
            PolicyKind::Stationary => DriftPolicy::Stationary,
            PolicyKind::Smooth => {
                let period = config
                    .drift_period
                    .ok_or_else(|| Error::config("smooth policy requires drift_period"))?;
                if !period.is_finite() || period < 1.0 {
                    return Err(Error::config(format!(
                        "drift_period must be a finite value >= 1, got {}",
                        period
                    )));
                }
                DriftPolicy::Smooth {
                    beta: 1.0 - 1.0 / period,
                }
            }
            PolicyKind::DiscretePeriodic => DriftPolicy::DiscretePeriodic {
                change_freq: change_freq
                    .ok_or_else(|| Error::config("discrete_periodic policy requires change_freq"))?,
            },
            PolicyKind::DiscreteSingleCoordinate => DriftPolicy::DiscreteSingleCoordinate {
                change_freq: change_freq.ok_or_else(|| {
                    Error::config("discrete_single_coordinate policy requires change_freq")
                })?,
            },
        };

        let retarget_freq = if config.change_target {
            Some(change_freq.ok_or_else(|| Error::config("change_target requires change_freq"))?)
        } else {
            None
        };

        Ok(Self {
            policy,
            distribution: config.distribution,
            target: config.target,
            zero_slow_inputs: config.zero_slow_inputs || config.target.zeroes_slow_inputs(),
            retarget_freq,
        })
    }
}
