//! Task Partitioning Module
//!
//! Splits a fixed labeled dataset into an ordered sequence of ten tasks and
//! walks through them on a step-count schedule where task `k` stays active
//! for roughly `k * change_freq` steps.

mod partitioner;
mod plan;

pub use partitioner::DatasetPartitioner;
pub use plan::PartitionPlan;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::images::{DatasetName, Preprocess};

/// Number of tasks in one partition plan
pub const NUM_TASKS: usize = 10;

/// What a task is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum PartitionStrategy {
    /// Disjoint random subsets of the training samples
    #[default]
    Samples,
    /// Disjoint groups of class ids
    Classes,
}

impl FromStr for PartitionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "samples" | "split" => Ok(PartitionStrategy::Samples),
            "classes" | "class_split" => Ok(PartitionStrategy::Classes),
            other => Err(Error::config(format!("unknown partition strategy '{}'", other))),
        }
    }
}

impl TryFrom<String> for PartitionStrategy {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionStrategy::Samples => f.write_str("samples"),
            PartitionStrategy::Classes => f.write_str("classes"),
        }
    }
}

/// Configuration for a [`DatasetPartitioner`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Base dataset
    pub dataset: DatasetName,
    /// Partition by samples or by classes
    pub strategy: PartitionStrategy,
    /// Base unit of the task-advance schedule
    pub change_freq: u64,
    /// Images per batch
    pub batch_size: usize,
    /// Random seed
    pub seed: Option<u64>,
    /// Preprocessing profile
    pub preprocess: Preprocess,
    /// Keep earlier tasks' data in later tasks
    pub accumulate: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetName::Cifar10,
            strategy: PartitionStrategy::Samples,
            change_freq: 1000,
            batch_size: 32,
            seed: None,
            preprocess: Preprocess::None,
            accumulate: false,
        }
    }
}

impl PartitionConfig {
    /// Check the scalar parameters
    pub fn validate(&self) -> Result<()> {
        if self.change_freq == 0 {
            return Err(Error::config("change_freq must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        Ok(())
    }
}
