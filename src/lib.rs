//! # Continual Streams
//!
//! Non-stationary data streams for continual learning experiments.
//!
//! Every stream is a pull-based generator: call [`Stream::step`] and get the
//! next transition. Two families are provided:
//!
//! - Drifting regression: a 16-dimensional input whose slow coordinates evolve
//!   under a drift policy, labelled by a fixed random network
//! - Image streams: labeled datasets served in batches, either re-partitioned
//!   into tasks on a schedule, under a fixed transform, or as pure noise
//!
//! ## Modules
//!
//! - [`target`] - random target networks
//! - [`drift`] - drifting regression processes
//! - [`images`] - datasets, pixel transforms and batch loading
//! - [`partition`] - task-partitioned image streams
//! - [`streams`] - single-task, robustness, noise and permuted image streams
//! - [`sequence`] - streams restarted on a schedule with derived seeds
//! - [`config`] / [`runner`] - JSON run files and a driver loop
//!
//! ## Quick Start
//!
//! ```rust
//! use continual_streams::prelude::*;
//!
//! let config = DriftConfig {
//!     policy: PolicyKind::DiscretePeriodic,
//!     change_freq: Some(100),
//!     seed: Some(1),
//!     ..Default::default()
//! };
//! let mut process = DriftProcess::new(config).unwrap();
//! let sample = process.step();
//! assert_eq!(sample.input.len(), 16);
//! ```

pub mod config;
pub mod drift;
pub mod error;
pub mod images;
pub mod partition;
pub mod runner;
pub mod sequence;
pub mod stream;
pub mod streams;
pub mod target;

// Re-exports
pub use config::{RunConfig, StreamSpec};
pub use drift::{DriftConfig, DriftProcess, InputDistribution, PolicyKind};
pub use error::{Error, Result};
pub use images::{DatasetName, DatasetProvider, DatasetView, SyntheticProvider};
pub use partition::{DatasetPartitioner, PartitionConfig, PartitionStrategy};
pub use runner::{run, RunSummary};
pub use sequence::{DriftSequencer, FamilySequencer, SequenceConfig, StreamSequencer};
pub use stream::{HeldOut, ImageBatch, Sample, Stream};
pub use target::{TargetKind, TargetNetwork};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{RunConfig, StreamSpec};
    pub use crate::drift::{
        DriftConfig, DriftProcess, InputDistribution, PolicyKind, NUM_FAST, NUM_SLOW,
    };
    pub use crate::error::{Error, Result};
    pub use crate::images::{
        BatchLoader, DatasetName, DatasetProvider, DatasetView, ImageShape, InMemoryDataset,
        LabeledDataset, MemoryProvider, Pipeline, PixelTransform, Preprocess, RandomImages, Split,
        SyntheticProvider,
    };
    pub use crate::partition::{
        DatasetPartitioner, PartitionConfig, PartitionPlan, PartitionStrategy, NUM_TASKS,
    };
    pub use crate::runner::{run, RunSummary};
    pub use crate::sequence::{
        DriftSegments, DriftSequencer, FamilyRegistry, FamilySequencer, FamilyStream,
        SegmentFactory, SequenceConfig, StreamFamily, StreamSequencer,
    };
    pub use crate::stream::{HeldOut, ImageBatch, Sample, Stream};
    pub use crate::streams::{
        NoiseConfig, NoiseImages, NoiseKind, PermutedConfig, PermutedImages, RobustnessConfig,
        RobustnessImages, RobustnessTransform, VanillaConfig, VanillaImages,
    };
    pub use crate::target::{Activation, TargetKind, TargetNetwork};
}
