//! Stream Sequencer
//!
//! Runs one sub-stream at a time and replaces it with a freshly built one
//! every `change_freq` steps. Segment `i` is seeded with `master_seed + i`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::StreamFamily;
use crate::drift::{DriftConfig, DriftProcess, DriftSettings};
use crate::error::{Error, Result};
use crate::images::{
    check_matching_splits, DatasetName, DatasetProvider, DatasetView, LabeledDataset, Pipeline,
    Split,
};
use crate::stream::{HeldOut, ImageBatch, Stream};
use crate::streams::{
    NoiseConfig, NoiseImages, NoiseKind, RobustnessConfig, RobustnessImages, RobustnessTransform,
    VanillaConfig, VanillaImages,
};

/// Builds the sub-stream of each segment
///
/// Factories are validated when they are created, so building a segment
/// cannot fail.
pub trait SegmentFactory {
    type Stream: Stream;

    /// Build the stream for segment `segment`
    fn build(&self, segment: u64, seed: Option<u64>) -> Self::Stream;

    /// Short description of what segment `segment` will contain
    fn describe(&self, segment: u64) -> String;
}

/// Seed of a segment derived from the master seed
pub fn segment_seed(master_seed: Option<u64>, segment: u64) -> Option<u64> {
    master_seed.map(|seed| seed.wrapping_add(segment))
}

/// Sequence of sub-streams, switched every `change_freq` steps
pub struct StreamSequencer<F: SegmentFactory> {
    factory: F,
    change_freq: u64,
    master_seed: Option<u64>,
    segment: u64,
    active: F::Stream,
    step_count: u64,
}

impl<F> fmt::Debug for StreamSequencer<F>
where
    F: SegmentFactory + fmt::Debug,
    F::Stream: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSequencer")
            .field("factory", &self.factory)
            .field("change_freq", &self.change_freq)
            .field("master_seed", &self.master_seed)
            .field("segment", &self.segment)
            .field("active", &self.active)
            .field("step_count", &self.step_count)
            .finish()
    }
}

impl<F: SegmentFactory> StreamSequencer<F> {
    /// Create a sequencer and build its first segment
    pub fn new(factory: F, change_freq: u64, master_seed: Option<u64>) -> Result<Self> {
        if change_freq == 0 {
            return Err(Error::config("change_freq must be at least 1"));
        }
        let active = factory.build(0, segment_seed(master_seed, 0));
        info!(
            "Sequencer started: segment 0 is {}, switching every {} steps",
            factory.describe(0),
            change_freq
        );
        Ok(Self {
            factory,
            change_freq,
            master_seed,
            segment: 0,
            active,
            step_count: 0,
        })
    }

    /// Index of the active segment
    pub fn segment_index(&self) -> u64 {
        self.segment
    }

    /// Seed the active segment was built with
    pub fn active_seed(&self) -> Option<u64> {
        segment_seed(self.master_seed, self.segment)
    }

    /// The active sub-stream
    pub fn active(&self) -> &F::Stream {
        &self.active
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn change_freq(&self) -> u64 {
        self.change_freq
    }
}

impl<F: SegmentFactory> Stream for StreamSequencer<F> {
    type Batch = <F::Stream as Stream>::Batch;

    fn step(&mut self) -> Self::Batch {
        self.step_count += 1;
        let transition = self.active.step();

        if self.step_count % self.change_freq == 0 {
            self.segment += 1;
            let seed = segment_seed(self.master_seed, self.segment);
            self.active = self.factory.build(self.segment, seed);
            debug!(
                "Segment {} started at step {}: {} (seed {:?})",
                self.segment,
                self.step_count,
                self.factory.describe(self.segment),
                seed
            );
        }
        transition
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl<F> HeldOut for StreamSequencer<F>
where
    F: SegmentFactory,
    F::Stream: HeldOut,
{
    fn test_view(&self) -> Option<DatasetView> {
        self.active.test_view()
    }
}

/// Configuration for a sequence of image stream families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// `sequence_<family>` names, used in turn by consecutive segments
    pub families: Vec<String>,
    /// Steps per segment
    pub change_freq: u64,
    pub batch_size: usize,
    /// Master seed
    pub seed: Option<u64>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            families: vec!["sequence_cifar10".to_string()],
            change_freq: 1000,
            batch_size: 128,
            seed: None,
        }
    }
}

/// Sub-stream of a family sequence
#[derive(Debug)]
pub enum FamilyStream {
    Vanilla(VanillaImages),
    Noise(NoiseImages),
    Robustness(RobustnessImages),
}

impl FamilyStream {
    /// Name of the stream kind
    pub fn kind(&self) -> &'static str {
        match self {
            FamilyStream::Vanilla(_) => "vanilla",
            FamilyStream::Noise(_) => "noise",
            FamilyStream::Robustness(_) => "robustness",
        }
    }
}

impl Stream for FamilyStream {
    type Batch = ImageBatch;

    fn step(&mut self) -> ImageBatch {
        match self {
            FamilyStream::Vanilla(stream) => stream.step(),
            FamilyStream::Noise(stream) => stream.step(),
            FamilyStream::Robustness(stream) => stream.step(),
        }
    }

    fn step_count(&self) -> u64 {
        match self {
            FamilyStream::Vanilla(stream) => stream.step_count(),
            FamilyStream::Noise(stream) => stream.step_count(),
            FamilyStream::Robustness(stream) => stream.step_count(),
        }
    }
}

impl HeldOut for FamilyStream {
    fn test_view(&self) -> Option<DatasetView> {
        match self {
            FamilyStream::Vanilla(stream) => stream.test_view(),
            FamilyStream::Noise(stream) => stream.test_view(),
            FamilyStream::Robustness(stream) => stream.test_view(),
        }
    }
}

#[derive(Debug, Clone)]
struct LoadedSplits {
    train: Arc<dyn LabeledDataset>,
    test: Arc<dyn LabeledDataset>,
}

impl LoadedSplits {
    fn load(name: DatasetName, provider: &dyn DatasetProvider) -> Result<Self> {
        let train = provider.load(name, Split::Train)?;
        let test = provider.load(name, Split::Test)?;
        check_matching_splits(train.as_ref(), test.as_ref())?;
        Ok(Self { train, test })
    }

    /// Splits of `name`, loaded on first use and shared afterwards
    fn shared(
        cache: &mut HashMap<DatasetName, LoadedSplits>,
        name: DatasetName,
        provider: &dyn DatasetProvider,
    ) -> Result<Self> {
        match cache.entry(name) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => Ok(entry.insert(Self::load(name, provider)?).clone()),
        }
    }
}

/// A family together with the data its segments draw from
#[derive(Debug, Clone)]
enum FamilySource {
    Vanilla {
        dataset: DatasetName,
        splits: LoadedSplits,
    },
    Robustness {
        dataset: DatasetName,
        transform: RobustnessTransform,
        splits: LoadedSplits,
    },
    Noise {
        base: DatasetName,
        kind: NoiseKind,
    },
}

impl FamilySource {
    fn family(&self) -> StreamFamily {
        match *self {
            FamilySource::Vanilla { dataset, .. } => StreamFamily::Vanilla(dataset),
            FamilySource::Robustness {
                dataset, transform, ..
            } => StreamFamily::Robustness { dataset, transform },
            FamilySource::Noise { base, kind } => StreamFamily::Noise { base, kind },
        }
    }
}

/// Ordered families cycled through by consecutive segments
///
/// Base datasets are loaded once when the registry is created and shared by
/// every segment.
#[derive(Debug)]
pub struct FamilyRegistry {
    sources: Vec<FamilySource>,
    batch_size: usize,
    pipeline: Arc<Pipeline>,
}

impl FamilyRegistry {
    /// Resolve `sequence_<family>` names and load the datasets they need
    pub fn new(
        names: &[String],
        batch_size: usize,
        provider: &dyn DatasetProvider,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::config("a sequence needs at least one family"));
        }
        if batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }

        let mut loaded = HashMap::new();
        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            let source = match StreamFamily::from_sequence_name(name)? {
                StreamFamily::Vanilla(dataset) => FamilySource::Vanilla {
                    dataset,
                    splits: LoadedSplits::shared(&mut loaded, dataset, provider)?,
                },
                StreamFamily::Robustness { dataset, transform } => FamilySource::Robustness {
                    dataset,
                    transform,
                    splits: LoadedSplits::shared(&mut loaded, dataset, provider)?,
                },
                StreamFamily::Noise { base, kind } => FamilySource::Noise { base, kind },
            };
            sources.push(source);
        }

        Ok(Self {
            sources,
            batch_size,
            pipeline: Arc::new(Pipeline::standard()),
        })
    }

    /// Families in the order segments use them
    pub fn families(&self) -> Vec<StreamFamily> {
        self.sources.iter().map(FamilySource::family).collect()
    }

    /// Family used by segment `segment`
    pub fn family_for(&self, segment: u64) -> StreamFamily {
        self.source_for(segment).family()
    }

    fn source_for(&self, segment: u64) -> &FamilySource {
        &self.sources[(segment % self.sources.len() as u64) as usize]
    }
}

impl SegmentFactory for FamilyRegistry {
    type Stream = FamilyStream;

    fn build(&self, segment: u64, seed: Option<u64>) -> FamilyStream {
        match self.source_for(segment) {
            FamilySource::Vanilla { dataset, splits } => {
                let config = VanillaConfig {
                    dataset: *dataset,
                    batch_size: self.batch_size,
                    seed,
                    ..Default::default()
                };
                FamilyStream::Vanilla(VanillaImages::with_pipelines(
                    config,
                    splits.train.clone(),
                    splits.test.clone(),
                    self.pipeline.clone(),
                    self.pipeline.clone(),
                ))
            }
            FamilySource::Robustness {
                dataset,
                transform,
                splits,
            } => {
                let config = RobustnessConfig {
                    dataset: *dataset,
                    transform: *transform,
                    batch_size: self.batch_size,
                    seed,
                };
                FamilyStream::Robustness(RobustnessImages::build(
                    config,
                    splits.train.clone(),
                    splits.test.clone(),
                ))
            }
            FamilySource::Noise { base, kind } => {
                let config = NoiseConfig {
                    kind: *kind,
                    base: *base,
                    batch_size: self.batch_size,
                    seed,
                    ..Default::default()
                };
                FamilyStream::Noise(NoiseImages::build(config))
            }
        }
    }

    fn describe(&self, segment: u64) -> String {
        self.family_for(segment).to_string()
    }
}

/// Sequencer over image stream families
pub type FamilySequencer = StreamSequencer<FamilyRegistry>;

impl StreamSequencer<FamilyRegistry> {
    /// Sequence a single `sequence_<family>` name
    pub fn from_name(
        name: &str,
        change_freq: u64,
        batch_size: usize,
        seed: Option<u64>,
        provider: &dyn DatasetProvider,
    ) -> Result<Self> {
        let registry = FamilyRegistry::new(&[name.to_string()], batch_size, provider)?;
        Self::new(registry, change_freq, seed)
    }

    /// Build from a [`SequenceConfig`]
    pub fn from_config(config: &SequenceConfig, provider: &dyn DatasetProvider) -> Result<Self> {
        let registry = FamilyRegistry::new(&config.families, config.batch_size, provider)?;
        Self::new(registry, config.change_freq, config.seed)
    }
}

/// Drift processes sharing one validated configuration
#[derive(Debug, Clone)]
pub struct DriftSegments {
    settings: DriftSettings,
}

impl DriftSegments {
    /// Validate `config`; its own seed is ignored in favor of segment seeds
    pub fn new(config: &DriftConfig) -> Result<Self> {
        Ok(Self {
            settings: DriftSettings::from_config(config)?,
        })
    }
}

impl SegmentFactory for DriftSegments {
    type Stream = DriftProcess;

    fn build(&self, _segment: u64, seed: Option<u64>) -> DriftProcess {
        DriftProcess::from_settings(self.settings.clone(), seed)
    }

    fn describe(&self, _segment: u64) -> String {
        format!("drift process ({:?})", self.settings.policy)
    }
}

/// Sequencer over drift processes
pub type DriftSequencer = StreamSequencer<DriftSegments>;
