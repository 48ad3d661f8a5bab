//! Driving streams and summarizing their output

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RunConfig, StreamSpec};
use crate::drift::DriftProcess;
use crate::error::Result;
use crate::images::DatasetProvider;
use crate::partition::DatasetPartitioner;
use crate::sequence::{DriftSegments, StreamSequencer};
use crate::stream::{ImageBatch, Sample, Stream};
use crate::streams::{NoiseImages, PermutedImages, RobustnessImages, VanillaImages};

/// What a stream produced over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Stream kind
    pub stream: String,
    /// Number of `step()` calls
    pub steps: u64,
    /// Samples or images produced
    pub items: usize,
    /// Mean regression target (drift streams)
    pub target_mean: Option<f64>,
    /// Standard deviation of the regression target (drift streams)
    pub target_std: Option<f64>,
    /// Label histogram (image streams)
    pub label_counts: BTreeMap<usize, usize>,
}

#[derive(Debug, Default)]
struct TargetMoments {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl RunSummary {
    fn new(stream: &str) -> Self {
        Self {
            stream: stream.to_string(),
            ..Default::default()
        }
    }

    fn record_batch(&mut self, batch: &ImageBatch) {
        self.steps += 1;
        self.items += batch.len();
        for &label in &batch.labels {
            *self.label_counts.entry(label).or_insert(0) += 1;
        }
    }

    fn finish_targets(&mut self, moments: &TargetMoments) {
        if moments.count == 0 {
            return;
        }
        let n = moments.count as f64;
        let mean = moments.sum / n;
        let variance = (moments.sum_sq / n - mean * mean).max(0.0);
        self.target_mean = Some(mean);
        self.target_std = Some(variance.sqrt());
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Summary ({})", self.stream)?;
        writeln!(f, "Steps: {}", self.steps)?;
        writeln!(f, "Items: {}", self.items)?;
        if let (Some(mean), Some(std)) = (self.target_mean, self.target_std) {
            writeln!(f, "Target: mean {:.4}, std {:.4}", mean, std)?;
        }
        if !self.label_counts.is_empty() {
            writeln!(f, "Distinct labels: {}", self.label_counts.len())?;
        }
        Ok(())
    }
}

/// Drive a drift stream, passing every sample to `on_sample`
pub fn drive_samples<S, F>(
    stream: &mut S,
    steps: u64,
    kind: &str,
    mut on_sample: F,
) -> Result<RunSummary>
where
    S: Stream<Batch = Sample>,
    F: FnMut(&Sample) -> Result<()>,
{
    let mut summary = RunSummary::new(kind);
    let mut moments = TargetMoments::default();
    for _ in 0..steps {
        let sample = stream.step();
        on_sample(&sample)?;
        summary.steps += 1;
        summary.items += 1;
        moments.count += 1;
        moments.sum += sample.target;
        moments.sum_sq += sample.target * sample.target;
    }
    summary.finish_targets(&moments);
    Ok(summary)
}

/// Drive an image stream
pub fn drive_batches<S>(stream: &mut S, steps: u64, kind: &str) -> RunSummary
where
    S: Stream<Batch = ImageBatch>,
{
    let mut summary = RunSummary::new(kind);
    for _ in 0..steps {
        summary.record_batch(&stream.step());
    }
    summary
}

/// Build the configured stream and drive it for `config.steps` steps
pub fn run(config: &RunConfig, provider: &dyn DatasetProvider) -> Result<RunSummary> {
    let kind = config.stream.kind();
    let steps = config.steps;
    info!("Running {} stream for {} steps", kind, steps);

    let summary = match &config.stream {
        StreamSpec::Drift(drift) => {
            let mut stream = DriftProcess::new(drift.clone())?;
            drive_samples(&mut stream, steps, kind, |_| Ok(()))?
        }
        StreamSpec::DriftSequence {
            drift,
            change_freq,
            seed,
        } => {
            let mut stream = StreamSequencer::new(DriftSegments::new(drift)?, *change_freq, *seed)?;
            drive_samples(&mut stream, steps, kind, |_| Ok(()))?
        }
        StreamSpec::Partition(partition) => {
            let mut stream = DatasetPartitioner::new(partition.clone(), provider)?;
            drive_batches(&mut stream, steps, kind)
        }
        StreamSpec::Vanilla(vanilla) => {
            let mut stream = VanillaImages::new(vanilla.clone(), provider)?;
            drive_batches(&mut stream, steps, kind)
        }
        StreamSpec::Robustness(robustness) => {
            let mut stream = RobustnessImages::new(robustness.clone(), provider)?;
            drive_batches(&mut stream, steps, kind)
        }
        StreamSpec::Noise(noise) => {
            let mut stream = NoiseImages::new(noise.clone())?;
            drive_batches(&mut stream, steps, kind)
        }
        StreamSpec::Permuted(permuted) => {
            let mut stream = PermutedImages::new(permuted.clone(), provider)?;
            drive_batches(&mut stream, steps, kind)
        }
        StreamSpec::Sequence(sequence) => {
            let mut stream = StreamSequencer::from_config(sequence, provider)?;
            drive_batches(&mut stream, steps, kind)
        }
    };
    Ok(summary)
}
