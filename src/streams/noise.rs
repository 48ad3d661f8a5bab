//! Synthetic noise streams
//!
//! Uniform random images with uniform random labels, shaped like a base
//! dataset. Nothing here is learnable beyond memorization.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::images::{
    BatchLoader, DatasetName, DatasetView, Pipeline, PixelTransform, RandomImages,
    DEFAULT_SYNTHETIC_LEN,
};
use crate::stream::{make_rng, HeldOut, ImageBatch, Stream};

/// How noise images are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum NoiseKind {
    /// Independent uniform pixels
    #[default]
    Random,
    /// Uniform pixels smoothed by a Gaussian blur
    RandomSmooth,
}

impl NoiseKind {
    pub const ALL: [NoiseKind; 2] = [NoiseKind::Random, NoiseKind::RandomSmooth];
}

impl FromStr for NoiseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(NoiseKind::Random),
            "random_smooth" => Ok(NoiseKind::RandomSmooth),
            other => Err(Error::config(format!("invalid noise kind '{}'", other))),
        }
    }
}

impl TryFrom<String> for NoiseKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseKind::Random => f.write_str("random"),
            NoiseKind::RandomSmooth => f.write_str("random_smooth"),
        }
    }
}

/// Configuration for [`NoiseImages`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Stored as `noise` so it does not clash with a run file's `kind` tag
    #[serde(rename = "noise")]
    pub kind: NoiseKind,
    /// Dataset whose image shape and label space are copied
    pub base: DatasetName,
    pub batch_size: usize,
    pub seed: Option<u64>,
    /// Number of synthetic samples
    pub len: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            kind: NoiseKind::Random,
            base: DatasetName::Cifar10,
            batch_size: 500,
            seed: None,
            len: DEFAULT_SYNTHETIC_LEN,
        }
    }
}

/// Stream of noise images; it has no test set
#[derive(Debug)]
pub struct NoiseImages {
    config: NoiseConfig,
    loader: BatchLoader,
    step_count: u64,
}

impl NoiseImages {
    pub fn new(config: NoiseConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        Ok(Self::build(config))
    }

    /// Build from a checked configuration
    pub(crate) fn build(config: NoiseConfig) -> Self {
        let mut rng = make_rng(config.seed);
        let dataset = Arc::new(RandomImages::like(config.base, config.len, &mut rng));

        let pipeline = match config.kind {
            NoiseKind::Random => Pipeline::standard(),
            NoiseKind::RandomSmooth => Pipeline::standard().then(PixelTransform::GaussianBlur {
                kernel_size: 5,
                sigma: 1.5,
            }),
        };
        let loader = BatchLoader::new(
            DatasetView::full(dataset, Arc::new(pipeline)),
            config.batch_size,
            true,
            false,
            StdRng::seed_from_u64(rng.gen()),
        );
        info!(
            "Noise stream {} shaped like {}: {} samples",
            config.kind, config.base, config.len
        );

        Self {
            config,
            loader,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }
}

impl Stream for NoiseImages {
    type Batch = ImageBatch;

    fn step(&mut self) -> ImageBatch {
        let batch = self.loader.next_cycling();
        self.step_count += 1;
        batch
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl HeldOut for NoiseImages {
    fn test_view(&self) -> Option<DatasetView> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: NoiseKind) -> NoiseConfig {
        NoiseConfig {
            kind,
            base: DatasetName::Mnist,
            batch_size: 16,
            seed: Some(2),
            len: 64,
        }
    }

    #[test]
    fn test_noise_batches() {
        let mut stream = NoiseImages::new(config(NoiseKind::Random)).unwrap();
        let batch = stream.step();
        assert_eq!(batch.images.dim(), (16, 1, 28, 28));
        assert!(batch.images.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        assert!(batch.labels.iter().all(|&l| l < 10));
        assert!(stream.test_view().is_none());
    }

    #[test]
    fn test_smooth_noise_has_less_contrast() {
        let mut rough = NoiseImages::new(config(NoiseKind::Random)).unwrap();
        let mut smooth = NoiseImages::new(config(NoiseKind::RandomSmooth)).unwrap();
        let variance = |batch: ImageBatch| {
            let mean = batch.images.mean().unwrap_or(0.0);
            batch.images.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0)
        };
        assert!(variance(smooth.step()) < variance(rough.step()));
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut a = NoiseImages::new(config(NoiseKind::Random)).unwrap();
        let mut b = NoiseImages::new(config(NoiseKind::Random)).unwrap();
        assert_eq!(a.step(), b.step());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            "random_smooth".parse::<NoiseKind>().unwrap(),
            NoiseKind::RandomSmooth
        );
        assert!("static".parse::<NoiseKind>().is_err());
    }
}
