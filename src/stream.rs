//! Stream Contract
//!
//! Every source in this crate is a pull-based generator: the caller invokes
//! `step()` and receives the next transition. All work happens inside that call.

use ndarray::{Array1, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::images::DatasetView;

/// A non-stationary data source
pub trait Stream {
    /// What one step produces
    type Batch;

    /// Produce the next transition and advance the internal step counter.
    fn step(&mut self) -> Self::Batch;

    /// Number of successful `step()` calls so far
    fn step_count(&self) -> u64;
}

/// Access to a stream's held-out data
///
/// Consumed by evaluation code; `None` means the stream has no test set.
pub trait HeldOut {
    /// View over the current test data
    fn test_view(&self) -> Option<DatasetView>;
}

/// One regression sample from a drifting process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Input vector (fast coordinates first, then slow)
    pub input: Array1<f64>,
    /// Target value
    pub target: f64,
}

/// A batch of images and integer labels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    /// Images laid out as (batch, channels, height, width)
    pub images: Array4<f32>,
    /// One label per image
    pub labels: Vec<usize>,
}

impl ImageBatch {
    /// Empty batch for images of the given (channels, height, width)
    pub fn empty(channels: usize, height: usize, width: usize) -> Self {
        Self {
            images: Array4::zeros((0, channels, height, width)),
            labels: Vec::new(),
        }
    }

    /// Number of images in the batch
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the batch holds no images
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Build a generator from an optional seed
///
/// Seeded generators are reproducible; unseeded ones draw from OS entropy.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_empty_batch() {
        let batch = ImageBatch::empty(3, 32, 32);
        assert!(batch.is_empty());
        assert_eq!(batch.images.dim(), (0, 3, 32, 32));
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut first = make_rng(Some(11));
        let mut second = make_rng(Some(11));
        for _ in 0..8 {
            assert_eq!(first.gen::<u64>(), second.gen::<u64>());
        }
    }
}
