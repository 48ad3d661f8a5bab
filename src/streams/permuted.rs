//! Permuted-pixel stream
//!
//! A dataset whose pixel order is re-permuted on a fixed schedule. The
//! permutations come from their own generator seeded with `seed + 100`, so
//! the permutation sequence does not depend on how batches are shuffled.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::images::{
    check_matching_splits, BatchLoader, DatasetName, DatasetProvider, DatasetView, LabeledDataset,
    Pipeline, PixelTransform, Split,
};
use crate::stream::{make_rng, HeldOut, ImageBatch, Stream};

/// Offset between the stream seed and the permutation generator's seed
pub const PERMUTATION_SEED_OFFSET: u64 = 100;

/// Configuration for [`PermutedImages`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutedConfig {
    /// `mnist`, `fashion_mnist` or `cifar10`
    pub dataset: DatasetName,
    /// Steps between permutation changes
    pub change_freq: u64,
    pub batch_size: usize,
    pub seed: Option<u64>,
}

impl Default for PermutedConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetName::Mnist,
            change_freq: 1000,
            batch_size: 32,
            seed: None,
        }
    }
}

/// Image stream with a periodically changing pixel permutation
#[derive(Debug)]
pub struct PermutedImages {
    config: PermutedConfig,
    test: Arc<dyn LabeledDataset>,
    permutation_rng: StdRng,
    permutation: Arc<[usize]>,
    pipeline: Arc<Pipeline>,
    permutations_drawn: u64,
    loader: BatchLoader,
    step_count: u64,
}

impl PermutedImages {
    pub fn new(config: PermutedConfig, provider: &dyn DatasetProvider) -> Result<Self> {
        match config.dataset {
            DatasetName::Mnist | DatasetName::FashionMnist | DatasetName::Cifar10 => {}
            other => {
                return Err(Error::config(format!(
                    "permuted streams need mnist, fashion_mnist or cifar10, got {}",
                    other
                )))
            }
        }
        if config.change_freq == 0 {
            return Err(Error::config("change_freq must be at least 1"));
        }
        if config.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }

        let train = provider.load(config.dataset, Split::Train)?;
        let test = provider.load(config.dataset, Split::Test)?;
        check_matching_splits(train.as_ref(), test.as_ref())?;

        let mut rng = make_rng(config.seed);
        let permutation_seed = config.seed.map(|s| s.wrapping_add(PERMUTATION_SEED_OFFSET));
        let mut permutation_rng = make_rng(permutation_seed);
        let permutation = draw_permutation(train.shape().pixels(), &mut permutation_rng);
        let pipeline = permuted_pipeline(&permutation);

        let loader = BatchLoader::new(
            DatasetView::full(train, pipeline.clone()),
            config.batch_size,
            true,
            false,
            StdRng::seed_from_u64(rng.gen()),
        );
        info!(
            "Permuted {} stream: new permutation every {} steps",
            config.dataset, config.change_freq
        );

        Ok(Self {
            config,
            test,
            permutation_rng,
            permutation,
            pipeline,
            permutations_drawn: 1,
            loader,
            step_count: 0,
        })
    }

    /// Current pixel permutation
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Number of permutations drawn so far, including the initial one
    pub fn permutations_drawn(&self) -> u64 {
        self.permutations_drawn
    }

    pub fn config(&self) -> &PermutedConfig {
        &self.config
    }

    fn repermute(&mut self) {
        self.permutation = draw_permutation(self.permutation.len(), &mut self.permutation_rng);
        self.pipeline = permuted_pipeline(&self.permutation);
        self.loader.set_pipeline(self.pipeline.clone());
        self.permutations_drawn += 1;
        debug!(
            "Permutation #{} drawn at step {}",
            self.permutations_drawn, self.step_count
        );
    }
}

fn draw_permutation(pixels: usize, rng: &mut StdRng) -> Arc<[usize]> {
    let mut permutation: Vec<usize> = (0..pixels).collect();
    permutation.shuffle(rng);
    permutation.into()
}

fn permuted_pipeline(permutation: &Arc<[usize]>) -> Arc<Pipeline> {
    Arc::new(Pipeline::standard().then(PixelTransform::PermutePixels(permutation.clone())))
}

impl Stream for PermutedImages {
    type Batch = ImageBatch;

    fn step(&mut self) -> ImageBatch {
        if (self.step_count + 1) % self.config.change_freq == 0 {
            self.repermute();
        }
        let batch = self.loader.next_cycling();
        self.step_count += 1;
        batch
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl HeldOut for PermutedImages {
    fn test_view(&self) -> Option<DatasetView> {
        Some(DatasetView::full(self.test.clone(), self.pipeline.clone()))
    }
}
