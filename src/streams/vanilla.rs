//! Single-task image stream over a whole training set

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::images::{
    check_matching_splits, BatchLoader, DatasetName, DatasetProvider, DatasetView, LabeledDataset,
    Pipeline, Preprocess, Split,
};
use crate::stream::{make_rng, HeldOut, ImageBatch, Stream};

/// Configuration for [`VanillaImages`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VanillaConfig {
    pub dataset: DatasetName,
    pub batch_size: usize,
    pub seed: Option<u64>,
    pub preprocess: Preprocess,
}

impl Default for VanillaConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetName::Cifar10,
            batch_size: 128,
            seed: None,
            preprocess: Preprocess::None,
        }
    }
}

/// The full training set, shuffled each epoch and cycled forever
#[derive(Debug)]
pub struct VanillaImages {
    config: VanillaConfig,
    loader: BatchLoader,
    test_view: DatasetView,
    step_count: u64,
}

impl VanillaImages {
    /// Load both splits from `provider` and build the stream
    pub fn new(config: VanillaConfig, provider: &dyn DatasetProvider) -> Result<Self> {
        let train = provider.load(config.dataset, Split::Train)?;
        let test = provider.load(config.dataset, Split::Test)?;
        Self::from_datasets(config, train, test)
    }

    /// Build the stream over already loaded splits
    pub fn from_datasets(
        config: VanillaConfig,
        train: Arc<dyn LabeledDataset>,
        test: Arc<dyn LabeledDataset>,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        check_matching_splits(train.as_ref(), test.as_ref())?;
        let train_pipeline = Arc::new(config.preprocess.train_pipeline(config.dataset)?);
        let test_pipeline = Arc::new(config.preprocess.test_pipeline(config.dataset)?);
        Ok(Self::with_pipelines(config, train, test, train_pipeline, test_pipeline))
    }

    /// Build from a checked configuration and its pipelines
    pub(crate) fn with_pipelines(
        config: VanillaConfig,
        train: Arc<dyn LabeledDataset>,
        test: Arc<dyn LabeledDataset>,
        train_pipeline: Arc<Pipeline>,
        test_pipeline: Arc<Pipeline>,
    ) -> Self {
        let mut rng = make_rng(config.seed);
        let loader = BatchLoader::new(
            DatasetView::full(train, train_pipeline),
            config.batch_size,
            true,
            false,
            StdRng::seed_from_u64(rng.gen()),
        );
        info!(
            "Vanilla {} stream: {} training samples, batch size {}",
            config.dataset,
            loader.view().len(),
            config.batch_size
        );

        Self {
            test_view: DatasetView::full(test, test_pipeline),
            config,
            loader,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &VanillaConfig {
        &self.config
    }
}

impl Stream for VanillaImages {
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

impl HeldOut for VanillaImages {
    fn test_view(&self) -> Option<DatasetView> {
        Some(self.test_view.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::SyntheticProvider;

    #[test]
    fn test_vanilla_cycles_through_epochs() {
        let provider = SyntheticProvider::new(10, 6, 0);
        let config = VanillaConfig {
            dataset: DatasetName::Mnist,
            batch_size: 4,
            seed: Some(1),
            ..Default::default()
        };
        let mut stream = VanillaImages::new(config, &provider).unwrap();

        let sizes: Vec<usize> = (0..6).map(|_| stream.step().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2, 4, 4, 2]);
        assert_eq!(stream.step_count(), 6);
        assert_eq!(stream.test_view().unwrap().len(), 6);
    }

    #[test]
    fn test_vanilla_augmented_cifar() {
        let provider = SyntheticProvider::new(8, 4, 0);
        let config = VanillaConfig {
            dataset: DatasetName::Cifar100,
            batch_size: 8,
            seed: Some(2),
            preprocess: Preprocess::Augmented,
        };
        let mut stream = VanillaImages::new(config, &provider).unwrap();
        assert_eq!(stream.step().images.dim(), (8, 3, 32, 32));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let provider = SyntheticProvider::new(8, 4, 0);
        let config = VanillaConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(VanillaImages::new(config, &provider).unwrap_err().is_configuration());
    }
}
