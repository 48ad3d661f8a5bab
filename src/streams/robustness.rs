//! Real-data robustness streams
//!
//! A CIFAR training set with one input or label transform applied, used to
//! probe how an agent copes with a changed but learnable problem.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::images::{
    check_matching_splits, BatchLoader, DatasetName, DatasetProvider, DatasetView, LabelSource,
    LabeledDataset, Pipeline, PixelTransform, Split,
};
use crate::stream::{make_rng, HeldOut, ImageBatch, Stream};

/// Input or label transform of a [`RobustnessImages`] stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RobustnessTransform {
    /// Every training label redrawn uniformly; no test set
    #[default]
    RandomLabels,
    /// A fixed permutation of the label space on train and test labels
    ShuffledLabels,
    /// Gaussian blur, kernel 5, sigma 1.5
    BlurredInputs,
    /// Random crop with padding 4 and horizontal flip
    RandomCropFlipInputs,
    /// A fixed permutation of pixel positions
    PermutedInputs,
    /// Grayscale replicated on every channel
    GrayscaleInputs,
}

impl RobustnessTransform {
    pub const ALL: [RobustnessTransform; 6] = [
        RobustnessTransform::RandomLabels,
        RobustnessTransform::ShuffledLabels,
        RobustnessTransform::BlurredInputs,
        RobustnessTransform::RandomCropFlipInputs,
        RobustnessTransform::PermutedInputs,
        RobustnessTransform::GrayscaleInputs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RobustnessTransform::RandomLabels => "random_labels",
            RobustnessTransform::ShuffledLabels => "shuffled_labels",
            RobustnessTransform::BlurredInputs => "blurred_inputs",
            RobustnessTransform::RandomCropFlipInputs => "random_crop_flip_inputs",
            RobustnessTransform::PermutedInputs => "permuted_inputs",
            RobustnessTransform::GrayscaleInputs => "grayscale_inputs",
        }
    }
}

impl FromStr for RobustnessTransform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RobustnessTransform::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::config(format!("invalid transform '{}'", s)))
    }
}

impl TryFrom<String> for RobustnessTransform {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for RobustnessTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for [`RobustnessImages`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustnessConfig {
    /// `cifar10` or `cifar100`
    pub dataset: DatasetName,
    pub transform: RobustnessTransform,
    pub batch_size: usize,
    pub seed: Option<u64>,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetName::Cifar10,
            transform: RobustnessTransform::RandomLabels,
            batch_size: 128,
            seed: None,
        }
    }
}

/// A CIFAR training set under one robustness transform
#[derive(Debug)]
pub struct RobustnessImages {
    config: RobustnessConfig,
    loader: BatchLoader,
    test_view: Option<DatasetView>,
    step_count: u64,
}

impl RobustnessImages {
    pub fn new(config: RobustnessConfig, provider: &dyn DatasetProvider) -> Result<Self> {
        check_dataset(config.dataset)?;
        let train = provider.load(config.dataset, Split::Train)?;
        let test = provider.load(config.dataset, Split::Test)?;
        Self::from_datasets(config, train, test)
    }

    /// Build the stream over already loaded splits
    ///
    /// The transform's own randomness (replacement labels, label mapping or
    /// pixel permutation) is drawn first from the stream's generator.
    pub fn from_datasets(
        config: RobustnessConfig,
        train: Arc<dyn LabeledDataset>,
        test: Arc<dyn LabeledDataset>,
    ) -> Result<Self> {
        check_dataset(config.dataset)?;
        if config.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        check_matching_splits(train.as_ref(), test.as_ref())?;
        Ok(Self::build(config, train, test))
    }

    /// Build from a checked configuration
    pub(crate) fn build(
        config: RobustnessConfig,
        train: Arc<dyn LabeledDataset>,
        test: Arc<dyn LabeledDataset>,
    ) -> Self {
        let mut rng = make_rng(config.seed);
        let num_classes = train.num_classes();

        let mut labels = LabelSource::Original;
        let mut pipeline = Pipeline::standard();
        match config.transform {
            RobustnessTransform::RandomLabels => {
                let random: Vec<usize> =
                    (0..train.len()).map(|_| rng.gen_range(0..num_classes)).collect();
                labels = LabelSource::Replaced(random.into());
            }
            RobustnessTransform::ShuffledLabels => {
                let mut mapping: Vec<usize> = (0..num_classes).collect();
                mapping.shuffle(&mut rng);
                labels = LabelSource::Mapped(mapping.into());
            }
            RobustnessTransform::BlurredInputs => {
                pipeline = pipeline.then(PixelTransform::GaussianBlur {
                    kernel_size: 5,
                    sigma: 1.5,
                });
            }
            RobustnessTransform::RandomCropFlipInputs => {
                pipeline = pipeline
                    .then(PixelTransform::RandomCrop { padding: 4 })
                    .then(PixelTransform::RandomHorizontalFlip);
            }
            RobustnessTransform::PermutedInputs => {
                let mut permutation: Vec<usize> = (0..train.shape().pixels()).collect();
                permutation.shuffle(&mut rng);
                pipeline = pipeline.before(PixelTransform::PermutePixels(permutation.into()));
            }
            RobustnessTransform::GrayscaleInputs => {
                pipeline = pipeline.then(PixelTransform::Grayscale);
            }
        }
        let pipeline = Arc::new(pipeline);

        let test_view = match config.transform {
            RobustnessTransform::RandomLabels => None,
            _ => Some(DatasetView::full(test, pipeline.clone()).with_labels(labels.clone())),
        };
        let loader = BatchLoader::new(
            DatasetView::full(train, pipeline).with_labels(labels),
            config.batch_size,
            true,
            false,
            StdRng::seed_from_u64(rng.gen()),
        );
        info!(
            "Robustness stream {}_{}: {} training samples",
            config.dataset,
            config.transform,
            loader.view().len()
        );

        Self {
            config,
            loader,
            test_view,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &RobustnessConfig {
        &self.config
    }

    /// Training data with its transform applied
    pub fn train_view(&self) -> &DatasetView {
        self.loader.view()
    }
}

fn check_dataset(dataset: DatasetName) -> Result<()> {
    match dataset {
        DatasetName::Cifar10 | DatasetName::Cifar100 => Ok(()),
        other => Err(Error::config(format!(
            "robustness streams need cifar10 or cifar100, got {}",
            other
        ))),
    }
}

impl Stream for RobustnessImages {
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

impl HeldOut for RobustnessImages {
    fn test_view(&self) -> Option<DatasetView> {
        self.test_view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{DatasetName, ImageShape, RandomImages, SyntheticProvider};

    fn build(transform: RobustnessTransform) -> RobustnessImages {
        let provider = SyntheticProvider::new(40, 20, 3);
        let config = RobustnessConfig {
            transform,
            batch_size: 8,
            seed: Some(6),
            ..Default::default()
        };
        RobustnessImages::new(config, &provider).unwrap()
    }

    #[test]
    fn test_transform_names() {
        for transform in RobustnessTransform::ALL {
            assert_eq!(
                transform.name().parse::<RobustnessTransform>().unwrap(),
                transform
            );
        }
        assert!("inverted_inputs".parse::<RobustnessTransform>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_random_labels_have_no_test_set() {
        let stream = build(RobustnessTransform::RandomLabels);
        assert!(stream.test_view().is_none());
        assert!(stream.train_view().labels().iter().all(|&l| l < 10));
    }

    #[test]
    fn test_shuffled_labels_apply_to_both_splits() {
        let stream = build(RobustnessTransform::ShuffledLabels);
        let train = stream.train_view();
        let raw = train.dataset().labels();
        let mapped = train.labels();

        // Same raw class maps to the same new class everywhere
        for (a, b) in raw.iter().zip(&mapped) {
            for (c, d) in raw.iter().zip(&mapped) {
                assert_eq!(a == c, b == d);
            }
        }
        assert!(stream.test_view().is_some());
    }

    #[test]
    fn test_input_transforms_keep_shape() {
        for transform in [
            RobustnessTransform::BlurredInputs,
            RobustnessTransform::RandomCropFlipInputs,
            RobustnessTransform::PermutedInputs,
            RobustnessTransform::GrayscaleInputs,
        ] {
            let mut stream = build(transform);
            let batch = stream.step();
            assert_eq!(batch.images.dim(), (8, 3, 32, 32));
        }
    }

    #[test]
    fn test_grayscale_channels_match() {
        let mut stream = build(RobustnessTransform::GrayscaleInputs);
        let batch = stream.step();
        let image = batch.images.index_axis(ndarray::Axis(0), 0);
        assert_eq!(
            image.index_axis(ndarray::Axis(0), 0),
            image.index_axis(ndarray::Axis(0), 2)
        );
    }

    #[test]
    fn test_rejects_mnist() {
        let provider = SyntheticProvider::new(40, 20, 3);
        let config = RobustnessConfig {
            dataset: DatasetName::Mnist,
            ..Default::default()
        };
        assert!(RobustnessImages::new(config, &provider).unwrap_err().is_configuration());
    }

    #[test]
    fn test_rejects_mismatched_splits() {
        let mut rng = StdRng::seed_from_u64(2);
        let small_shape = ImageShape::new(28, 28, 3);
        let train: Arc<dyn LabeledDataset> =
            Arc::new(RandomImages::like(DatasetName::Cifar10, 8, &mut rng));
        let small: Arc<dyn LabeledDataset> =
            Arc::new(RandomImages::new(small_shape, 10, 8, &mut rng));
        let wide: Arc<dyn LabeledDataset> =
            Arc::new(RandomImages::like(DatasetName::Cifar100, 8, &mut rng));

        let config = RobustnessConfig {
            transform: RobustnessTransform::PermutedInputs,
            ..Default::default()
        };
        let err = RobustnessImages::from_datasets(config, train.clone(), small).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));

        let config = RobustnessConfig {
            transform: RobustnessTransform::ShuffledLabels,
            ..Default::default()
        };
        let err = RobustnessImages::from_datasets(config, train, wide).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));
    }
}
