//! Labeled image datasets and providers
//!
//! The core never decodes images itself. A [`DatasetProvider`] hands out
//! read-only [`LabeledDataset`]s that streams share through `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array3, Array4, Axis};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of samples in the synthetic datasets used by the noise streams
pub const DEFAULT_SYNTHETIC_LEN: usize = 50_000;

/// Image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of pixel positions (height * width)
    pub fn pixels(&self) -> usize {
        self.height * self.width
    }
}

/// Supported base datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum DatasetName {
    Mnist,
    FashionMnist,
    Cifar10,
    Cifar100,
}

impl DatasetName {
    /// Image shape of the dataset
    pub fn shape(self) -> ImageShape {
        match self {
            DatasetName::Mnist | DatasetName::FashionMnist => ImageShape::new(28, 28, 1),
            DatasetName::Cifar10 | DatasetName::Cifar100 => ImageShape::new(32, 32, 3),
        }
    }

    /// Size of the label space
    pub fn num_classes(self) -> usize {
        match self {
            DatasetName::Cifar100 => 100,
            _ => 10,
        }
    }

    /// Per-channel (mean, std) of the training images
    pub fn normalization(self) -> (Vec<f32>, Vec<f32>) {
        match self {
            DatasetName::Mnist => (vec![0.1307], vec![0.3081]),
            DatasetName::FashionMnist => (vec![0.2860], vec![0.3530]),
            DatasetName::Cifar10 => (vec![0.4914, 0.4822, 0.4465], vec![0.2023, 0.1994, 0.2010]),
            DatasetName::Cifar100 => (vec![0.5071, 0.4865, 0.4409], vec![0.2673, 0.2564, 0.2762]),
        }
    }

    /// Name used in configuration files and family names
    pub fn name(self) -> &'static str {
        match self {
            DatasetName::Mnist => "mnist",
            DatasetName::FashionMnist => "fashion_mnist",
            DatasetName::Cifar10 => "cifar10",
            DatasetName::Cifar100 => "cifar100",
        }
    }
}

impl FromStr for DatasetName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mnist" => Ok(DatasetName::Mnist),
            "fashion_mnist" | "fashionmnist" => Ok(DatasetName::FashionMnist),
            "cifar10" => Ok(DatasetName::Cifar10),
            "cifar100" => Ok(DatasetName::Cifar100),
            other => Err(Error::config(format!("invalid dataset '{}'", other))),
        }
    }
}

impl TryFrom<String> for DatasetName {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Train or test portion of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

/// Read-only collection of labeled images
pub trait LabeledDataset: Send + Sync + fmt::Debug {
    /// Number of samples
    fn len(&self) -> usize;

    /// Check if the dataset has no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of every image
    fn shape(&self) -> ImageShape;

    /// Size of the label space
    fn num_classes(&self) -> usize;

    /// Label of one sample
    fn label(&self, index: usize) -> usize;

    /// Pixels of one sample, laid out as (height, width, channels)
    fn image(&self, index: usize) -> Array3<u8>;

    /// All labels in sample order
    fn labels(&self) -> Vec<usize> {
        (0..self.len()).map(|i| self.label(i)).collect()
    }
}

/// Check that a test split holds the same kind of images as its train split
///
/// Streams build one preprocessing pipeline (crops, pixel permutations,
/// label tables) from the train split and apply it to both.
pub fn check_matching_splits(train: &dyn LabeledDataset, test: &dyn LabeledDataset) -> Result<()> {
    if train.shape() != test.shape() {
        return Err(Error::DatasetError(format!(
            "train images are {:?} but test images are {:?}",
            train.shape(),
            test.shape()
        )));
    }
    if train.num_classes() != test.num_classes() {
        return Err(Error::DatasetError(format!(
            "train split has {} classes but test split has {}",
            train.num_classes(),
            test.num_classes()
        )));
    }
    Ok(())
}

/// Dataset fully held in memory
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    images: Array4<u8>,
    labels: Vec<usize>,
    num_classes: usize,
}

impl InMemoryDataset {
    /// Create from images laid out as (samples, height, width, channels)
    pub fn new(images: Array4<u8>, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if images.len_of(Axis(0)) != labels.len() {
            return Err(Error::DatasetError(format!(
                "{} images but {} labels",
                images.len_of(Axis(0)),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(Error::DatasetError(format!(
                "label {} outside label space of size {}",
                bad, num_classes
            )));
        }
        Ok(Self {
            images,
            labels,
            num_classes,
        })
    }
}

impl LabeledDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn shape(&self) -> ImageShape {
        let (_, height, width, channels) = self.images.dim();
        ImageShape::new(height, width, channels)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    fn image(&self, index: usize) -> Array3<u8> {
        self.images.index_axis(Axis(0), index).to_owned()
    }

    fn labels(&self) -> Vec<usize> {
        self.labels.clone()
    }
}

/// Uniform random images with uniform random labels
///
/// Labels are drawn up front. Pixels are generated on access from a
/// per-sample seed, so the same index always yields the same image without
/// keeping the whole dataset in memory.
#[derive(Debug, Clone)]
pub struct RandomImages {
    shape: ImageShape,
    num_classes: usize,
    labels: Vec<usize>,
    pixel_seed: u64,
}

impl RandomImages {
    /// Draw a dataset of `len` samples from `rng`
    pub fn new<R: Rng + ?Sized>(
        shape: ImageShape,
        num_classes: usize,
        len: usize,
        rng: &mut R,
    ) -> Self {
        let labels = (0..len).map(|_| rng.gen_range(0..num_classes.max(1))).collect();
        Self {
            shape,
            num_classes,
            labels,
            pixel_seed: rng.gen(),
        }
    }

    /// Random dataset with the shape and label space of a named dataset
    pub fn like<R: Rng + ?Sized>(name: DatasetName, len: usize, rng: &mut R) -> Self {
        Self::new(name.shape(), name.num_classes(), len, rng)
    }
}

impl LabeledDataset for RandomImages {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn shape(&self) -> ImageShape {
        self.shape
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    fn image(&self, index: usize) -> Array3<u8> {
        let seed = self.pixel_seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::random_using(
            (self.shape.height, self.shape.width, self.shape.channels),
            Uniform::new_inclusive(0u8, 255u8),
            &mut rng,
        )
    }

    fn labels(&self) -> Vec<usize> {
        self.labels.clone()
    }
}

/// Source of base datasets
pub trait DatasetProvider: Send + Sync {
    /// Load one split of a dataset
    fn load(&self, name: DatasetName, split: Split) -> Result<Arc<dyn LabeledDataset>>;
}

/// Provider that serves [`RandomImages`] with each dataset's shape
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    /// Samples in every training split
    pub train_len: usize,
    /// Samples in every test split
    pub test_len: usize,
    /// Base seed; each (dataset, split) pair derives its own
    pub seed: u64,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            train_len: DEFAULT_SYNTHETIC_LEN,
            test_len: 10_000,
            seed: 0,
        }
    }
}

impl SyntheticProvider {
    pub fn new(train_len: usize, test_len: usize, seed: u64) -> Self {
        Self {
            train_len,
            test_len,
            seed,
        }
    }
}

impl DatasetProvider for SyntheticProvider {
    fn load(&self, name: DatasetName, split: Split) -> Result<Arc<dyn LabeledDataset>> {
        let (len, salt) = match split {
            Split::Train => (self.train_len, 0),
            Split::Test => (self.test_len, 1),
        };
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(2 * name as u64 + salt));
        Ok(Arc::new(RandomImages::like(name, len, &mut rng)))
    }
}

/// Provider backed by datasets registered up front
#[derive(Debug, Default, Clone)]
pub struct MemoryProvider {
    datasets: HashMap<(DatasetName, Split), Arc<dyn LabeledDataset>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset split
    pub fn with(
        mut self,
        name: DatasetName,
        split: Split,
        dataset: Arc<dyn LabeledDataset>,
    ) -> Self {
        self.datasets.insert((name, split), dataset);
        self
    }
}

impl DatasetProvider for MemoryProvider {
    fn load(&self, name: DatasetName, split: Split) -> Result<Arc<dyn LabeledDataset>> {
        self.datasets.get(&(name, split)).cloned().ok_or_else(|| {
            Error::DatasetError(format!("{} {:?} split is not available", name, split))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names() {
        assert_eq!(
            "CIFAR100".parse::<DatasetName>().unwrap(),
            DatasetName::Cifar100
        );
        assert_eq!(
            "FashionMNIST".parse::<DatasetName>().unwrap(),
            DatasetName::FashionMnist
        );
        assert!("imagenet".parse::<DatasetName>().unwrap_err().is_configuration());
        assert_eq!(DatasetName::Cifar10.shape(), ImageShape::new(32, 32, 3));
        assert_eq!(DatasetName::Cifar100.num_classes(), 100);
        assert_eq!(DatasetName::Mnist.shape().pixels(), 784);
    }

    #[test]
    fn test_in_memory_validation() {
        let images = Array4::<u8>::zeros((3, 2, 2, 1));
        assert!(InMemoryDataset::new(images.clone(), vec![0, 1], 2).is_err());
        assert!(InMemoryDataset::new(images.clone(), vec![0, 1, 5], 2).is_err());

        let dataset = InMemoryDataset::new(images, vec![0, 1, 1], 2).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.shape(), ImageShape::new(2, 2, 1));
        assert_eq!(dataset.labels(), vec![0, 1, 1]);
    }

    #[test]
    fn test_matching_splits() {
        let small = InMemoryDataset::new(Array4::zeros((2, 28, 28, 1)), vec![0, 1], 10).unwrap();
        let large = InMemoryDataset::new(Array4::zeros((2, 32, 32, 1)), vec![0, 1], 10).unwrap();
        let wide = InMemoryDataset::new(Array4::zeros((2, 28, 28, 1)), vec![0, 1], 100).unwrap();

        assert!(check_matching_splits(&small, &small.clone()).is_ok());
        let err = check_matching_splits(&small, &large).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));
        let err = check_matching_splits(&small, &wide).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));
    }

    #[test]
    fn test_random_images_are_stable() {
        let mut rng = StdRng::seed_from_u64(3);
        let dataset = RandomImages::like(DatasetName::Cifar10, 20, &mut rng);
        assert_eq!(dataset.len(), 20);
        assert!(dataset.labels().iter().all(|&l| l < 10));
        assert_eq!(dataset.image(4), dataset.image(4));
        assert_ne!(dataset.image(4), dataset.image(5));
        assert_eq!(dataset.image(0).dim(), (32, 32, 3));
    }

    #[test]
    fn test_synthetic_provider() {
        let provider = SyntheticProvider::new(50, 10, 1);
        let train = provider.load(DatasetName::Mnist, Split::Train).unwrap();
        let test = provider.load(DatasetName::Mnist, Split::Test).unwrap();
        assert_eq!(train.len(), 50);
        assert_eq!(test.len(), 10);
        assert_eq!(train.shape(), ImageShape::new(28, 28, 1));

        let again = provider.load(DatasetName::Mnist, Split::Train).unwrap();
        assert_eq!(train.labels(), again.labels());
    }

    #[test]
    fn test_memory_provider_missing_split() {
        let provider = MemoryProvider::new();
        let err = provider.load(DatasetName::Cifar10, Split::Train).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));
    }
}
