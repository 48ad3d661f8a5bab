//! Per-image pixel transforms
//!
//! Images enter a [`Pipeline`] as `u8` arrays laid out (height, width,
//! channels), are scaled to `[0, 1]` and transposed to (channels, height,
//! width), then each transform runs in order.

use std::str::FromStr;
use std::sync::Arc;

use ndarray::{s, Array1, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::images::DatasetName;

/// Convert a (height, width, channels) `u8` image to a (channels, height, width)
/// `f32` tensor in `[0, 1]`
pub fn to_tensor(image: &Array3<u8>) -> Array3<f32> {
    image
        .view()
        .permuted_axes([2, 0, 1])
        .mapv(|p| p as f32 / 255.0)
}

/// A single transform on a (channels, height, width) tensor
#[derive(Debug, Clone, PartialEq)]
pub enum PixelTransform {
    /// `(x - mean) / std` per channel; a single value applies to every channel
    Normalize { mean: Vec<f32>, std: Vec<f32> },
    /// Zero-pad every side, then crop back to the original size at a random offset
    RandomCrop { padding: usize },
    /// Mirror left-right with probability 0.5
    RandomHorizontalFlip,
    /// Separable Gaussian blur with reflected borders
    GaussianBlur { kernel_size: usize, sigma: f32 },
    /// Luma, replicated over all channels
    Grayscale,
    /// Reorder pixel positions: output pixel `p` takes input pixel `perm[p]`
    ///
    /// `perm` must cover every pixel position of the images it is applied
    /// to; see [`check_matching_splits`](crate::images::check_matching_splits).
    PermutePixels(Arc<[usize]>),
}

impl PixelTransform {
    /// Normalization with statistics shared by every channel
    pub fn normalize_uniform(mean: f32, std: f32) -> Self {
        PixelTransform::Normalize {
            mean: vec![mean],
            std: vec![std],
        }
    }

    /// Normalization with a dataset's own statistics
    pub fn normalize_for(dataset: DatasetName) -> Self {
        let (mean, std) = dataset.normalization();
        PixelTransform::Normalize { mean, std }
    }

    /// Apply the transform, drawing any randomness from `rng`
    pub fn apply<R: Rng + ?Sized>(&self, image: Array3<f32>, rng: &mut R) -> Array3<f32> {
        match self {
            PixelTransform::Normalize { mean, std } => normalize(image, mean, std),
            PixelTransform::RandomCrop { padding } => random_crop(image, *padding, rng),
            PixelTransform::RandomHorizontalFlip => {
                if rng.gen::<bool>() {
                    image.slice(s![.., .., ..;-1]).to_owned()
                } else {
                    image
                }
            }
            PixelTransform::GaussianBlur { kernel_size, sigma } => {
                gaussian_blur(&image, *kernel_size, *sigma)
            }
            PixelTransform::Grayscale => grayscale(image),
            PixelTransform::PermutePixels(perm) => permute_pixels(&image, perm),
        }
    }
}

fn normalize(mut image: Array3<f32>, mean: &[f32], std: &[f32]) -> Array3<f32> {
    for (c, mut plane) in image.axis_iter_mut(Axis(0)).enumerate() {
        let m = mean.get(c).or_else(|| mean.last());
        let s = std.get(c).or_else(|| std.last());
        if let (Some(&m), Some(&s)) = (m, s) {
            plane.mapv_inplace(|v| (v - m) / s);
        }
    }
    image
}

fn random_crop<R: Rng + ?Sized>(image: Array3<f32>, padding: usize, rng: &mut R) -> Array3<f32> {
    if padding == 0 {
        return image;
    }
    let (channels, height, width) = image.dim();
    let mut padded = Array3::zeros((channels, height + 2 * padding, width + 2 * padding));
    padded
        .slice_mut(s![.., padding..padding + height, padding..padding + width])
        .assign(&image);

    let top = rng.gen_range(0..=2 * padding);
    let left = rng.gen_range(0..=2 * padding);
    padded
        .slice(s![.., top..top + height, left..left + width])
        .to_owned()
}

/// Index into `0..len` mirrored at the borders without repeating the edge
fn reflect(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let i = index.rem_euclid(period);
    if i >= len as isize {
        (period - i) as usize
    } else {
        i as usize
    }
}

fn gaussian_kernel(kernel_size: usize, sigma: f32) -> Array1<f32> {
    let half = (kernel_size / 2) as f32;
    let weights = Array1::from_shape_fn(kernel_size, |i| {
        let x = i as f32 - half;
        (-(x * x) / (2.0 * sigma * sigma)).exp()
    });
    let total = weights.sum();
    weights / total
}

fn gaussian_blur(image: &Array3<f32>, kernel_size: usize, sigma: f32) -> Array3<f32> {
    if kernel_size <= 1 || sigma <= 0.0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(kernel_size, sigma);
    let half = (kernel_size / 2) as isize;
    let (channels, height, width) = image.dim();

    let horizontal: Array3<f32> = Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * image[[c, y, reflect(x as isize + k as isize - half, width)]])
            .sum::<f32>()
    });
    Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * horizontal[[c, reflect(y as isize + k as isize - half, height), x]])
            .sum::<f32>()
    })
}

fn grayscale(mut image: Array3<f32>) -> Array3<f32> {
    if image.len_of(Axis(0)) < 3 {
        return image;
    }
    let luma = &image.index_axis(Axis(0), 0) * 0.2989
        + &image.index_axis(Axis(0), 1) * 0.587
        + &image.index_axis(Axis(0), 2) * 0.114;
    for mut plane in image.axis_iter_mut(Axis(0)) {
        plane.assign(&luma);
    }
    image
}

fn permute_pixels(image: &Array3<f32>, perm: &[usize]) -> Array3<f32> {
    let (channels, height, width) = image.dim();
    debug_assert_eq!(
        perm.len(),
        height * width,
        "permutation does not match image size"
    );
    if perm.len() != height * width {
        return image.clone();
    }
    Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        let source = perm[y * width + x];
        image[[c, source / width, source % width]]
    })
}

/// Ordered list of transforms applied after tensor conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    transforms: Vec<PixelTransform>,
}

impl Pipeline {
    pub fn new(transforms: Vec<PixelTransform>) -> Self {
        Self { transforms }
    }

    /// Tensor conversion followed by `(x - 0.5) / 0.5`
    pub fn standard() -> Self {
        Self::new(vec![PixelTransform::normalize_uniform(0.5, 0.5)])
    }

    /// Append a transform
    pub fn then(mut self, transform: PixelTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Prepend a transform so it runs before the existing ones
    pub fn before(mut self, transform: PixelTransform) -> Self {
        self.transforms.insert(0, transform);
        self
    }

    pub fn transforms(&self) -> &[PixelTransform] {
        &self.transforms
    }

    /// Convert and transform one raw image
    pub fn apply<R: Rng + ?Sized>(&self, image: &Array3<u8>, rng: &mut R) -> Array3<f32> {
        self.transforms
            .iter()
            .fold(to_tensor(image), |acc, t| t.apply(acc, &mut *rng))
    }
}

/// Preprocessing profile for image streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Preprocess {
    /// Tensor conversion and `(x - 0.5) / 0.5`
    #[default]
    None,
    /// Training-time crop and flip plus dataset normalization (32x32 RGB only)
    Augmented,
}

impl Preprocess {
    fn check(self, dataset: DatasetName) -> Result<()> {
        let shape = dataset.shape();
        let rgb32 = (shape.height, shape.width, shape.channels) == (32, 32, 3);
        if self == Preprocess::Augmented && !rgb32 {
            return Err(Error::config(format!(
                "augmented preprocessing requires 32x32 RGB images, {} is {}x{}x{}",
                dataset, shape.height, shape.width, shape.channels
            )));
        }
        Ok(())
    }

    /// Pipeline for training batches
    pub fn train_pipeline(self, dataset: DatasetName) -> Result<Pipeline> {
        self.check(dataset)?;
        Ok(match self {
            Preprocess::None => Pipeline::standard(),
            Preprocess::Augmented => Pipeline::new(vec![
                PixelTransform::RandomCrop { padding: 4 },
                PixelTransform::RandomHorizontalFlip,
                PixelTransform::normalize_for(dataset),
            ]),
        })
    }

    /// Pipeline for held-out batches
    pub fn test_pipeline(self, dataset: DatasetName) -> Result<Pipeline> {
        self.check(dataset)?;
        Ok(match self {
            Preprocess::None => Pipeline::standard(),
            Preprocess::Augmented => Pipeline::new(vec![PixelTransform::normalize_for(dataset)]),
        })
    }
}

impl FromStr for Preprocess {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Preprocess::None),
            "augmented" | "good" => Ok(Preprocess::Augmented),
            other => Err(Error::config(format!("unknown preprocessing '{}'", other))),
        }
    }
}

impl TryFrom<String> for Preprocess {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(channels: usize, height: usize, width: usize) -> Array3<f32> {
        Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
            (c * 100 + y * width + x) as f32
        })
    }

    #[test]
    fn test_to_tensor_layout() {
        let image = Array3::from_shape_fn((2, 3, 3), |(y, x, c)| (y * 30 + x * 3 + c) as u8);
        let tensor = to_tensor(&image);
        assert_eq!(tensor.dim(), (3, 2, 3));
        assert_abs_diff_eq!(tensor[[2, 1, 0]], 32.0 / 255.0);
    }

    #[test]
    fn test_normalize_broadcasts_single_value() {
        let mut rng = StdRng::seed_from_u64(0);
        let image = Array3::from_elem((3, 2, 2), 1.0f32);
        let out = PixelTransform::normalize_uniform(0.5, 0.5).apply(image, &mut rng);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_crop_keeps_shape_and_content() {
        let mut rng = StdRng::seed_from_u64(1);
        let image = ramp(1, 6, 6) + 1.0;
        for _ in 0..20 {
            let out = PixelTransform::RandomCrop { padding: 2 }.apply(image.clone(), &mut rng);
            assert_eq!(out.dim(), (1, 6, 6));
            // Every nonzero value is an original pixel
            assert!(out.iter().all(|&v| v == 0.0 || image.iter().any(|&p| p == v)));
        }
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let image = ramp(1, 2, 3);
        let mut rng = StdRng::seed_from_u64(5);
        let mut saw_flip = false;
        for _ in 0..20 {
            let out = PixelTransform::RandomHorizontalFlip.apply(image.clone(), &mut rng);
            if out != image {
                saw_flip = true;
                assert_eq!(out[[0, 0, 0]], image[[0, 0, 2]]);
                assert_eq!(out[[0, 1, 2]], image[[0, 1, 0]]);
            }
        }
        assert!(saw_flip);
    }

    #[test]
    fn test_reflect_indices() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(6, 5), 2);
        assert_eq!(reflect(3, 1), 0);
    }

    #[test]
    fn test_blur_preserves_constant_image() {
        let mut rng = StdRng::seed_from_u64(0);
        let image = Array3::from_elem((3, 8, 8), 0.25f32);
        let out = PixelTransform::GaussianBlur {
            kernel_size: 5,
            sigma: 1.5,
        }
        .apply(image, &mut rng);
        for v in out.iter() {
            assert_abs_diff_eq!(*v, 0.25, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_blur_smooths_spike() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut image = Array3::zeros((1, 9, 9));
        image[[0, 4, 4]] = 1.0;
        let out = PixelTransform::GaussianBlur {
            kernel_size: 5,
            sigma: 1.5,
        }
        .apply(image, &mut rng);
        assert!(out[[0, 4, 4]] < 1.0);
        assert!(out[[0, 4, 5]] > 0.0);
        assert_abs_diff_eq!(out.sum(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_grayscale_replicates_luma() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut image = Array3::zeros((3, 1, 1));
        image[[0, 0, 0]] = 1.0;
        let out = PixelTransform::Grayscale.apply(image, &mut rng);
        for c in 0..3 {
            assert_abs_diff_eq!(out[[c, 0, 0]], 0.2989, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_permute_pixels() {
        let mut rng = StdRng::seed_from_u64(0);
        let image = ramp(2, 2, 2);
        let perm: Arc<[usize]> = vec![3, 2, 1, 0].into();
        let out = PixelTransform::PermutePixels(perm).apply(image.clone(), &mut rng);
        assert_eq!(out[[0, 0, 0]], image[[0, 1, 1]]);
        assert_eq!(out[[1, 1, 0]], image[[1, 0, 1]]);
    }

    #[test]
    fn test_augmented_requires_rgb32() {
        assert!(Preprocess::Augmented.train_pipeline(DatasetName::Mnist).is_err());
        let train = Preprocess::Augmented.train_pipeline(DatasetName::Cifar10).unwrap();
        assert_eq!(train.transforms().len(), 3);
        let test = Preprocess::Augmented.test_pipeline(DatasetName::Cifar10).unwrap();
        assert_eq!(test.transforms().len(), 1);
        let train = Preprocess::None.train_pipeline(DatasetName::Mnist).unwrap();
        assert_eq!(train, Pipeline::standard());
    }
}
