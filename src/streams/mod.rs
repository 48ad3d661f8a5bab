//! Single-Source Image Streams
//!
//! Image streams without a task schedule of their own. They serve as the
//! segments of a [`crate::sequence::StreamSequencer`] or stand alone.

mod noise;
mod permuted;
mod robustness;
mod vanilla;

pub use noise::{NoiseConfig, NoiseImages, NoiseKind};
pub use permuted::{PermutedConfig, PermutedImages, PERMUTATION_SEED_OFFSET};
pub use robustness::{RobustnessConfig, RobustnessImages, RobustnessTransform};
pub use vanilla::{VanillaConfig, VanillaImages};
