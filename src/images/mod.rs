//! Image Data Module
//!
//! Labeled datasets, pixel transforms and batch loading shared by every
//! image stream.

mod dataset;
mod loader;
mod transform;

pub use dataset::{
    check_matching_splits, DatasetName, DatasetProvider, ImageShape, InMemoryDataset,
    LabeledDataset, MemoryProvider, RandomImages, Split, SyntheticProvider, DEFAULT_SYNTHETIC_LEN,
};
pub use loader::{BatchLoader, DatasetView, LabelSource};
pub use transform::{to_tensor, Pipeline, PixelTransform, Preprocess};
