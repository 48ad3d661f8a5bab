//! Dataset views and batch loading
//!
//! A [`DatasetView`] is a cheap, clonable window onto a shared dataset: a
//! subset of sample indices, a label source, and a preprocessing pipeline.
//! A [`BatchLoader`] walks a view in (optionally shuffled) batches.

use std::sync::Arc;

use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::images::{ImageShape, LabeledDataset, Pipeline};
use crate::stream::ImageBatch;

/// Where a view's labels come from
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSource {
    /// The dataset's own labels
    Original,
    /// Dataset labels passed through a lookup table (`table[label]`)
    Mapped(Arc<[usize]>),
    /// One replacement label per dataset sample, indexed by sample index
    Replaced(Arc<[usize]>),
}

impl LabelSource {
    fn resolve(&self, dataset: &dyn LabeledDataset, index: usize) -> usize {
        match self {
            LabelSource::Original => dataset.label(index),
            LabelSource::Mapped(table) => table[dataset.label(index)],
            LabelSource::Replaced(labels) => labels[index],
        }
    }
}

/// Subset of a shared dataset with its labels and preprocessing
#[derive(Debug, Clone)]
pub struct DatasetView {
    dataset: Arc<dyn LabeledDataset>,
    indices: Arc<[usize]>,
    labels: LabelSource,
    pipeline: Arc<Pipeline>,
}

impl DatasetView {
    /// View over every sample
    pub fn full(dataset: Arc<dyn LabeledDataset>, pipeline: Arc<Pipeline>) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        Self::subset(dataset, indices, pipeline)
    }

    /// View over the given sample indices
    pub fn subset(
        dataset: Arc<dyn LabeledDataset>,
        indices: Vec<usize>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            dataset,
            indices: indices.into(),
            labels: LabelSource::Original,
            pipeline,
        }
    }

    /// Replace the label source
    pub fn with_labels(mut self, labels: LabelSource) -> Self {
        self.labels = labels;
        self
    }

    /// Replace the preprocessing pipeline
    pub fn with_pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dataset sample indices covered by the view
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn dataset(&self) -> &Arc<dyn LabeledDataset> {
        &self.dataset
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Raw image shape of the underlying dataset
    pub fn shape(&self) -> ImageShape {
        self.dataset.shape()
    }

    /// Label of a dataset sample under this view's label source
    pub fn label_of(&self, index: usize) -> usize {
        self.labels.resolve(self.dataset.as_ref(), index)
    }

    /// All labels in view order
    pub fn labels(&self) -> Vec<usize> {
        self.indices.iter().map(|&i| self.label_of(i)).collect()
    }

    /// Load, preprocess and stack the given dataset samples
    pub fn assemble<R: Rng + ?Sized>(&self, sample_indices: &[usize], rng: &mut R) -> ImageBatch {
        let shape = self.shape();
        let processed: Vec<Array3<f32>> = sample_indices
            .iter()
            .map(|&i| self.pipeline.apply(&self.dataset.image(i), &mut *rng))
            .collect();
        let (channels, height, width) = processed
            .first()
            .map(|image| image.dim())
            .unwrap_or((shape.channels, shape.height, shape.width));

        let mut images = Array4::zeros((processed.len(), channels, height, width));
        for (mut slot, image) in images.outer_iter_mut().zip(&processed) {
            slot.assign(image);
        }
        ImageBatch {
            images,
            labels: sample_indices.iter().map(|&i| self.label_of(i)).collect(),
        }
    }

    /// Sequential batches over the whole view, without shuffling
    ///
    /// Random transforms in the pipeline draw from a fixed seed, so two
    /// passes over the same view produce the same batches.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = ImageBatch> + '_ {
        let mut rng = StdRng::seed_from_u64(0);
        self.indices
            .chunks(batch_size.max(1))
            .map(move |chunk| self.assemble(chunk, &mut rng))
    }
}

/// Batch iterator over a [`DatasetView`]
#[derive(Debug, Clone)]
pub struct BatchLoader {
    view: DatasetView,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
    epochs: u64,
}

impl BatchLoader {
    /// Create a loader positioned at the start of its first epoch
    pub fn new(
        view: DatasetView,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        rng: StdRng,
    ) -> Self {
        let mut loader = Self {
            view,
            batch_size: batch_size.max(1),
            shuffle,
            drop_last,
            rng,
            order: Vec::new(),
            cursor: 0,
            epochs: 0,
        };
        loader.restart();
        loader
    }

    /// Begin a new epoch
    pub fn restart(&mut self) {
        self.order = self.view.indices().to_vec();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.epochs += 1;
    }

    /// Next batch of the current epoch, `None` once it is exhausted
    ///
    /// With `drop_last`, a trailing partial batch is skipped unless the whole
    /// view is smaller than one batch.
    pub fn next_batch(&mut self) -> Option<ImageBatch> {
        let remaining = self.order.len() - self.cursor;
        if remaining == 0 {
            return None;
        }
        let take = if remaining >= self.batch_size {
            self.batch_size
        } else if self.drop_last && self.order.len() >= self.batch_size {
            self.cursor = self.order.len();
            return None;
        } else {
            remaining
        };

        let chunk = &self.order[self.cursor..self.cursor + take];
        let batch = self.view.assemble(chunk, &mut self.rng);
        self.cursor += take;
        Some(batch)
    }

    /// Next batch, restarting the epoch when the current one is exhausted
    ///
    /// An empty view yields an empty batch.
    pub fn next_cycling(&mut self) -> ImageBatch {
        if let Some(batch) = self.next_batch() {
            return batch;
        }
        self.restart();
        self.next_batch().unwrap_or_else(|| {
            let shape = self.view.shape();
            ImageBatch::empty(shape.channels, shape.height, shape.width)
        })
    }

    pub fn view(&self) -> &DatasetView {
        &self.view
    }

    /// Swap the preprocessing pipeline without disturbing the epoch position
    pub fn set_pipeline(&mut self, pipeline: Arc<Pipeline>) {
        self.view.pipeline = pipeline;
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of epochs started, including the current one
    pub fn epochs(&self) -> u64 {
        self.epochs
    }
}

impl Iterator for BatchLoader {
    type Item = ImageBatch;

    fn next(&mut self) -> Option<ImageBatch> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::InMemoryDataset;
    use std::collections::HashSet;

    fn tiny_dataset(n: usize) -> Arc<dyn LabeledDataset> {
        let images = Array4::from_shape_fn((n, 2, 2, 1), |(i, _, _, _)| i as u8);
        let labels = (0..n).map(|i| i % 10).collect();
        Arc::new(InMemoryDataset::new(images, labels, 10).unwrap())
    }

    fn identity() -> Arc<Pipeline> {
        Arc::new(Pipeline::default())
    }

    #[test]
    fn test_view_labels() {
        let dataset = tiny_dataset(12);
        let view = DatasetView::subset(dataset.clone(), vec![1, 5, 11], identity());
        assert_eq!(view.labels(), vec![1, 5, 1]);

        let table: Arc<[usize]> = (0..10usize).map(|l| 9 - l).collect::<Vec<_>>().into();
        let mapped = view.clone().with_labels(LabelSource::Mapped(table));
        assert_eq!(mapped.labels(), vec![8, 4, 8]);

        let replaced: Arc<[usize]> = vec![7; 12].into();
        let replaced = view.with_labels(LabelSource::Replaced(replaced));
        assert_eq!(replaced.labels(), vec![7, 7, 7]);
    }

    #[test]
    fn test_assemble_layout() {
        let view = DatasetView::full(tiny_dataset(4), identity());
        let mut rng = StdRng::seed_from_u64(0);
        let batch = view.assemble(&[3, 0], &mut rng);
        assert_eq!(batch.images.dim(), (2, 1, 2, 2));
        assert_eq!(batch.labels, vec![3, 0]);
        assert!((batch.images[[0, 0, 1, 1]] - 3.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_with_pipeline() {
        let view = DatasetView::full(tiny_dataset(2), identity())
            .with_pipeline(Arc::new(Pipeline::standard()));
        let mut rng = StdRng::seed_from_u64(0);
        let batch = view.assemble(&[0], &mut rng);
        assert!((batch.images[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert_eq!(view.pipeline(), &Pipeline::standard());
    }

    #[test]
    fn test_sequential_batches() {
        let view = DatasetView::full(tiny_dataset(10), identity());
        let sizes: Vec<usize> = view.batches(4).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_loader_covers_epoch_without_repeats() {
        let view = DatasetView::full(tiny_dataset(10), identity());
        let mut loader = BatchLoader::new(view, 3, true, false, StdRng::seed_from_u64(1));
        let mut seen = HashSet::new();
        let mut sizes = Vec::new();
        while let Some(batch) = loader.next_batch() {
            sizes.push(batch.len());
            for label in batch.labels {
                assert!(seen.insert(label));
            }
        }
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_drop_last() {
        let view = DatasetView::full(tiny_dataset(10), identity());
        let loader = BatchLoader::new(view, 4, false, true, StdRng::seed_from_u64(1));
        let sizes: Vec<usize> = loader.map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4]);

        // A view smaller than one batch still yields it
        let view = DatasetView::full(tiny_dataset(3), identity());
        let mut loader = BatchLoader::new(view, 4, false, true, StdRng::seed_from_u64(1));
        assert_eq!(loader.next_batch().map(|b| b.len()), Some(3));
    }

    #[test]
    fn test_cycling_restarts() {
        let view = DatasetView::full(tiny_dataset(5), identity());
        let mut loader = BatchLoader::new(view, 5, false, false, StdRng::seed_from_u64(1));
        assert_eq!(loader.next_cycling().labels, vec![0, 1, 2, 3, 4]);
        assert_eq!(loader.next_cycling().labels, vec![0, 1, 2, 3, 4]);
        assert_eq!(loader.epochs(), 2);
    }

    #[test]
    fn test_empty_view_yields_empty_batch() {
        let view = DatasetView::subset(tiny_dataset(5), Vec::new(), identity());
        let mut loader = BatchLoader::new(view, 4, true, true, StdRng::seed_from_u64(1));
        let batch = loader.next_cycling();
        assert!(batch.is_empty());
        assert_eq!(batch.images.dim(), (0, 1, 2, 2));
    }
}
