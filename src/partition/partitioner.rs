//! Dataset Partitioner
//!
//! Serves batches from the active task of a [`PartitionPlan`] and moves to
//! the next task when `(step_count + 1) % (next_task * change_freq) == 0`,
//! where `next_task` counts the tasks started in the current plan. Later
//! tasks therefore last longer than earlier ones.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{PartitionConfig, PartitionPlan, PartitionStrategy, NUM_TASKS};
use crate::error::Result;
use crate::images::{
    check_matching_splits, BatchLoader, DatasetProvider, DatasetView, LabeledDataset, Pipeline,
    Split,
};
use crate::stream::{make_rng, HeldOut, ImageBatch, Stream};

/// A labeled dataset replayed as a sequence of ten tasks
#[derive(Debug)]
pub struct DatasetPartitioner {
    config: PartitionConfig,
    train: Arc<dyn LabeledDataset>,
    test: Arc<dyn LabeledDataset>,
    train_labels: Vec<usize>,
    test_labels: Vec<usize>,
    train_pipeline: Arc<Pipeline>,
    test_pipeline: Arc<Pipeline>,
    rng: StdRng,
    plan: PartitionPlan,
    plans_drawn: u64,
    next_task: usize,
    loader: BatchLoader,
    test_view: DatasetView,
    step_count: u64,
}

impl DatasetPartitioner {
    /// Load the dataset, draw the first plan and start task 0
    pub fn new(config: PartitionConfig, provider: &dyn DatasetProvider) -> Result<Self> {
        config.validate()?;
        let train_pipeline = Arc::new(config.preprocess.train_pipeline(config.dataset)?);
        let test_pipeline = Arc::new(config.preprocess.test_pipeline(config.dataset)?);

        let train = provider.load(config.dataset, Split::Train)?;
        let test = provider.load(config.dataset, Split::Test)?;
        check_matching_splits(train.as_ref(), test.as_ref())?;

        if config.strategy == PartitionStrategy::Classes {
            PartitionPlan::check_class_count(train.num_classes())?;
        }
        let mut rng = make_rng(config.seed);
        let plan = Self::draw_plan(config.strategy, train.as_ref(), &mut rng);

        info!(
            "Partitioning {} ({} train / {} test samples) by {} into {} tasks",
            config.dataset,
            train.len(),
            test.len(),
            config.strategy,
            NUM_TASKS
        );

        let loader = BatchLoader::new(
            DatasetView::subset(train.clone(), Vec::new(), train_pipeline.clone()),
            config.batch_size,
            true,
            true,
            StdRng::seed_from_u64(rng.gen()),
        );
        let test_view = DatasetView::full(test.clone(), test_pipeline.clone());

        let mut partitioner = Self {
            train_labels: train.labels(),
            test_labels: test.labels(),
            config,
            train,
            test,
            train_pipeline,
            test_pipeline,
            rng,
            plan,
            plans_drawn: 1,
            next_task: 0,
            loader,
            test_view,
            step_count: 0,
        };
        partitioner.advance_task();
        Ok(partitioner)
    }

    /// Draw a plan; the label space was checked in `new`
    fn draw_plan(
        strategy: PartitionStrategy,
        train: &dyn LabeledDataset,
        rng: &mut StdRng,
    ) -> PartitionPlan {
        match strategy {
            PartitionStrategy::Samples => PartitionPlan::by_samples(train.len(), rng),
            PartitionStrategy::Classes => PartitionPlan::split_classes(train.num_classes(), rng),
        }
    }

    /// Move to the next task, drawing a fresh plan after the last one
    ///
    /// With accumulation the plan is kept past the last task and every
    /// later task covers the whole training set.
    pub fn advance_task(&mut self) {
        if self.next_task >= NUM_TASKS && !self.config.accumulate {
            let strategy = self.config.strategy;
            self.plan = Self::draw_plan(strategy, self.train.as_ref(), &mut self.rng);
            self.plans_drawn += 1;
            self.next_task = 0;
            debug!(
                "Partition plan #{} drawn at step {}",
                self.plans_drawn, self.step_count
            );
        }

        let task = self.next_task;
        let accumulate = self.config.accumulate;
        let members = self.plan.task_members(task, accumulate);

        self.test_view = match self.config.strategy {
            PartitionStrategy::Classes if !accumulate => DatasetView::subset(
                self.test.clone(),
                samples_with_labels(&self.test_labels, &members, self.test.num_classes()),
                self.test_pipeline.clone(),
            ),
            _ => DatasetView::full(self.test.clone(), self.test_pipeline.clone()),
        };

        let train_indices = match self.config.strategy {
            PartitionStrategy::Samples => members,
            PartitionStrategy::Classes => {
                samples_with_labels(&self.train_labels, &members, self.train.num_classes())
            }
        };

        let view = DatasetView::subset(
            self.train.clone(),
            train_indices,
            self.train_pipeline.clone(),
        );
        debug!(
            "Task {} active at step {} with {} training samples",
            task,
            self.step_count,
            view.len()
        );
        self.loader = BatchLoader::new(
            view,
            self.config.batch_size,
            true,
            true,
            StdRng::seed_from_u64(self.rng.gen()),
        );
        self.next_task += 1;
    }

    /// Index of the active task within the current plan
    pub fn active_task(&self) -> usize {
        self.next_task.saturating_sub(1)
    }

    /// Number of plans drawn so far, including the first
    pub fn plans_drawn(&self) -> u64 {
        self.plans_drawn
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Training data of the active task
    pub fn train_view(&self) -> &DatasetView {
        self.loader.view()
    }
}

/// Indices of samples whose label is in `classes`
fn samples_with_labels(labels: &[usize], classes: &[usize], num_classes: usize) -> Vec<usize> {
    let mut wanted = vec![false; num_classes];
    for &c in classes {
        if let Some(slot) = wanted.get_mut(c) {
            *slot = true;
        }
    }
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &label)| wanted.get(label).copied().unwrap_or(false))
        .map(|(i, _)| i)
        .collect()
}

impl Stream for DatasetPartitioner {
    type Batch = ImageBatch;

    fn step(&mut self) -> ImageBatch {
        let threshold = self.next_task as u64 * self.config.change_freq;
        if (self.step_count + 1) % threshold == 0 {
            self.advance_task();
        }
        let batch = self.loader.next_cycling();
        self.step_count += 1;
        batch
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl HeldOut for DatasetPartitioner {
    fn test_view(&self) -> Option<DatasetView> {
        Some(self.test_view.clone())
    }
}
