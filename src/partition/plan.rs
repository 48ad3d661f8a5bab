//! Ten-way partition plans

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::partition::{PartitionStrategy, NUM_TASKS};

/// An ordered split of sample indices or class ids into [`NUM_TASKS`] groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    strategy: PartitionStrategy,
    groups: Vec<Vec<usize>>,
}

impl PartitionPlan {
    /// Shuffle `0..num_samples` and cut it into ten disjoint groups
    ///
    /// Groups hold `num_samples / 10` items; the remainder goes one each to
    /// the first groups.
    pub fn by_samples<R: Rng + ?Sized>(num_samples: usize, rng: &mut R) -> Self {
        let mut indices: Vec<usize> = (0..num_samples).collect();
        indices.shuffle(rng);

        let base = num_samples / NUM_TASKS;
        let extra = num_samples % NUM_TASKS;
        let mut groups = Vec::with_capacity(NUM_TASKS);
        let mut start = 0;
        for k in 0..NUM_TASKS {
            let size = base + usize::from(k < extra);
            groups.push(indices[start..start + size].to_vec());
            start += size;
        }

        Self {
            strategy: PartitionStrategy::Samples,
            groups,
        }
    }

    /// Permute the label space and cut it into ten equal groups of class ids
    pub fn by_classes<R: Rng + ?Sized>(num_classes: usize, rng: &mut R) -> Result<Self> {
        Self::check_class_count(num_classes)?;
        Ok(Self::split_classes(num_classes, rng))
    }

    /// Class partitioning needs a non-empty label space divisible by [`NUM_TASKS`]
    pub fn check_class_count(num_classes: usize) -> Result<()> {
        if num_classes == 0 || num_classes % NUM_TASKS != 0 {
            return Err(Error::config(format!(
                "class partitioning needs a label space divisible by {}, got {}",
                NUM_TASKS, num_classes
            )));
        }
        Ok(())
    }

    /// Class plan for a label space already passed through [`Self::check_class_count`]
    pub(crate) fn split_classes<R: Rng + ?Sized>(num_classes: usize, rng: &mut R) -> Self {
        let mut classes: Vec<usize> = (0..num_classes).collect();
        classes.shuffle(rng);

        let groups = classes
            .chunks((num_classes / NUM_TASKS).max(1))
            .map(|chunk| chunk.to_vec())
            .collect();

        Self {
            strategy: PartitionStrategy::Classes,
            groups,
        }
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Members of one task
    ///
    /// Accumulating tasks hold groups `0..=task`; task indices past the last
    /// group cover every group.
    pub fn task_members(&self, task: usize, accumulate: bool) -> Vec<usize> {
        if accumulate {
            let last = task.min(self.groups.len().saturating_sub(1));
            self.groups[..=last].concat()
        } else {
            self.groups.get(task).cloned().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_sample_groups_are_disjoint_and_complete() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = PartitionPlan::by_samples(103, &mut rng);
        assert_eq!(plan.groups().len(), NUM_TASKS);

        let sizes: Vec<usize> = plan.groups().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![11, 11, 11, 10, 10, 10, 10, 10, 10, 10]);

        let mut seen = HashSet::new();
        for group in plan.groups() {
            for &i in group {
                assert!(seen.insert(i), "index {} appears twice", i);
            }
        }
        assert_eq!(seen, (0..103).collect::<HashSet<_>>());
    }

    #[test]
    fn test_class_groups() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = PartitionPlan::by_classes(100, &mut rng).unwrap();
        assert!(plan.groups().iter().all(|g| g.len() == 10));

        let all: HashSet<usize> = plan.groups().iter().flatten().copied().collect();
        assert_eq!(all.len(), 100);

        assert!(PartitionPlan::by_classes(15, &mut rng).unwrap_err().is_configuration());
        assert!(PartitionPlan::check_class_count(0).unwrap_err().is_configuration());
        assert!(PartitionPlan::check_class_count(100).is_ok());
    }

    #[test]
    fn test_accumulated_members() {
        let mut rng = StdRng::seed_from_u64(8);
        let plan = PartitionPlan::by_classes(20, &mut rng).unwrap();

        let task2 = plan.task_members(2, true);
        assert_eq!(task2.len(), 6);
        for k in 0..=2 {
            assert!(plan.groups()[k].iter().all(|c| task2.contains(c)));
        }

        assert_eq!(plan.task_members(3, false), plan.groups()[3]);
        assert_eq!(plan.task_members(14, true).len(), 20);
        assert!(plan.task_members(14, false).is_empty());
    }

    #[test]
    fn test_plans_follow_seed() {
        let a = PartitionPlan::by_samples(50, &mut StdRng::seed_from_u64(1));
        let b = PartitionPlan::by_samples(50, &mut StdRng::seed_from_u64(1));
        let c = PartitionPlan::by_samples(50, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
