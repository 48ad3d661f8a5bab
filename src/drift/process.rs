//! Drift Process
//!
//! Owns the 16-dimensional input state, its random generator and the target
//! network, and produces one (input, target) sample per step.

use ndarray::{s, Array1, ArrayView1};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use super::{DriftConfig, DriftPolicy, DriftSettings};
use crate::error::Result;
use crate::stream::{make_rng, Sample, Stream};
use crate::target::{TargetNetwork, NUM_INPUTS};

/// Number of coordinates redrawn on every step
pub const NUM_FAST: usize = 4;

/// Number of coordinates governed by the drift policy
pub const NUM_SLOW: usize = NUM_INPUTS - NUM_FAST;

/// Unbounded generator of drifting regression samples
///
/// # Example
///
/// ```rust
/// use continual_streams::drift::{DriftConfig, DriftProcess, PolicyKind};
/// use continual_streams::Stream;
///
/// let config = DriftConfig {
///     policy: PolicyKind::Smooth,
///     drift_period: Some(1000.0),
///     seed: Some(7),
///     ..Default::default()
/// };
/// let mut process = DriftProcess::new(config).unwrap();
/// let sample = process.step();
/// assert_eq!(sample.input.len(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct DriftProcess {
    settings: DriftSettings,
    seed: Option<u64>,
    rng: StdRng,
    state: Array1<f64>,
    target: TargetNetwork,
    step_count: u64,
}

impl DriftProcess {
    /// Create a process from a configuration, validating it first
    pub fn new(config: DriftConfig) -> Result<Self> {
        let settings = DriftSettings::from_config(&config)?;
        Ok(Self::from_settings(settings, config.seed))
    }

    /// Create a process from already validated settings
    ///
    /// The target network is drawn before the initial state, both from the
    /// process's own generator.
    pub fn from_settings(settings: DriftSettings, seed: Option<u64>) -> Self {
        let mut rng = make_rng(seed);
        let target = settings.target.build(&mut rng);
        let state = Array1::random_using(NUM_INPUTS, StandardNormal, &mut rng);

        debug!(
            "Drift process created: policy={:?}, distribution={:?}, target={}, seed={:?}",
            settings.policy, settings.distribution, settings.target, seed
        );

        Self {
            settings,
            seed,
            rng,
            state,
            target,
            step_count: 0,
        }
    }

    /// Current input state
    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    /// The slow part of the current state
    pub fn slow_state(&self) -> ArrayView1<'_, f64> {
        self.state.slice(s![NUM_FAST..])
    }

    /// Current target network
    pub fn target(&self) -> &TargetNetwork {
        &self.target
    }

    /// Validated settings
    pub fn settings(&self) -> &DriftSettings {
        &self.settings
    }

    /// Seed this process was created with
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    fn is_trigger(&self, change_freq: u64) -> bool {
        self.step_count % change_freq == 0
    }
}

impl Stream for DriftProcess {
    type Batch = Sample;

    fn step(&mut self) -> Sample {
        let candidates = self.settings.distribution.sample(NUM_SLOW, &mut self.rng);
        let fast = self.settings.distribution.sample(NUM_FAST, &mut self.rng);
        self.state.slice_mut(s![..NUM_FAST]).assign(&fast);

        let trigger = match self.settings.policy {
            DriftPolicy::DiscretePeriodic { change_freq }
            | DriftPolicy::DiscreteSingleCoordinate { change_freq } => self.is_trigger(change_freq),
            _ => false,
        };

        let mut slow = self.state.slice_mut(s![NUM_FAST..]);
        match self.settings.policy {
            DriftPolicy::Stationary => slow.assign(&candidates),
            DriftPolicy::Smooth { beta } => {
                let keep = beta.sqrt();
                let mix = (1.0 - beta).sqrt();
                slow.zip_mut_with(&candidates, |old, &new| *old = keep * *old + mix * new);
            }
            DriftPolicy::DiscretePeriodic { .. } => {
                if trigger {
                    slow.assign(&candidates);
                }
            }
            DriftPolicy::DiscreteSingleCoordinate { .. } => {
                if trigger {
                    let idx = self.rng.gen_range(0..NUM_SLOW);
                    slow[idx] = candidates[idx];
                }
            }
        }

        if self.settings.zero_slow_inputs {
            slow.fill(0.0);
        }

        if let Some(freq) = self.settings.retarget_freq {
            if self.is_trigger(freq) {
                self.target.reset(&mut self.rng);
                debug!("Target network redrawn at step {}", self.step_count);
            }
        }

        self.step_count += 1;

        Sample {
            input: self.state.clone(),
            target: self.target.evaluate(&self.state),
        }
    }

    fn step_count(&self) -> u64 {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{InputDistribution, PolicyKind};
    use crate::target::TargetKind;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    /// Replays the generator draws a process makes before its first step
    fn mirror_rng(config: &DriftConfig) -> StdRng {
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap());
        config.target.build(&mut rng);
        let _initial: Array1<f64> = Array1::random_using(NUM_INPUTS, StandardNormal, &mut rng);
        rng
    }

    fn slow(sample: &Sample) -> Array1<f64> {
        sample.input.slice(s![NUM_FAST..]).to_owned()
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let config = DriftConfig {
            policy: PolicyKind::DiscreteSingleCoordinate,
            change_freq: Some(5),
            change_target: true,
            seed: Some(1234),
            ..Default::default()
        };
        let mut a = DriftProcess::new(config.clone()).unwrap();
        let mut b = DriftProcess::new(config).unwrap();

        for _ in 0..200 {
            let sa = a.step();
            let sb = b.step();
            assert_eq!(sa.input, sb.input);
            assert_eq!(sa.target.to_bits(), sb.target.to_bits());
        }
    }

    #[test]
    fn test_stationary_uses_fresh_candidates() {
        let config = DriftConfig {
            policy: PolicyKind::Stationary,
            seed: Some(21),
            ..Default::default()
        };
        let mut mirror = mirror_rng(&config);
        let mut process = DriftProcess::new(config).unwrap();

        for _ in 0..20 {
            let candidates = InputDistribution::Gaussian.sample(NUM_SLOW, &mut mirror);
            let fast = InputDistribution::Gaussian.sample(NUM_FAST, &mut mirror);
            let sample = process.step();
            assert_eq!(slow(&sample), candidates);
            assert_eq!(sample.input.slice(s![..NUM_FAST]), fast);
        }
    }

    #[test]
    fn test_smooth_follows_recurrence() {
        let config = DriftConfig {
            policy: PolicyKind::Smooth,
            drift_period: Some(50.0),
            seed: Some(8),
            ..Default::default()
        };
        let beta: f64 = 1.0 - 1.0 / 50.0;
        let mut mirror = mirror_rng(&config);
        let mut process = DriftProcess::new(config).unwrap();
        let mut previous = process.slow_state().to_owned();

        for _ in 0..30 {
            let candidates = InputDistribution::Gaussian.sample(NUM_SLOW, &mut mirror);
            let _fast = InputDistribution::Gaussian.sample(NUM_FAST, &mut mirror);
            let sample = process.step();
            let expected = &previous * beta.sqrt() + &candidates * (1.0 - beta).sqrt();
            for (got, want) in slow(&sample).iter().zip(expected.iter()) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
            previous = slow(&sample);
        }
    }

    #[test]
    fn test_smooth_keeps_unit_variance() {
        let config = DriftConfig {
            policy: PolicyKind::Smooth,
            drift_period: Some(10.0),
            seed: Some(99),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();

        let steps = 20_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..steps {
            for &v in slow(&process.step()).iter() {
                sum += v;
                sum_sq += v * v;
            }
        }
        let n = (steps * NUM_SLOW) as f64;
        let mean = sum / n;
        let var = sum_sq / n - mean * mean;
        assert_abs_diff_eq!(var, 1.0, epsilon = 0.1);
        assert_abs_diff_eq!(mean, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_discrete_periodic_changes_only_on_trigger() {
        let config = DriftConfig {
            policy: PolicyKind::DiscretePeriodic,
            change_freq: Some(4),
            seed: Some(17),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        let mut previous = process.slow_state().to_owned();

        for counter in 0..40u64 {
            let current = slow(&process.step());
            if counter % 4 == 0 {
                assert!(current.iter().zip(previous.iter()).all(|(a, b)| a != b));
            } else {
                assert_eq!(current, previous);
            }
            previous = current;
        }
    }

    #[test]
    fn test_single_coordinate_changes_exactly_one() {
        let config = DriftConfig {
            policy: PolicyKind::DiscreteSingleCoordinate,
            change_freq: Some(3),
            seed: Some(5),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        let mut previous = process.slow_state().to_owned();

        for counter in 0..60u64 {
            let current = slow(&process.step());
            let changed = current
                .iter()
                .zip(previous.iter())
                .filter(|(a, b)| a != b)
                .count();
            if counter % 3 == 0 {
                assert_eq!(changed, 1, "step {}", counter);
            } else {
                assert_eq!(changed, 0, "step {}", counter);
            }
            previous = current;
        }
    }

    #[test]
    fn test_retargeting_on_trigger_steps() {
        let config = DriftConfig {
            policy: PolicyKind::Stationary,
            change_target: true,
            change_freq: Some(4),
            seed: Some(31),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();

        for counter in 0..20u64 {
            let before = process.target().params().clone();
            process.step();
            let after = process.target().params();
            if counter % 4 == 0 {
                assert_ne!(&before.w1, &after.w1, "step {}", counter);
                assert_ne!(&before.w3, &after.w3, "step {}", counter);
            } else {
                assert_eq!(&before, after, "step {}", counter);
            }
        }
    }

    #[test]
    fn test_fixed_target_without_retargeting() {
        let config = DriftConfig {
            policy: PolicyKind::DiscretePeriodic,
            change_freq: Some(2),
            seed: Some(32),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        let before = process.target().params().clone();
        for _ in 0..10 {
            process.step();
        }
        assert_eq!(&before, process.target().params());
    }

    #[test]
    fn test_target_matches_returned_input() {
        let config = DriftConfig {
            policy: PolicyKind::Smooth,
            drift_period: Some(20.0),
            target: TargetKind::LtuNetwork,
            seed: Some(2),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        for _ in 0..10 {
            let sample = process.step();
            assert_eq!(sample.target, process.target().evaluate(&sample.input));
        }
    }

    #[test]
    fn test_returned_sample_is_a_copy() {
        let config = DriftConfig {
            seed: Some(4),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        let mut sample = process.step();
        let state = process.state().clone();
        sample.input.fill(100.0);
        assert_eq!(process.state(), &state);
    }

    #[test]
    fn test_four_input_variant_zeroes_slow_coordinates() {
        let config = DriftConfig {
            policy: PolicyKind::Smooth,
            drift_period: Some(10.0),
            target: TargetKind::LtuNetworkFourInput,
            seed: Some(6),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        for _ in 0..10 {
            let sample = process.step();
            assert!(slow(&sample).iter().all(|&v| v == 0.0));
            assert!(sample.input.slice(s![..NUM_FAST]).iter().any(|&v| v != 0.0));
        }
    }

    #[test]
    fn test_step_counter() {
        let config = DriftConfig {
            seed: Some(1),
            ..Default::default()
        };
        let mut process = DriftProcess::new(config).unwrap();
        assert_eq!(process.step_count(), 0);
        for _ in 0..7 {
            process.step();
        }
        assert_eq!(process.step_count(), 7);
    }
}
