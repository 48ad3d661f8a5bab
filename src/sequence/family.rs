//! Stream families addressable by name

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::images::DatasetName;
use crate::streams::{NoiseKind, RobustnessTransform};

/// Marker every sequenced family name starts with
pub const SEQUENCE_PREFIX: &str = "sequence_";

/// Datasets every family exists for
pub const SEQUENCE_DATASETS: [DatasetName; 2] = [DatasetName::Cifar10, DatasetName::Cifar100];

/// A kind of image stream that can fill a sequencer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFamily {
    /// The plain training set
    Vanilla(DatasetName),
    /// Synthetic noise shaped like `base`
    Noise { base: DatasetName, kind: NoiseKind },
    /// A real dataset under a robustness transform
    Robustness {
        dataset: DatasetName,
        transform: RobustnessTransform,
    },
}

impl StreamFamily {
    /// Every family a sequencer can be built from
    ///
    /// Per dataset: the vanilla stream, each noise kind, then each
    /// robustness transform.
    pub fn all() -> impl Iterator<Item = StreamFamily> {
        SEQUENCE_DATASETS.into_iter().flat_map(|dataset| {
            let base = dataset;
            let noise = NoiseKind::ALL
                .into_iter()
                .map(move |kind| StreamFamily::Noise { base, kind });
            let robustness = RobustnessTransform::ALL
                .into_iter()
                .map(move |transform| StreamFamily::Robustness { dataset, transform });
            std::iter::once(StreamFamily::Vanilla(dataset))
                .chain(noise)
                .chain(robustness)
        })
    }

    /// Resolve a `sequence_<family>` name
    pub fn from_sequence_name(name: &str) -> Result<Self> {
        let family = name.strip_prefix(SEQUENCE_PREFIX).ok_or_else(|| {
            Error::config(format!("'{}' does not start with '{}'", name, SEQUENCE_PREFIX))
        })?;
        family.parse()
    }
}

impl FromStr for StreamFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StreamFamily::all()
            .find(|family| family.to_string() == s)
            .ok_or_else(|| Error::config(format!("invalid stream family '{}'", s)))
    }
}

impl fmt::Display for StreamFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanilla(dataset) => write!(f, "{}", dataset),
            Self::Noise { base, kind } => write!(f, "{}_{}_inputs_random_labels", base, kind),
            Self::Robustness { dataset, transform } => write!(f, "{}_{}", dataset, transform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_family_names() {
        let names: Vec<String> = StreamFamily::all().map(|f| f.to_string()).collect();
        assert_eq!(names.len(), 18);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), 18);
        assert_eq!(names[0], "cifar10");
        assert_eq!(names[1], "cifar10_random_inputs_random_labels");
        assert_eq!(names[2], "cifar10_random_smooth_inputs_random_labels");
        assert_eq!(names[6], "cifar10_random_crop_flip_inputs");
        assert_eq!(names[9], "cifar100");
        assert_eq!(names[17], "cifar100_grayscale_inputs");

        for (name, family) in names.iter().zip(StreamFamily::all()) {
            assert_eq!(name.parse::<StreamFamily>().unwrap(), family);
        }
    }

    #[test]
    fn test_sequence_names() {
        assert_eq!(
            StreamFamily::from_sequence_name("sequence_cifar100_permuted_inputs").unwrap(),
            StreamFamily::Robustness {
                dataset: DatasetName::Cifar100,
                transform: RobustnessTransform::PermutedInputs,
            }
        );
        assert!(StreamFamily::from_sequence_name("cifar10").unwrap_err().is_configuration());
        assert!(StreamFamily::from_sequence_name("sequence_mnist").unwrap_err().is_configuration());
    }

    #[test]
    fn test_noise_family_base() {
        let family: StreamFamily = "cifar10_random_smooth_inputs_random_labels".parse().unwrap();
        assert_eq!(
            family,
            StreamFamily::Noise {
                base: DatasetName::Cifar10,
                kind: NoiseKind::RandomSmooth,
            }
        );
    }
}
