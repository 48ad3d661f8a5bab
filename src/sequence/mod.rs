//! Stream Sequencing Module
//!
//! Composes independently built sub-streams end to end. Each segment lasts
//! `change_freq` steps and gets its own seed derived from a master seed.

mod family;
mod sequencer;

pub use family::{StreamFamily, SEQUENCE_DATASETS, SEQUENCE_PREFIX};
pub use sequencer::{
    segment_seed, DriftSegments, DriftSequencer, FamilyRegistry, FamilySequencer, FamilyStream,
    SegmentFactory, SequenceConfig, StreamSequencer,
};
