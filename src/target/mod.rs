//! Target Function Module
//!
//! Randomly initialized networks that define the regression target of a
//! drifting stream.

mod network;

pub use network::{Activation, NetworkParams, TargetKind, TargetNetwork, NUM_HIDDEN, NUM_INPUTS};
