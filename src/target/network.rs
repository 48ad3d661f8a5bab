//! Target network for synthetic regression.
//!
//! A small fixed-architecture feed-forward network whose output is used as the
//! regression target of a drifting stream. It is never trained; it can only be
//! redrawn.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Input dimension of every target network
pub const NUM_INPUTS: usize = 16;

/// Hidden layer width of every target network
pub const NUM_HIDDEN: usize = 32;

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Activation {
    /// Rectified linear unit
    Relu,
    /// Linear threshold unit: 1 above zero, 0 otherwise
    Ltu,
}

impl Activation {
    /// Apply the activation to a single pre-activation value
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Ltu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "ltu" => Ok(Activation::Ltu),
            other => Err(Error::config(format!("invalid activation function '{}'", other))),
        }
    }
}

impl TryFrom<String> for Activation {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Ltu => write!(f, "ltu"),
        }
    }
}

/// One independent draw of all network parameters
///
/// Weights and biases of each layer have standard deviation `sqrt(2 / fan_in)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkParams {
    /// Input to first hidden layer, shape (hidden, inputs)
    pub w1: Array2<f64>,
    /// First to second hidden layer, shape (hidden, hidden)
    pub w2: Array2<f64>,
    /// Last hidden layer to the scalar output
    pub w3: Array1<f64>,
    /// First hidden layer bias
    pub b1: Array1<f64>,
    /// Second hidden layer bias
    pub b2: Array1<f64>,
}

impl NetworkParams {
    /// Draw a fresh parameter bundle.
    ///
    /// The second layer is drawn even for single-layer networks so that the
    /// number of draws consumed from `rng` does not depend on depth.
    pub fn draw<R: Rng + ?Sized>(num_inputs: usize, num_hidden: usize, rng: &mut R) -> Self {
        let input_scale = (2.0 / num_inputs as f64).sqrt();
        let hidden_scale = (2.0 / num_hidden as f64).sqrt();

        let w1 = Array2::<f64>::random_using((num_hidden, num_inputs), StandardNormal, rng);
        let w2 = Array2::<f64>::random_using((num_hidden, num_hidden), StandardNormal, rng);
        let w3 = Array1::<f64>::random_using(num_hidden, StandardNormal, rng);
        let b1 = Array1::<f64>::random_using(num_hidden, StandardNormal, rng);
        let b2 = Array1::<f64>::random_using(num_hidden, StandardNormal, rng);

        Self {
            w1: w1 * input_scale,
            w2: w2 * hidden_scale,
            w3: w3 * hidden_scale,
            b1: b1 * input_scale,
            b2: b2 * hidden_scale,
        }
    }
}

/// Feed-forward target function with one or two hidden layers
///
/// `h1 = act(W1 x + b1)`, `h2 = act(W2 h1 + b2)` (or `h1` with one layer),
/// output `W3 h2` with no output bias or activation.
#[derive(Debug, Clone)]
pub struct TargetNetwork {
    num_inputs: usize,
    num_hidden: usize,
    activation: Activation,
    hidden_layers: usize,
    params: NetworkParams,
}

impl TargetNetwork {
    /// Create a network with freshly drawn parameters.
    ///
    /// Fails if `hidden_layers` is not 1 or 2.
    pub fn new<R: Rng + ?Sized>(
        num_inputs: usize,
        num_hidden: usize,
        activation: Activation,
        hidden_layers: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if !(1..=2).contains(&hidden_layers) {
            return Err(Error::config(format!(
                "invalid number of hidden layers {} (expected 1 or 2)",
                hidden_layers
            )));
        }
        Ok(Self::draw(num_inputs, num_hidden, activation, hidden_layers, rng))
    }

    pub(crate) fn draw<R: Rng + ?Sized>(
        num_inputs: usize,
        num_hidden: usize,
        activation: Activation,
        hidden_layers: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            num_inputs,
            num_hidden,
            activation,
            hidden_layers,
            params: NetworkParams::draw(num_inputs, num_hidden, rng),
        }
    }

    /// Evaluate the network on one input vector.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have `num_inputs` elements.
    pub fn evaluate(&self, x: &Array1<f64>) -> f64 {
        let p = &self.params;
        let h1 = (p.w1.dot(x) + &p.b1).mapv(|v| self.activation.apply(v));
        let h2 = if self.hidden_layers == 2 {
            (p.w2.dot(&h1) + &p.b2).mapv(|v| self.activation.apply(v))
        } else {
            h1
        };
        p.w3.dot(&h2)
    }

    /// Replace every parameter with an independent fresh draw from `rng`.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.params = NetworkParams::draw(self.num_inputs, self.num_hidden, rng);
    }

    /// Current parameters
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Activation used by the hidden layers
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Number of hidden layers (1 or 2)
    pub fn hidden_layers(&self) -> usize {
        self.hidden_layers
    }

    /// Input dimension
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }
}

/// Named target function variants used by drifting streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum TargetKind {
    /// Two ReLU hidden layers
    #[default]
    #[serde(rename = "relu_network")]
    ReluNetwork,
    /// Two threshold hidden layers
    #[serde(rename = "ltu_network")]
    LtuNetwork,
    /// One threshold hidden layer
    #[serde(rename = "ltu_network_1layer")]
    LtuNetworkOneLayer,
    /// One threshold hidden layer, only the four fast inputs are non-zero
    #[serde(rename = "ltu_network_4input")]
    LtuNetworkFourInput,
}

impl TargetKind {
    /// Activation used by this variant
    pub fn activation(self) -> Activation {
        match self {
            TargetKind::ReluNetwork => Activation::Relu,
            _ => Activation::Ltu,
        }
    }

    /// Number of hidden layers used by this variant
    pub fn hidden_layers(self) -> usize {
        match self {
            TargetKind::ReluNetwork | TargetKind::LtuNetwork => 2,
            TargetKind::LtuNetworkOneLayer | TargetKind::LtuNetworkFourInput => 1,
        }
    }

    /// Whether the slow inputs are forced to zero for this variant
    pub fn zeroes_slow_inputs(self) -> bool {
        matches!(self, TargetKind::LtuNetworkFourInput)
    }

    /// Draw a network of this variant with the standard dimensions
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> TargetNetwork {
        TargetNetwork::draw(
            NUM_INPUTS,
            NUM_HIDDEN,
            self.activation(),
            self.hidden_layers(),
            rng,
        )
    }

    /// Name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::ReluNetwork => "relu_network",
            TargetKind::LtuNetwork => "ltu_network",
            TargetKind::LtuNetworkOneLayer => "ltu_network_1layer",
            TargetKind::LtuNetworkFourInput => "ltu_network_4input",
        }
    }
}

impl FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu_network" => Ok(TargetKind::ReluNetwork),
            "ltu_network" => Ok(TargetKind::LtuNetwork),
            "ltu_network_1layer" => Ok(TargetKind::LtuNetworkOneLayer),
            "ltu_network_4input" => Ok(TargetKind::LtuNetworkFourInput),
            other => Err(Error::config(format!("{} is not a valid target function", other))),
        }
    }
}

impl TryFrom<String> for TargetKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse().map_err(|e: Error| e.detail())
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
