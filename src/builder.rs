//! Model builder.
//!
//! `MlpBuilder` is the recommended way to define a reference response model.
//!
//! It makes model structure explicit (layer sizes, activations, dropout) and chooses a
//! reasonable default weight initializer for each activation:
//!
//! - `tanh` / `sigmoid` / `identity` / `elu+1`: Xavier/Glorot
//! - `relu` / `leaky relu`: He/Kaiming

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Dropout, Error, Init, Layer, Mlp, Result};

#[derive(Debug, Clone, Copy)]
struct PendingLayer {
    out_dim: usize,
    activation: Activation,
    dropout: Option<Dropout>,
}

#[derive(Debug, Clone)]
/// Builder for an `Mlp`.
///
/// Example:
///
/// ```rust
/// use response_stop::{Activation, MlpBuilder};
///
/// # fn main() -> response_stop::Result<()> {
/// let mlp = MlpBuilder::new(16)?
///     .add_layer(32, Activation::ReLU)?
///     .with_dropout(0.3)?
///     .add_layer(4, Activation::EluPlusOne)?
///     .l2(1e-4)?
///     .build_with_seed(0)?;
/// # Ok(())
/// # }
/// ```
pub struct MlpBuilder {
    input_dim: usize,
    layers: Vec<PendingLayer>,
    l2: f32,
}

impl MlpBuilder {
    /// Start building an MLP that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
            l2: 0.0,
        })
    }

    /// Add a dense layer.
    ///
    /// The layer will have `out_dim` outputs and uses `activation`.
    pub fn add_layer(mut self, out_dim: usize, activation: Activation) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        activation.validate()?;

        self.layers.push(PendingLayer {
            out_dim,
            activation,
            dropout: None,
        });
        Ok(self)
    }

    /// Attach dropout with drop probability `p` to the most recently added layer.
    pub fn with_dropout(mut self, p: f32) -> Result<Self> {
        let dropout = Dropout::new(p)?;
        let Some(last) = self.layers.last_mut() else {
            return Err(Error::InvalidConfig(
                "with_dropout requires a preceding add_layer".to_owned(),
            ));
        };
        last.dropout = Some(dropout);
        Ok(self)
    }

    /// Weight of the L2 penalty on all layer weights.
    pub fn l2(mut self, l2: f32) -> Result<Self> {
        if !(l2.is_finite() && l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 must be finite and >= 0, got {l2}"
            )));
        }
        self.l2 = l2;
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for pending in self.layers {
            let init = default_init_for_activation(pending.activation);
            let mut layer =
                Layer::new_with_rng(in_dim, pending.out_dim, init, pending.activation, rng)?;
            if let Some(dropout) = pending.dropout {
                layer = layer.with_dropout(dropout);
            }
            layers.push(layer);
            in_dim = pending.out_dim;
        }

        Mlp::from_layers(layers)?.with_l2(self.l2)
    }
}

#[inline]
fn default_init_for_activation(act: Activation) -> Init {
    match act {
        Activation::Tanh | Activation::Sigmoid | Activation::Identity | Activation::EluPlusOne => {
            Init::Xavier
        }
        Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
    }
}
