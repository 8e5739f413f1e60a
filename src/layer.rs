use rand::{Rng, RngCore};

use crate::{Activation, Error, Mode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Weight initialization scheme.
pub enum Init {
    /// Xavier/Glorot uniform: `U(-sqrt(6/(in+out)), sqrt(6/(in+out)))`.
    Xavier,
    /// He/Kaiming uniform: `U(-sqrt(6/in), sqrt(6/in))`.
    He,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Inverted dropout applied to a layer's outputs.
///
/// Only samples a mask when [`Mode::dropout_active`] is true; otherwise it is the identity.
pub struct Dropout {
    p: f32,
}

impl Dropout {
    /// Drop probability must be finite and in `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        if !(p.is_finite() && (0.0..1.0).contains(&p)) {
            return Err(Error::InvalidConfig(format!(
                "dropout p must be finite and in [0,1), got {p}"
            )));
        }
        Ok(Self { p })
    }

    #[inline]
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Zero each value with probability `p` and rescale survivors by `1 / (1 - p)`.
    #[inline]
    pub fn apply(&self, values: &mut [f32], mode: Mode, rng: &mut dyn RngCore) {
        if !mode.dropout_active() || self.p == 0.0 {
            return;
        }
        let scale = 1.0 / (1.0 - self.p);
        for v in values.iter_mut() {
            if rng.r#gen::<f32>() < self.p {
                *v = 0.0;
            } else {
                *v *= scale;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
    activation: Activation,
    dropout: Option<Dropout>,
}

impl Layer {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(
                "layer dims must be > 0".to_owned(),
            ));
        }
        activation.validate()?;

        let limit = match init {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        };
        let weights = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases: vec![0.0; out_dim],
            activation,
            dropout: None,
        })
    }

    /// Build a layer from explicit parameters.
    ///
    /// `weights` is row-major with shape `(out_dim, in_dim)`.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        weights: Vec<f32>,
        biases: Vec<f32>,
        activation: Activation,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(
                "layer dims must be > 0".to_owned(),
            ));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        activation.validate()?;

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
            activation,
            dropout: None,
        })
    }

    /// Attach (or replace) the dropout component of this layer.
    pub fn with_dropout(mut self, dropout: Dropout) -> Self {
        self.dropout = Some(dropout);
        self
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn dropout(&self) -> Option<Dropout> {
        self.dropout
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Sum of squared weights (biases excluded).
    pub fn weight_sq_norm(&self) -> f32 {
        self.weights.iter().map(|w| w * w).sum()
    }

    /// Forward pass for a single sample.
    ///
    /// Computes:
    /// - `z = W * inputs + b`
    /// - `outputs = dropout(activation(z))`
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(
        &self,
        inputs: &[f32],
        outputs: &mut [f32],
        mode: Mode,
        rng: &mut dyn RngCore,
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for o in 0..self.out_dim {
            let mut sum = self.biases[o];
            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                sum = self.weights[row + i].mul_add(inputs[i], sum);
            }
            outputs[o] = self.activation.forward(sum);
        }

        if let Some(dropout) = &self.dropout {
            dropout.apply(outputs, mode, rng);
        }
    }
}
