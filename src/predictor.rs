//! The predictor seam.
//!
//! Anything that maps a stimulus row to a response row can be scored. A predictor is
//! borrowed immutably for the whole evaluation and receives its [`Mode`] explicitly on
//! every call, so scoring leaves it untouched on every exit path.

use rand::RngCore;

use crate::{Error, Mode, Result};

pub trait Predictor {
    /// Per-sample input dimension.
    fn input_dim(&self) -> usize;

    /// Per-sample output dimension (number of response channels).
    fn output_dim(&self) -> usize;

    /// Forward pass for a single sample.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `out.len() == self.output_dim()`
    fn forward(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()>;

    /// Forward pass for `len` samples stored row-major.
    ///
    /// `inputs` is `(len, input_dim)` and `out` is `(len, output_dim)`.
    fn forward_batch(
        &self,
        inputs: &[f32],
        len: usize,
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        let in_dim = self.input_dim();
        let out_dim = self.output_dim();
        check_batch_shape(inputs.len(), out.len(), len, in_dim, out_dim)?;

        for idx in 0..len {
            self.forward(
                &inputs[idx * in_dim..(idx + 1) * in_dim],
                mode,
                rng,
                &mut out[idx * out_dim..(idx + 1) * out_dim],
            )?;
        }
        Ok(())
    }

    /// Model-intrinsic regularization penalty added to the training objective.
    fn regularizer(&self) -> f32 {
        0.0
    }
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn input_dim(&self) -> usize {
        (**self).input_dim()
    }

    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }

    fn forward(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        (**self).forward(input, mode, rng, out)
    }

    fn forward_batch(
        &self,
        inputs: &[f32],
        len: usize,
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        (**self).forward_batch(inputs, len, mode, rng, out)
    }

    fn regularizer(&self) -> f32 {
        (**self).regularizer()
    }
}

pub(crate) fn check_batch_shape(
    inputs_len: usize,
    out_len: usize,
    len: usize,
    in_dim: usize,
    out_dim: usize,
) -> Result<()> {
    if inputs_len != len * in_dim {
        return Err(Error::InvalidShape(format!(
            "inputs length {inputs_len} does not match len * input_dim ({len} * {in_dim})"
        )));
    }
    if out_len != len * out_dim {
        return Err(Error::InvalidShape(format!(
            "output length {out_len} does not match len * output_dim ({len} * {out_dim})"
        )));
    }
    Ok(())
}

/// A set of constituent predictors with identical shapes.
///
/// The ensemble is itself a [`Predictor`]: each forward pass fans out to every member
/// under the same mode and averages their outputs with equal weight. Under
/// [`Mode::MonteCarlo`] every member samples its own dropout masks.
#[derive(Debug, Clone)]
pub struct Ensemble<P> {
    members: Vec<P>,
}

impl<P: Predictor> Ensemble<P> {
    pub fn new(members: Vec<P>) -> Result<Self> {
        let Some(first) = members.first() else {
            return Err(Error::InvalidConfig(
                "ensemble must have at least one member".to_owned(),
            ));
        };
        let (in_dim, out_dim) = (first.input_dim(), first.output_dim());
        for (i, m) in members.iter().enumerate() {
            if m.input_dim() != in_dim || m.output_dim() != out_dim {
                return Err(Error::InvalidShape(format!(
                    "ensemble member {i} has shape ({}, {}), expected ({in_dim}, {out_dim})",
                    m.input_dim(),
                    m.output_dim()
                )));
            }
        }
        Ok(Self { members })
    }

    #[inline]
    pub fn members(&self) -> &[P] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<P: Predictor> Predictor for Ensemble<P> {
    fn input_dim(&self) -> usize {
        self.members[0].input_dim()
    }

    fn output_dim(&self) -> usize {
        self.members[0].output_dim()
    }

    fn forward(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        self.forward_batch(input, 1, mode, rng, out)
    }

    fn forward_batch(
        &self,
        inputs: &[f32],
        len: usize,
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        check_batch_shape(inputs.len(), out.len(), len, self.input_dim(), self.output_dim())?;

        let mut member_out = vec![0.0_f32; out.len()];
        out.fill(0.0);
        for member in &self.members {
            member.forward_batch(inputs, len, mode, rng, &mut member_out)?;
            for (acc, &v) in out.iter_mut().zip(&member_out) {
                *acc += v;
            }
        }

        let inv = 1.0 / self.members.len() as f32;
        for v in out.iter_mut() {
            *v *= inv;
        }
        Ok(())
    }

    /// Sum of the members' penalties.
    fn regularizer(&self) -> f32 {
        self.members.iter().map(|m| m.regularizer()).sum()
    }
}
