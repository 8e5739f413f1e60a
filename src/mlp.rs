use rand::RngCore;

use crate::predictor::check_batch_shape;
use crate::{Error, Layer, Mode, Predictor, Result};

/// A dense feed-forward response model.
///
/// Each layer may carry a [`crate::Dropout`] component, which is what Monte-Carlo
/// evaluation samples over.
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    l2: f32,
}

/// Reusable buffers for `Mlp::forward_with`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
}

impl Mlp {
    /// Assemble a model from consecutive layers.
    ///
    /// Each layer's `in_dim` must match the previous layer's `out_dim`.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }
        for (idx, w) in layers.windows(2).enumerate() {
            if w[0].out_dim() != w[1].in_dim() {
                return Err(Error::InvalidShape(format!(
                    "layer {idx} out_dim {} does not match layer {} in_dim {}",
                    w[0].out_dim(),
                    idx + 1,
                    w[1].in_dim()
                )));
            }
        }
        Ok(Self { layers, l2: 0.0 })
    }

    /// Set the weight of the L2 penalty returned by [`Predictor::regularizer`].
    pub fn with_l2(mut self, l2: f32) -> Result<Self> {
        if !(l2.is_finite() && l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 must be finite and >= 0, got {l2}"
            )));
        }
        self.l2 = l2;
        Ok(self)
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn l2(&self) -> f32 {
        self.l2
    }

    /// Returns true if any layer has a dropout component.
    pub fn has_dropout(&self) -> bool {
        self.layers.iter().any(|l| l.dropout().is_some())
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Writes intermediate activations into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Mlp` (same layer count and output sizes)
    pub fn forward_with<'a>(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        scratch: &'a mut Scratch,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx == 0 {
                layer.forward(input, &mut scratch.layer_outputs[0], mode, rng);
            } else {
                // Borrow the previous output immutably and the current output mutably.
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                layer.forward(&left[idx - 1], &mut right[0], mode, rng);
            }
        }

        scratch.output()
    }
}

impl Predictor for Mlp {
    #[inline]
    fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    fn forward(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        check_batch_shape(input.len(), out.len(), 1, self.input_dim(), self.output_dim())?;
        let mut scratch = self.scratch();
        out.copy_from_slice(self.forward_with(input, mode, rng, &mut scratch));
        Ok(())
    }

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

        let mut scratch = self.scratch();
        for idx in 0..len {
            let y = self.forward_with(
                &inputs[idx * in_dim..(idx + 1) * in_dim],
                mode,
                rng,
                &mut scratch,
            );
            out[idx * out_dim..(idx + 1) * out_dim].copy_from_slice(y);
        }
        Ok(())
    }

    /// `l2 * sum(W^2)` over all layers.
    fn regularizer(&self) -> f32 {
        if self.l2 == 0.0 {
            return 0.0;
        }
        self.l2 * self.layers.iter().map(Layer::weight_sq_norm).sum::<f32>()
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        let mut layer_outputs = Vec::with_capacity(mlp.layers.len());
        for layer in &mlp.layers {
            layer_outputs.push(vec![0.0; layer.out_dim()]);
        }
        Self { layer_outputs }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        self.layer_outputs
            .last()
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
