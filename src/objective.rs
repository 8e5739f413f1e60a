//! Training objective: criterion plus model-intrinsic penalty.

use rand::RngCore;

use crate::{Error, Loss, Mode, Predictor, Result};

/// `criterion(predictor(inputs), targets) + predictor.regularizer()`.
///
/// The forward pass runs in [`Mode::Training`], so dropout components are active.
/// `inputs` is `(len, input_dim)` and `targets` is `(len, output_dim)`, both row-major.
pub fn full_objective<P: Predictor + ?Sized>(
    predictor: &P,
    inputs: &[f32],
    targets: &[f32],
    len: usize,
    criterion: Loss,
    rng: &mut dyn RngCore,
) -> Result<f32> {
    if targets.len() != len * predictor.output_dim() {
        return Err(Error::InvalidShape(format!(
            "targets length {} does not match len * output_dim ({len} * {})",
            targets.len(),
            predictor.output_dim()
        )));
    }

    let mut pred = vec![0.0_f32; targets.len()];
    predictor.forward_batch(inputs, len, Mode::Training, rng, &mut pred)?;
    Ok(criterion.forward(&pred, targets) + predictor.regularizer())
}
