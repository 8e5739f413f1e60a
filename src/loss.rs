//! Training criteria.
//!
//! A criterion compares a batch of predictions with the recorded responses and returns
//! the mean loss over all entries. It is combined with the model's own penalty by
//! [`crate::full_objective`].

use crate::measures::{mean, poisson_nll_per_entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
/// Supported loss functions.
pub enum Loss {
    /// Mean squared error.
    Mse,
    /// Mean absolute error.
    Mae,
    /// Poisson negative log-likelihood, the usual choice for spike-count responses.
    ///
    /// Expects non-negative predictions (firing rates).
    #[default]
    Poisson,
}

impl Loss {
    /// Compute a loss value.
    ///
    /// Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::Mse => mse(pred, target),
            Loss::Mae => mae(pred, target),
            Loss::Poisson => poisson(pred, target),
        }
    }
}

/// Mean squared error (MSE) loss.
///
/// Returns `0.5 * mean((pred - target)^2)`.
#[inline]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );

    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    0.5 * sum_sq * inv_n
}

/// Mean absolute error (MAE) loss.
///
/// Returns `mean(|pred - target|)`.
#[inline]
pub fn mae(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );

    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        sum += (pred[i] - target[i]).abs();
    }
    sum * inv_n
}

/// Poisson loss.
///
/// Returns `mean(pred - target * ln(pred + eps))` with `eps` =
/// [`POISSON_LOG_OFFSET`](crate::measures::POISSON_LOG_OFFSET), the same entry as the
/// Poisson stopping score.
#[inline]
pub fn poisson(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );

    if pred.is_empty() {
        return 0.0;
    }

    mean(&poisson_nll_per_entry(target, pred)) as f32
}
