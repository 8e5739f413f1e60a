//! Forward-pass modes.
//!
//! A predictor never stores its mode. Callers pass a [`Mode`] into every forward pass,
//! so an evaluation can never leave a model in a different state than it found it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How a predictor should behave during a forward pass.
pub enum Mode {
    /// Training behavior: stochastic regularization is active.
    Training,
    /// Pure deterministic inference.
    #[default]
    Inference,
    /// Inference with stochastic regularization left active (Monte-Carlo dropout).
    MonteCarlo,
}

impl Mode {
    /// Returns true if dropout-like components should sample masks in this mode.
    #[inline]
    pub fn dropout_active(self) -> bool {
        matches!(self, Mode::Training | Mode::MonteCarlo)
    }

    /// Returns true if this mode is deterministic.
    #[inline]
    pub fn is_deterministic(self) -> bool {
        !self.dropout_active()
    }
}
