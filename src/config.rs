//! Evaluation configuration.
//!
//! Plain structs with `Default` and `validate()`. With the `serde` feature enabled,
//! [`StopConfig`] can be read from and written to JSON, which is how a training
//! configuration typically names its stopping criterion.

use crate::{Error, Result, StopMeasure};

/// Number of stochastic forward passes averaged per batch by default.
pub const DEFAULT_SAMPLES: usize = 5;
/// Offset added to exponential-family predictions before division and `ln`.
pub const DEFAULT_BIAS: f64 = 1e-12;
/// Offset added to exponential-family targets.
pub const DEFAULT_TARGET_BIAS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Monte-Carlo dropout settings.
pub struct McConfig {
    /// Stochastic forward passes averaged per batch.
    pub samples: usize,
    /// Fixed seed for bit-identical repeats; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: None,
        }
    }
}

impl McConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(Error::InvalidConfig(
                "monte-carlo samples must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Offsets of the exponential stopping score.
pub struct ExpBias {
    /// Added to predictions.
    pub bias: f64,
    /// Added to targets.
    pub target_bias: f64,
}

impl Default for ExpBias {
    fn default() -> Self {
        Self {
            bias: DEFAULT_BIAS,
            target_bias: DEFAULT_TARGET_BIAS,
        }
    }
}

impl ExpBias {
    pub fn validate(&self) -> Result<()> {
        if !self.bias.is_finite() || !self.target_bias.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "exponential biases must be finite, got bias={} target_bias={}",
                self.bias, self.target_bias
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Which stopping score to compute and how to collect predictions for it.
pub struct StopConfig {
    pub measure: StopMeasure,
    /// `Some` selects Monte-Carlo collection; `None` a single deterministic pass.
    pub monte_carlo: Option<McConfig>,
    /// Only read by [`StopMeasure::Exponential`].
    pub exp_bias: ExpBias,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            measure: StopMeasure::Correlation,
            monte_carlo: None,
            exp_bias: ExpBias::default(),
        }
    }
}

impl StopConfig {
    pub fn new(measure: StopMeasure) -> Self {
        Self {
            measure,
            ..Self::default()
        }
    }

    /// Switch to Monte-Carlo collection.
    pub fn monte_carlo(mut self, mc: McConfig) -> Self {
        self.monte_carlo = Some(mc);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(mc) = &self.monte_carlo {
            mc.validate()?;
        }
        self.exp_bias.validate()
    }

    /// Parse and validate a JSON configuration.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse stop config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidConfig(format!("failed to serialize stop config: {e}")))
    }
}
