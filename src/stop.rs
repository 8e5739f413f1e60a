//! Early-stopping scores.
//!
//! Every score follows the same template:
//!
//! 1. collect `(target, output)` over the whole validation stream, either with one
//!    deterministic pass or with Monte-Carlo dropout averaging,
//! 2. apply a per-entry statistical transform,
//! 3. zero any non-finite entries (with a warning),
//! 4. average what remains into one scalar.
//!
//! | measure       | transform                                         | direction |
//! |---------------|---------------------------------------------------|-----------|
//! | correlation   | Pearson per channel                               | higher    |
//! | gamma         | `-log Gamma(y + 1e-7; y_hat + 0.5)` bits/example  | lower     |
//! | exponential   | `y'/y_hat' + ln y_hat'` bits/example              | lower     |
//! | Poisson       | `y_hat - y ln(y_hat + 1e-12)` per entry           | lower     |

use std::fmt;
use std::str::FromStr;

use crate::collect::{collect_deterministic, collect_ensemble, collect_monte_carlo};
use crate::measures::{
    exponential_nll_bits_per_example, gamma_nll_bits_per_example, mean, neutralize_non_finite,
    pearson_per_channel, poisson_nll_per_entry,
};
use crate::{
    BatchStream, Ensemble, Error, ExpBias, McConfig, NonFinite, Predictions, Predictor, Result,
    StopConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
/// Statistical model behind a stopping score.
pub enum StopMeasure {
    /// Mean per-channel Pearson correlation.
    #[default]
    Correlation,
    /// Gamma negative log-likelihood, bits per example.
    Gamma,
    /// Exponential negative log-likelihood, bits per example.
    Exponential,
    /// Poisson negative log-likelihood per entry.
    Poisson,
}

impl StopMeasure {
    pub const ALL: [StopMeasure; 4] = [
        StopMeasure::Correlation,
        StopMeasure::Gamma,
        StopMeasure::Exponential,
        StopMeasure::Poisson,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StopMeasure::Correlation => "correlation",
            StopMeasure::Gamma => "gamma",
            StopMeasure::Exponential => "exponential",
            StopMeasure::Poisson => "poisson",
        }
    }

    /// Correlation is a fitness; the likelihood measures are losses.
    pub fn higher_is_better(self) -> bool {
        matches!(self, StopMeasure::Correlation)
    }

    /// Returns true if `candidate` is strictly better than `best` for this measure.
    pub fn improved(self, best: f64, candidate: f64) -> bool {
        if self.higher_is_better() {
            candidate > best
        } else {
            candidate < best
        }
    }

    /// Reduce collected predictions to a single finite score.
    ///
    /// `exp_bias` is only read by [`StopMeasure::Exponential`].
    pub fn score_predictions(self, preds: &Predictions, exp_bias: &ExpBias) -> f64 {
        self.score_predictions_with_report(preds, exp_bias).0
    }

    /// Like [`StopMeasure::score_predictions`], also returning how many reduced entries
    /// were non-finite and zeroed.
    pub fn score_predictions_with_report(
        self,
        preds: &Predictions,
        exp_bias: &ExpBias,
    ) -> (f64, NonFinite) {
        let (t, o, c) = (preds.targets(), preds.outputs(), preds.channels());
        let mut ret = match self {
            StopMeasure::Correlation => pearson_per_channel(t, o, c),
            StopMeasure::Gamma => gamma_nll_bits_per_example(t, o, c),
            StopMeasure::Exponential => {
                exponential_nll_bits_per_example(t, o, c, exp_bias.bias, exp_bias.target_bias)
            }
            StopMeasure::Poisson => poisson_nll_per_entry(t, o),
        };
        let report = neutralize_non_finite(&mut ret);
        (mean(&ret), report)
    }
}

impl fmt::Display for StopMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StopMeasure {
    type Err = Error;

    /// Accepts measure names (`"poisson"`) and stop-function names (`"poisson_stop"`,
    /// `"poisson_stop_mc"`); the sampling suffix is ignored here.
    fn from_str(s: &str) -> Result<Self> {
        let mut base = s.trim();
        for suffix in ["_mc_ensemble", "_mc"] {
            if let Some(stripped) = base.strip_suffix(suffix) {
                base = stripped;
                break;
            }
        }
        let base = base.strip_suffix("_stop").unwrap_or(base);
        match base {
            "correlation" | "corr" => Ok(StopMeasure::Correlation),
            "gamma" => Ok(StopMeasure::Gamma),
            "exponential" | "exp" => Ok(StopMeasure::Exponential),
            "poisson" => Ok(StopMeasure::Poisson),
            _ => Err(Error::InvalidConfig(format!("unknown stop measure '{s}'"))),
        }
    }
}

impl StopConfig {
    /// Score `predictor` on `stream` according to this configuration.
    pub fn evaluate<P, S>(&self, predictor: &P, stream: &S) -> Result<f64>
    where
        P: Predictor + ?Sized,
        S: BatchStream + ?Sized,
    {
        self.validate()?;
        let preds = match &self.monte_carlo {
            Some(mc) => collect_monte_carlo(predictor, stream, mc)?,
            None => collect_deterministic(predictor, stream)?,
        };
        let score = self.measure.score_predictions(&preds, &self.exp_bias);
        tracing::debug!(
            measure = %self.measure,
            monte_carlo = self.monte_carlo.is_some(),
            score,
            "stopping score"
        );
        Ok(score)
    }
}

/// Mean per-channel correlation from a single deterministic pass.
pub fn corr_stop<P, S>(predictor: &P, stream: &S) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_deterministic(predictor, stream)?;
    Ok(StopMeasure::Correlation.score_predictions(&preds, &ExpBias::default()))
}

/// Mean per-channel correlation of Monte-Carlo dropout averages.
pub fn corr_stop_mc<P, S>(predictor: &P, stream: &S, mc: &McConfig) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_monte_carlo(predictor, stream, mc)?;
    Ok(StopMeasure::Correlation.score_predictions(&preds, &ExpBias::default()))
}

/// Mean per-channel correlation of Monte-Carlo averages over an ensemble.
pub fn corr_stop_mc_ensemble<P, S>(
    ensemble: &Ensemble<P>,
    stream: &S,
    mc: &McConfig,
) -> Result<f64>
where
    P: Predictor,
    S: BatchStream + ?Sized,
{
    let preds = collect_ensemble(ensemble, stream, mc)?;
    Ok(StopMeasure::Correlation.score_predictions(&preds, &ExpBias::default()))
}

/// Gamma negative log-likelihood in bits from a single deterministic pass.
pub fn gamma_stop<P, S>(predictor: &P, stream: &S) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_deterministic(predictor, stream)?;
    Ok(StopMeasure::Gamma.score_predictions(&preds, &ExpBias::default()))
}

pub fn gamma_stop_mc<P, S>(predictor: &P, stream: &S, mc: &McConfig) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_monte_carlo(predictor, stream, mc)?;
    Ok(StopMeasure::Gamma.score_predictions(&preds, &ExpBias::default()))
}

/// Exponential negative log-likelihood in bits from a single deterministic pass.
///
/// `bias` is added to predictions and `target_bias` to targets; see [`ExpBias`] for
/// the defaults.
pub fn exp_stop<P, S>(predictor: &P, stream: &S, bias: f64, target_bias: f64) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let exp_bias = ExpBias { bias, target_bias };
    exp_bias.validate()?;
    let preds = collect_deterministic(predictor, stream)?;
    Ok(StopMeasure::Exponential.score_predictions(&preds, &exp_bias))
}

pub fn exp_stop_mc<P, S>(
    predictor: &P,
    stream: &S,
    bias: f64,
    target_bias: f64,
    mc: &McConfig,
) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let exp_bias = ExpBias { bias, target_bias };
    exp_bias.validate()?;
    let preds = collect_monte_carlo(predictor, stream, mc)?;
    Ok(StopMeasure::Exponential.score_predictions(&preds, &exp_bias))
}

/// Poisson negative log-likelihood from a single deterministic pass.
pub fn poisson_stop<P, S>(predictor: &P, stream: &S) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_deterministic(predictor, stream)?;
    Ok(StopMeasure::Poisson.score_predictions(&preds, &ExpBias::default()))
}

pub fn poisson_stop_mc<P, S>(predictor: &P, stream: &S, mc: &McConfig) -> Result<f64>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let preds = collect_monte_carlo(predictor, stream, mc)?;
    Ok(StopMeasure::Poisson.score_predictions(&preds, &ExpBias::default()))
}

pub fn poisson_stop_mc_ensemble<P, S>(
    ensemble: &Ensemble<P>,
    stream: &S,
    mc: &McConfig,
) -> Result<f64>
where
    P: Predictor,
    S: BatchStream + ?Sized,
{
    let preds = collect_ensemble(ensemble, stream, mc)?;
    Ok(StopMeasure::Poisson.score_predictions(&preds, &ExpBias::default()))
}
