//! Per-entry statistical transforms behind the stopping scores.
//!
//! All functions read aligned row-major `(len, channels)` buffers and compute in `f64`.
//! They do not sanitize their results: non-finite values are left in place for
//! [`neutralize_non_finite`] to count and zero.

use std::f64::consts::LN_2;

/// Added to targets before evaluating the gamma density.
pub const GAMMA_TARGET_OFFSET: f64 = 1e-7;
/// Added to predictions to form the gamma shape parameter.
pub const GAMMA_SHAPE_OFFSET: f64 = 0.5;
/// Added to predictions inside the Poisson `ln`.
pub const POISSON_LOG_OFFSET: f64 = 1e-12;

/// Outcome of [`neutralize_non_finite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonFinite {
    pub count: usize,
    pub total: usize,
}

impl NonFinite {
    /// Percentage of non-finite entries, `100 * count / total`.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.count as f64 / self.total as f64
    }
}

/// Replace every non-finite entry with `0.0`.
///
/// Emits a warning carrying the non-finite percentage when any are found.
pub fn neutralize_non_finite(values: &mut [f64]) -> NonFinite {
    let mut count = 0;
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
            count += 1;
        }
    }
    let report = NonFinite {
        count,
        total: values.len(),
    };
    if count > 0 {
        tracing::warn!(
            percent = report.percent(),
            count,
            total = report.total,
            "{}% NaNs",
            report.percent()
        );
    }
    report
}

/// Arithmetic mean; `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation between targets and outputs for every channel (column).
///
/// A channel whose targets or outputs are all equal yields `NaN`. Constancy is checked
/// on the raw values, so rounding in the mean cannot turn it into a tiny finite value.
pub fn pearson_per_channel(targets: &[f32], outputs: &[f32], channels: usize) -> Vec<f64> {
    debug_assert_eq!(targets.len(), outputs.len());
    let len = targets.len() / channels;
    let inv_n = 1.0 / len as f64;

    let mut mean_t = vec![0.0_f64; channels];
    let mut mean_o = vec![0.0_f64; channels];
    let mut constant = vec![true; channels];
    for row in 0..len {
        for c in 0..channels {
            let (t, o) = (targets[row * channels + c], outputs[row * channels + c]);
            if t != targets[c] || o != outputs[c] {
                constant[c] = false;
            }
            mean_t[c] += t as f64;
            mean_o[c] += o as f64;
        }
    }
    for c in 0..channels {
        mean_t[c] *= inv_n;
        mean_o[c] *= inv_n;
    }

    let mut cov = vec![0.0_f64; channels];
    let mut var_t = vec![0.0_f64; channels];
    let mut var_o = vec![0.0_f64; channels];
    for row in 0..len {
        for c in 0..channels {
            let dt = targets[row * channels + c] as f64 - mean_t[c];
            let d_o = outputs[row * channels + c] as f64 - mean_o[c];
            cov[c] = dt.mul_add(d_o, cov[c]);
            var_t[c] = dt.mul_add(dt, var_t[c]);
            var_o[c] = d_o.mul_add(d_o, var_o[c]);
        }
    }

    (0..channels)
        .map(|c| {
            if constant[c] {
                f64::NAN
            } else {
                cov[c] / (var_t[c].sqrt() * var_o[c].sqrt())
            }
        })
        .collect()
}

/// Log-density of a unit-rate gamma distribution with the given `shape` at `x`.
///
/// Returns `NaN` for a non-positive or non-finite shape and `-inf` outside the support.
pub fn gamma_log_density(x: f64, shape: f64) -> f64 {
    if !(shape.is_finite() && shape > 0.0) || x.is_nan() {
        return f64::NAN;
    }
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if x == 0.0 {
        return if shape < 1.0 {
            f64::INFINITY
        } else if shape == 1.0 {
            0.0
        } else {
            f64::NEG_INFINITY
        };
    }
    (shape - 1.0) * x.ln() - x - libm::lgamma(shape)
}

/// Per-example gamma negative log-likelihood in bits.
///
/// For each row: `-mean_c(log_gamma(y + 1e-7; shape = y_hat + 0.5)) / ln 2`.
pub fn gamma_nll_bits_per_example(targets: &[f32], outputs: &[f32], channels: usize) -> Vec<f64> {
    per_row_mean_bits(targets, outputs, channels, |y, y_hat| {
        -gamma_log_density(y + GAMMA_TARGET_OFFSET, y_hat + GAMMA_SHAPE_OFFSET)
    })
}

/// Per-example exponential negative log-likelihood in bits.
///
/// For each row: `mean_c(y' / y_hat' + ln(y_hat')) / ln 2` with `y' = y + target_bias`
/// and `y_hat' = y_hat + bias`.
pub fn exponential_nll_bits_per_example(
    targets: &[f32],
    outputs: &[f32],
    channels: usize,
    bias: f64,
    target_bias: f64,
) -> Vec<f64> {
    per_row_mean_bits(targets, outputs, channels, |y, y_hat| {
        let y = y + target_bias;
        let y_hat = y_hat + bias;
        y / y_hat + y_hat.ln()
    })
}

/// Per-entry Poisson negative log-likelihood (up to the `ln(y!)` constant).
///
/// `y_hat - y * ln(y_hat + 1e-12)` for every entry; the result has the input's shape.
pub fn poisson_nll_per_entry(targets: &[f32], outputs: &[f32]) -> Vec<f64> {
    debug_assert_eq!(targets.len(), outputs.len());
    targets
        .iter()
        .zip(outputs)
        .map(|(&y, &y_hat)| {
            let (y, y_hat) = (y as f64, y_hat as f64);
            y_hat - y * (y_hat + POISSON_LOG_OFFSET).ln()
        })
        .collect()
}

fn per_row_mean_bits(
    targets: &[f32],
    outputs: &[f32],
    channels: usize,
    entry: impl Fn(f64, f64) -> f64,
) -> Vec<f64> {
    debug_assert_eq!(targets.len(), outputs.len());
    let inv_c = 1.0 / channels as f64;
    targets
        .chunks_exact(channels)
        .zip(outputs.chunks_exact(channels))
        .map(|(t_row, o_row)| {
            let sum: f64 = t_row
                .iter()
                .zip(o_row)
                .map(|(&y, &y_hat)| entry(y as f64, y_hat as f64))
                .sum();
            sum * inv_c / LN_2
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn neutralize_counts_and_zeroes_non_finite() {
        let mut v = [1.0, f64::NAN, 3.0, f64::INFINITY];
        let report = neutralize_non_finite(&mut v);
        assert_eq!(report, NonFinite { count: 2, total: 4 });
        assert_eq!(report.percent(), 50.0);
        assert_eq!(v, [1.0, 0.0, 3.0, 0.0]);
        // Zeroed entries stay in the denominator.
        assert_eq!(mean(&v), 1.0);
    }

    #[test]
    fn pearson_matches_hand_computed_values() {
        // Channel 0 is perfectly correlated, channel 1 perfectly anti-correlated.
        let targets = [1.0_f32, 1.0, 2.0, 2.0, 3.0, 3.0];
        let outputs = [2.0_f32, 6.0, 4.0, 4.0, 6.0, 2.0];
        let r = pearson_per_channel(&targets, &outputs, 2);
        assert_abs_diff_eq!(r[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_is_nan_for_constant_channel() {
        let targets = [1.0_f32, 2.0, 3.0];
        let outputs = [0.5_f32, 0.5, 0.5];
        let r = pearson_per_channel(&targets, &outputs, 1);
        assert!(r[0].is_nan());
    }

    #[test]
    fn pearson_is_nan_for_inexact_constants() {
        // 0.0147 is not exactly representable, so the f64 mean leaves residuals.
        let ramp: Vec<f32> = (0..49).map(|i| i as f32 * 0.1).collect();
        let flat = vec![0.0147_f32; 49];
        assert!(pearson_per_channel(&ramp, &flat, 1)[0].is_nan());
        assert!(pearson_per_channel(&flat, &ramp, 1)[0].is_nan());
        assert!(pearson_per_channel(&flat, &flat, 1)[0].is_nan());
        assert!(pearson_per_channel(&[0.1_f32; 49], &flat, 1)[0].is_nan());

        for k in 0..200 {
            let value = k as f32 * 0.0137 + 0.001;
            for len in 2..40 {
                let r = pearson_per_channel(&ramp[..len], &vec![value; len], 1);
                assert!(r[0].is_nan(), "value {value} over {len} rows gave {}", r[0]);
            }
        }
    }

    #[test]
    fn pearson_only_flags_the_constant_channel() {
        // Channel 1 is constant in both columns; channel 0 is well defined.
        let targets = [1.0_f32, 0.0147, 2.0, 0.0147, 3.0, 0.0147];
        let outputs = [2.0_f32, 0.0147, 4.0, 0.0147, 6.0, 0.0147];
        let r = pearson_per_channel(&targets, &outputs, 2);
        assert_abs_diff_eq!(r[0], 1.0, epsilon = 1e-12);
        assert!(r[1].is_nan());
    }

    #[test]
    fn gamma_log_density_matches_closed_forms() {
        // shape 1 is the unit exponential: log p(x) = -x.
        assert_abs_diff_eq!(gamma_log_density(2.0, 1.0), -2.0, epsilon = 1e-12);
        // shape 2: log p(x) = ln(x) - x - ln(1!) = ln(x) - x.
        assert_abs_diff_eq!(gamma_log_density(3.0, 2.0), 3.0_f64.ln() - 3.0, epsilon = 1e-12);
        // shape 0.5 at x = 1: -1 - ln(Gamma(0.5)) = -1 - 0.5 * ln(pi).
        let expected = -1.0 - 0.5 * std::f64::consts::PI.ln();
        assert_abs_diff_eq!(gamma_log_density(1.0, 0.5), expected, epsilon = 1e-12);

        assert!(gamma_log_density(1.0, 0.0).is_nan());
        assert!(gamma_log_density(1.0, -0.3).is_nan());
        assert_eq!(gamma_log_density(-1.0, 2.0), f64::NEG_INFINITY);
    }

    #[test]
    fn gamma_nll_is_mean_over_channels_in_bits() {
        let targets = [0.0_f32, 1.0];
        let outputs = [0.5_f32, 0.5];
        let got = gamma_nll_bits_per_example(&targets, &outputs, 2);
        let expected = -(gamma_log_density(1e-7, 1.0) + gamma_log_density(1.0 + 1e-7, 1.0)) / 2.0
            / LN_2;
        assert_eq!(got.len(), 1);
        assert_abs_diff_eq!(got[0], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(got[0], (1.0 + 2e-7) / 2.0 / LN_2, epsilon = 1e-6);
    }

    #[test]
    fn exponential_offsets_keep_all_zero_inputs_finite() {
        let got = exponential_nll_bits_per_example(&[0.0], &[0.0], 1, 1e-12, 1e-7);
        assert!(got[0].is_finite());
        let expected = (1e-7 / 1e-12 + (1e-12_f64).ln()) / LN_2;
        assert_abs_diff_eq!(got[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn poisson_perfect_prediction_example() {
        let got = poisson_nll_per_entry(&[1.0, 2.0], &[1.0, 2.0]);
        assert_abs_diff_eq!(got[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(got[1], 2.0 - 2.0 * 2.0_f64.ln(), epsilon = 1e-9);
        assert_abs_diff_eq!(mean(&got), 0.8069, epsilon = 1e-4);
    }

    #[test]
    fn poisson_negative_prediction_is_nan() {
        let got = poisson_nll_per_entry(&[1.0], &[-1.0]);
        assert!(got[0].is_nan());
    }
}
