//! Prediction collection.
//!
//! Drives a predictor over a [`BatchStream`] and gathers aligned `(target, output)`
//! matrices. Row `i` of both matrices is the `i`-th example consumed from the stream,
//! regardless of batch boundaries.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::{Batch, BatchStream, Ensemble, Error, McConfig, Mode, Predictor, Result};

/// Aligned targets and predictions, both row-major with shape `(len, channels)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    targets: Vec<f32>,
    outputs: Vec<f32>,
    len: usize,
    channels: usize,
}

impl Predictions {
    /// Build from flat buffers with shape `(len, channels)`.
    pub fn from_flat(targets: Vec<f32>, outputs: Vec<f32>, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidShape("channels must be > 0".to_owned()));
        }
        if targets.len() != outputs.len() {
            return Err(Error::InvalidShape(format!(
                "targets length {} does not match outputs length {}",
                targets.len(),
                outputs.len()
            )));
        }
        if !targets.len().is_multiple_of(channels) {
            return Err(Error::InvalidShape(format!(
                "buffer length {} is not divisible by channels {channels}",
                targets.len()
            )));
        }
        let len = targets.len() / channels;
        if len == 0 {
            return Err(Error::InvalidData(
                "predictions must contain at least one example".to_owned(),
            ));
        }
        Ok(Self {
            targets,
            outputs,
            len,
            channels,
        })
    }

    /// Build from per-example rows.
    pub fn from_rows(targets: &[Vec<f32>], outputs: &[Vec<f32>]) -> Result<Self> {
        if targets.len() != outputs.len() {
            return Err(Error::InvalidShape(format!(
                "targets/outputs row count mismatch: {} vs {}",
                targets.len(),
                outputs.len()
            )));
        }
        let channels = targets.first().map(Vec::len).unwrap_or(0);
        let mut t = Vec::with_capacity(targets.len() * channels);
        let mut o = Vec::with_capacity(outputs.len() * channels);
        for (i, (tr, or)) in targets.iter().zip(outputs).enumerate() {
            if tr.len() != channels || or.len() != channels {
                return Err(Error::InvalidShape(format!(
                    "row {i} has lengths ({}, {}), expected {channels}",
                    tr.len(),
                    or.len()
                )));
            }
            t.extend_from_slice(tr);
            o.extend_from_slice(or);
        }
        Self::from_flat(t, o, channels)
    }

    /// Number of examples.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of response channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    #[inline]
    pub fn outputs(&self) -> &[f32] {
        &self.outputs
    }

    /// Returns the `idx`-th `(target, output)` row pair.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn row(&self, idx: usize) -> (&[f32], &[f32]) {
        let start = idx * self.channels;
        let end = start + self.channels;
        (&self.targets[start..end], &self.outputs[start..end])
    }
}

/// Single deterministic pass over `stream` in [`Mode::Inference`].
pub fn collect_deterministic<P, S>(predictor: &P, stream: &S) -> Result<Predictions>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    // Inference never draws from the generator.
    let mut rng = StdRng::seed_from_u64(0);
    collect_with(predictor, stream, Mode::Inference, 1, &mut rng)
}

/// Monte-Carlo dropout pass over `stream`.
///
/// Every batch is predicted `mc.samples` times in [`Mode::MonteCarlo`] and the average
/// is recorded.
pub fn collect_monte_carlo<P, S>(predictor: &P, stream: &S, mc: &McConfig) -> Result<Predictions>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    mc.validate()?;
    let mut rng = mc_rng(mc);
    collect_with(predictor, stream, Mode::MonteCarlo, mc.samples, &mut rng)
}

/// Monte-Carlo dropout pass with an ensemble.
///
/// Each of the `mc.samples` passes fans out to every member, so each recorded output is
/// the equally weighted mean over `samples * members` stochastic predictions.
pub fn collect_ensemble<P, S>(
    ensemble: &Ensemble<P>,
    stream: &S,
    mc: &McConfig,
) -> Result<Predictions>
where
    P: Predictor,
    S: BatchStream + ?Sized,
{
    tracing::debug!(members = ensemble.len(), "collecting ensemble predictions");
    collect_monte_carlo(ensemble, stream, mc)
}

/// Average of `samples` forward passes of one batch under `mode`.
///
/// Writes `(len, output_dim)` values into `out`.
pub fn mean_estimate<P: Predictor + ?Sized>(
    predictor: &P,
    inputs: &[f32],
    len: usize,
    samples: usize,
    mode: Mode,
    rng: &mut dyn RngCore,
    out: &mut [f32],
) -> Result<()> {
    if samples == 0 {
        return Err(Error::InvalidConfig("samples must be > 0".to_owned()));
    }
    if samples == 1 {
        return predictor.forward_batch(inputs, len, mode, rng, out);
    }

    let mut pass = vec![0.0_f32; out.len()];
    out.fill(0.0);
    for _ in 0..samples {
        predictor.forward_batch(inputs, len, mode, rng, &mut pass)?;
        for (acc, &v) in out.iter_mut().zip(&pass) {
            *acc += v;
        }
    }
    let inv = 1.0 / samples as f32;
    for v in out.iter_mut() {
        *v *= inv;
    }
    Ok(())
}

fn mc_rng(mc: &McConfig) -> StdRng {
    match mc.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn collect_with<P, S>(
    predictor: &P,
    stream: &S,
    mode: Mode,
    samples: usize,
    rng: &mut dyn RngCore,
) -> Result<Predictions>
where
    P: Predictor + ?Sized,
    S: BatchStream + ?Sized,
{
    let channels = predictor.output_dim();
    if stream.target_dim() != channels {
        return Err(Error::InvalidShape(format!(
            "stream target_dim {} does not match predictor output_dim {channels}",
            stream.target_dim()
        )));
    }
    if stream.input_dim() != predictor.input_dim() {
        return Err(Error::InvalidShape(format!(
            "stream input_dim {} does not match predictor input_dim {}",
            stream.input_dim(),
            predictor.input_dim()
        )));
    }

    let mut targets = Vec::new();
    let mut outputs = Vec::new();
    let mut batches = 0_usize;
    for batch in stream.batches() {
        let Batch {
            inputs,
            targets: y,
            len,
        } = batch?;
        if y.len() != len * channels {
            return Err(Error::InvalidShape(format!(
                "batch {batches} targets length {} does not match {len} * {channels}",
                y.len()
            )));
        }

        let start = outputs.len();
        outputs.resize(start + len * channels, 0.0);
        mean_estimate(
            predictor,
            inputs,
            len,
            samples,
            mode,
            rng,
            &mut outputs[start..],
        )?;
        targets.extend_from_slice(y);
        batches += 1;
    }

    if targets.is_empty() {
        return Err(Error::InvalidData(
            "data stream produced no examples".to_owned(),
        ));
    }
    tracing::debug!(
        ?mode,
        samples,
        batches,
        examples = targets.len() / channels,
        channels,
        "collected predictions"
    );
    Predictions::from_flat(targets, outputs, channels)
}
