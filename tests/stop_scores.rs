use std::cell::Cell;

use approx::assert_abs_diff_eq;
use rand::RngCore;
use response_stop::{
    Activation, Batch, BatchStream, DataLoader, Dataset, Ensemble, Error, ExpBias, McConfig, Mlp,
    MlpBuilder, Mode, NonFinite, Predictor, Result, StopConfig, StopMeasure,
};

fn model(seed: u64, dropout: f32) -> Mlp {
    MlpBuilder::new(4)
        .unwrap()
        .add_layer(16, Activation::ReLU)
        .unwrap()
        .with_dropout(dropout)
        .unwrap()
        .add_layer(3, Activation::EluPlusOne)
        .unwrap()
        .build_with_seed(seed)
        .unwrap()
}

fn validation_set(n: usize) -> Dataset {
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f32 / n as f32;
        xs.push(vec![t, 1.0 - t, (3.0 * t).sin(), (5.0 * t).cos()]);
        ys.push(vec![(i % 3) as f32, (i % 5) as f32 * 0.5, t * 4.0]);
    }
    Dataset::from_rows(&xs, &ys).unwrap()
}

/// Yields batches from `inner` and fails on batch number `fail_at`.
struct FailingStream<'d> {
    inner: DataLoader<'d>,
    fail_at: usize,
}

impl BatchStream for FailingStream<'_> {
    type Iter<'a>
        = Box<dyn Iterator<Item = Result<Batch<'a>>> + 'a>
    where
        Self: 'a;

    fn input_dim(&self) -> usize {
        self.inner.input_dim()
    }

    fn target_dim(&self) -> usize {
        self.inner.target_dim()
    }

    fn batches(&self) -> Self::Iter<'_> {
        let fail_at = self.fail_at;
        Box::new(self.inner.batches().enumerate().map(move |(i, b)| {
            if i == fail_at {
                Err(Error::Stream(format!("batch {i} unavailable")))
            } else {
                b
            }
        }))
    }
}

/// Wraps a predictor, counting forward passes and failing after `fail_after` of them.
struct Flaky<'m> {
    inner: &'m Mlp,
    calls: Cell<usize>,
    fail_after: usize,
}

impl Predictor for Flaky<'_> {
    fn input_dim(&self) -> usize {
        self.inner.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.inner.output_dim()
    }

    fn forward(
        &self,
        input: &[f32],
        mode: Mode,
        rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if n >= self.fail_after {
            return Err(Error::Predictor("device lost".to_owned()));
        }
        self.inner.forward(input, mode, rng, out)
    }
}

/// Two dead channels stuck at a rate that is not exactly representable, and one channel
/// that tracks the third target exactly.
struct DeadChannels;

impl Predictor for DeadChannels {
    fn input_dim(&self) -> usize {
        4
    }

    fn output_dim(&self) -> usize {
        3
    }

    fn forward(
        &self,
        input: &[f32],
        _mode: Mode,
        _rng: &mut dyn RngCore,
        out: &mut [f32],
    ) -> Result<()> {
        out.copy_from_slice(&[0.0147, 0.0147, input[0] * 4.0]);
        Ok(())
    }
}

fn outputs(model: &Mlp, data: &Dataset) -> Vec<f32> {
    let loader = DataLoader::new(data, 8).unwrap();
    response_stop::collect_deterministic(model, &loader)
        .unwrap()
        .outputs()
        .to_vec()
}

#[test]
fn deterministic_scores_are_bit_identical_and_batch_size_invariant() {
    let m = model(1, 0.3);
    let data = validation_set(37);
    let a = DataLoader::new(&data, 5).unwrap();
    let b = DataLoader::new(&data, 37).unwrap();

    let corr = response_stop::corr_stop(&m, &a).unwrap();
    assert_eq!(corr.to_bits(), response_stop::corr_stop(&m, &a).unwrap().to_bits());
    assert_eq!(corr.to_bits(), response_stop::corr_stop(&m, &b).unwrap().to_bits());

    let pois = response_stop::poisson_stop(&m, &a).unwrap();
    assert_eq!(pois.to_bits(), response_stop::poisson_stop(&m, &b).unwrap().to_bits());

    assert!(corr.is_finite() && (-1.0..=1.0).contains(&corr));
    assert!(response_stop::gamma_stop(&m, &a).unwrap().is_finite());
    assert!(response_stop::exp_stop(&m, &a, 1e-12, 1e-7).unwrap().is_finite());
}

#[test]
fn monte_carlo_scores_repeat_with_a_fixed_seed() {
    let m = model(2, 0.5);
    let data = validation_set(40);
    let loader = DataLoader::new(&data, 16).unwrap();
    let mc = McConfig::seeded(99);

    let a = response_stop::poisson_stop_mc(&m, &loader, &mc).unwrap();
    let b = response_stop::poisson_stop_mc(&m, &loader, &mc).unwrap();
    assert_eq!(a.to_bits(), b.to_bits());

    let g1 = response_stop::gamma_stop_mc(&m, &loader, &mc).unwrap();
    let g2 = response_stop::gamma_stop_mc(&m, &loader, &mc).unwrap();
    assert_eq!(g1.to_bits(), g2.to_bits());

    let e1 = response_stop::exp_stop_mc(&m, &loader, 1e-12, 1e-7, &mc).unwrap();
    let e2 = response_stop::exp_stop_mc(&m, &loader, 1e-12, 1e-7, &mc).unwrap();
    assert_eq!(e1.to_bits(), e2.to_bits());

    let c1 = response_stop::corr_stop_mc(&m, &loader, &mc).unwrap();
    let other = response_stop::corr_stop_mc(&m, &loader, &McConfig::seeded(100)).unwrap();
    assert!(c1.is_finite() && other.is_finite());
    assert_ne!(c1.to_bits(), other.to_bits());
}

#[test]
fn monte_carlo_without_dropout_matches_deterministic() {
    let m = model(3, 0.0);
    let data = validation_set(20);
    let loader = DataLoader::new(&data, 6).unwrap();

    let det = response_stop::poisson_stop(&m, &loader).unwrap();
    let mc = response_stop::poisson_stop_mc(&m, &loader, &McConfig::default()).unwrap();
    assert_abs_diff_eq!(det, mc, epsilon = 1e-6);
}

#[test]
fn ensemble_of_one_equals_single_model_monte_carlo() {
    let m = model(4, 0.4);
    let data = validation_set(24);
    let loader = DataLoader::new(&data, 8).unwrap();
    let mc = McConfig::seeded(5);

    let single = response_stop::poisson_stop_mc(&m, &loader, &mc).unwrap();
    let ens = Ensemble::new(vec![&m]).unwrap();
    let via_ensemble = response_stop::poisson_stop_mc_ensemble(&ens, &loader, &mc).unwrap();
    assert_eq!(single.to_bits(), via_ensemble.to_bits());
}

#[test]
fn ensemble_scores_average_members() {
    let a = model(5, 0.0);
    let b = model(6, 0.0);
    let data = validation_set(30);
    let loader = DataLoader::new(&data, 7).unwrap();
    let ens = Ensemble::new(vec![a.clone(), b.clone()]).unwrap();

    let preds = response_stop::collect_ensemble(&ens, &loader, &McConfig::seeded(0)).unwrap();
    let out_a = outputs(&a, &data);
    let out_b = outputs(&b, &data);
    for (i, &v) in preds.outputs().iter().enumerate() {
        assert_abs_diff_eq!(v, 0.5 * (out_a[i] + out_b[i]), epsilon = 1e-5);
    }

    let corr = response_stop::corr_stop_mc_ensemble(&ens, &loader, &McConfig::seeded(0)).unwrap();
    assert!(corr.is_finite());
}

#[test]
fn stream_errors_propagate_and_leave_the_model_untouched() {
    let m = model(7, 0.5);
    let data = validation_set(32);
    let before = outputs(&m, &data);
    let stream = FailingStream {
        inner: DataLoader::new(&data, 8).unwrap(),
        fail_at: 2,
    };

    let err = response_stop::corr_stop_mc(&m, &stream, &McConfig::seeded(1)).unwrap_err();
    assert_eq!(err, Error::Stream("batch 2 unavailable".to_owned()));
    assert!(response_stop::gamma_stop(&m, &stream).is_err());

    // Deterministic inference after a failed Monte-Carlo evaluation is unchanged.
    assert_eq!(outputs(&m, &data), before);
}

#[test]
fn predictor_errors_propagate_without_retry() {
    let m = model(8, 0.2);
    let data = validation_set(16);
    let loader = DataLoader::new(&data, 4).unwrap();
    let flaky = Flaky {
        inner: &m,
        calls: Cell::new(0),
        fail_after: 6,
    };

    let err = response_stop::poisson_stop_mc(&flaky, &loader, &McConfig::seeded(0)).unwrap_err();
    assert!(matches!(err, Error::Predictor(_)));
    assert_eq!(flaky.calls.get(), 7);
}

#[test]
fn config_dispatch_matches_named_functions() {
    let m = model(9, 0.3);
    let data = validation_set(25);
    let loader = DataLoader::new(&data, 10).unwrap();
    let mc = McConfig::seeded(42);

    let cases = [
        (StopMeasure::Correlation, response_stop::corr_stop(&m, &loader).unwrap()),
        (StopMeasure::Gamma, response_stop::gamma_stop(&m, &loader).unwrap()),
        (
            StopMeasure::Exponential,
            response_stop::exp_stop(&m, &loader, 1e-12, 1e-7).unwrap(),
        ),
        (StopMeasure::Poisson, response_stop::poisson_stop(&m, &loader).unwrap()),
    ];
    for (measure, expected) in cases {
        let got = StopConfig::new(measure).evaluate(&m, &loader).unwrap();
        assert_eq!(got.to_bits(), expected.to_bits(), "{measure}");
    }

    let got = StopConfig::new(StopMeasure::Poisson)
        .monte_carlo(mc)
        .evaluate(&m, &loader)
        .unwrap();
    let expected = response_stop::poisson_stop_mc(&m, &loader, &mc).unwrap();
    assert_eq!(got.to_bits(), expected.to_bits());
}

#[test]
fn shape_mismatch_surfaces_as_error() {
    let m = model(10, 0.0);
    let xs = vec![vec![0.0; 4]; 3];
    let ys = vec![vec![0.0; 2]; 3];
    let data = Dataset::from_rows(&xs, &ys).unwrap();
    let loader = DataLoader::new(&data, 2).unwrap();
    assert!(matches!(
        response_stop::poisson_stop(&m, &loader),
        Err(Error::InvalidShape(_))
    ));
}

#[test]
fn dead_channels_score_zero_correlation_and_are_reported() {
    let data = validation_set(49);
    let loader = DataLoader::new(&data, 8).unwrap();

    let score = response_stop::corr_stop(&DeadChannels, &loader).unwrap();
    assert_abs_diff_eq!(score, 1.0 / 3.0, epsilon = 1e-6);

    let preds = response_stop::collect_deterministic(&DeadChannels, &loader).unwrap();
    let (reported, report) =
        StopMeasure::Correlation.score_predictions_with_report(&preds, &ExpBias::default());
    assert_eq!(reported, score);
    assert_eq!(report, NonFinite { count: 2, total: 3 });
    assert_abs_diff_eq!(report.percent(), 200.0 / 3.0, epsilon = 1e-9);
}
