//! Early-stopping scores for neural response prediction models.
//!
//! `response-stop` scores a model that predicts neural responses from stimuli against a
//! held-out stream of `(stimulus, response)` batches and reduces the result to one
//! scalar that a training loop can use to decide when to stop.
//!
//! # Pieces
//!
//! - [`Predictor`]: the model seam. Forward passes take an explicit [`Mode`], so a model
//!   is never left in a toggled state by an evaluation.
//! - [`BatchStream`]: a finite, restartable sequence of batches ([`DataLoader`] over a
//!   [`Dataset`] is the in-memory one).
//! - [`collect`]: gathers aligned `(target, output)` matrices, either from one
//!   deterministic pass or as Monte-Carlo dropout averages.
//! - [`stop`]: correlation, gamma, exponential and Poisson scores built on top.
//!
//! # Data layout
//!
//! - Scalars are `f32`; scores are computed and returned as `f64`.
//! - Matrices are flat row-major buffers: `(examples, channels)`.
//!
//! # Non-finite values
//!
//! A degenerate channel (for example a constant prediction, which has no correlation)
//! produces `NaN`. Such entries are replaced with `0` before averaging and a
//! `tracing` warning reports the percentage affected. They stay in the denominator.
//!
//! # Quick start
//!
//! ```rust
//! use response_stop::{Activation, DataLoader, Dataset, McConfig, MlpBuilder};
//!
//! # fn main() -> response_stop::Result<()> {
//! let xs = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.5, 0.2]];
//! let ys = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0], vec![0.0, 0.0]];
//! let val = Dataset::from_rows(&xs, &ys)?;
//! let loader = DataLoader::new(&val, 2)?;
//!
//! let model = MlpBuilder::new(2)?
//!     .add_layer(8, Activation::ReLU)?
//!     .with_dropout(0.2)?
//!     .add_layer(2, Activation::EluPlusOne)?
//!     .build_with_seed(0)?;
//!
//! let corr = response_stop::corr_stop(&model, &loader)?;
//! let nll = response_stop::poisson_stop_mc(&model, &loader, &McConfig::seeded(7))?;
//! assert!(corr.is_finite() && nll.is_finite());
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod collect;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod measures;
pub mod mlp;
pub mod mode;
pub mod objective;
pub mod predictor;
pub mod stop;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use collect::{
    Predictions, collect_deterministic, collect_ensemble, collect_monte_carlo, mean_estimate,
};
pub use config::{ExpBias, McConfig, StopConfig};
pub use data::{Batch, BatchStream, DataLoader, Dataset};
pub use error::{Error, Result};
pub use layer::{Dropout, Init, Layer};
pub use loss::Loss;
pub use measures::NonFinite;
pub use mlp::{Mlp, Scratch};
pub use mode::Mode;
pub use objective::full_objective;
pub use predictor::{Ensemble, Predictor};
pub use stop::{
    StopMeasure, corr_stop, corr_stop_mc, corr_stop_mc_ensemble, exp_stop, exp_stop_mc,
    gamma_stop, gamma_stop_mc, poisson_stop, poisson_stop_mc, poisson_stop_mc_ensemble,
};
