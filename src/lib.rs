#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Projected multi-start gradient ascent for batched, possibly stochastic
//! acquisition functions over box constraints.
//!
//! Quasi-Newton optimizers assume a deterministic, smooth objective. Monte
//! Carlo acquisition functions resample on every call, so their values and
//! gradients are noisy. This crate optimizes them with Adam instead, running
//! `N` independent restarts of a q-batch at once and clamping every
//! coordinate back into its bounds after each step.
//!
//! # Getting Started
//!
//! ```
//! use core::convert::Infallible;
//!
//! use acqf_optim::prelude::*;
//!
//! // f(x) = -||x - c||² with c = (0.2, 0.8), scored per restart.
//! let mut objective = FiniteDifference::new(|batch: &CandidateBatch| {
//!     Ok::<_, Infallible>(
//!         batch
//!             .restarts()
//!             .map(|r| -(r[0] - 0.2).powi(2) - (r[1] - 0.8).powi(2))
//!             .collect(),
//!     )
//! });
//!
//! let bounds = Bounds::unit(2).unwrap();
//! let shape = BatchShape::new(8, 1, 2).unwrap();
//! let mut rng = fastrand::Rng::with_seed(42);
//!
//! let optimizer = ProjectedAdam::builder()
//!     .learning_rate(0.05)
//!     .max_iterations(100)
//!     .build()
//!     .unwrap();
//! let result = optimizer.run_random(&mut objective, &bounds, shape, &mut rng).unwrap();
//!
//! let (best, _score) = result.best().unwrap();
//! assert!((best[0] - 0.2).abs() < 0.05 && (best[1] - 0.8).abs() < 0.05);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`CandidateBatch`] | The `(N, q, d)` array being optimized. |
//! | [`Bounds`] | Per-dimension box constraints and their projection. |
//! | [`BatchObjective`] | The batched objective: scores per restart plus gradient. |
//! | [`FiniteDifference`] | Gradient adapter for score-only objectives. |
//! | [`AdamConfig`] / [`AdamState`] | Adam hyperparameters and per-run moments. |
//! | [`ProjectedAdam`] | The evaluate → step → project loop. |
//! | [`StoppingCriterion`](stopping::StoppingCriterion) | External stopping policy. |
//! | [`InitialConditions`] | Raw-sample screening for good starting points. |
//! | [`optimize_acqf`] | Multi-start driver with fixed features and best-restart selection. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on batches, bounds, configs and results | off |
//! | `sobol` | Scrambled Sobol raw samples in [`InitialConditions`] | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at run start/end, every step and during initialization | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod acqf;
pub mod adam;
mod batch;
mod bounds;
mod error;
pub mod init;
pub mod objective;
pub mod optimize;
pub mod stopping;

pub use acqf::{AcqfOptions, AcqfResult, optimize_acqf};
pub use adam::{AdamConfig, AdamState};
pub use batch::{BatchShape, CandidateBatch};
pub use bounds::Bounds;
pub use error::{BoxError, Error, Quantity, Result};
pub use init::InitialConditions;
pub use objective::{BatchObjective, Evaluation, FiniteDifference};
pub use optimize::{OptimizationResult, ProjectedAdam, Run, StepResult};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use acqf_optim::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acqf::{AcqfOptions, AcqfResult, optimize_acqf};
    pub use crate::adam::AdamConfig;
    pub use crate::batch::{BatchShape, CandidateBatch};
    pub use crate::bounds::Bounds;
    pub use crate::error::{Error, Result};
    pub use crate::init::InitialConditions;
    pub use crate::objective::{BatchObjective, Evaluation, FiniteDifference};
    pub use crate::optimize::{OptimizationResult, ProjectedAdam};
    pub use crate::stopping::{ExpMaStopping, MaxIterations, StoppingCriterion};
}
