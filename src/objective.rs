//! The [`BatchObjective`] trait defines what gets maximized.
//!
//! An objective scores a whole [`CandidateBatch`] in one call and returns one
//! value per restart. Restarts must not influence each other's scores. The
//! gradient it reports is the gradient of the *sum* of those scores with
//! respect to every coordinate in the batch; because restarts are
//! independent, the slice belonging to restart `k` is exactly the gradient of
//! restart `k`'s own score.
//!
//! Objectives may be stochastic (for example when they resample inside every
//! evaluation), which is why both methods take `&mut self`.
//!
//! ```
//! use core::convert::Infallible;
//!
//! use acqf_optim::{BatchObjective, CandidateBatch, Evaluation};
//!
//! /// `f(x) = -||x - c||²` summed over the q points of each restart.
//! struct NegativeQuadratic {
//!     target: Vec<f64>,
//! }
//!
//! impl BatchObjective for NegativeQuadratic {
//!     type Error = Infallible;
//!
//!     fn evaluate_with_gradient(&mut self, batch: &CandidateBatch) -> Result<Evaluation, Infallible> {
//!         let d = self.target.len();
//!         let scores = batch
//!             .restarts()
//!             .map(|r| {
//!                 -r.iter()
//!                     .enumerate()
//!                     .map(|(i, x)| (x - self.target[i % d]).powi(2))
//!                     .sum::<f64>()
//!             })
//!             .collect();
//!         let gradient = batch
//!             .as_slice()
//!             .iter()
//!             .enumerate()
//!             .map(|(i, x)| -2.0 * (x - self.target[i % d]))
//!             .collect();
//!         Ok(Evaluation { scores, gradient })
//!     }
//! }
//! ```

use crate::batch::CandidateBatch;
use crate::error::{BoxError, Error};

/// Scores and gradient produced by one batched evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// One score per restart, length `N`.
    pub scores: Vec<f64>,
    /// Gradient of `Σ scores` with respect to the batch, same layout as
    /// [`CandidateBatch::as_slice`] (length `N * q * d`).
    pub gradient: Vec<f64>,
}

/// A batched, differentiable, possibly stochastic objective.
///
/// Only [`evaluate_with_gradient`](BatchObjective::evaluate_with_gradient) is
/// required. Override [`evaluate`](BatchObjective::evaluate) when scores are
/// cheaper to get without a gradient; it is used for raw-sample screening and
/// for the final per-restart scores.
///
/// Internal state of the objective (model weights, hyperparameters, RNG) is
/// never touched by the optimizer; only the batch passed in is optimized.
pub trait BatchObjective {
    /// Error raised by the objective. It is boxed and handed back to the
    /// caller unchanged inside [`Error::ObjectiveEvaluation`].
    type Error: Into<BoxError>;

    /// Scores every restart of `batch`.
    ///
    /// # Errors
    ///
    /// Any error of the objective.
    fn evaluate(&mut self, batch: &CandidateBatch) -> Result<Vec<f64>, Self::Error> {
        self.evaluate_with_gradient(batch).map(|e| e.scores)
    }

    /// Scores every restart of `batch` and returns the gradient of their sum.
    ///
    /// # Errors
    ///
    /// Any error of the objective.
    fn evaluate_with_gradient(&mut self, batch: &CandidateBatch)
    -> Result<Evaluation, Self::Error>;

    /// Conditions later evaluations on points that are already chosen but not
    /// yet observed.
    ///
    /// Sequential optimization calls this with a `(1, k, d)` batch holding the
    /// `k` candidates picked so far, and with `None` once it is done. The
    /// default ignores pending points.
    fn set_pending(&mut self, pending: Option<&CandidateBatch>) {
        let _ = pending;
    }
}

impl<T: BatchObjective + ?Sized> BatchObjective for &mut T {
    type Error = T::Error;

    fn evaluate(&mut self, batch: &CandidateBatch) -> Result<Vec<f64>, Self::Error> {
        (**self).evaluate(batch)
    }

    fn evaluate_with_gradient(
        &mut self,
        batch: &CandidateBatch,
    ) -> Result<Evaluation, Self::Error> {
        (**self).evaluate_with_gradient(batch)
    }

    fn set_pending(&mut self, pending: Option<&CandidateBatch>) {
        (**self).set_pending(pending);
    }
}

/// Converts an objective failure into the crate error.
///
/// Errors that already are [`Error`] (for example a shape problem reported by
/// [`FiniteDifference`]) are passed through with the iteration filled in;
/// everything else is wrapped in [`Error::ObjectiveEvaluation`].
pub(crate) fn objective_error(iteration: Option<usize>, err: impl Into<BoxError>) -> Error {
    match err.into().downcast::<Error>() {
        Ok(inner) => match *inner {
            Error::InvalidShape {
                iteration: None,
                message,
            } => Error::InvalidShape { iteration, message },
            Error::ObjectiveEvaluation {
                iteration: None,
                source,
            } => Error::ObjectiveEvaluation { iteration, source },
            other => other,
        },
        Err(source) => Error::ObjectiveEvaluation { iteration, source },
    }
}

/// Default relative step for central differences.
const DEFAULT_FD_STEP: f64 = 1e-6;

/// Supplies gradients for a score-only batched function by central differences.
///
/// Coordinate `(j, i)` of every restart is perturbed in the same batched call,
/// so one gradient costs `2 * q * d + 1` evaluations regardless of `N`. This
/// relies on restarts being independent, which every [`BatchObjective`] must
/// guarantee anyway. Step sizes scale with `max(1, |x|)`.
///
/// With a stochastic function the differences pick up sampling noise; keep the
/// noise fixed within one gradient (e.g. common random numbers) when possible.
///
/// # Examples
///
/// ```
/// use core::convert::Infallible;
///
/// use acqf_optim::{BatchObjective, CandidateBatch, FiniteDifference};
///
/// let mut objective = FiniteDifference::new(|batch: &CandidateBatch| {
///     Ok::<_, Infallible>(batch.restarts().map(|r| -r[0] * r[0]).collect())
/// });
///
/// let batch = CandidateBatch::from_nested(&[vec![vec![1.0]], vec![vec![-2.0]]]).unwrap();
/// let eval = objective.evaluate_with_gradient(&batch).unwrap();
/// assert!((eval.gradient[0] + 2.0).abs() < 1e-4);
/// assert!((eval.gradient[1] - 4.0).abs() < 1e-4);
/// ```
pub struct FiniteDifference<F> {
    f: F,
    step: f64,
}

impl<F> FiniteDifference<F> {
    /// Wraps `f` with the default step of `1e-6`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            step: DEFAULT_FD_STEP,
        }
    }

    /// Sets the relative finite-difference step.
    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }
}

impl<F, E> FiniteDifference<F>
where
    F: FnMut(&CandidateBatch) -> Result<Vec<f64>, E>,
    E: Into<BoxError>,
{
    fn call(&mut self, batch: &CandidateBatch) -> Result<Vec<f64>, BoxError> {
        let scores = (self.f)(batch).map_err(Into::into)?;
        let n = batch.n_restarts();
        if scores.len() == n {
            Ok(scores)
        } else {
            Err(Box::new(Error::shape(format!(
                "objective returned {} scores for {n} restarts",
                scores.len()
            ))))
        }
    }
}

impl<F, E> BatchObjective for FiniteDifference<F>
where
    F: FnMut(&CandidateBatch) -> Result<Vec<f64>, E>,
    E: Into<BoxError>,
{
    type Error = BoxError;

    fn evaluate(&mut self, batch: &CandidateBatch) -> Result<Vec<f64>, BoxError> {
        self.call(batch)
    }

    fn evaluate_with_gradient(&mut self, batch: &CandidateBatch) -> Result<Evaluation, BoxError> {
        let scores = self.call(batch)?;
        let shape = batch.shape();
        let restart_len = shape.restart_len();
        let mut gradient = vec![0.0; shape.len()];
        let mut probe = batch.clone();
        let mut steps = vec![0.0; shape.n_restarts];

        for c in 0..restart_len {
            for (k, h) in steps.iter_mut().enumerate() {
                let x = batch.restart(k)[c];
                *h = self.step * x.abs().max(1.0);
                probe.restart_mut(k)[c] = x + *h;
            }
            let plus = self.call(&probe)?;
            for (k, h) in steps.iter().enumerate() {
                probe.restart_mut(k)[c] = batch.restart(k)[c] - h;
            }
            let minus = self.call(&probe)?;
            for (k, h) in steps.iter().enumerate() {
                gradient[k * restart_len + c] = (plus[k] - minus[k]) / (2.0 * h);
                probe.restart_mut(k)[c] = batch.restart(k)[c];
            }
        }

        Ok(Evaluation { scores, gradient })
    }
}
