//! When to stop the optimization loop.
//!
//! The loop asks a [`StoppingCriterion`] after every iteration. Any
//! `FnMut(usize, &[f64]) -> bool` closure is a criterion: it receives the
//! number of completed iterations and the loss history so far and returns
//! `true` to stop. Two criteria ship with the crate:
//!
//! - [`MaxIterations`]: a fixed budget.
//! - [`ExpMaStopping`]: stop once the exponentially weighted moving average
//!   of the loss stops decreasing (relative to a tolerance), with an upper
//!   bound on the number of iterations.

use crate::error::{Error, Result};

/// Decides whether the loop should stop after an iteration.
pub trait StoppingCriterion {
    /// Returns `true` to stop.
    ///
    /// `iterations` is the number of completed iterations (at least 1) and
    /// `losses` holds their aggregate losses, oldest first.
    fn should_stop(&mut self, iterations: usize, losses: &[f64]) -> bool;
}

impl<F> StoppingCriterion for F
where
    F: FnMut(usize, &[f64]) -> bool,
{
    fn should_stop(&mut self, iterations: usize, losses: &[f64]) -> bool {
        self(iterations, losses)
    }
}

/// Stop after a fixed number of iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxIterations(usize);

impl MaxIterations {
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterations`] if `n` is zero.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidIterations);
        }
        Ok(Self(n))
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.0
    }
}

impl StoppingCriterion for MaxIterations {
    fn should_stop(&mut self, iterations: usize, _losses: &[f64]) -> bool {
        iterations >= self.0
    }
}

/// Default maximum number of iterations.
const DEFAULT_MAX_ITER: usize = 10_000;
/// Default moving-average window.
const DEFAULT_N_WINDOW: usize = 10;
/// Default exponential weighting rate.
const DEFAULT_ETA: f64 = 1.0;
/// Default relative tolerance.
const DEFAULT_REL_TOL: f64 = 1e-5;

/// Exponential moving-average convergence test on the loss.
///
/// Keeps the last `n_window` losses and computes their weighted average.
/// Weights are `exp(-eta * (1 - j / (n_window - 1)))` for the `j`-th oldest
/// loss, normalized, so they rise from `exp(-eta)` to 1 across the window.
/// Once the window is full, the loop stops when `(ma_prev - ma) / |ma_prev| < rel_tol`.
/// It always stops after `max_iterations`.
///
/// # Examples
///
/// ```
/// use acqf_optim::stopping::{ExpMaStopping, StoppingCriterion};
///
/// let mut stop = ExpMaStopping::builder().n_window(3).rel_tol(1e-3).build().unwrap();
/// let flat = [1.0; 10];
/// let stopped_at = (1..=10).find(|&i| stop.should_stop(i, &flat[..i]));
/// assert_eq!(stopped_at, Some(4));
/// ```
#[derive(Clone, Debug)]
pub struct ExpMaStopping {
    max_iterations: usize,
    rel_tol: f64,
    weights: Vec<f64>,
    prev_ma: Option<f64>,
}

impl ExpMaStopping {
    /// Creates a builder for configuring an `ExpMaStopping`.
    #[must_use]
    pub fn builder() -> ExpMaStoppingBuilder {
        ExpMaStoppingBuilder::default()
    }

    fn moving_average(&self, window: &[f64]) -> f64 {
        window
            .iter()
            .zip(&self.weights)
            .map(|(loss, w)| loss * w)
            .sum()
    }
}

impl StoppingCriterion for ExpMaStopping {
    fn should_stop(&mut self, iterations: usize, losses: &[f64]) -> bool {
        if iterations >= self.max_iterations {
            return true;
        }
        let n_window = self.weights.len();
        if losses.len() < n_window {
            return false;
        }
        let ma = self.moving_average(&losses[losses.len() - n_window..]);
        let Some(prev) = self.prev_ma.replace(ma) else {
            return false;
        };
        let rel_decrease = (prev - ma) / prev.abs().max(f64::MIN_POSITIVE);
        rel_decrease < self.rel_tol
    }
}

/// Builder for configuring an [`ExpMaStopping`].
///
/// Defaults:
/// - `max_iterations`: 10000
/// - `n_window`: 10
/// - `eta`: 1.0
/// - `rel_tol`: 1e-5
#[derive(Clone, Debug, Default)]
pub struct ExpMaStoppingBuilder {
    max_iterations: Option<usize>,
    n_window: Option<usize>,
    eta: Option<f64>,
    rel_tol: Option<f64>,
}

impl ExpMaStoppingBuilder {
    #[must_use]
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Number of recent losses in the moving average.
    #[must_use]
    pub fn n_window(mut self, n: usize) -> Self {
        self.n_window = Some(n);
        self
    }

    /// Exponential decay of the window weights. Zero gives a plain mean.
    #[must_use]
    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    #[must_use]
    pub fn rel_tol(mut self, tol: f64) -> Self {
        self.rel_tol = Some(tol);
        self
    }

    /// Builds the configured [`ExpMaStopping`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterations`] if `max_iterations` or `n_window`
    /// is zero, and [`Error::InvalidEta`] for a negative or non-finite `eta`.
    #[allow(clippy::cast_precision_loss)]
    pub fn build(self) -> Result<ExpMaStopping> {
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITER);
        let n_window = self.n_window.unwrap_or(DEFAULT_N_WINDOW);
        let eta = self.eta.unwrap_or(DEFAULT_ETA);
        if max_iterations == 0 || n_window == 0 {
            return Err(Error::InvalidIterations);
        }
        if !eta.is_finite() || eta < 0.0 {
            return Err(Error::InvalidEta(eta));
        }

        // Oldest first, rising from exp(-eta) to 1 across the window.
        let span = (n_window - 1).max(1) as f64;
        let raw: Vec<f64> = (0..n_window)
            .map(|j| (-eta * (1.0 - j as f64 / span)).exp())
            .collect();
        let total: f64 = raw.iter().sum();
        Ok(ExpMaStopping {
            max_iterations,
            rel_tol: self.rel_tol.unwrap_or(DEFAULT_REL_TOL),
            weights: raw.into_iter().map(|w| w / total).collect(),
            prev_ma: None,
        })
    }
}
