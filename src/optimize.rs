//! Projected stochastic gradient ascent with Adam.
//!
//! Every iteration performs, in order:
//!
//! 1. **Evaluate**: one call to
//!    [`BatchObjective::evaluate_with_gradient`] on the whole batch.
//! 2. **Aggregate**: loss = `-Σ scores`, loss gradient = `-∇Σ scores`. The
//!    sum is valid because restarts are independent: the gradient of the sum
//!    with respect to restart `k` is restart `k`'s own gradient.
//! 3. **Step**: one Adam update on the candidate coordinates.
//! 4. **Project**: clamp every coordinate into its bounds.
//!
//! The projection acts on the values after the step and never feeds into the
//! loss or its gradient. The gradient buffer is overwritten on every
//! iteration, so nothing carries over between iterations except the Adam
//! moments.
//!
//! Iterations are numbered from 1. Errors raised while preparing the run
//! (or by the initialization heuristic) report iteration 0.
//!
//! # Examples
//!
//! ```
//! use core::convert::Infallible;
//!
//! use acqf_optim::prelude::*;
//!
//! // Score each restart by -(x - 0.7)² on its single coordinate.
//! let mut objective = FiniteDifference::new(|batch: &CandidateBatch| {
//!     Ok::<_, Infallible>(batch.restarts().map(|r| -(r[0] - 0.7).powi(2)).collect())
//! });
//!
//! let bounds = Bounds::unit(1).unwrap();
//! let initial = CandidateBatch::from_nested(&[vec![vec![0.1]], vec![vec![0.95]]]).unwrap();
//!
//! let optimizer = ProjectedAdam::builder()
//!     .learning_rate(0.05)
//!     .max_iterations(200)
//!     .build()
//!     .unwrap();
//! let result = optimizer.run(&mut objective, &bounds, initial).unwrap();
//!
//! for restart in result.candidates.restarts() {
//!     assert!((restart[0] - 0.7).abs() < 0.05);
//! }
//! assert_eq!(result.loss_history.len(), 200);
//! ```

use crate::adam::{AdamConfig, AdamState};
use crate::batch::{BatchShape, CandidateBatch};
use crate::bounds::Bounds;
use crate::error::{Error, Quantity, Result};
use crate::init;
use crate::objective::{BatchObjective, objective_error};
use crate::stopping::{MaxIterations, StoppingCriterion};

/// Default iteration budget.
const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Outcome of one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    /// 1-based index of the iteration that just finished.
    pub iteration: usize,
    /// Aggregate loss `-Σ scores` evaluated before the step.
    pub loss: f64,
}

/// Final state of an optimization run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult {
    /// The optimized, feasible batch.
    pub candidates: CandidateBatch,
    /// Aggregate loss of every iteration, oldest first.
    pub loss_history: Vec<f64>,
    /// Per-restart scores of the final batch, if requested.
    pub scores: Option<Vec<f64>>,
    /// Number of iterations run.
    pub iterations: usize,
}

impl OptimizationResult {
    /// Index of the restart with the highest final score.
    #[must_use]
    pub fn best_restart(&self) -> Option<usize> {
        self.scores.as_ref().and_then(|scores| {
            scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k)
        })
    }

    /// The coordinates and score of the best restart.
    #[must_use]
    pub fn best(&self) -> Option<(&[f64], f64)> {
        let k = self.best_restart()?;
        let score = self.scores.as_ref()?[k];
        Some((self.candidates.restart(k), score))
    }
}

/// Projected Adam ascent over a box-constrained candidate batch.
///
/// The optimizer itself only holds configuration; every run gets its own
/// [`AdamState`], so one `ProjectedAdam` can drive any number of runs.
#[derive(Clone, Debug)]
pub struct ProjectedAdam {
    config: AdamConfig,
    max_iterations: usize,
    final_scores: bool,
}

impl ProjectedAdam {
    /// An optimizer with the given Adam configuration and default budget.
    #[must_use]
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            final_scores: true,
        }
    }

    /// Creates a builder for configuring a `ProjectedAdam`.
    #[must_use]
    pub fn builder() -> ProjectedAdamBuilder {
        ProjectedAdamBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Prepares a run on `initial`, projecting it into `bounds` first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the bounds dimension differs from
    /// the batch and [`Error::NonFiniteValue`] (iteration 0) if the batch
    /// contains NaN or infinite coordinates.
    pub fn start<'b>(&self, bounds: &'b Bounds, initial: CandidateBatch) -> Result<Run<'b>> {
        bounds.check_batch(&initial)?;
        if !initial.is_finite() {
            return Err(Error::NonFiniteValue {
                iteration: 0,
                quantity: Quantity::Candidate,
            });
        }
        let mut batch = initial;
        bounds.project(&mut batch);

        let len = batch.shape().len();
        Ok(Run {
            bounds,
            batch,
            state: AdamState::new(self.config, len),
            gradient: vec![0.0; len],
            losses: Vec::new(),
            iteration: 0,
            final_scores: self.final_scores,
        })
    }

    /// Runs the configured number of iterations.
    ///
    /// # Errors
    ///
    /// Any error from [`ProjectedAdam::start`] or [`Run::step`]; the run is
    /// aborted at the first one.
    pub fn run<O: BatchObjective>(
        &self,
        objective: &mut O,
        bounds: &Bounds,
        initial: CandidateBatch,
    ) -> Result<OptimizationResult> {
        let budget = MaxIterations::new(self.max_iterations)?;
        self.run_until(objective, bounds, initial, budget)
    }

    /// Runs until `stop` says so.
    ///
    /// `stop` is consulted after every iteration; the configured iteration
    /// budget is not applied.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectedAdam::run`].
    pub fn run_until<O, S>(
        &self,
        objective: &mut O,
        bounds: &Bounds,
        initial: CandidateBatch,
        mut stop: S,
    ) -> Result<OptimizationResult>
    where
        O: BatchObjective,
        S: StoppingCriterion,
    {
        let mut run = self.start(bounds, initial)?;
        #[cfg(feature = "tracing")]
        let shape = run.batch.shape();
        trace_info!(
            n_restarts = shape.n_restarts,
            q = shape.q,
            d = shape.d,
            lr = self.config.learning_rate(),
            "optimization started"
        );
        loop {
            let step = run.step(objective)?;
            if stop.should_stop(step.iteration, run.loss_history()) {
                break;
            }
        }
        let result = run.finish(objective)?;
        trace_info!(
            iterations = result.iterations,
            final_loss = result.loss_history.last().copied().unwrap_or(f64::NAN),
            "optimization finished"
        );
        Ok(result)
    }

    /// Draws a uniform random batch of `shape` inside `bounds` and runs on it.
    ///
    /// # Errors
    ///
    /// Same as [`init::random_batch`] and [`ProjectedAdam::run`].
    pub fn run_random<O: BatchObjective>(
        &self,
        objective: &mut O,
        bounds: &Bounds,
        shape: BatchShape,
        rng: &mut fastrand::Rng,
    ) -> Result<OptimizationResult> {
        let initial = init::random_batch(shape, bounds, rng)?;
        self.run(objective, bounds, initial)
    }
}

/// Builder for configuring a [`ProjectedAdam`].
///
/// Defaults:
/// - Adam settings: see [`AdamConfig`]
/// - `max_iterations`: 100
/// - `final_scores`: true
#[derive(Clone, Debug, Default)]
pub struct ProjectedAdamBuilder {
    config: Option<AdamConfig>,
    learning_rate: Option<f64>,
    max_iterations: Option<usize>,
    final_scores: Option<bool>,
}

impl ProjectedAdamBuilder {
    /// Uses a full Adam configuration.
    #[must_use]
    pub fn config(mut self, config: AdamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the learning rate of the Adam configuration.
    #[must_use]
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = Some(lr);
        self
    }

    /// Iteration budget for [`ProjectedAdam::run`].
    #[must_use]
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Whether to score the final batch once more after the last iteration.
    #[must_use]
    pub fn final_scores(mut self, yes: bool) -> Self {
        self.final_scores = Some(yes);
        self
    }

    /// Builds the configured [`ProjectedAdam`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterations`] for a zero budget and
    /// [`Error::InvalidLearningRate`] for a bad learning rate override.
    pub fn build(self) -> Result<ProjectedAdam> {
        let base = self.config.unwrap_or_default();
        let config = match self.learning_rate {
            Some(lr) => AdamConfig::builder()
                .learning_rate(lr)
                .moment_decay_1(base.moment_decay_1())
                .moment_decay_2(base.moment_decay_2())
                .numerical_epsilon(base.numerical_epsilon())
                .build()?,
            None => base,
        };
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(Error::InvalidIterations);
        }
        Ok(ProjectedAdam {
            config,
            max_iterations,
            final_scores: self.final_scores.unwrap_or(true),
        })
    }
}

/// A single optimization run in progress.
///
/// Owns the batch and the Adam state until [`Run::finish`] hands the batch
/// back. The batch is feasible whenever a method returns.
#[derive(Debug)]
pub struct Run<'b> {
    bounds: &'b Bounds,
    batch: CandidateBatch,
    state: AdamState,
    gradient: Vec<f64>,
    losses: Vec<f64>,
    iteration: usize,
    final_scores: bool,
}

impl Run<'_> {
    /// The current (projected) batch.
    #[must_use]
    pub fn batch(&self) -> &CandidateBatch {
        &self.batch
    }

    #[must_use]
    pub fn state(&self) -> &AdamState {
        &self.state
    }

    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        &self.losses
    }

    /// Number of completed iterations.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iteration
    }

    /// Performs one evaluate → step → project iteration.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectiveEvaluation`] if the objective fails.
    /// - [`Error::InvalidShape`] if it returns the wrong number of scores or
    ///   gradient entries.
    /// - [`Error::NonFiniteValue`] if a score, gradient entry or updated
    ///   coordinate is NaN or infinite.
    ///
    /// On error the batch keeps its last feasible value.
    pub fn step<O: BatchObjective>(&mut self, objective: &mut O) -> Result<StepResult> {
        let iteration = self.iteration + 1;
        let shape = self.batch.shape();
        self.gradient.fill(0.0);

        let eval = objective
            .evaluate_with_gradient(&self.batch)
            .map_err(|e| objective_error(Some(iteration), e))?;

        if eval.scores.len() != shape.n_restarts {
            return Err(Error::InvalidShape {
                iteration: Some(iteration),
                message: format!(
                    "objective returned {} scores for {} restarts",
                    eval.scores.len(),
                    shape.n_restarts
                ),
            });
        }
        if eval.gradient.len() != shape.len() {
            return Err(Error::InvalidShape {
                iteration: Some(iteration),
                message: format!(
                    "objective returned {} gradient entries for a batch of {}",
                    eval.gradient.len(),
                    shape.len()
                ),
            });
        }
        if eval.scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::NonFiniteValue {
                iteration,
                quantity: Quantity::Score,
            });
        }
        if eval.gradient.iter().any(|g| !g.is_finite()) {
            return Err(Error::NonFiniteValue {
                iteration,
                quantity: Quantity::Gradient,
            });
        }

        // Ascent on the scores is descent on the negated sum.
        let loss = -eval.scores.iter().sum::<f64>();
        if !loss.is_finite() {
            return Err(Error::NonFiniteValue {
                iteration,
                quantity: Quantity::Score,
            });
        }
        for (buf, g) in self.gradient.iter_mut().zip(&eval.gradient) {
            *buf = -g;
        }

        let mut updated = self.batch.clone();
        self.state.step(updated.as_mut_slice(), &self.gradient);
        if !updated.is_finite() {
            return Err(Error::NonFiniteValue {
                iteration,
                quantity: Quantity::Candidate,
            });
        }
        self.bounds.project(&mut updated);
        self.batch = updated;

        self.losses.push(loss);
        self.iteration = iteration;
        trace_debug!(iteration, loss, "step");
        Ok(StepResult { iteration, loss })
    }

    /// Ends the run and returns the batch, optionally scoring it once more.
    ///
    /// # Errors
    ///
    /// Same as [`Run::step`] for the final evaluation.
    pub fn finish<O: BatchObjective>(self, objective: &mut O) -> Result<OptimizationResult> {
        let scores = if self.final_scores {
            let scores =
                init::evaluate_chunked(objective, &self.batch, self.batch.n_restarts(), self.iteration)?;
            Some(scores)
        } else {
            None
        };
        Ok(OptimizationResult {
            candidates: self.batch,
            loss_history: self.losses,
            scores,
            iterations: self.iteration,
        })
    }
}
