//! Multi-start acquisition optimization.
//!
//! [`optimize_acqf`] ties the pieces together the way a Bayesian-optimization
//! driver uses them:
//!
//! 1. Pick `num_restarts` starting q-batches with [`InitialConditions`]
//!    (or take the caller's).
//! 2. Optimize them with [`ProjectedAdam`], at most `batch_limit` restarts per
//!    run. Each run has its own Adam state.
//! 3. Optionally post-process the candidates and keep only the best restart.
//!
//! In sequential mode the q points are chosen one at a time instead: each pass
//! optimizes a single point, and the points chosen so far are handed to the
//! objective through [`BatchObjective::set_pending`] before the next pass.
//!
//! Fixed features are held constant by collapsing their bounds to a single
//! value, so the projection pins them after every step.

use std::collections::HashMap;

use crate::batch::{BatchShape, CandidateBatch};
use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::init::{self, DEFAULT_NUM_RESTARTS, DEFAULT_RAW_SAMPLES, InitialConditions};
use crate::objective::BatchObjective;
use crate::optimize::{OptimizationResult, ProjectedAdam};
use crate::stopping::ExpMaStopping;

/// Post-processing applied to the optimized candidates.
pub type PostProcessing = Box<dyn Fn(&mut CandidateBatch)>;

/// Options for [`optimize_acqf`].
///
/// # Examples
///
/// ```
/// use core::convert::Infallible;
///
/// use acqf_optim::prelude::*;
///
/// let mut objective = FiniteDifference::new(|batch: &CandidateBatch| {
///     Ok::<_, Infallible>(
///         batch
///             .restarts()
///             .map(|r| -(r[0] - 0.25).powi(2) - (r[1] - 0.75).powi(2))
///             .collect(),
///     )
/// });
/// let bounds = Bounds::unit(2).unwrap();
///
/// let options = AcqfOptions::builder()
///     .num_restarts(4)
///     .raw_samples(32)
///     .optimizer(ProjectedAdam::builder().learning_rate(0.05).max_iterations(150).build().unwrap())
///     .seed(3)
///     .build()
///     .unwrap();
/// let result = optimize_acqf(&mut objective, &bounds, &options).unwrap();
///
/// assert_eq!(result.candidates.n_restarts(), 1);
/// let x = result.candidates.point(0, 0);
/// assert!((x[0] - 0.25).abs() < 0.05 && (x[1] - 0.75).abs() < 0.05);
/// ```
pub struct AcqfOptions {
    num_restarts: usize,
    q: usize,
    batch_limit: Option<usize>,
    fixed_features: HashMap<usize, f64>,
    initial_conditions: Option<CandidateBatch>,
    return_best_only: bool,
    sequential: bool,
    optimizer: ProjectedAdam,
    stopping: Option<ExpMaStopping>,
    init: InitialConditions,
    post_processing: Option<PostProcessing>,
}

impl AcqfOptions {
    /// Creates a builder for configuring `AcqfOptions`.
    #[must_use]
    pub fn builder() -> AcqfOptionsBuilder {
        AcqfOptionsBuilder::default()
    }

    #[must_use]
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    #[must_use]
    pub fn q(&self) -> usize {
        self.q
    }

    #[must_use]
    pub fn sequential(&self) -> bool {
        self.sequential
    }
}

/// Builder for configuring [`AcqfOptions`].
///
/// Defaults:
/// - `num_restarts`: 20
/// - `raw_samples`: 512
/// - `q`: 1
/// - `batch_limit`: all restarts in one run
/// - `fixed_features`: none
/// - `return_best_only`: true
/// - `sequential`: false
/// - `optimizer`: [`ProjectedAdam`] defaults
/// - `stopping`: the optimizer's iteration budget
/// - initialization: `eta` 1.0, `alpha` 1e-4, not non-negative, random seed
#[derive(Default)]
pub struct AcqfOptionsBuilder {
    num_restarts: Option<usize>,
    raw_samples: Option<usize>,
    q: Option<usize>,
    batch_limit: Option<usize>,
    fixed_features: HashMap<usize, f64>,
    initial_conditions: Option<CandidateBatch>,
    return_best_only: Option<bool>,
    sequential: bool,
    optimizer: Option<ProjectedAdam>,
    stopping: Option<ExpMaStopping>,
    eta: Option<f64>,
    alpha: Option<f64>,
    nonnegative: bool,
    #[cfg(feature = "sobol")]
    sobol: bool,
    seed: Option<u64>,
    post_processing: Option<PostProcessing>,
}

impl AcqfOptionsBuilder {
    /// Number of restarts to optimize.
    #[must_use]
    pub fn num_restarts(mut self, n: usize) -> Self {
        self.num_restarts = Some(n);
        self
    }

    /// Number of raw samples screened to pick the restarts.
    #[must_use]
    pub fn raw_samples(mut self, n: usize) -> Self {
        self.raw_samples = Some(n);
        self
    }

    /// Points per candidate q-batch.
    #[must_use]
    pub fn q(mut self, q: usize) -> Self {
        self.q = Some(q);
        self
    }

    /// Maximum number of restarts per objective call, both when screening raw
    /// samples and when optimizing.
    #[must_use]
    pub fn batch_limit(mut self, n: usize) -> Self {
        self.batch_limit = Some(n);
        self
    }

    /// Holds feature `dim` at `value` in every candidate.
    #[must_use]
    pub fn fixed_feature(mut self, dim: usize, value: f64) -> Self {
        self.fixed_features.insert(dim, value);
        self
    }

    /// Starts from the given batch instead of the raw-sample heuristic.
    #[must_use]
    pub fn initial_conditions(mut self, batch: CandidateBatch) -> Self {
        self.initial_conditions = Some(batch);
        self
    }

    /// Return only the best restart (default) or all of them.
    #[must_use]
    pub fn return_best_only(mut self, yes: bool) -> Self {
        self.return_best_only = Some(yes);
        self
    }

    /// Choose the q points one after another instead of jointly.
    ///
    /// Requires `return_best_only` and generated initial conditions.
    #[must_use]
    pub fn sequential(mut self, yes: bool) -> Self {
        self.sequential = yes;
        self
    }

    /// The optimizer used for every chunk of restarts.
    #[must_use]
    pub fn optimizer(mut self, optimizer: ProjectedAdam) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Stop each run on a moving-average convergence test instead of a fixed budget.
    #[must_use]
    pub fn stopping(mut self, stopping: ExpMaStopping) -> Self {
        self.stopping = Some(stopping);
        self
    }

    /// Boltzmann temperature for restart selection.
    #[must_use]
    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Threshold for the non-negative restart selection.
    #[must_use]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Treat the objective as non-negative when selecting restarts.
    #[must_use]
    pub fn nonnegative(mut self, yes: bool) -> Self {
        self.nonnegative = yes;
        self
    }

    /// Draw raw samples from a scrambled Sobol sequence.
    #[cfg(feature = "sobol")]
    #[must_use]
    pub fn sobol(mut self, yes: bool) -> Self {
        self.sobol = yes;
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Transformation applied to all optimized candidates before the best is picked.
    #[must_use]
    pub fn post_processing(mut self, f: impl Fn(&mut CandidateBatch) + 'static) -> Self {
        self.post_processing = Some(Box::new(f));
        self
    }

    /// Builds the configured [`AcqfOptions`].
    ///
    /// # Errors
    ///
    /// Same as [`InitialConditionsBuilder::build`](crate::init::InitialConditionsBuilder::build).
    /// When initial conditions are supplied, `q` is taken from them.
    ///
    /// [`Error::UnsupportedSequential`] if `sequential` is combined with
    /// `return_best_only(false)` or with initial conditions.
    pub fn build(self) -> Result<AcqfOptions> {
        if self.sequential {
            if self.return_best_only == Some(false) {
                return Err(Error::UnsupportedSequential("returning all restarts"));
            }
            if self.initial_conditions.is_some() {
                return Err(Error::UnsupportedSequential("initial conditions"));
            }
        }
        let q = self
            .initial_conditions
            .as_ref()
            .map_or(self.q.unwrap_or(1), |b| b.shape().q);
        let num_restarts = self
            .initial_conditions
            .as_ref()
            .map_or(self.num_restarts.unwrap_or(DEFAULT_NUM_RESTARTS), |b| {
                b.n_restarts()
            });

        let mut init = InitialConditions::builder()
            .num_restarts(num_restarts)
            .raw_samples(self.raw_samples.unwrap_or(DEFAULT_RAW_SAMPLES).max(num_restarts))
            .q(if self.sequential { 1 } else { q })
            .nonnegative(self.nonnegative);
        if let Some(limit) = self.batch_limit {
            init = init.batch_limit(limit);
        }
        if let Some(eta) = self.eta {
            init = init.eta(eta);
        }
        if let Some(alpha) = self.alpha {
            init = init.alpha(alpha);
        }
        if let Some(seed) = self.seed {
            init = init.seed(seed);
        }
        #[cfg(feature = "sobol")]
        {
            init = init.sobol(self.sobol);
        }
        let init = init.build()?;

        if self.raw_samples.is_some_and(|raw| raw < num_restarts)
            && self.initial_conditions.is_none()
        {
            return Err(Error::NotEnoughRawSamples {
                requested: num_restarts,
                available: self.raw_samples.unwrap_or_default(),
            });
        }

        Ok(AcqfOptions {
            num_restarts,
            q,
            batch_limit: self.batch_limit,
            fixed_features: self.fixed_features,
            initial_conditions: self.initial_conditions,
            return_best_only: self.return_best_only.unwrap_or(true),
            sequential: self.sequential,
            optimizer: match self.optimizer {
                Some(optimizer) => optimizer,
                None => ProjectedAdam::builder().build()?,
            },
            stopping: self.stopping,
            init,
            post_processing: self.post_processing,
        })
    }
}

/// Candidates and their acquisition values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcqfResult {
    /// `(1, q, d)` when only the best restart is returned, `(N, q, d)` otherwise.
    pub candidates: CandidateBatch,
    /// Final acquisition value of each returned restart. In sequential mode,
    /// one value per point, each conditioned on the points before it.
    pub values: Vec<f64>,
    /// Loss history of every optimization run, one per chunk of restarts.
    pub loss_histories: Vec<Vec<f64>>,
}

/// Generates candidates by multi-start projected Adam ascent.
///
/// # Errors
///
/// - [`Error::InvalidShape`] / [`Error::InvalidBounds`] if fixed features or
///   initial conditions do not fit `bounds`.
/// - Any error from the initialization heuristic or the optimization runs;
///   the first one aborts the whole call.
///
/// In sequential mode the objective's pending points are reset to `None`
/// before returning, whether the call succeeded or not.
pub fn optimize_acqf<O: BatchObjective>(
    objective: &mut O,
    bounds: &Bounds,
    options: &AcqfOptions,
) -> Result<AcqfResult> {
    let bounds = bounds.with_fixed(&options.fixed_features)?;
    if !options.sequential {
        return optimize_joint(objective, &bounds, options, options.q, options.return_best_only);
    }

    let result = optimize_sequential(objective, &bounds, options);
    objective.set_pending(None);
    result
}

fn optimize_sequential<O: BatchObjective>(
    objective: &mut O,
    bounds: &Bounds,
    options: &AcqfOptions,
) -> Result<AcqfResult> {
    let d = bounds.dim();
    let mut chosen = Vec::with_capacity(options.q * d);
    let mut values = Vec::with_capacity(options.q);
    let mut loss_histories = Vec::new();
    for j in 0..options.q {
        let best = optimize_joint(objective, bounds, options, 1, true)?;
        trace_debug!(point = j, value = best.values[0], "sequential point selected");
        chosen.extend_from_slice(best.candidates.as_slice());
        values.extend(best.values);
        loss_histories.extend(best.loss_histories);
        let pending = CandidateBatch::from_vec(BatchShape::new(1, j + 1, d)?, chosen.clone())?;
        objective.set_pending(Some(&pending));
    }
    Ok(AcqfResult {
        candidates: CandidateBatch::from_vec(BatchShape::new(1, options.q, d)?, chosen)?,
        values,
        loss_histories,
    })
}

fn optimize_joint<O: BatchObjective>(
    objective: &mut O,
    bounds: &Bounds,
    options: &AcqfOptions,
    q: usize,
    best_only: bool,
) -> Result<AcqfResult> {
    let initial = match &options.initial_conditions {
        Some(batch) => batch.clone(),
        None => options.init.generate(objective, bounds)?,
    };
    bounds.check_batch(&initial)?;
    if initial.shape().q != q {
        return Err(Error::shape(format!(
            "initial conditions have q = {}, expected {q}",
            initial.shape().q
        )));
    }

    let n = initial.n_restarts();
    let limit = options.batch_limit.unwrap_or(n);
    if limit == 0 {
        return Err(Error::InvalidBatchLimit);
    }

    let mut chunks = Vec::new();
    let mut values = Vec::with_capacity(n);
    let mut loss_histories = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + limit).min(n);
        trace_debug!(start, end, "optimizing restarts");
        let chunk = initial.slice_restarts(start, end)?;
        let result = match &options.stopping {
            Some(stopping) => {
                options
                    .optimizer
                    .run_until(objective, bounds, chunk, stopping.clone())?
            }
            None => options.optimizer.run(objective, bounds, chunk)?,
        };
        let OptimizationResult {
            candidates,
            loss_history,
            scores,
            ..
        } = result;
        let scores = match scores {
            Some(scores) => scores,
            None => init::evaluate_chunked(objective, &candidates, limit, loss_history.len())?,
        };
        values.extend(scores);
        loss_histories.push(loss_history);
        chunks.push(candidates);
        start = end;
    }

    let mut candidates = CandidateBatch::concat(&chunks)?;
    if let Some(post) = &options.post_processing {
        post(&mut candidates);
    }

    if !best_only {
        return Ok(AcqfResult {
            candidates,
            values,
            loss_histories,
        });
    }

    let best = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(k, _)| k);
    trace_info!(best, value = values[best], "best restart selected");
    Ok(AcqfResult {
        candidates: candidates.select(&[best])?,
        values: vec![values[best]],
        loss_histories,
    })
}
