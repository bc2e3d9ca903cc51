//! Starting points for multi-start optimization.
//!
//! [`random_batch`] draws every coordinate uniformly inside its bounds.
//! [`InitialConditions`] implements the raw-sample heuristic used to pick
//! good restarts for acquisition functions:
//!
//! 1. Draw `raw_samples` q-batches uniformly (or from a scrambled Sobol
//!    sequence with the `sobol` feature).
//! 2. Score them with [`BatchObjective::evaluate`], `batch_limit` at a time.
//! 3. Keep `num_restarts` of them by Boltzmann sampling on the scores, always
//!    including the best one.
//!
//! If the scores carry no information (all equal, or all non-positive for a
//! non-negative acquisition function) the draw is repeated with 2×, 3× and 4×
//! as many raw samples before falling back to a random subset.

use crate::batch::{BatchShape, CandidateBatch};
use crate::bounds::Bounds;
use crate::error::{Error, Quantity, Result};
use crate::objective::{BatchObjective, objective_error};

/// Draws a batch with every coordinate uniform in `[lower[i], upper[i]]`.
///
/// # Errors
///
/// Returns [`Error::InvalidShape`] if the bounds dimension differs from `shape.d`.
///
/// # Examples
///
/// ```
/// use acqf_optim::{BatchShape, Bounds, init};
///
/// let bounds = Bounds::from_pairs(&[(0.0, 1.0), (-5.0, 5.0)]).unwrap();
/// let shape = BatchShape::new(4, 2, 2).unwrap();
/// let mut rng = fastrand::Rng::with_seed(7);
///
/// let batch = init::random_batch(shape, &bounds, &mut rng).unwrap();
/// assert!(bounds.contains(&batch));
/// ```
pub fn random_batch(
    shape: BatchShape,
    bounds: &Bounds,
    rng: &mut fastrand::Rng,
) -> Result<CandidateBatch> {
    let shape = BatchShape::new(shape.n_restarts, shape.q, shape.d)?;
    if bounds.dim() != shape.d {
        return Err(Error::shape(format!(
            "bounds have {} dimensions, shape asks for {}",
            bounds.dim(),
            shape.d
        )));
    }
    let data = (0..shape.len())
        .map(|i| bounds.scale(i % shape.d, rng.f64()))
        .collect();
    CandidateBatch::from_vec(shape, data)
}

/// Draws a batch from a scrambled Sobol sequence, one sequence index per restart.
///
/// Falls back to [`random_batch`] when `q * d` exceeds the number of Sobol
/// dimensions available.
#[cfg(feature = "sobol")]
#[allow(clippy::cast_possible_truncation)]
fn sobol_batch(
    shape: BatchShape,
    bounds: &Bounds,
    seed: u32,
    rng: &mut fastrand::Rng,
) -> Result<CandidateBatch> {
    let dims = shape.restart_len();
    if dims > sobol_burley::NUM_DIMENSIONS as usize {
        trace_warn!(
            dims,
            max = sobol_burley::NUM_DIMENSIONS,
            "q * d exceeds Sobol dimensions; using iid samples"
        );
        return random_batch(shape, bounds, rng);
    }
    if bounds.dim() != shape.d {
        return Err(Error::shape(format!(
            "bounds have {} dimensions, shape asks for {}",
            bounds.dim(),
            shape.d
        )));
    }
    let data = (0..shape.len())
        .map(|i| {
            let (k, c) = (i / dims, i % dims);
            let u = f64::from(sobol_burley::sample(k as u32, c as u32, seed));
            bounds.scale(c % shape.d, u)
        })
        .collect();
    CandidateBatch::from_vec(shape, data)
}

/// Scores `batch` in chunks of at most `batch_limit` restarts.
///
/// Each chunk is one call to [`BatchObjective::evaluate`]. `iteration` is
/// attached to any error.
pub(crate) fn evaluate_chunked<O: BatchObjective>(
    objective: &mut O,
    batch: &CandidateBatch,
    batch_limit: usize,
    iteration: usize,
) -> Result<Vec<f64>> {
    let n = batch.n_restarts();
    let mut scores = Vec::with_capacity(n);
    let mut start = 0;
    while start < n {
        let end = (start + batch_limit).min(n);
        let chunk = batch.slice_restarts(start, end)?;
        let chunk_scores = objective
            .evaluate(&chunk)
            .map_err(|e| objective_error(Some(iteration), e))?;
        if chunk_scores.len() != end - start {
            return Err(Error::InvalidShape {
                iteration: Some(iteration),
                message: format!(
                    "objective returned {} scores for {} restarts",
                    chunk_scores.len(),
                    end - start
                ),
            });
        }
        if chunk_scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::NonFiniteValue {
                iteration,
                quantity: Quantity::Score,
            });
        }
        scores.extend(chunk_scores);
        start = end;
    }
    Ok(scores)
}

/// Outcome of selecting restarts from raw samples.
struct Selection {
    indices: Vec<usize>,
    /// The scores carried no information and the selection is random.
    degenerate: bool,
}

/// Draws `n` distinct indices with probability proportional to `weights`.
fn weighted_sample_without_replacement(
    weights: &[f64],
    n: usize,
    rng: &mut fastrand::Rng,
) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = weights.iter().copied().enumerate().collect();
    let mut picked = Vec::with_capacity(n);
    while picked.len() < n && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, w)| w).sum();
        let pos = if total > 0.0 && total.is_finite() {
            let mut r = rng.f64() * total;
            remaining
                .iter()
                .position(|(_, w)| {
                    r -= w;
                    r < 0.0
                })
                .unwrap_or(remaining.len() - 1)
        } else {
            rng.usize(..remaining.len())
        };
        picked.push(remaining.swap_remove(pos).0);
    }
    picked
}

fn random_subset(n_samples: usize, n: usize, rng: &mut fastrand::Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    rng.shuffle(&mut indices);
    indices.truncate(n);
    indices
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

/// Boltzmann selection on standardized scores.
///
/// Weights are `exp(eta * z)` with `z` the standardized score; the best raw
/// sample is always part of the result.
#[allow(clippy::cast_precision_loss)]
fn select_boltzmann(scores: &[f64], n: usize, eta: f64, rng: &mut fastrand::Rng) -> Selection {
    let n_samples = scores.len();
    if n == n_samples {
        return Selection {
            indices: (0..n).collect(),
            degenerate: false,
        };
    }

    let mean = scores.iter().sum::<f64>() / n_samples as f64;
    let var = scores.iter().map(|y| (y - mean).powi(2)).sum::<f64>()
        / (n_samples.saturating_sub(1).max(1)) as f64;
    let std = var.sqrt();
    if std <= 0.0 {
        return Selection {
            indices: random_subset(n_samples, n, rng),
            degenerate: true,
        };
    }

    let best = argmax(scores);
    let z_max = (scores[best] - mean) / std;
    // Shifting by z_max leaves the distribution unchanged and keeps exp() finite.
    let weights: Vec<f64> = scores
        .iter()
        .map(|y| (eta * ((y - mean) / std - z_max)).exp())
        .collect();
    let mut indices = weighted_sample_without_replacement(&weights, n, rng);
    if !indices.contains(&best) {
        indices[n - 1] = best;
    }
    Selection {
        indices,
        degenerate: false,
    }
}

/// Selection for acquisition functions that are non-negative by construction.
///
/// Only samples within `alpha` of the best score get Boltzmann weights
/// `exp(eta * (y / max - 1))`; `alpha` shrinks tenfold until enough samples
/// qualify. When fewer than `n` scores are positive, all positive samples are
/// kept and the rest is filled at random.
fn select_nonnegative(
    scores: &[f64],
    n: usize,
    eta: f64,
    alpha: f64,
    rng: &mut fastrand::Rng,
) -> Selection {
    let n_samples = scores.len();
    if n == n_samples {
        return Selection {
            indices: (0..n).collect(),
            degenerate: false,
        };
    }

    let best = argmax(scores);
    let max_val = scores[best];
    if max_val <= 0.0 {
        return Selection {
            indices: random_subset(n_samples, n, rng),
            degenerate: true,
        };
    }

    let (positive, mut rest): (Vec<usize>, Vec<usize>) =
        (0..n_samples).partition(|&i| scores[i] > 0.0);
    if positive.len() < n {
        rng.shuffle(&mut rest);
        rest.truncate(n - positive.len());
        let mut indices = positive;
        indices.extend(rest);
        indices.sort_unstable();
        return Selection {
            indices,
            degenerate: false,
        };
    }

    let mut alpha = alpha;
    let eligible: Vec<usize> = loop {
        let eligible: Vec<usize> = (0..n_samples)
            .filter(|&i| scores[i] >= alpha * max_val)
            .collect();
        if eligible.len() >= n {
            break eligible;
        }
        alpha *= 0.1;
    };
    let weights: Vec<f64> = eligible
        .iter()
        .map(|&i| (eta * (scores[i] / max_val - 1.0)).exp())
        .collect();
    let picked = weighted_sample_without_replacement(&weights, n, rng);
    let mut indices: Vec<usize> = picked.into_iter().map(|p| eligible[p]).collect();
    if !indices.contains(&best) {
        indices[n - 1] = best;
    }
    Selection {
        indices,
        degenerate: false,
    }
}

/// Default Boltzmann temperature.
const DEFAULT_ETA: f64 = 1.0;
/// Default threshold for non-negative selection.
const DEFAULT_ALPHA: f64 = 1e-4;
/// Raw-sample multiplier after which the heuristic gives up.
const MAX_FACTOR: usize = 5;

/// Raw-sample initialization heuristic for multi-start optimization.
///
/// # Examples
///
/// ```
/// use core::convert::Infallible;
///
/// use acqf_optim::{Bounds, CandidateBatch, FiniteDifference, InitialConditions};
///
/// let mut objective = FiniteDifference::new(|batch: &CandidateBatch| {
///     Ok::<_, Infallible>(batch.restarts().map(|r| -(r[0] - 0.3).powi(2)).collect())
/// });
/// let bounds = Bounds::unit(1).unwrap();
///
/// let init = InitialConditions::builder()
///     .num_restarts(4)
///     .raw_samples(64)
///     .seed(1)
///     .build()
///     .unwrap();
/// let batch = init.generate(&mut objective, &bounds).unwrap();
/// assert_eq!(batch.n_restarts(), 4);
/// assert!(bounds.contains(&batch));
/// ```
#[derive(Clone, Debug)]
pub struct InitialConditions {
    num_restarts: usize,
    raw_samples: usize,
    q: usize,
    batch_limit: Option<usize>,
    eta: f64,
    alpha: f64,
    nonnegative: bool,
    #[cfg(feature = "sobol")]
    sobol: bool,
    seed: Option<u64>,
}

impl InitialConditions {
    /// Creates a builder for configuring `InitialConditions`.
    #[must_use]
    pub fn builder() -> InitialConditionsBuilder {
        InitialConditionsBuilder::default()
    }

    #[must_use]
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    #[must_use]
    pub fn q(&self) -> usize {
        self.q
    }

    #[cfg_attr(not(feature = "sobol"), allow(unused_variables))]
    fn draw(
        &self,
        shape: BatchShape,
        bounds: &Bounds,
        attempt: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<CandidateBatch> {
        #[cfg(feature = "sobol")]
        if self.sobol {
            #[allow(clippy::cast_possible_truncation)]
            let seed = match self.seed {
                Some(s) => (s as u32).wrapping_add(attempt as u32),
                None => rng.u32(..),
            };
            return sobol_batch(shape, bounds, seed, rng);
        }
        random_batch(shape, bounds, rng)
    }

    /// Draws raw samples, scores them, and selects `num_restarts` restarts.
    ///
    /// The objective is only evaluated, never differentiated. Errors raised
    /// here report iteration `0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the bounds are incompatible or the
    /// objective returns the wrong number of scores,
    /// [`Error::NonFiniteValue`] for NaN or infinite scores, and
    /// [`Error::ObjectiveEvaluation`] if the objective fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn generate<O: BatchObjective>(
        &self,
        objective: &mut O,
        bounds: &Bounds,
    ) -> Result<CandidateBatch> {
        let mut rng = self
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        let mut factor = 1;

        loop {
            let n_raw = self.raw_samples * factor;
            let shape = BatchShape::new(n_raw, self.q, bounds.dim())?;
            let raw = self.draw(shape, bounds, factor - 1, &mut rng)?;
            let scores = evaluate_chunked(objective, &raw, self.batch_limit.unwrap_or(n_raw), 0)?;

            let selection = if self.nonnegative {
                select_nonnegative(&scores, self.num_restarts, self.eta, self.alpha, &mut rng)
            } else {
                select_boltzmann(&scores, self.num_restarts, self.eta, &mut rng)
            };
            let batch = raw.select(&selection.indices)?;
            if !selection.degenerate {
                trace_debug!(raw_samples = n_raw, "initial conditions selected");
                return Ok(batch);
            }
            if factor + 1 >= MAX_FACTOR {
                trace_warn!(
                    raw_samples = n_raw,
                    "unable to find informative acquisition values; initial conditions are random"
                );
                return Ok(batch);
            }

            trace_debug!(raw_samples = n_raw, "raw scores uninformative; retrying with more samples");
            factor += 1;
            if let Some(seed) = self.seed {
                // A fresh stream so the retry does not redraw the same points.
                rng = fastrand::Rng::with_seed(seed.wrapping_add(factor as u64 - 1));
            }
        }
    }
}

/// Builder for configuring [`InitialConditions`].
///
/// Defaults:
/// - `num_restarts`: 20
/// - `raw_samples`: 512
/// - `q`: 1
/// - `batch_limit`: all raw samples in one call
/// - `eta`: 1.0
/// - `alpha`: 1e-4
/// - `nonnegative`: false
/// - `seed`: random
#[derive(Clone, Debug, Default)]
pub struct InitialConditionsBuilder {
    num_restarts: Option<usize>,
    raw_samples: Option<usize>,
    q: Option<usize>,
    batch_limit: Option<usize>,
    eta: Option<f64>,
    alpha: Option<f64>,
    nonnegative: bool,
    #[cfg(feature = "sobol")]
    sobol: bool,
    seed: Option<u64>,
}

/// Default number of restarts.
pub(crate) const DEFAULT_NUM_RESTARTS: usize = 20;
/// Default number of raw samples.
pub(crate) const DEFAULT_RAW_SAMPLES: usize = 512;

impl InitialConditionsBuilder {
    /// Number of restarts to select.
    #[must_use]
    pub fn num_restarts(mut self, n: usize) -> Self {
        self.num_restarts = Some(n);
        self
    }

    /// Number of raw q-batches drawn on the first attempt.
    #[must_use]
    pub fn raw_samples(mut self, n: usize) -> Self {
        self.raw_samples = Some(n);
        self
    }

    /// Points per restart.
    #[must_use]
    pub fn q(mut self, q: usize) -> Self {
        self.q = Some(q);
        self
    }

    /// Maximum number of raw samples scored per objective call.
    #[must_use]
    pub fn batch_limit(mut self, n: usize) -> Self {
        self.batch_limit = Some(n);
        self
    }

    /// Boltzmann temperature. Higher values concentrate on the best samples.
    #[must_use]
    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Relative threshold for the non-negative selection.
    #[must_use]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Treat the objective as non-negative and use the thresholded selection.
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

    /// Builds the configured [`InitialConditions`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] for zero restarts, raw samples or `q`,
    /// [`Error::NotEnoughRawSamples`] if `num_restarts > raw_samples`,
    /// [`Error::InvalidBatchLimit`], [`Error::InvalidEta`] or
    /// [`Error::InvalidAlpha`] for out-of-range options.
    pub fn build(self) -> Result<InitialConditions> {
        let num_restarts = self.num_restarts.unwrap_or(DEFAULT_NUM_RESTARTS);
        let raw_samples = self.raw_samples.unwrap_or(DEFAULT_RAW_SAMPLES);
        let q = self.q.unwrap_or(1);
        let eta = self.eta.unwrap_or(DEFAULT_ETA);
        let alpha = self.alpha.unwrap_or(DEFAULT_ALPHA);

        if num_restarts == 0 || raw_samples == 0 || q == 0 {
            return Err(Error::shape(format!(
                "num_restarts, raw_samples and q must be positive, got ({num_restarts}, {raw_samples}, {q})"
            )));
        }
        if num_restarts > raw_samples {
            return Err(Error::NotEnoughRawSamples {
                requested: num_restarts,
                available: raw_samples,
            });
        }
        if self.batch_limit == Some(0) {
            return Err(Error::InvalidBatchLimit);
        }
        if !eta.is_finite() || eta < 0.0 {
            return Err(Error::InvalidEta(eta));
        }
        if !(0.0..1.0).contains(&alpha) {
            return Err(Error::InvalidAlpha(alpha));
        }

        Ok(InitialConditions {
            num_restarts,
            raw_samples,
            q,
            batch_limit: self.batch_limit,
            eta,
            alpha,
            nonnegative: self.nonnegative,
            #[cfg(feature = "sobol")]
            sobol: self.sobol,
            seed: self.seed,
        })
    }
}
