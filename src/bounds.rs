//! Box constraints and the feasibility projection.
//!
//! The feasible region is the axis-aligned hyperrectangle
//! `[lower[0], upper[0]] × … × [lower[d-1], upper[d-1]]`, broadcast over
//! every restart and every point of a [`CandidateBatch`]. Its Euclidean
//! projection is an independent per-coordinate clamp, so
//! [`Bounds::project`] is exact and needs no iterative solve.

use std::collections::HashMap;

use crate::batch::CandidateBatch;
use crate::error::{Error, Result};

/// Per-dimension lower and upper bounds.
///
/// # Examples
///
/// ```
/// use acqf_optim::{BatchShape, Bounds, CandidateBatch};
///
/// let bounds = Bounds::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
/// let shape = BatchShape::new(1, 1, 2).unwrap();
/// let mut batch = CandidateBatch::from_vec(shape, vec![1.5, -3.0]).unwrap();
///
/// bounds.project(&mut batch);
/// assert_eq!(batch.as_slice(), &[1.0, -1.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBounds")
)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// Unvalidated wire form of [`Bounds`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBounds> for Bounds {
    type Error = Error;

    fn try_from(raw: RawBounds) -> Result<Self> {
        Self::new(raw.lower, raw.upper)
    }
}

impl Bounds {
    /// Creates bounds from lower and upper vectors of equal length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the vectors are empty or differ in
    /// length, and [`Error::InvalidBounds`] if `lower[i] > upper[i]` or a
    /// bound is not finite.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(Error::shape(format!(
                "lower and upper bounds must be non-empty and of equal length, got {} and {}",
                lower.len(),
                upper.len()
            )));
        }
        for (dim, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(Error::InvalidBounds {
                    dim,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// Creates bounds from `(lower, upper)` pairs, one per dimension.
    ///
    /// # Errors
    ///
    /// Same as [`Bounds::new`].
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (lower, upper) = pairs.iter().copied().unzip();
        Self::new(lower, upper)
    }

    /// The unit hypercube `[0, 1]^d`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if `d` is zero.
    pub fn unit(d: usize) -> Result<Self> {
        Self::new(vec![0.0; d], vec![1.0; d])
    }

    /// Number of feature dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Collapses the given dimensions onto a single value each.
    ///
    /// The projection then pins those coordinates, which is how fixed
    /// features are held constant during optimization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if a dimension is out of range and
    /// [`Error::InvalidBounds`] if a value lies outside that dimension's bounds
    /// or is not finite.
    pub fn with_fixed(&self, fixed: &HashMap<usize, f64>) -> Result<Self> {
        let mut out = self.clone();
        for (&dim, &value) in fixed {
            if dim >= self.dim() {
                return Err(Error::shape(format!(
                    "fixed feature {dim} out of range for {} dimensions",
                    self.dim()
                )));
            }
            if !value.is_finite() || value < self.lower[dim] || value > self.upper[dim] {
                return Err(Error::InvalidBounds {
                    dim,
                    lower: value,
                    upper: value,
                });
            }
            out.lower[dim] = value;
            out.upper[dim] = value;
        }
        Ok(out)
    }

    /// Checks that the bounds match the feature dimension of `batch`.
    pub(crate) fn check_batch(&self, batch: &CandidateBatch) -> Result<()> {
        let d = batch.shape().d;
        if d == self.dim() {
            Ok(())
        } else {
            Err(Error::shape(format!(
                "bounds have {} dimensions but batch points have {d}",
                self.dim()
            )))
        }
    }

    /// Clamps a single point in place.
    ///
    /// # Panics
    ///
    /// Panics if `point.len()` differs from [`Bounds::dim`].
    pub fn project_point(&self, point: &mut [f64]) {
        assert_eq!(point.len(), self.dim(), "point dimension mismatch");
        for ((x, &lo), &hi) in point.iter_mut().zip(&self.lower).zip(&self.upper) {
            *x = x.clamp(lo, hi);
        }
    }

    /// Clamps every coordinate of `batch` into its dimension's bounds, in place.
    ///
    /// Idempotent. NaN coordinates are left as NaN so the caller can detect them.
    ///
    /// # Panics
    ///
    /// Panics if the batch feature dimension differs from [`Bounds::dim`].
    pub fn project(&self, batch: &mut CandidateBatch) {
        let d = self.dim();
        assert_eq!(batch.shape().d, d, "batch dimension mismatch");
        for point in batch.as_mut_slice().chunks_exact_mut(d) {
            self.project_point(point);
        }
    }

    /// `true` if every coordinate of `batch` lies within its bounds (inclusive).
    #[must_use]
    pub fn contains(&self, batch: &CandidateBatch) -> bool {
        batch.shape().d == self.dim()
            && batch.points().all(|point| {
                point
                    .iter()
                    .zip(&self.lower)
                    .zip(&self.upper)
                    .all(|((x, lo), hi)| (*lo..=*hi).contains(x))
            })
    }

    /// Maps `u ∈ [0, 1]` to `lower + u * (upper - lower)` in dimension `dim`.
    pub(crate) fn scale(&self, dim: usize, u: f64) -> f64 {
        let (lo, hi) = (self.lower[dim], self.upper[dim]);
        // `hi - lo` overflows for bounds near `±f64::MAX`.
        (lo * (1.0 - u) + hi * u).clamp(lo, hi)
    }
}
