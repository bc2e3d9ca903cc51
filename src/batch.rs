//! The candidate batch: an `(N, q, d)` array of points.
//!
//! `N` independent restarts, each holding a q-batch of `d`-dimensional
//! points. Storage is a flat row-major `Vec<f64>` so that restart `k` is
//! the contiguous slice `[k*q*d, (k+1)*q*d)`, which is what objectives
//! and gradients index into.

use crate::error::{Error, Result};

/// Dimensions of a [`CandidateBatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawShape")
)]
pub struct BatchShape {
    /// Number of independent restarts (`N`).
    pub n_restarts: usize,
    /// Points per restart (`q`).
    pub q: usize,
    /// Feature dimension (`d`).
    pub d: usize,
}

impl BatchShape {
    /// Creates a shape, rejecting zero-sized dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if any of `n_restarts`, `q` or `d` is zero.
    pub fn new(n_restarts: usize, q: usize, d: usize) -> Result<Self> {
        if n_restarts == 0 || q == 0 || d == 0 {
            return Err(Error::shape(format!(
                "N, q and d must be positive, got ({n_restarts}, {q}, {d})"
            )));
        }
        Ok(Self { n_restarts, q, d })
    }

    /// Number of coordinates in one restart (`q * d`).
    #[must_use]
    pub fn restart_len(&self) -> usize {
        self.q * self.d
    }

    /// Total number of coordinates (`N * q * d`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.n_restarts * self.restart_len()
    }

    /// Always `false` for shapes built through [`BatchShape::new`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The same shape with a different number of restarts.
    #[must_use]
    pub fn with_restarts(self, n_restarts: usize) -> Self {
        Self { n_restarts, ..self }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawShape {
    n_restarts: usize,
    q: usize,
    d: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<RawShape> for BatchShape {
    type Error = Error;

    fn try_from(raw: RawShape) -> Result<Self> {
        Self::new(raw.n_restarts, raw.q, raw.d)
    }
}

/// A batch of candidate points, shape `(N, q, d)`.
///
/// # Examples
///
/// ```
/// use acqf_optim::{BatchShape, CandidateBatch};
///
/// let shape = BatchShape::new(2, 1, 2).unwrap();
/// let batch = CandidateBatch::from_vec(shape, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
/// assert_eq!(batch.restart(1), &[0.3, 0.4]);
/// assert_eq!(batch.point(0, 0), &[0.1, 0.2]);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBatch")
)]
pub struct CandidateBatch {
    shape: BatchShape,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBatch {
    shape: BatchShape,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBatch> for CandidateBatch {
    type Error = Error;

    fn try_from(raw: RawBatch) -> Result<Self> {
        Self::from_vec(raw.shape, raw.data)
    }
}

impl CandidateBatch {
    /// Wraps row-major data of the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if `data.len()` differs from `N * q * d`
    /// or the shape has a zero dimension.
    pub fn from_vec(shape: BatchShape, data: Vec<f64>) -> Result<Self> {
        let shape = BatchShape::new(shape.n_restarts, shape.q, shape.d)?;
        if data.len() != shape.len() {
            return Err(Error::shape(format!(
                "batch of shape ({}, {}, {}) needs {} values, got {}",
                shape.n_restarts,
                shape.q,
                shape.d,
                shape.len(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Builds a batch from nested `[restart][point][feature]` vectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the nesting is empty or ragged.
    pub fn from_nested(restarts: &[Vec<Vec<f64>>]) -> Result<Self> {
        let n = restarts.len();
        let q = restarts.first().map_or(0, Vec::len);
        let d = restarts
            .first()
            .and_then(|points| points.first())
            .map_or(0, Vec::len);
        let shape = BatchShape::new(n, q, d)?;

        let mut data = Vec::with_capacity(shape.len());
        for (k, points) in restarts.iter().enumerate() {
            if points.len() != q {
                return Err(Error::shape(format!(
                    "restart {k} has {} points, expected {q}",
                    points.len()
                )));
            }
            for point in points {
                if point.len() != d {
                    return Err(Error::shape(format!(
                        "restart {k} has a point of dimension {}, expected {d}",
                        point.len()
                    )));
                }
                data.extend_from_slice(point);
            }
        }
        Ok(Self { shape, data })
    }

    /// Concatenates batches along the restart dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if `batches` is empty or the
    /// batches disagree on `q` or `d`.
    pub fn concat(batches: &[Self]) -> Result<Self> {
        let first = batches
            .first()
            .ok_or_else(|| Error::shape("cannot concatenate zero batches"))?;
        let (q, d) = (first.shape.q, first.shape.d);
        let mut data = Vec::new();
        let mut n = 0;
        for batch in batches {
            if batch.shape.q != q || batch.shape.d != d {
                return Err(Error::shape(format!(
                    "cannot concatenate batch with (q, d) = ({}, {}) onto ({q}, {d})",
                    batch.shape.q, batch.shape.d
                )));
            }
            n += batch.shape.n_restarts;
            data.extend_from_slice(&batch.data);
        }
        Self::from_vec(first.shape.with_restarts(n), data)
    }

    #[must_use]
    pub fn shape(&self) -> BatchShape {
        self.shape
    }

    #[must_use]
    pub fn n_restarts(&self) -> usize {
        self.shape.n_restarts
    }

    /// The coordinates of restart `k`, `q * d` values.
    ///
    /// # Panics
    ///
    /// Panics if `k >= N`.
    #[must_use]
    pub fn restart(&self, k: usize) -> &[f64] {
        let len = self.shape.restart_len();
        &self.data[k * len..(k + 1) * len]
    }

    /// Mutable access to the coordinates of restart `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k >= N`.
    pub fn restart_mut(&mut self, k: usize) -> &mut [f64] {
        let len = self.shape.restart_len();
        &mut self.data[k * len..(k + 1) * len]
    }

    /// Point `j` of restart `k`, `d` values.
    ///
    /// # Panics
    ///
    /// Panics if `k >= N` or `j >= q`.
    #[must_use]
    pub fn point(&self, k: usize, j: usize) -> &[f64] {
        let d = self.shape.d;
        &self.restart(k)[j * d..(j + 1) * d]
    }

    /// Iterates over restarts as `q * d` slices.
    pub fn restarts(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.shape.restart_len())
    }

    /// Iterates over every point of every restart as `d` slices.
    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.shape.d)
    }

    /// A new batch holding the given restarts, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if `indices` is empty or out of range.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let mut data = Vec::with_capacity(indices.len() * self.shape.restart_len());
        for &k in indices {
            if k >= self.shape.n_restarts {
                return Err(Error::shape(format!(
                    "restart index {k} out of range for {} restarts",
                    self.shape.n_restarts
                )));
            }
            data.extend_from_slice(self.restart(k));
        }
        Self::from_vec(self.shape.with_restarts(indices.len()), data)
    }

    /// Copies restarts `start..end` into a new batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the range is empty or out of bounds.
    pub fn slice_restarts(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.shape.n_restarts {
            return Err(Error::shape(format!(
                "restart range {start}..{end} invalid for {} restarts",
                self.shape.n_restarts
            )));
        }
        let len = self.shape.restart_len();
        Self::from_vec(
            self.shape.with_restarts(end - start),
            self.data[start * len..end * len].to_vec(),
        )
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// `true` if every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}
