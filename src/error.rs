use core::fmt;

/// The kind of value that turned out to be NaN or infinite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    /// A per-restart score returned by the objective.
    Score,
    /// A gradient entry returned by the objective.
    Gradient,
    /// A candidate coordinate.
    Candidate,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score => f.write_str("score"),
            Self::Gradient => f.write_str("gradient"),
            Self::Candidate => f.write_str("candidate"),
        }
    }
}

/// Boxed error raised inside an objective.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a batch, bounds vector or objective output has the wrong shape.
    #[error("invalid shape{}: {message}", at_iteration(.iteration))]
    InvalidShape {
        /// Iteration at which the mismatch was detected, if inside a run.
        iteration: Option<usize>,
        /// What was wrong.
        message: String,
    },

    /// Returned when a lower bound is greater than its upper bound, or either is not finite.
    #[error(
        "invalid bounds in dimension {dim}: lower ({lower}) must be finite and less than or equal to upper ({upper})"
    )]
    InvalidBounds {
        /// The feature dimension.
        dim: usize,
        /// The lower bound value.
        lower: f64,
        /// The upper bound value.
        upper: f64,
    },

    /// Returned when the objective, its gradient or a candidate becomes NaN or infinite.
    #[error("non-finite {quantity} at iteration {iteration}")]
    NonFiniteValue {
        /// Iteration at which the value was observed.
        iteration: usize,
        /// Which quantity was not finite.
        quantity: Quantity,
    },

    /// Wraps an error raised by the objective itself.
    ///
    /// The original error is kept as the source and can be recovered with
    /// `downcast_ref` on the boxed source.
    #[error("objective evaluation failed{}", at_iteration(.iteration))]
    ObjectiveEvaluation {
        /// Iteration at which the objective failed. `None` outside a run.
        iteration: Option<usize>,
        /// The objective's error.
        #[source]
        source: BoxError,
    },

    /// Returned when the learning rate is negative or not finite.
    #[error("invalid learning rate: {0} must be finite and non-negative")]
    InvalidLearningRate(f64),

    /// Returned when a moment decay rate is outside `[0, 1)`.
    #[error("invalid moment decay: {0} must be in [0.0, 1.0)")]
    InvalidMomentDecay(f64),

    /// Returned when the numerical epsilon is not positive.
    #[error("invalid epsilon: {0} must be positive")]
    InvalidEpsilon(f64),

    /// Returned when the Boltzmann temperature `eta` is negative or not finite.
    #[error("invalid eta: {0} must be finite and non-negative")]
    InvalidEta(f64),

    /// Returned when the non-negative selection threshold `alpha` is outside `[0, 1)`.
    #[error("invalid alpha: {0} must be in [0.0, 1.0)")]
    InvalidAlpha(f64),

    /// Returned when an iteration budget of zero is requested.
    #[error("iteration budget must be positive")]
    InvalidIterations,

    /// Returned when the number of restarts per chunk is zero.
    #[error("batch limit must be positive")]
    InvalidBatchLimit,

    /// Returned when more restarts are requested than raw samples are drawn.
    #[error("cannot select {requested} restarts from {available} raw samples")]
    NotEnoughRawSamples {
        /// Number of restarts requested.
        requested: usize,
        /// Number of raw samples drawn.
        available: usize,
    },

    /// Returned when sequential optimization is combined with an option it
    /// cannot honor.
    #[error("sequential optimization does not support {0}")]
    UnsupportedSequential(&'static str),
}

#[allow(clippy::ref_option)]
fn at_iteration(iteration: &Option<usize>) -> String {
    iteration.map_or_else(String::new, |i| format!(" at iteration {i}"))
}

impl Error {
    /// The iteration at which a run-time error occurred, if any.
    #[must_use]
    pub fn iteration(&self) -> Option<usize> {
        match self {
            Self::InvalidShape { iteration, .. } | Self::ObjectiveEvaluation { iteration, .. } => {
                *iteration
            }
            Self::NonFiniteValue { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }

    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::InvalidShape {
            iteration: None,
            message: message.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
