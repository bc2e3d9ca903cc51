//! Adaptive moment estimation (Adam) for the candidate coordinates.
//!
//! The update for every coordinate `x` with loss gradient `g` at step `t`:
//!
//! ```text
//! m ← β1 m + (1 - β1) g
//! v ← β2 v + (1 - β2) g²
//! x ← x - lr · (m / (1 - β1ᵗ)) / (sqrt(v / (1 - β2ᵗ)) + ε)
//! ```
//!
//! [`AdamState`] holds `m`, `v` and `t` for one run. It is created fresh for
//! each run and never shared between runs.

use crate::error::{Error, Result};

/// Default learning rate.
const DEFAULT_LEARNING_RATE: f64 = 0.025;
/// Default first-moment decay (β1).
const DEFAULT_MOMENT_DECAY_1: f64 = 0.9;
/// Default second-moment decay (β2).
const DEFAULT_MOMENT_DECAY_2: f64 = 0.999;
/// Default denominator epsilon.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Hyperparameters of the Adam update.
///
/// # Examples
///
/// ```
/// use acqf_optim::AdamConfig;
///
/// let config = AdamConfig::builder()
///     .learning_rate(0.05)
///     .moment_decay_2(0.99)
///     .build()
///     .unwrap();
/// assert!((config.learning_rate() - 0.05).abs() < f64::EPSILON);
/// assert!((config.moment_decay_1() - 0.9).abs() < f64::EPSILON);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawAdamConfig")
)]
pub struct AdamConfig {
    learning_rate: f64,
    moment_decay_1: f64,
    moment_decay_2: f64,
    numerical_epsilon: f64,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawAdamConfig {
    learning_rate: f64,
    moment_decay_1: f64,
    moment_decay_2: f64,
    numerical_epsilon: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawAdamConfig> for AdamConfig {
    type Error = Error;

    fn try_from(raw: RawAdamConfig) -> Result<Self> {
        AdamConfigBuilder::new()
            .learning_rate(raw.learning_rate)
            .moment_decay_1(raw.moment_decay_1)
            .moment_decay_2(raw.moment_decay_2)
            .numerical_epsilon(raw.numerical_epsilon)
            .build()
    }
}

impl AdamConfig {
    /// Creates a config with the given learning rate and default decays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLearningRate`] if `learning_rate` is negative
    /// or not finite.
    pub fn with_learning_rate(learning_rate: f64) -> Result<Self> {
        Self::builder().learning_rate(learning_rate).build()
    }

    /// Creates a builder for configuring an `AdamConfig`.
    #[must_use]
    pub fn builder() -> AdamConfigBuilder {
        AdamConfigBuilder::new()
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn moment_decay_1(&self) -> f64 {
        self.moment_decay_1
    }

    #[must_use]
    pub fn moment_decay_2(&self) -> f64 {
        self.moment_decay_2
    }

    #[must_use]
    pub fn numerical_epsilon(&self) -> f64 {
        self.numerical_epsilon
    }
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            moment_decay_1: DEFAULT_MOMENT_DECAY_1,
            moment_decay_2: DEFAULT_MOMENT_DECAY_2,
            numerical_epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Builder for configuring an [`AdamConfig`].
///
/// All options have sensible defaults:
/// - `learning_rate`: 0.025
/// - `moment_decay_1`: 0.9
/// - `moment_decay_2`: 0.999
/// - `numerical_epsilon`: 1e-8
#[derive(Debug, Clone, Default)]
pub struct AdamConfigBuilder {
    learning_rate: Option<f64>,
    moment_decay_1: Option<f64>,
    moment_decay_2: Option<f64>,
    numerical_epsilon: Option<f64>,
}

impl AdamConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step size. Zero is allowed and freezes the batch.
    ///
    /// Default: 0.025.
    #[must_use]
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = Some(lr);
        self
    }

    /// Sets the exponential decay of the first-moment estimate (β1).
    ///
    /// Default: 0.9.
    #[must_use]
    pub fn moment_decay_1(mut self, beta1: f64) -> Self {
        self.moment_decay_1 = Some(beta1);
        self
    }

    /// Sets the exponential decay of the second-moment estimate (β2).
    ///
    /// Default: 0.999.
    #[must_use]
    pub fn moment_decay_2(mut self, beta2: f64) -> Self {
        self.moment_decay_2 = Some(beta2);
        self
    }

    /// Sets the epsilon added to the update denominator.
    ///
    /// Default: 1e-8.
    #[must_use]
    pub fn numerical_epsilon(mut self, eps: f64) -> Self {
        self.numerical_epsilon = Some(eps);
        self
    }

    /// Builds the configured [`AdamConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLearningRate`], [`Error::InvalidMomentDecay`] or
    /// [`Error::InvalidEpsilon`] for out-of-range values.
    pub fn build(self) -> Result<AdamConfig> {
        let learning_rate = self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);
        let moment_decay_1 = self.moment_decay_1.unwrap_or(DEFAULT_MOMENT_DECAY_1);
        let moment_decay_2 = self.moment_decay_2.unwrap_or(DEFAULT_MOMENT_DECAY_2);
        let numerical_epsilon = self.numerical_epsilon.unwrap_or(DEFAULT_EPSILON);

        if !learning_rate.is_finite() || learning_rate < 0.0 {
            return Err(Error::InvalidLearningRate(learning_rate));
        }
        for beta in [moment_decay_1, moment_decay_2] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::InvalidMomentDecay(beta));
            }
        }
        if !numerical_epsilon.is_finite() || numerical_epsilon <= 0.0 {
            return Err(Error::InvalidEpsilon(numerical_epsilon));
        }

        Ok(AdamConfig {
            learning_rate,
            moment_decay_1,
            moment_decay_2,
            numerical_epsilon,
        })
    }
}

/// Moment estimates and step counter for one optimization run.
#[derive(Clone, Debug)]
pub struct AdamState {
    config: AdamConfig,
    first_moment: Vec<f64>,
    second_moment: Vec<f64>,
    step: i32,
}

impl AdamState {
    /// Zero-initialized state for `len` coordinates.
    #[must_use]
    pub fn new(config: AdamConfig, len: usize) -> Self {
        Self {
            config,
            first_moment: vec![0.0; len],
            second_moment: vec![0.0; len],
            step: 0,
        }
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.step
    }

    #[must_use]
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    #[must_use]
    pub fn first_moment(&self) -> &[f64] {
        &self.first_moment
    }

    #[must_use]
    pub fn second_moment(&self) -> &[f64] {
        &self.second_moment
    }

    /// Applies one descent step to `params` given the loss gradient `grad`.
    ///
    /// The result is not projected; callers clamp afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `params`, `grad` and the state differ in length.
    pub fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        assert_eq!(params.len(), self.first_moment.len(), "parameter length mismatch");
        assert_eq!(grad.len(), self.first_moment.len(), "gradient length mismatch");

        let AdamConfig {
            learning_rate: lr,
            moment_decay_1: beta1,
            moment_decay_2: beta2,
            numerical_epsilon: eps,
        } = self.config;

        self.step = self.step.saturating_add(1);
        let bias1 = 1.0 - beta1.powi(self.step);
        let bias2 = 1.0 - beta2.powi(self.step);

        for (((x, &g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(&mut self.first_moment)
            .zip(&mut self.second_moment)
        {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *x -= lr * m_hat / (v_hat.sqrt() + eps);
        }
    }
}
