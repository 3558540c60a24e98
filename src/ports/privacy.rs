//! Differential Privacy port: Traits for calibrated noise mechanisms.
//!
//! These traits abstract the noise source from the statistic engine so the
//! application layer never touches an RNG directly.

/// Errors that can occur when calibrating a noise mechanism.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DpError {
    #[error("Invalid epsilon: {0} (must be finite and > 0)")]
    InvalidEpsilon(f64),

    #[error("Invalid sensitivity: {0} (must be finite and > 0)")]
    InvalidSensitivity(f64),
}

/// Check the mechanism preconditions shared by every implementation.
///
/// # Errors
/// Returns `DpError` if epsilon or sensitivity is not a positive finite number.
pub fn check_parameters(epsilon: f64, sensitivity: f64) -> Result<(), DpError> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(DpError::InvalidEpsilon(epsilon));
    }
    if !sensitivity.is_finite() || sensitivity <= 0.0 {
        return Err(DpError::InvalidSensitivity(sensitivity));
    }
    Ok(())
}

/// A calibrated additive-noise mechanism.
///
/// Every call to [`Mechanism::apply`] is an independent random draw.
pub trait Mechanism: Send {
    /// Privacy budget this mechanism was calibrated for.
    fn epsilon(&self) -> f64;

    /// Sensitivity this mechanism was calibrated for.
    fn sensitivity(&self) -> f64;

    /// Noise scale (`sensitivity / epsilon` for Laplace).
    fn scale(&self) -> f64 {
        self.sensitivity() / self.epsilon()
    }

    /// Perturb a true value.
    fn apply(&mut self, value: f64) -> f64;
}

/// Factory for calibrated mechanisms.
///
/// Implementations must hand out a fresh, independently seeded mechanism per
/// `calibrate` call so concurrent group/epsilon work never shares noise.
pub trait DifferentialPrivacy: Send + Sync {
    /// Concrete mechanism type.
    type Mechanism: Mechanism;

    /// Build a mechanism for the given privacy parameters.
    ///
    /// # Errors
    /// Returns `DpError` if epsilon or sensitivity is invalid.
    fn calibrate(&self, epsilon: f64, sensitivity: f64) -> Result<Self::Mechanism, DpError>;

    /// Sensitivity applied to mean, count and percent statistics.
    fn default_sensitivity(&self) -> f64;

    /// Add Laplacian noise to a single value using a one-shot mechanism.
    ///
    /// # Errors
    /// Returns `DpError` if epsilon or sensitivity is invalid.
    fn add_laplace_noise(&self, value: f64, sensitivity: f64, epsilon: f64) -> Result<f64, DpError> {
        let mut mechanism = self.calibrate(epsilon, sensitivity)?;
        Ok(mechanism.apply(value))
    }
}
