//! Laplace adapter: Implementation of DifferentialPrivacy.
//!
//! Provides the Laplacian noise mechanism for privacy-preserving analytics.
//!
//! # Independence
//!
//! Every `calibrate` call seeds a new ChaCha20 CSPRNG from OS entropy, so no
//! two mechanisms (and no two concurrent groups or epsilons) share a noise
//! stream. Seeded construction exists only under `cfg(test)`.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::ports::{check_parameters, DifferentialPrivacy, DpError, Mechanism};

/// Configuration for the Laplace mechanism.
#[derive(Debug, Clone)]
pub struct PrivacyConfig {
    /// Sensitivity applied uniformly to mean, count and percent.
    ///
    /// Fixed at 1.0 by default regardless of the statistic's real
    /// sensitivity. This is a known simplification, not a formal guarantee.
    pub sensitivity: f64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self { sensitivity: 1.0 }
    }
}

impl PrivacyConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - DPSCOPE_DP_SENSITIVITY
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("DPSCOPE_DP_SENSITIVITY") {
            match v.trim().parse::<f64>() {
                Ok(x) if x.is_finite() && x > 0.0 => cfg.sensitivity = x,
                _ => tracing::warn!("Ignoring invalid DPSCOPE_DP_SENSITIVITY={v:?}"),
            }
        }

        cfg
    }
}

/// Laplace mechanism calibrated to `scale = sensitivity / epsilon`.
pub struct LaplaceMechanism {
    epsilon: f64,
    sensitivity: f64,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for LaplaceMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // RNG state stays out of logs.
        f.debug_struct("LaplaceMechanism")
            .field("epsilon", &self.epsilon)
            .field("sensitivity", &self.sensitivity)
            .finish_non_exhaustive()
    }
}

impl LaplaceMechanism {
    /// Calibrate a mechanism seeded from OS entropy.
    ///
    /// # Errors
    /// Returns `DpError` if epsilon or sensitivity is invalid.
    pub fn new(epsilon: f64, sensitivity: f64) -> Result<Self, DpError> {
        check_parameters(epsilon, sensitivity)?;
        Ok(Self {
            epsilon,
            sensitivity,
            rng: ChaCha20Rng::from_entropy(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_test_seed(epsilon: f64, sensitivity: f64, seed: [u8; 32]) -> Result<Self, DpError> {
        check_parameters(epsilon, sensitivity)?;
        Ok(Self {
            epsilon,
            sensitivity,
            rng: ChaCha20Rng::from_seed(seed),
        })
    }

    /// Sample from Laplace(0, scale) via inverse CDF.
    fn sample(&mut self, scale: f64) -> f64 {
        // Avoid exact endpoints that would yield ln(0) => +/-inf.
        let mut u01: f64 = self.rng.gen(); // [0, 1)
        if u01 == 0.0 {
            u01 = f64::MIN_POSITIVE;
        }
        let u: f64 = u01 - 0.5; // (-0.5, 0.5)

        let inner: f64 = 1.0 - 2.0 * u.abs();
        -scale * u.signum() * inner.ln()
    }
}

impl Mechanism for LaplaceMechanism {
    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    fn apply(&mut self, value: f64) -> f64 {
        let scale = self.scale();
        value + self.sample(scale)
    }
}

/// Factory handing out independent Laplace mechanisms.
#[derive(Debug, Clone, Default)]
pub struct LaplaceAdapter {
    config: PrivacyConfig,
}

impl LaplaceAdapter {
    /// Create a new adapter with configuration from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PrivacyConfig::from_env_or_default())
    }

    /// Create a new adapter with custom configuration.
    #[must_use]
    pub fn with_config(config: PrivacyConfig) -> Self {
        Self { config }
    }
}

impl DifferentialPrivacy for LaplaceAdapter {
    type Mechanism = LaplaceMechanism;

    fn calibrate(&self, epsilon: f64, sensitivity: f64) -> Result<LaplaceMechanism, DpError> {
        LaplaceMechanism::new(epsilon, sensitivity).inspect_err(|e| {
            tracing::error!("{e}. Refusing to release statistic.");
        })
    }

    fn default_sensitivity(&self) -> f64 {
        self.config.sensitivity
    }
}
