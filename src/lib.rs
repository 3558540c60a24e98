//! # dpscope
//!
//! Differentially-private aggregate statistics over user-supplied datasets.
//!
//! This crate provides:
//! - Laplace noise calibrated to a privacy budget (epsilon) and sensitivity
//! - True vs. DP estimates for mean, count, percent and histogram statistics
//! - Ranking-stability and error-bar diagnostics under noise
//! - A raw vs. perturbed model-accuracy comparison
//! - An HTTP surface exposing all of the above
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (Dataset, StatisticKind, results)
//! - `ports`: Trait definitions for noise mechanisms and classifiers
//! - `adapters`: Concrete implementations (Laplace, logistic regression, HTTP)
//! - `application`: Use cases orchestrating domain and ports

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub use domain::{Dataset, ErrorKind, FieldValue, StatisticKind};

/// Result type for dpscope operations
pub type Result<T> = std::result::Result<T, DpScopeError>;

/// Main error type for dpscope.
///
/// Every variant maps to exactly one [`ErrorKind`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum DpScopeError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Privacy mechanism rejected parameters: {0}")]
    Privacy(#[from] ports::DpError),

    #[error("Empty partition: no numeric values in group '{group}'")]
    EmptyPartition { group: String },

    #[error("Unknown statistic: {0}")]
    UnknownStatistic(String),

    #[error("Model error: {0}")]
    Model(#[from] ports::ModelError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DpScopeError {
    /// The closed error kind this failure belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) | Self::Privacy(_) => ErrorKind::InvalidParameter,
            Self::EmptyPartition { .. } => ErrorKind::EmptyPartition,
            Self::UnknownStatistic(_) => ErrorKind::UnknownStatistic,
            Self::Model(_) => ErrorKind::ModelError,
            Self::Unknown(_) => ErrorKind::UnknownError,
        }
    }

    /// Human-readable cause tag, e.g. `EmptyPartition: Empty partition: ...`.
    #[must_use]
    pub fn tagged(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e = DpScopeError::from(ports::DpError::InvalidEpsilon(0.0));
        assert_eq!(e.kind(), ErrorKind::InvalidParameter);

        let e = DpScopeError::EmptyPartition {
            group: "all".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::EmptyPartition);
        assert!(e.tagged().starts_with("EmptyPartition: "));

        let e = DpScopeError::UnknownStatistic("median".to_string());
        assert_eq!(e.to_string(), "Unknown statistic: median");
    }
}
