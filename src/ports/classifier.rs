//! Classifier port: the opaque fit-and-score collaborator.
//!
//! The model comparison harness only needs "train on these rows, score on
//! those rows"; how the model is fitted is an adapter concern.

use crate::domain::ModelScore;

/// Errors from fitting or scoring a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Only one class in training set")]
    SingleClass,

    #[error("Not enough samples: {0}")]
    NotEnoughSamples(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Fit failed: {0}")]
    FitFailed(String),
}

/// Row-major feature matrix with one label per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledData {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl LabeledData {
    /// Create labeled data, checking that rows and labels line up.
    ///
    /// # Errors
    /// Returns `ModelError::ShapeMismatch` on ragged rows or a label count mismatch.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self, ModelError> {
        if features.len() != labels.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(width) = features.first().map(Vec::len) {
            if let Some(i) = features.iter().position(|row| row.len() != width) {
                return Err(ModelError::ShapeMismatch(format!(
                    "row {i} has {} features, expected {width}",
                    features[i].len()
                )));
            }
        }
        Ok(Self { features, labels })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Distinct label values in ascending order.
    #[must_use]
    pub fn classes(&self) -> Vec<f64> {
        let mut classes = self.labels.clone();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        classes
    }
}

/// Trait for the downstream classification step.
pub trait Classifier: Send + Sync {
    /// Fit on `train` and score on `test`.
    ///
    /// # Errors
    /// Returns `ModelError::SingleClass` when `train` has fewer than two classes.
    fn fit_score(&self, train: &LabeledData, test: &LabeledData) -> Result<ModelScore, ModelError>;
}
