//! Model comparison harness: raw vs. DP-perturbed training data.
//!
//! The harness owns the split and the perturbation; fitting and scoring are
//! delegated to a [`Classifier`].

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::{ModelScore, TrainingComparison};
use crate::ports::{Classifier, DifferentialPrivacy, LabeledData, Mechanism, ModelError};
use crate::DpScopeError;

use super::evaluator;

/// Test fraction of the `/api/train-model` split.
pub const DEFAULT_TRAIN_TEST_FRACTION: f64 = 0.2;

/// Test fraction of the per-epsilon model step in a sweep.
pub const DEFAULT_SWEEP_TEST_FRACTION: f64 = 0.3;

/// Build the sweep's demo task: one feature (the value), label = value > median.
///
/// # Errors
/// Returns `EmptyPartition` for no values.
pub fn median_split_task(values: &[f64]) -> Result<LabeledData, DpScopeError> {
    let median = evaluator::median(values).ok_or_else(|| DpScopeError::EmptyPartition {
        group: crate::domain::ALL_GROUP.to_string(),
    })?;
    let features = values.iter().map(|&v| vec![v]).collect();
    let labels = values
        .iter()
        .map(|&v| if v > median { 1.0 } else { 0.0 })
        .collect();
    Ok(LabeledData::new(features, labels)?)
}

/// Shuffle and split into (train, test); the test side gets `ceil(n * fraction)` rows.
///
/// # Errors
/// Returns `InvalidParameter` for a fraction outside (0, 1) and
/// `ModelError::NotEnoughSamples` when either side would be empty.
pub fn train_test_split<R: Rng>(
    data: &LabeledData,
    test_fraction: f64,
    rng: &mut R,
) -> Result<(LabeledData, LabeledData), DpScopeError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DpScopeError::InvalidParameter(format!(
            "test fraction {test_fraction} must be in (0, 1)"
        )));
    }

    let n = data.len();
    // Shave float noise so 10 * 0.3 stays 3.
    let n_test = (n as f64 * test_fraction - 1e-9).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ModelError::NotEnoughSamples(format!(
            "{n} samples cannot be split with test fraction {test_fraction}"
        ))
        .into());
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let take = |idx: &[usize]| LabeledData {
        features: idx.iter().map(|&i| data.features[i].clone()).collect(),
        labels: idx.iter().map(|&i| data.labels[i]).collect(),
    };
    let (test_idx, train_idx) = order.split_at(n_test);
    Ok((take(train_idx), take(test_idx)))
}

/// Raw vs. perturbed comparison over one classifier.
pub struct ModelComparison<'a, D, C>
where
    D: DifferentialPrivacy,
    C: Classifier,
{
    privacy: &'a D,
    classifier: &'a C,
}

impl<'a, D, C> ModelComparison<'a, D, C>
where
    D: DifferentialPrivacy,
    C: Classifier,
{
    #[must_use]
    pub fn new(privacy: &'a D, classifier: &'a C) -> Self {
        Self { privacy, classifier }
    }

    /// Element-wise perturbed copy of a feature matrix.
    ///
    /// Every scalar gets its own freshly calibrated mechanism.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if epsilon is invalid.
    pub fn perturb_features(&self, rows: &[Vec<f64>], epsilon: f64) -> Result<Vec<Vec<f64>>, DpScopeError> {
        let sensitivity = self.privacy.default_sensitivity();
        rows.iter()
            .map(|row| {
                row.iter()
                    .map(|&x| -> Result<f64, DpScopeError> {
                        Ok(self.privacy.calibrate(epsilon, sensitivity)?.apply(x))
                    })
                    .collect()
            })
            .collect()
    }

    fn split(&self, data: &LabeledData, test_fraction: f64) -> Result<(LabeledData, LabeledData), DpScopeError> {
        let mut rng = ChaCha20Rng::from_entropy();
        let (train, test) = train_test_split(data, test_fraction, &mut rng)?;
        if train.classes().len() < 2 {
            return Err(ModelError::SingleClass.into());
        }
        Ok((train, test))
    }

    fn perturbed(&self, train: &LabeledData, epsilon: f64) -> Result<LabeledData, DpScopeError> {
        Ok(LabeledData {
            features: self.perturb_features(&train.features, epsilon)?,
            labels: train.labels.clone(),
        })
    }

    /// Fit on raw and on perturbed training data; score both on the raw test set.
    ///
    /// # Errors
    /// Returns `ModelError` for unusable data and `InvalidParameter` for a bad epsilon.
    pub fn compare(
        &self,
        data: &LabeledData,
        epsilon: f64,
        test_fraction: f64,
    ) -> Result<TrainingComparison, DpScopeError> {
        let (train, test) = self.split(data, test_fraction)?;
        let dp_train = self.perturbed(&train, epsilon)?;

        let original = self.classifier.fit_score(&train, &test)?;
        let perturbed = self.classifier.fit_score(&dp_train, &test)?;

        tracing::info!(
            "Model comparison (ε={}): accuracy {:.3} -> {:.3}",
            epsilon,
            original.accuracy,
            perturbed.accuracy
        );

        Ok(TrainingComparison { original, perturbed })
    }

    /// Score a model trained on perturbed data only (the sweep's model step).
    ///
    /// # Errors
    /// Returns `ModelError` for unusable data and `InvalidParameter` for a bad epsilon.
    pub fn score_perturbed(
        &self,
        data: &LabeledData,
        epsilon: f64,
        test_fraction: f64,
    ) -> Result<ModelScore, DpScopeError> {
        let (train, test) = self.split(data, test_fraction)?;
        let dp_train = self.perturbed(&train, epsilon)?;
        Ok(self.classifier.fit_score(&dp_train, &test)?)
    }
}
