//! Logistic regression adapter: Implementation of Classifier.
//!
//! L2-regularised logistic regression fitted by batch gradient descent on
//! standardised features. More than two classes are handled one-vs-rest with
//! per-row probability normalisation.

use crate::domain::ModelScore;
use crate::ports::{Classifier, LabeledData, ModelError};

/// Probabilities are clipped to [EPS, 1 - EPS] before taking logs.
const PROB_EPS: f64 = 1e-15;

/// Hyperparameters for gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticConfig {
    /// Inverse regularisation strength (larger = weaker penalty)
    pub c: f64,
    /// Gradient descent step size
    pub learning_rate: f64,
    /// Number of full-batch iterations
    pub max_iter: usize,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.5,
            max_iter: 500,
        }
    }
}

/// Fitted binary model (one per class in one-vs-rest).
#[derive(Debug, Clone)]
struct BinaryModel {
    weights: Vec<f64>,
    intercept: f64,
}

impl BinaryModel {
    fn decision(&self, x: &[f64]) -> f64 {
        self.intercept + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }
}

/// Per-feature standardisation fitted on the training set.
#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f64>,
    std_inv: Vec<f64>,
}

impl Scaler {
    fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }

        // Constant columns keep unit scale.
        let std_inv = var
            .into_iter()
            .map(|v| if v > 0.0 { 1.0 / v.sqrt() } else { 1.0 })
            .collect();

        Self { mean, std_inv }
    }

    fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.std_inv)
            .map(|((v, m), s)| (v - m) * s)
            .collect()
    }
}

/// Numerically stable sigmoid: 1 / (1 + exp(-x))
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Logistic regression classifier.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticConfig,
}

impl LogisticRegression {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: LogisticConfig) -> Self {
        Self { config }
    }

    fn fit_binary(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<BinaryModel, ModelError> {
        let n = rows.len() as f64;
        let width = rows.first().map_or(0, Vec::len);
        let lambda = 1.0 / (self.config.c * n);

        let mut model = BinaryModel {
            weights: vec![0.0; width],
            intercept: 0.0,
        };

        for _ in 0..self.config.max_iter {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;

            for (x, &t) in rows.iter().zip(targets) {
                let err = sigmoid(model.decision(x)) - t;
                for (g, v) in grad_w.iter_mut().zip(x) {
                    *g += err * v / n;
                }
                grad_b += err / n;
            }

            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= self.config.learning_rate * (g + lambda * *w);
            }
            model.intercept -= self.config.learning_rate * grad_b;
        }

        if !model.intercept.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::FitFailed("gradient descent diverged".to_string()));
        }
        Ok(model)
    }

    /// Class probabilities for one (already scaled) row.
    fn predict_proba(models: &[BinaryModel], x: &[f64]) -> Vec<f64> {
        if models.len() == 1 {
            let p = sigmoid(models[0].decision(x));
            return vec![1.0 - p, p];
        }

        let raw: Vec<f64> = models.iter().map(|m| sigmoid(m.decision(x))).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.into_iter().map(|p| p / total).collect()
        } else {
            vec![1.0 / raw.len() as f64; raw.len()]
        }
    }
}

impl Classifier for LogisticRegression {
    fn fit_score(&self, train: &LabeledData, test: &LabeledData) -> Result<ModelScore, ModelError> {
        if test.is_empty() {
            return Err(ModelError::NotEnoughSamples("test set is empty".to_string()));
        }

        let classes = train.classes();
        if classes.len() < 2 {
            return Err(ModelError::SingleClass);
        }

        let train_width = train.features.first().map_or(0, Vec::len);
        let test_width = test.features.first().map_or(0, Vec::len);
        if train_width != test_width {
            return Err(ModelError::ShapeMismatch(format!(
                "train has {train_width} features, test has {test_width}"
            )));
        }

        let scaler = Scaler::fit(&train.features);
        let rows: Vec<Vec<f64>> = train.features.iter().map(|r| scaler.transform(r)).collect();

        // Binary problems fit a single model for the larger class.
        let positives: &[f64] = if classes.len() == 2 { &classes[1..] } else { &classes };
        let models = positives
            .iter()
            .map(|&class| {
                let targets: Vec<f64> = train
                    .labels
                    .iter()
                    .map(|&y| if y == class { 1.0 } else { 0.0 })
                    .collect();
                self.fit_binary(&rows, &targets)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut correct = 0usize;
        let mut loss = 0.0;
        for (row, &label) in test.features.iter().zip(&test.labels) {
            let proba = Self::predict_proba(&models, &scaler.transform(row));

            let predicted = proba
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i);
            if classes[predicted] == label {
                correct += 1;
            }

            let p_true = classes
                .iter()
                .position(|&c| c == label)
                .map_or(0.0, |i| proba[i]);
            loss -= p_true.clamp(PROB_EPS, 1.0 - PROB_EPS).ln();
        }

        let n = test.len() as f64;
        Ok(ModelScore {
            accuracy: correct as f64 / n,
            log_loss: loss / n,
        })
    }
}
