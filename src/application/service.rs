//! Analytics service: one pure handler per request type.
//!
//! The service holds no mutable state. Every call builds its own mechanisms,
//! computes, and returns; nothing is retained between requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Dataset, ErrorBarEstimate, StatisticKind, StatisticResult, TrainingComparison};
use crate::ports::{Classifier, DifferentialPrivacy, LabeledData};
use crate::DpScopeError;

use super::aggregator::{DpAggregator, EpsilonResult, GroupedOutcome, GroupedQuery};
use super::error_bars::{self, DEFAULT_SIMULATIONS};
use super::evaluator::{self, DEFAULT_HISTOGRAM_BINS};
use super::model_comparison::{
    median_split_task, ModelComparison, DEFAULT_SWEEP_TEST_FRACTION, DEFAULT_TRAIN_TEST_FRACTION,
};

/// Tunables for the analytics service.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Histogram bins in the multi-epsilon sweep
    pub histogram_bins: usize,
    /// Error-bar simulations when the request gives none
    pub default_simulations: usize,
    /// Test fraction for `/api/train-model`
    pub train_test_fraction: f64,
    /// Test fraction for the sweep's model step
    pub sweep_test_fraction: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            default_simulations: DEFAULT_SIMULATIONS,
            train_test_fraction: DEFAULT_TRAIN_TEST_FRACTION,
            sweep_test_fraction: DEFAULT_SWEEP_TEST_FRACTION,
        }
    }
}

impl AnalyticsConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - DPSCOPE_HISTOGRAM_BINS
    /// - DPSCOPE_DEFAULT_SIMULATIONS
    /// - DPSCOPE_TRAIN_TEST_FRACTION
    /// - DPSCOPE_SWEEP_TEST_FRACTION
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(x) = env_parse::<usize>("DPSCOPE_HISTOGRAM_BINS").filter(|&x| x > 0) {
            cfg.histogram_bins = x;
        }
        if let Some(x) = env_parse::<usize>("DPSCOPE_DEFAULT_SIMULATIONS").filter(|&x| x > 0) {
            cfg.default_simulations = x;
        }
        if let Some(x) = env_parse::<f64>("DPSCOPE_TRAIN_TEST_FRACTION").filter(|x| *x > 0.0 && *x < 1.0) {
            cfg.train_test_fraction = x;
        }
        if let Some(x) = env_parse::<f64>("DPSCOPE_SWEEP_TEST_FRACTION").filter(|x| *x > 0.0 && *x < 1.0) {
            cfg.sweep_test_fraction = x;
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Ungrouped mean/count with their DP counterparts.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicStats {
    pub original_mean: f64,
    pub original_count: usize,
    pub dp_mean: f64,
    pub dp_count: i64,
}

/// Grouped request before the statistic name is validated.
#[derive(Debug, Clone)]
pub struct GroupedRequest {
    pub group_by: Vec<String>,
    pub statistic: String,
    pub column: String,
    pub epsilon: f64,
}

impl GroupedRequest {
    /// Validate the statistic name.
    ///
    /// # Errors
    /// Returns `UnknownStatistic`; this aborts the whole request.
    pub fn into_query(self) -> Result<GroupedQuery, DpScopeError> {
        let kind: StatisticKind = self.statistic.parse()?;
        Ok(GroupedQuery {
            group_by: self.group_by,
            column: self.column,
            kind,
            epsilon: self.epsilon,
        })
    }
}

/// Error bars per group, in group order.
#[derive(Debug, Clone)]
pub struct ErrorBarReport {
    pub bars: Vec<Result<ErrorBarEstimate, StatisticResult>>,
    pub timestamp: DateTime<Utc>,
}

/// Service for privacy-preserving analytics.
pub struct AnalyticsService<D, C>
where
    D: DifferentialPrivacy,
    C: Classifier,
{
    privacy: Arc<D>,
    classifier: Arc<C>,
    config: AnalyticsConfig,
}

impl<D, C> Clone for AnalyticsService<D, C>
where
    D: DifferentialPrivacy,
    C: Classifier,
{
    fn clone(&self) -> Self {
        Self {
            privacy: Arc::clone(&self.privacy),
            classifier: Arc::clone(&self.classifier),
            config: self.config.clone(),
        }
    }
}

impl<D, C> AnalyticsService<D, C>
where
    D: DifferentialPrivacy,
    C: Classifier,
{
    /// Create a new analytics service.
    pub fn new(privacy: D, classifier: C, config: AnalyticsConfig) -> Self {
        Self {
            privacy: Arc::new(privacy),
            classifier: Arc::new(classifier),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    fn aggregator(&self) -> DpAggregator<'_, D> {
        DpAggregator::new(self.privacy.as_ref()).with_histogram_bins(self.config.histogram_bins)
    }

    fn harness(&self) -> ModelComparison<'_, D, C> {
        ModelComparison::new(self.privacy.as_ref(), self.classifier.as_ref())
    }

    /// DP mean and count of a plain value list.
    ///
    /// # Errors
    /// Returns `EmptyPartition` for no values or `InvalidParameter` for a bad epsilon.
    pub fn compute_stats(&self, values: &[f64], epsilon: f64) -> Result<BasicStats, DpScopeError> {
        let sensitivity = self.privacy.default_sensitivity();

        let original_mean = evaluator::mean(values)?;
        let original_count = values.len();
        let dp_mean = self
            .privacy
            .add_laplace_noise(original_mean, sensitivity, epsilon)?;
        let dp_count = self
            .privacy
            .add_laplace_noise(original_count as f64, sensitivity, epsilon)?
            .round() as i64;

        tracing::info!(
            "Generated DP stats (ε={}): n={}, mean~{:.3}, count~{}",
            epsilon,
            original_count,
            dp_mean,
            dp_count
        );

        Ok(BasicStats {
            original_mean,
            original_count,
            dp_mean,
            dp_count,
        })
    }

    /// Grouped statistic with ranking comparison.
    ///
    /// # Errors
    /// Returns `UnknownStatistic` before any computation if the name is invalid.
    /// Per-group failures are reported inside the outcome.
    pub fn compute_grouped(&self, dataset: &Dataset, request: GroupedRequest) -> Result<GroupedOutcome, DpScopeError> {
        let query = request.into_query()?;
        Ok(self.aggregator().compute_single(dataset, &query))
    }

    /// Multi-epsilon sweep with the downstream model step per epsilon.
    #[must_use]
    pub fn compute_multi_epsilon(&self, values: &[f64], epsilons: &[f64]) -> Vec<EpsilonResult> {
        let task = median_split_task(values);
        let harness = self.harness();
        let fraction = self.config.sweep_test_fraction;

        self.aggregator().compute_sweep(values, epsilons, |epsilon| match &task {
            Ok(task) => harness.score_perturbed(task, epsilon, fraction),
            Err(e) => Err(e.clone()),
        })
    }

    /// Simulated error bars per group.
    ///
    /// # Errors
    /// Returns `UnknownStatistic` for an invalid name, or `InvalidParameter`
    /// for an explicit `num_simulations` of zero.
    pub fn compute_error_bars(
        &self,
        dataset: &Dataset,
        request: GroupedRequest,
        num_simulations: Option<usize>,
    ) -> Result<ErrorBarReport, DpScopeError> {
        let query = request.into_query()?;
        let n = num_simulations.unwrap_or(self.config.default_simulations);
        if n == 0 {
            return Err(DpScopeError::InvalidParameter(
                "num_simulations must be at least 1".to_string(),
            ));
        }

        let bars = error_bars::simulate_groups(self.privacy.as_ref(), dataset, &query, n);

        tracing::info!(
            "Simulated error bars for {} groups ({} draws each, ε={})",
            bars.len(),
            n,
            query.epsilon
        );

        Ok(ErrorBarReport {
            bars,
            timestamp: Utc::now(),
        })
    }

    /// Train on raw vs. perturbed features and compare.
    ///
    /// # Errors
    /// Returns `ModelError` for unusable training data.
    pub fn train_model(
        &self,
        features: Vec<Vec<f64>>,
        labels: Vec<f64>,
        epsilon: f64,
    ) -> Result<TrainingComparison, DpScopeError> {
        let data = LabeledData::new(features, labels)?;
        self.harness()
            .compare(&data, epsilon, self.config.train_test_fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::laplace::LaplaceAdapter;
    use crate::adapters::logistic::LogisticRegression;
    use crate::domain::ErrorKind;

    fn create_test_service() -> AnalyticsService<LaplaceAdapter, LogisticRegression> {
        AnalyticsService::new(
            LaplaceAdapter::default(),
            LogisticRegression::new(),
            AnalyticsConfig::default(),
        )
    }

    #[test]
    fn test_compute_stats() {
        let service = create_test_service();
        let stats = service
            .compute_stats(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.0)
            .expect("Should compute");

        assert_eq!(stats.original_mean, 3.0);
        assert_eq!(stats.original_count, 5);
        assert!(stats.dp_mean.is_finite());
    }

    #[test]
    fn test_compute_stats_bounded_over_trials() {
        let service = create_test_service();
        let trials: u32 = 400;
        let (mut mean_sum, mut count_sum) = (0.0, 0.0);
        for _ in 0..trials {
            let stats = service
                .compute_stats(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.0)
                .expect("Should compute");
            mean_sum += stats.dp_mean;
            count_sum += stats.dp_count as f64;
        }

        // Laplace(b = 1) has std sqrt(2); the standard error at 400 trials is ~0.07.
        let avg_mean = mean_sum / f64::from(trials);
        let avg_count = count_sum / f64::from(trials);
        assert!((avg_mean - 3.0).abs() < 0.3, "average dp_mean {avg_mean}");
        assert!((avg_count - 5.0).abs() < 0.3, "average dp_count {avg_count}");
    }

    #[test]
    fn test_compute_stats_errors() {
        let service = create_test_service();
        assert_eq!(
            service.compute_stats(&[], 1.0).unwrap_err().kind(),
            ErrorKind::EmptyPartition
        );
        assert_eq!(
            service.compute_stats(&[1.0], 0.0).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_unknown_statistic_aborts() {
        let service = create_test_service();
        let request = GroupedRequest {
            group_by: vec![],
            statistic: "median".to_string(),
            column: "x".to_string(),
            epsilon: 1.0,
        };

        let err = service
            .compute_grouped(&Dataset::from_values("x", &[1.0]), request.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStatistic);

        let err = service
            .compute_error_bars(&Dataset::from_values("x", &[1.0]), request, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStatistic);
    }

    #[test]
    fn test_multi_epsilon_order() {
        let service = create_test_service();
        let values: Vec<f64> = (1..=30).map(f64::from).collect();
        let results = service.compute_multi_epsilon(&values, &[0.1, 1.0, 10.0]);

        assert_eq!(results.len(), 3);
        for (r, eps) in results.iter().zip([0.1, 1.0, 10.0]) {
            assert_eq!(r.epsilon, eps);
            assert!(r.dp_error.is_none());
            let model = r.model.as_ref().expect("model step ran");
            assert!(model.error.is_some() || model.accuracy.is_some());
        }
    }

    #[test]
    fn test_error_bars_default_simulations() {
        let service = create_test_service();
        let request = GroupedRequest {
            group_by: vec![],
            statistic: "mean".to_string(),
            column: "x".to_string(),
            epsilon: 1.0,
        };
        let report = service
            .compute_error_bars(&Dataset::from_values("x", &[2.0, 4.0]), request.clone(), None)
            .expect("error bars");
        assert_eq!(report.bars.len(), 1);
        let est = report.bars[0].as_ref().expect("group ok");
        assert_eq!(est.true_value, 3.0);

        assert!(service
            .compute_error_bars(&Dataset::from_values("x", &[2.0]), request, Some(0))
            .is_err());
    }

    #[test]
    fn test_train_model_shape_mismatch() {
        let service = create_test_service();
        let err = service
            .train_model(vec![vec![1.0]], vec![0.0, 1.0], 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelError);
    }
}
