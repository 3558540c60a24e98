//! DP aggregator: drives the noise mechanism over evaluator outputs.
//!
//! Groups and epsilons are independent units of work. Each unit calibrates its
//! own mechanism, records its own failure, and results come back in input
//! order regardless of how the `rayon` pool schedules them.

use rayon::prelude::*;

use crate::domain::{
    Dataset, HistogramBin, ModelComparisonResult, ModelScore, Partition, RankingComparison,
    StatisticKind, StatisticResult,
};
use crate::ports::{DifferentialPrivacy, Mechanism};
use crate::DpScopeError;

use super::evaluator::{self, DEFAULT_HISTOGRAM_BINS};

/// Grouped single-epsilon query.
#[derive(Debug, Clone)]
pub struct GroupedQuery {
    pub group_by: Vec<String>,
    pub column: String,
    pub kind: StatisticKind,
    pub epsilon: f64,
}

/// Per-group results plus ranking stability.
#[derive(Debug, Clone)]
pub struct GroupedOutcome {
    pub groups: Vec<StatisticResult>,
    pub ranking: RankingComparison,
}

/// Outcome of one epsilon in a sweep.
///
/// DP fields are `None` and `dp_error` is set when the DP step failed; in
/// that case no model step was attempted and `model` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonResult {
    pub epsilon: f64,
    pub true_mean: Option<f64>,
    pub dp_mean: Option<f64>,
    pub true_count: Option<usize>,
    pub dp_count: Option<i64>,
    pub histogram: Vec<HistogramBin>,
    pub dp_error: Option<String>,
    pub model: Option<ModelComparisonResult>,
}

impl EpsilonResult {
    fn failed(epsilon: f64, error: &DpScopeError) -> Self {
        Self {
            epsilon,
            true_mean: None,
            dp_mean: None,
            true_count: None,
            dp_count: None,
            histogram: Vec::new(),
            dp_error: Some(format!("DP computation failed: {}", error.tagged())),
            model: None,
        }
    }
}

/// DP summary of a plain value list at one epsilon.
#[derive(Debug, Clone, PartialEq)]
struct DpSummary {
    true_mean: f64,
    dp_mean: f64,
    true_count: usize,
    dp_count: i64,
    histogram: Vec<HistogramBin>,
}

/// Orchestrates mechanisms over statistics.
pub struct DpAggregator<'a, D: DifferentialPrivacy> {
    privacy: &'a D,
    histogram_bins: usize,
}

impl<'a, D: DifferentialPrivacy> DpAggregator<'a, D> {
    #[must_use]
    pub fn new(privacy: &'a D) -> Self {
        Self {
            privacy,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }

    #[must_use]
    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = bins;
        self
    }

    /// Perturb one true value with a freshly calibrated mechanism.
    fn perturb(&self, value: f64, epsilon: f64) -> Result<f64, DpScopeError> {
        let mut mechanism = self
            .privacy
            .calibrate(epsilon, self.privacy.default_sensitivity())?;
        Ok(mechanism.apply(value))
    }

    fn perturb_partition(&self, partition: &Partition<'_>, query: &GroupedQuery) -> StatisticResult {
        let outcome = evaluator::evaluate_partition(partition, &query.column, query.kind)
            .and_then(|t| Ok((t, query.kind.clip(self.perturb(t, query.epsilon)?))));

        match outcome {
            Ok((true_value, dp_value)) => {
                StatisticResult::success(partition.label.clone(), true_value, dp_value)
            }
            Err(e) => {
                tracing::warn!(
                    "Group {:?} failed for {} (ε={}): {}",
                    partition.label,
                    query.kind,
                    query.epsilon,
                    e
                );
                StatisticResult::failure(partition.label.clone(), &e)
            }
        }
    }

    /// Single-epsilon, per-group computation with ranking comparison.
    #[must_use]
    pub fn compute_single(&self, dataset: &Dataset, query: &GroupedQuery) -> GroupedOutcome {
        let partitions = dataset.partition(&query.group_by);

        let groups: Vec<StatisticResult> = partitions
            .par_iter()
            .map(|p| self.perturb_partition(p, query))
            .collect();

        let ranking = RankingComparison::from_results(&groups);

        tracing::info!(
            "Computed DP {} over {} groups (ε={}), ranking_changed={}",
            query.kind,
            groups.len(),
            query.epsilon,
            ranking.changed
        );

        GroupedOutcome { groups, ranking }
    }

    fn dp_summary(&self, values: &[f64], epsilon: f64) -> Result<DpSummary, DpScopeError> {
        let true_mean = evaluator::mean(values)?;
        let dp_mean = self.perturb(true_mean, epsilon)?;

        let true_count = values.len();
        let dp_count = self.perturb(true_count as f64, epsilon)?.round() as i64;

        // Each bin is perturbed at the full epsilon; composition across bins
        // is not accounted for.
        let histogram = evaluator::histogram(values, self.histogram_bins)?
            .into_iter()
            .map(|bin| {
                Ok(HistogramBin {
                    count: self.perturb(bin.count, epsilon)?.round().max(0.0),
                    ..bin
                })
            })
            .collect::<Result<Vec<_>, DpScopeError>>()?;

        Ok(DpSummary {
            true_mean,
            dp_mean,
            true_count,
            dp_count,
            histogram,
        })
    }

    fn sweep_one<F>(&self, values: &[f64], epsilon: f64, downstream: &F) -> EpsilonResult
    where
        F: Fn(f64) -> Result<ModelScore, DpScopeError> + Sync,
    {
        let summary = match self.dp_summary(values, epsilon) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("DP error for epsilon {epsilon}: {e}");
                return EpsilonResult::failed(epsilon, &e);
            }
        };

        let model = match downstream(epsilon) {
            Ok(score) => {
                tracing::debug!(
                    "Epsilon {epsilon}: accuracy={:.3}, loss={:.3}",
                    score.accuracy,
                    score.log_loss
                );
                ModelComparisonResult::scored(epsilon, score)
            }
            Err(e) => {
                tracing::warn!("Model error for epsilon {epsilon}: {e}");
                let message = match e {
                    DpScopeError::Model(inner) => inner.to_string(),
                    other => format!("Model computation failed: {}", other.tagged()),
                };
                ModelComparisonResult::failed(epsilon, message)
            }
        };

        EpsilonResult {
            epsilon,
            true_mean: Some(summary.true_mean),
            dp_mean: Some(summary.dp_mean),
            true_count: Some(summary.true_count),
            dp_count: Some(summary.dp_count),
            histogram: summary.histogram,
            dp_error: None,
            model: Some(model),
        }
    }

    /// Multi-epsilon sweep over a plain value list.
    ///
    /// Returns exactly one entry per input epsilon, in input order, without
    /// deduplication. `downstream` runs only for epsilons whose DP step
    /// succeeded.
    pub fn compute_sweep<F>(&self, values: &[f64], epsilons: &[f64], downstream: F) -> Vec<EpsilonResult>
    where
        F: Fn(f64) -> Result<ModelScore, DpScopeError> + Sync,
    {
        tracing::info!(
            "Sweeping {} epsilons over {} values",
            epsilons.len(),
            values.len()
        );

        epsilons
            .par_iter()
            .map(|&epsilon| self.sweep_one(values, epsilon, &downstream))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::laplace::LaplaceAdapter;
    use crate::domain::{ErrorKind, FieldValue, Record};

    fn grouped_dataset() -> Dataset {
        let rows = [
            ("north", 1.0),
            ("north", 1.0),
            ("south", 0.0),
            ("south", 1.0),
            ("east", 0.0),
        ];
        Dataset::new(
            rows.iter()
                .map(|(g, v)| {
                    let mut r = Record::new();
                    r.insert("region".to_string(), FieldValue::from(*g));
                    r.insert("flag".to_string(), FieldValue::Number(*v));
                    r
                })
                .collect(),
        )
    }

    fn query(kind: StatisticKind, epsilon: f64) -> GroupedQuery {
        GroupedQuery {
            group_by: vec!["region".to_string()],
            column: "flag".to_string(),
            kind,
            epsilon,
        }
    }

    fn no_model(_: f64) -> Result<ModelScore, DpScopeError> {
        Ok(ModelScore {
            accuracy: 1.0,
            log_loss: 0.0,
        })
    }

    #[test]
    fn test_percent_always_clipped() {
        let privacy = LaplaceAdapter::default();
        let agg = DpAggregator::new(&privacy);

        for _ in 0..50 {
            let outcome = agg.compute_single(&grouped_dataset(), &query(StatisticKind::Percent, 0.05));
            for g in &outcome.groups {
                let dp = g.perturbed_value.expect("percent never fails");
                assert!((0.0..=1.0).contains(&dp), "out of range: {dp}");
            }
        }
    }

    #[test]
    fn test_grouped_true_values_in_order() {
        let privacy = LaplaceAdapter::default();
        let outcome = DpAggregator::new(&privacy)
            .compute_single(&grouped_dataset(), &query(StatisticKind::Mean, 1.0));

        let labels: Vec<_> = outcome.groups.iter().map(|g| g.group_label.as_str()).collect();
        assert_eq!(labels, vec!["north", "south", "east"]);
        let truths: Vec<_> = outcome.groups.iter().map(|g| g.true_value).collect();
        assert_eq!(truths, vec![Some(1.0), Some(0.5), Some(0.0)]);
        assert_eq!(outcome.ranking.original_ranking, vec!["north", "south", "east"]);
        assert_eq!(
            outcome.ranking.changed,
            outcome.ranking.original_ranking != outcome.ranking.dp_ranking
        );
    }

    #[test]
    fn test_grouped_invalid_epsilon_fails_per_group() {
        let privacy = LaplaceAdapter::default();
        let outcome = DpAggregator::new(&privacy)
            .compute_single(&grouped_dataset(), &query(StatisticKind::Count, -1.0));

        assert_eq!(outcome.groups.len(), 3);
        assert!(outcome.groups.iter().all(|g| !g.is_success()));
        assert!(outcome.ranking.original_ranking.is_empty());
    }

    #[test]
    fn test_sweep_structure_with_failure() {
        let privacy = LaplaceAdapter::default();
        let agg = DpAggregator::new(&privacy);

        let results = agg.compute_sweep(&[1.0, 2.0, 3.0], &[0.5, 0.0, 2.0, 0.5], no_model);

        assert_eq!(results.len(), 4);
        let eps: Vec<f64> = results.iter().map(|r| r.epsilon).collect();
        assert_eq!(eps, vec![0.5, 0.0, 2.0, 0.5]);

        assert!(results[0].dp_error.is_none());
        assert!(results[0].dp_mean.is_some());
        assert_eq!(results[0].histogram.len(), 5);
        assert!(results[0].model.is_some());

        let failed = &results[1];
        assert!(failed.dp_mean.is_none());
        assert!(failed.dp_count.is_none());
        assert!(failed.histogram.is_empty());
        assert!(failed.model.is_none());
        let msg = failed.dp_error.as_deref().unwrap_or_default();
        assert!(msg.starts_with("DP computation failed: InvalidParameter"), "{msg}");

        assert!(results[2].dp_error.is_none());
        assert!(results[3].dp_error.is_none());
    }

    #[test]
    fn test_sweep_empty_values() {
        let privacy = LaplaceAdapter::default();
        let results = DpAggregator::new(&privacy).compute_sweep(&[], &[1.0, 2.0], no_model);

        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.dp_error.as_deref().unwrap_or_default().contains("EmptyPartition"));
        }
    }

    #[test]
    fn test_sweep_model_failure_is_isolated() {
        let privacy = LaplaceAdapter::default();
        let results = DpAggregator::new(&privacy).compute_sweep(&[1.0, 2.0, 3.0], &[1.0, 2.0], |eps| {
            if eps < 1.5 {
                Err(crate::ports::ModelError::SingleClass.into())
            } else {
                no_model(eps)
            }
        });

        assert!(results[0].dp_error.is_none());
        assert!(results[0].dp_mean.is_some());
        let model = results[0].model.as_ref().expect("model attempted");
        assert_eq!(model.error.as_deref(), Some("Only one class in training set"));
        assert!(model.accuracy.is_none());

        let model = results[1].model.as_ref().expect("model attempted");
        assert_eq!(model.accuracy, Some(1.0));
    }

    #[test]
    fn test_histogram_counts_non_negative_integers() {
        let privacy = LaplaceAdapter::default();
        let results = DpAggregator::new(&privacy).compute_sweep(&[1.0, 2.0, 3.0, 4.0, 5.0], &[0.1], no_model);
        for bin in &results[0].histogram {
            assert!(bin.count >= 0.0);
            assert_eq!(bin.count.fract(), 0.0);
        }
    }

    #[test]
    fn test_empty_group_kind_semantics() {
        let mut r = Record::new();
        r.insert("region".to_string(), FieldValue::from("west"));
        r.insert("flag".to_string(), FieldValue::from("n/a"));
        let ds = Dataset::new(vec![r]);
        let privacy = LaplaceAdapter::default();
        let agg = DpAggregator::new(&privacy);

        let mean = agg.compute_single(&ds, &query(StatisticKind::Mean, 1.0));
        let err = mean.groups[0].perturbation_error.as_deref().unwrap_or_default();
        assert!(err.starts_with(&ErrorKind::EmptyPartition.to_string()));

        let count = agg.compute_single(&ds, &query(StatisticKind::Count, 1.0));
        assert_eq!(count.groups[0].true_value, Some(0.0));
        let pct = agg.compute_single(&ds, &query(StatisticKind::Percent, 1.0));
        assert_eq!(pct.groups[0].true_value, Some(0.0));
    }
}
