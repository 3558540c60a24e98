//! Statistic kinds and result types.
//!
//! Represents the true and privacy-preserving outputs of a DP computation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DpScopeError;

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad epsilon, sensitivity or simulation count
    InvalidParameter,
    /// No coercible data in a group
    EmptyPartition,
    /// Statistic name not recognised
    UnknownStatistic,
    /// Insufficient label classes or fit failure
    ModelError,
    /// Catch-all at the outermost boundary
    UnknownError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "InvalidParameter"),
            Self::EmptyPartition => write!(f, "EmptyPartition"),
            Self::UnknownStatistic => write!(f, "UnknownStatistic"),
            Self::ModelError => write!(f, "ModelError"),
            Self::UnknownError => write!(f, "UnknownError"),
        }
    }
}

/// Scalar statistic computed over one column of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    /// Arithmetic mean of numeric values
    Mean,
    /// Number of numeric values
    Count,
    /// Fraction of values equal to the positive indicator
    Percent,
}

impl StatisticKind {
    /// Whether DP outputs must be clipped into [0, 1].
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Percent)
    }

    /// Clip a perturbed value into the valid range of this statistic.
    #[must_use]
    pub fn clip(&self, value: f64) -> f64 {
        if self.is_bounded() {
            value.clamp(0.0, 1.0)
        } else {
            value
        }
    }
}

impl FromStr for StatisticKind {
    type Err = DpScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "count" => Ok(Self::Count),
            "percent" => Ok(Self::Percent),
            _ => Err(DpScopeError::UnknownStatistic(s.to_string())),
        }
    }
}

impl std::fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Count => write!(f, "count"),
            Self::Percent => write!(f, "percent"),
        }
    }
}

/// True vs. perturbed value for one group.
///
/// `perturbed_value` is present iff `perturbation_error` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticResult {
    pub group_label: String,
    pub true_value: Option<f64>,
    pub perturbed_value: Option<f64>,
    pub perturbation_error: Option<String>,
}

impl StatisticResult {
    #[must_use]
    pub fn success(group_label: impl Into<String>, true_value: f64, perturbed_value: f64) -> Self {
        Self {
            group_label: group_label.into(),
            true_value: Some(true_value),
            perturbed_value: Some(perturbed_value),
            perturbation_error: None,
        }
    }

    #[must_use]
    pub fn failure(group_label: impl Into<String>, error: &DpScopeError) -> Self {
        Self {
            group_label: group_label.into(),
            true_value: None,
            perturbed_value: None,
            perturbation_error: Some(error.tagged()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.perturbation_error.is_none()
    }
}

/// Group ordering by true value vs. by perturbed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingComparison {
    pub original_ranking: Vec<String>,
    pub dp_ranking: Vec<String>,
    pub changed: bool,
}

impl RankingComparison {
    /// Rank successful results descending by true and by perturbed value.
    ///
    /// Sorting is stable, so ties keep iteration order. Failed results are
    /// left out of both rankings.
    #[must_use]
    pub fn from_results(results: &[StatisticResult]) -> Self {
        let ranked: Vec<(&str, f64, f64)> = results
            .iter()
            .filter_map(|r| match (r.true_value, r.perturbed_value) {
                (Some(t), Some(p)) => Some((r.group_label.as_str(), t, p)),
                _ => None,
            })
            .collect();

        let mut by_true = ranked.clone();
        by_true.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut by_dp = ranked;
        by_dp.sort_by(|a, b| b.2.total_cmp(&a.2));

        let original_ranking: Vec<String> = by_true.iter().map(|r| r.0.to_string()).collect();
        let dp_ranking: Vec<String> = by_dp.iter().map(|r| r.0.to_string()).collect();
        let changed = original_ranking != dp_ranking;

        Self {
            original_ranking,
            dp_ranking,
            changed,
        }
    }
}

/// One equal-width histogram bin with its count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: f64,
}

impl HistogramBin {
    /// Wire label `"lo-hi"` with bounds rounded to two decimals.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", format_bound(self.lower), format_bound(self.upper))
    }
}

fn format_bound(x: f64) -> String {
    let rounded = (x * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        rounded.to_string()
    }
}

/// Empirical distribution of a DP estimator around one true value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBarEstimate {
    pub group_label: String,
    pub true_value: f64,
    pub empirical_mean: f64,
    pub empirical_std_dev: f64,
}

/// Accuracy and log loss of one fit/score run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub accuracy: f64,
    pub log_loss: f64,
}

/// Downstream model outcome for one epsilon of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparisonResult {
    pub epsilon: f64,
    pub accuracy: Option<f64>,
    pub log_loss: Option<f64>,
    pub error: Option<String>,
}

impl ModelComparisonResult {
    #[must_use]
    pub fn scored(epsilon: f64, score: ModelScore) -> Self {
        Self {
            epsilon,
            accuracy: Some(score.accuracy),
            log_loss: Some(score.log_loss),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(epsilon: f64, error: impl Into<String>) -> Self {
        Self {
            epsilon,
            accuracy: None,
            log_loss: None,
            error: Some(error.into()),
        }
    }
}

/// Raw vs. perturbed training scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingComparison {
    pub original: ModelScore,
    pub perturbed: ModelScore,
}

impl TrainingComparison {
    /// Accuracy lost by training on perturbed data.
    #[must_use]
    pub fn accuracy_delta(&self) -> f64 {
        self.original.accuracy - self.perturbed.accuracy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statistic_kind() {
        assert_eq!("mean".parse::<StatisticKind>().ok(), Some(StatisticKind::Mean));
        assert_eq!("Count".parse::<StatisticKind>().ok(), Some(StatisticKind::Count));
        assert_eq!("percent".parse::<StatisticKind>().ok(), Some(StatisticKind::Percent));

        let err = "median".parse::<StatisticKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStatistic);
        assert!(err.to_string().contains("Unknown statistic"));
    }

    #[test]
    fn test_percent_clipping() {
        assert_eq!(StatisticKind::Percent.clip(1.7), 1.0);
        assert_eq!(StatisticKind::Percent.clip(-0.2), 0.0);
        assert_eq!(StatisticKind::Mean.clip(-0.2), -0.2);
    }

    #[test]
    fn test_ranking_changed() {
        let results = vec![
            StatisticResult::success("A", 10.0, 7.0),
            StatisticResult::success("B", 8.0, 9.0),
        ];
        let ranking = RankingComparison::from_results(&results);

        assert!(ranking.changed);
        assert_eq!(ranking.original_ranking, vec!["A", "B"]);
        assert_eq!(ranking.dp_ranking, vec!["B", "A"]);
    }

    #[test]
    fn test_ranking_stable_ties_and_failures() {
        let failed = DpScopeError::EmptyPartition {
            group: "C".to_string(),
        };
        let results = vec![
            StatisticResult::success("A", 5.0, 5.0),
            StatisticResult::failure("C", &failed),
            StatisticResult::success("B", 5.0, 5.0),
        ];
        let ranking = RankingComparison::from_results(&results);

        assert!(!ranking.changed);
        assert_eq!(ranking.original_ranking, vec!["A", "B"]);
        assert_eq!(ranking.dp_ranking, vec!["A", "B"]);
    }

    #[test]
    fn test_failure_invariant() {
        let err = DpScopeError::EmptyPartition {
            group: "x".to_string(),
        };
        let r = StatisticResult::failure("x", &err);
        assert!(!r.is_success());
        assert!(r.perturbed_value.is_none());
        assert!(r.true_value.is_none());
        assert!(r.perturbation_error.as_deref().unwrap_or("").starts_with("EmptyPartition"));
    }

    #[test]
    fn test_histogram_label() {
        let bin = HistogramBin {
            lower: 1.0,
            upper: 1.8,
            count: 1.0,
        };
        assert_eq!(bin.label(), "1.0-1.8");

        let bin = HistogramBin {
            lower: 2.333_333,
            upper: 3.0,
            count: 0.0,
        };
        assert_eq!(bin.label(), "2.33-3.0");
    }
}
