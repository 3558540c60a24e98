//! Request/response DTOs for the HTTP API.
//!
//! Field names follow the wire format consumed by the dashboard frontend.

use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::application::{BasicStats, EpsilonResult, ErrorBarReport, GroupedOutcome, GroupedRequest};
use crate::domain::{Dataset, TrainingComparison};

/// JSON object that keeps insertion order.
///
/// A repeated key keeps its first position and takes the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, V)>) -> Self {
        let mut out: Vec<(String, V)> = Vec::new();
        for (k, v) in pairs {
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Self(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, V)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// =============================================================================
// /api/compute-stats
// =============================================================================

/// Ungrouped body: `{values, epsilon}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleStatsRequest {
    pub values: Vec<f64>,
    pub epsilon: f64,
}

/// Grouped body: `{data, epsilon, group_by, statistic, column}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupedStatsRequest {
    pub data: Dataset,
    pub epsilon: f64,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub statistic: String,
    pub column: String,
}

impl GroupedStatsRequest {
    pub fn split(self) -> (Dataset, GroupedRequest) {
        (
            self.data,
            GroupedRequest {
                group_by: self.group_by,
                statistic: self.statistic,
                column: self.column,
                epsilon: self.epsilon,
            },
        )
    }
}

/// Either body shape; a `data` key selects the grouped form.
#[derive(Debug, Clone)]
pub enum ComputeStatsRequest {
    Grouped(GroupedStatsRequest),
    Simple(SimpleStatsRequest),
}

impl<'de> Deserialize<'de> for ComputeStatsRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let body = serde_json::Value::deserialize(deserializer)?;
        let grouped = body.get("data").is_some();
        if grouped {
            serde_json::from_value(body).map(Self::Grouped)
        } else {
            serde_json::from_value(body).map(Self::Simple)
        }
        .map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleStatsResponse {
    pub original_mean: f64,
    pub original_count: usize,
    pub dp_mean: f64,
    pub dp_count: i64,
}

impl From<BasicStats> for SimpleStatsResponse {
    fn from(s: BasicStats) -> Self {
        Self {
            original_mean: s.original_mean,
            original_count: s.original_count,
            dp_mean: s.dp_mean,
            dp_count: s.dp_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEntry {
    pub name: String,
    pub original: Option<f64>,
    pub dp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedStatsResponse {
    pub groups: Vec<GroupEntry>,
    pub ranking_changed: bool,
    pub original_ranking: Vec<String>,
    pub dp_ranking: Vec<String>,
}

impl From<GroupedOutcome> for GroupedStatsResponse {
    fn from(outcome: GroupedOutcome) -> Self {
        Self {
            groups: outcome
                .groups
                .into_iter()
                .map(|g| GroupEntry {
                    name: g.group_label,
                    original: g.true_value,
                    dp: g.perturbed_value,
                    error: g.perturbation_error,
                })
                .collect(),
            ranking_changed: outcome.ranking.changed,
            original_ranking: outcome.ranking.original_ranking,
            dp_ranking: outcome.ranking.dp_ranking,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ComputeStatsResponse {
    Grouped(GroupedStatsResponse),
    Simple(SimpleStatsResponse),
}

// =============================================================================
// /api/compute-multi-epsilon
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MultiEpsilonRequest {
    pub values: Vec<f64>,
    pub epsilons: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelPerformance {
    pub accuracy: Option<f64>,
    pub loss: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpsilonEntry {
    pub epsilon: f64,
    pub mean: Option<f64>,
    pub count: Option<i64>,
    pub histogram: OrderedMap<i64>,
    pub dp_error: Option<String>,
    pub model_performance: ModelPerformance,
}

impl From<EpsilonResult> for EpsilonEntry {
    fn from(r: EpsilonResult) -> Self {
        let model_performance = r
            .model
            .map(|m| ModelPerformance {
                accuracy: m.accuracy,
                loss: m.log_loss,
                error: m.error,
            })
            .unwrap_or_default();

        Self {
            epsilon: r.epsilon,
            mean: r.dp_mean,
            count: r.dp_count,
            histogram: OrderedMap::from_pairs(
                r.histogram.iter().map(|b| (b.label(), b.count as i64)),
            ),
            dp_error: r.dp_error,
            model_performance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiEpsilonResponse {
    pub results: Vec<EpsilonEntry>,
}

// =============================================================================
// /api/compute-error-bars
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBarsRequest {
    pub data: Dataset,
    pub epsilon: f64,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub statistic: String,
    pub column: String,
    #[serde(default)]
    pub num_simulations: Option<usize>,
}

impl ErrorBarsRequest {
    pub fn split(self) -> (Dataset, GroupedRequest, Option<usize>) {
        (
            self.data,
            GroupedRequest {
                group_by: self.group_by,
                statistic: self.statistic,
                column: self.column,
                epsilon: self.epsilon,
            },
            self.num_simulations,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBarEntry {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub orig: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBarsResponse {
    pub error_bars: OrderedMap<ErrorBarEntry>,
    pub timestamp: String,
}

impl From<ErrorBarReport> for ErrorBarsResponse {
    fn from(report: ErrorBarReport) -> Self {
        let entries = report.bars.into_iter().map(|bar| match bar {
            Ok(est) => (
                est.group_label,
                ErrorBarEntry {
                    mean: Some(est.empirical_mean),
                    std: Some(est.empirical_std_dev),
                    orig: Some(est.true_value),
                    error: None,
                },
            ),
            Err(failed) => (
                failed.group_label,
                ErrorBarEntry {
                    mean: None,
                    std: None,
                    orig: None,
                    error: failed.perturbation_error,
                },
            ),
        });

        Self {
            error_bars: OrderedMap::from_pairs(entries),
            timestamp: report.timestamp.to_rfc3339(),
        }
    }
}

// =============================================================================
// /api/train-model
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TrainModelRequest {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainModelResponse {
    pub original_accuracy: f64,
    pub dp_accuracy: f64,
    pub original_loss: f64,
    pub dp_loss: f64,
}

impl From<TrainingComparison> for TrainModelResponse {
    fn from(c: TrainingComparison) -> Self {
        Self {
            original_accuracy: c.original.accuracy,
            dp_accuracy: c.perturbed.accuracy,
            original_loss: c.original.log_loss,
            dp_loss: c.perturbed.log_loss,
        }
    }
}

/// Error body: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HistogramBin;

    #[test]
    fn test_request_shape_detection() {
        let simple: ComputeStatsRequest =
            serde_json::from_str(r#"{"values": [1, 2, 3], "epsilon": 1.0}"#).expect("parse");
        assert!(matches!(simple, ComputeStatsRequest::Simple(_)));

        let grouped: ComputeStatsRequest = serde_json::from_str(
            r#"{"data": [{"g": "a", "x": 1}], "epsilon": 0.5, "group_by": ["g"], "statistic": "mean", "column": "x"}"#,
        )
        .expect("parse");
        assert!(matches!(grouped, ComputeStatsRequest::Grouped(_)));
    }

    #[test]
    fn test_grouped_body_reports_missing_field() {
        let err = serde_json::from_str::<ComputeStatsRequest>(
            r#"{"data": [{"x": 1}], "epsilon": 1.0, "group_by": [], "statistic": "mean"}"#,
        )
        .expect_err("column is required");
        assert!(err.to_string().contains("missing field `column`"), "{err}");
    }

    #[test]
    fn test_ordered_map_keeps_order() {
        let map = OrderedMap::from_pairs(vec![
            ("9.0-10.0".to_string(), 1),
            ("10.0-11.0".to_string(), 2),
            ("9.0-10.0".to_string(), 3),
        ]);
        assert_eq!(map.len(), 2);
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"9.0-10.0":3,"10.0-11.0":2}"#);
    }

    #[test]
    fn test_epsilon_entry_failed_shape() {
        let entry = EpsilonEntry::from(EpsilonResult {
            epsilon: 0.5,
            true_mean: None,
            dp_mean: None,
            true_count: None,
            dp_count: None,
            histogram: Vec::new(),
            dp_error: Some("DP computation failed: EmptyPartition: x".to_string()),
            model: None,
        });
        let json = serde_json::to_value(&entry).expect("serialize");

        assert_eq!(json["mean"], serde_json::Value::Null);
        assert_eq!(json["count"], serde_json::Value::Null);
        assert_eq!(json["histogram"], serde_json::json!({}));
        assert_eq!(json["model_performance"]["accuracy"], serde_json::Value::Null);
        assert_eq!(json["model_performance"]["error"], serde_json::Value::Null);
        assert!(json["dp_error"].as_str().unwrap_or_default().contains("EmptyPartition"));
    }

    #[test]
    fn test_epsilon_entry_histogram_labels() {
        let entry = EpsilonEntry::from(EpsilonResult {
            epsilon: 1.0,
            true_mean: Some(3.0),
            dp_mean: Some(3.2),
            true_count: Some(5),
            dp_count: Some(6),
            histogram: vec![HistogramBin {
                lower: 1.0,
                upper: 1.8,
                count: 2.0,
            }],
            dp_error: None,
            model: None,
        });
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["histogram"]["1.0-1.8"], 2);
        assert_eq!(json["count"], 6);
    }
}
