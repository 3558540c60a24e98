//! Statistic evaluator: true (non-private) statistics per partition.

use crate::domain::{Dataset, FieldValue, HistogramBin, Partition, StatisticKind};
use crate::DpScopeError;

/// Number of histogram bins used by the multi-epsilon sweep.
pub const DEFAULT_HISTOGRAM_BINS: usize = 5;

/// Compute one scalar statistic over the coercible values of `column`.
///
/// # Errors
/// Returns `DpScopeError::EmptyPartition` for a mean with no numeric values.
/// Count and percent of an empty partition are 0.
pub fn evaluate_partition(
    partition: &Partition<'_>,
    column: &str,
    kind: StatisticKind,
) -> Result<f64, DpScopeError> {
    let values: Vec<&FieldValue> = partition
        .column(column)
        .filter(|v| v.as_number().is_some())
        .collect();

    match kind {
        StatisticKind::Count => Ok(values.len() as f64),
        StatisticKind::Mean => {
            if values.is_empty() {
                return Err(DpScopeError::EmptyPartition {
                    group: partition.label.clone(),
                });
            }
            let sum: f64 = values.iter().filter_map(|v| v.as_number()).sum();
            Ok(sum / values.len() as f64)
        }
        StatisticKind::Percent => {
            if values.is_empty() {
                return Ok(0.0);
            }
            let positives = values.iter().filter(|v| v.is_positive_indicator()).count();
            Ok(positives as f64 / values.len() as f64)
        }
    }
}

/// Evaluate a statistic for every partition of `dataset`.
///
/// Each group keeps its own result; one empty group does not fail the others.
#[must_use]
pub fn evaluate(
    dataset: &Dataset,
    group_by: &[String],
    column: &str,
    kind: StatisticKind,
) -> Vec<(String, Result<f64, DpScopeError>)> {
    dataset
        .partition(group_by)
        .iter()
        .map(|p| (p.label.clone(), evaluate_partition(p, column, kind)))
        .collect()
}

/// Mean of a plain slice.
///
/// # Errors
/// Returns `DpScopeError::EmptyPartition` for an empty slice.
pub fn mean(values: &[f64]) -> Result<f64, DpScopeError> {
    if values.is_empty() {
        return Err(DpScopeError::EmptyPartition {
            group: crate::domain::ALL_GROUP.to_string(),
        });
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of a plain slice (average of the two middle values for even length).
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Equal-width histogram covering [min, max] of `values`.
///
/// The last bin is closed on the right. A degenerate range (all values equal)
/// is widened to [min - 0.5, max + 0.5].
///
/// # Errors
/// Returns `DpScopeError::EmptyPartition` for no values and
/// `DpScopeError::InvalidParameter` for zero bins.
pub fn histogram(values: &[f64], bins: usize) -> Result<Vec<HistogramBin>, DpScopeError> {
    if bins == 0 {
        return Err(DpScopeError::InvalidParameter(
            "histogram needs at least one bin".to_string(),
        ));
    }

    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (mut lo, mut hi) = match (
        finite.iter().copied().reduce(f64::min),
        finite.iter().copied().reduce(f64::max),
    ) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            return Err(DpScopeError::EmptyPartition {
                group: crate::domain::ALL_GROUP.to_string(),
            })
        }
    };

    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0.0; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1.0;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count,
        })
        .collect())
}
