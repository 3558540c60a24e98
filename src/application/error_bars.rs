//! Error-bar simulator: empirical spread of a DP estimator.
//!
//! Uses the population standard deviation (divide by N) throughout.

use rayon::prelude::*;

use crate::domain::{Dataset, ErrorBarEstimate, StatisticKind, StatisticResult};
use crate::ports::{DifferentialPrivacy, Mechanism};
use crate::DpScopeError;

use super::aggregator::GroupedQuery;
use super::evaluator;

/// Default number of perturbations per group.
pub const DEFAULT_SIMULATIONS: usize = 100;

/// Draw `num_simulations` perturbations of `true_value` and summarise them.
///
/// `kind` decides whether draws are clipped before summarising, so the
/// estimate describes the estimator actually released.
///
/// # Errors
/// Returns `InvalidParameter` for zero simulations or invalid epsilon/sensitivity.
pub fn simulate<D: DifferentialPrivacy>(
    privacy: &D,
    group_label: &str,
    true_value: f64,
    epsilon: f64,
    sensitivity: f64,
    num_simulations: usize,
    kind: Option<StatisticKind>,
) -> Result<ErrorBarEstimate, DpScopeError> {
    if num_simulations == 0 {
        return Err(DpScopeError::InvalidParameter(
            "num_simulations must be at least 1".to_string(),
        ));
    }

    let mut mechanism = privacy.calibrate(epsilon, sensitivity)?;
    let draws: Vec<f64> = (0..num_simulations)
        .map(|_| {
            let v = mechanism.apply(true_value);
            kind.map_or(v, |k| k.clip(v))
        })
        .collect();

    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let variance = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    Ok(ErrorBarEstimate {
        group_label: group_label.to_string(),
        true_value,
        empirical_mean: mean,
        empirical_std_dev: variance.sqrt(),
    })
}

/// Error bars for every group of a grouped query.
///
/// Each group calibrates its own mechanism. A failing group yields a
/// `StatisticResult` failure instead of an estimate; siblings are unaffected.
pub fn simulate_groups<D: DifferentialPrivacy>(
    privacy: &D,
    dataset: &Dataset,
    query: &GroupedQuery,
    num_simulations: usize,
) -> Vec<Result<ErrorBarEstimate, StatisticResult>> {
    let sensitivity = privacy.default_sensitivity();

    dataset
        .partition(&query.group_by)
        .par_iter()
        .map(|p| {
            evaluator::evaluate_partition(p, &query.column, query.kind)
                .and_then(|t| {
                    simulate(
                        privacy,
                        &p.label,
                        t,
                        query.epsilon,
                        sensitivity,
                        num_simulations,
                        Some(query.kind),
                    )
                })
                .map_err(|e| {
                    tracing::warn!("Error bars failed for group {:?}: {}", p.label, e);
                    StatisticResult::failure(p.label.clone(), &e)
                })
        })
        .collect()
}
