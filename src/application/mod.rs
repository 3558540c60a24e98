//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the statistic engine and its diagnostics.

pub mod aggregator;
pub mod error_bars;
pub mod evaluator;
pub mod model_comparison;
mod service;

pub use aggregator::{DpAggregator, EpsilonResult, GroupedOutcome, GroupedQuery};
pub use service::{AnalyticsConfig, AnalyticsService, BasicStats, ErrorBarReport, GroupedRequest};
