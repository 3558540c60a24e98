//! Domain layer: Core types for DP analytics.
//!
//! This module contains pure Rust types with no I/O. Everything here is
//! constructed per request and discarded with the response.

mod dataset;
mod statistic;

pub use dataset::{Dataset, FieldValue, Partition, Record, ALL_GROUP};
pub use statistic::{
    ErrorBarEstimate, ErrorKind, HistogramBin, ModelComparisonResult, ModelScore,
    RankingComparison, StatisticKind, StatisticResult, TrainingComparison,
};
