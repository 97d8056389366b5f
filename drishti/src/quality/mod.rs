//! Quality aggregation and acceptance.
//!
//! - [`QualityAggregator`]: rolling window of [`QualityMetrics`] + trend
//! - [`ConditionsHistory`]: rolling window of scanning conditions
//! - [`QualityThresholds`]: pure acceptability check
//! - [`ThresholdProvider`]: injected regional thresholds

mod aggregator;
mod thresholds;

use serde::{Deserialize, Serialize};

pub use aggregator::{AggregatorConfig, ConditionsHistory, QualityAggregator, QualityTrend, Trend};
pub use thresholds::{
    MetricKind, QualityFailure, QualityThresholds, QualityVerdict, RegionalThresholds,
    StaticThresholds, ThresholdProvider,
};

use crate::core::types::QualityMetrics;

/// Snapshot handed to the adaptive controller after each evaluated frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub metrics: QualityMetrics,
    pub trend: QualityTrend,
    pub acceptable: bool,
}

impl QualityAnalysis {
    pub fn new(metrics: QualityMetrics, trend: QualityTrend, acceptable: bool) -> Self {
        Self {
            metrics,
            trend,
            acceptable,
        }
    }
}
