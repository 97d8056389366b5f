//! Rolling quality window and trend classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::math::regression_slope;
use crate::core::ring_buffer::RingBuffer;
use crate::core::types::{QualityMetrics, ScanningConditions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Quality snapshots retained.
    /// Default: 30
    pub window_size: usize,

    /// Samples used for the trend regression.
    /// Default: 5
    pub trend_window: usize,

    /// Slope magnitude separating stable from improving/declining.
    /// Default: 0.05
    pub trend_threshold: f32,

    /// Conditions samples retained.
    /// Default: 30
    pub conditions_window: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            trend_window: 5,
            trend_threshold: 0.05,
            conditions_window: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

impl Trend {
    pub fn classify(slope: f32, threshold: f32) -> Self {
        if slope > threshold {
            Trend::Improving
        } else if slope < -threshold {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        };
        f.write_str(s)
    }
}

/// Per-metric trends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityTrend {
    pub accuracy: Trend,
    pub density: Trend,
}

impl QualityTrend {
    /// Declining if any metric declines, improving if any improves and none
    /// declines.
    pub fn overall(&self) -> Trend {
        let trends = [self.accuracy, self.density];
        if trends.contains(&Trend::Declining) {
            Trend::Declining
        } else if trends.contains(&Trend::Improving) {
            Trend::Improving
        } else {
            Trend::Stable
        }
    }
}

/// Bounded window of recent quality snapshots.
#[derive(Debug, Clone)]
pub struct QualityAggregator {
    config: AggregatorConfig,
    window: RingBuffer<QualityMetrics>,
}

impl QualityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let window = RingBuffer::new(config.window_size);
        Self { config, window }
    }

    /// Append a snapshot, evicting the oldest beyond the window size.
    pub fn push(&mut self, metrics: QualityMetrics) {
        self.window.push(metrics);
    }

    /// The most recently appended snapshot.
    pub fn current_metrics(&self) -> Option<QualityMetrics> {
        self.window.latest().copied()
    }

    pub fn trend(&self) -> QualityTrend {
        QualityTrend {
            accuracy: self.metric_trend(|m| m.accuracy()),
            density: self.metric_trend(|m| m.point_density),
        }
    }

    fn metric_trend(&self, extract: impl Fn(&QualityMetrics) -> Option<f32>) -> Trend {
        let values: Vec<f32> = self
            .window
            .last_n(self.config.trend_window)
            .filter_map(&extract)
            .collect();
        if values.len() < 2 {
            return Trend::Stable;
        }
        Trend::classify(regression_slope(&values), self.config.trend_threshold)
    }

    pub fn history(&self) -> Vec<QualityMetrics> {
        self.window.to_vec()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Shrink the window to the newest `keep` snapshots.
    pub fn release_memory(&mut self, keep: usize) {
        let before = self.window.len();
        self.window.retain_latest(keep);
        log::info!(
            "Quality window trimmed: {} -> {} snapshots",
            before,
            self.window.len()
        );
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Bounded history of conditions samples.
#[derive(Debug, Clone)]
pub struct ConditionsHistory {
    samples: RingBuffer<ScanningConditions>,
}

impl ConditionsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, conditions: ScanningConditions) {
        self.samples.push(conditions);
    }

    pub fn latest(&self) -> Option<ScanningConditions> {
        self.samples.latest().copied()
    }

    /// Field-wise mean over the window; the timestamp is the newest one.
    pub fn average(&self) -> Option<ScanningConditions> {
        let latest = self.samples.latest()?;
        let n = self.samples.len() as f32;
        let mut avg = ScanningConditions {
            lighting_level: 0.0,
            motion_stability: 0.0,
            surface_complexity: 0.0,
            device_performance: 0.0,
            battery_level: 0.0,
            timestamp_us: latest.timestamp_us,
        };
        for c in self.samples.iter() {
            avg.lighting_level += c.lighting_level / n;
            avg.motion_stability += c.motion_stability / n;
            avg.surface_complexity += c.surface_complexity / n;
            avg.device_performance += c.device_performance / n;
            avg.battery_level += c.battery_level / n;
        }
        Some(avg)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn retain_latest(&mut self, keep: usize) {
        self.samples.retain_latest(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_density(ts: u64, density: f32, noise: f32) -> QualityMetrics {
        QualityMetrics {
            timestamp_us: ts,
            point_density: Some(density),
            noise_level: Some(noise),
            ..Default::default()
        }
    }

    #[test]
    fn test_current_is_latest() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        assert!(agg.current_metrics().is_none());
        for i in 0..50 {
            let m = with_density(i, 0.5, 0.1);
            agg.push(m);
            assert_eq!(agg.current_metrics(), Some(m));
        }
        assert_eq!(agg.len(), 30);
        assert_eq!(agg.history()[0].timestamp_us, 20);
    }

    #[test]
    fn test_improving_density() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        for (i, d) in [0.3, 0.4, 0.5, 0.6, 0.7].into_iter().enumerate() {
            agg.push(with_density(i as u64, d, 0.2));
        }
        let trend = agg.trend();
        assert_eq!(trend.density, Trend::Improving);
        assert_eq!(trend.accuracy, Trend::Stable);
        assert_eq!(trend.overall(), Trend::Improving);
    }

    #[test]
    fn test_declining_accuracy_dominates() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        for (i, noise) in [0.1, 0.2, 0.3, 0.4, 0.5].into_iter().enumerate() {
            agg.push(with_density(i as u64, 0.3 + 0.1 * i as f32, noise));
        }
        let trend = agg.trend();
        assert_eq!(trend.accuracy, Trend::Declining);
        assert_eq!(trend.overall(), Trend::Declining);
    }

    #[test]
    fn test_trend_uses_only_last_window() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        // Steep early decline followed by a flat tail of five
        for d in [0.9, 0.7, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5] {
            agg.push(with_density(0, d, 0.2));
        }
        assert_eq!(agg.trend().density, Trend::Stable);
    }

    #[test]
    fn test_missing_depth_is_stable() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        for i in 0..5 {
            agg.push(QualityMetrics {
                timestamp_us: i,
                ..Default::default()
            });
        }
        assert_eq!(agg.trend(), QualityTrend::default());
    }

    #[test]
    fn test_release_memory() {
        let mut agg = QualityAggregator::new(AggregatorConfig::default());
        for i in 0..40 {
            agg.push(with_density(i, 0.5, 0.1));
        }
        agg.release_memory(5);
        assert_eq!(agg.len(), 5);
        assert_eq!(agg.current_metrics().unwrap().timestamp_us, 39);
    }

    #[test]
    fn test_conditions_average() {
        let mut history = ConditionsHistory::new(2);
        history.push(ScanningConditions::new(0.2, 1.0, 0.0, 1.0).at(1));
        history.push(ScanningConditions::new(0.4, 0.5, 0.2, 0.8).at(2));
        history.push(ScanningConditions::new(0.6, 0.5, 0.4, 0.6).at(3));
        let avg = history.average().unwrap();
        assert_relative_eq!(avg.lighting_level, 0.5, epsilon = 1e-6);
        assert_relative_eq!(avg.surface_complexity, 0.3, epsilon = 1e-6);
        assert_eq!(avg.timestamp_us, 3);
        assert_eq!(history.len(), 2);
    }
}
