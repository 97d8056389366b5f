//! Invariants, idempotence and boundaries of the decision components.
//!
//! Run with: `cargo test --test properties`

mod common;

use common::{arbitrator, lidar_friendly, metrics, photo_friendly};
use drishti::adaptive::{AdaptationConfig, AdaptiveQualityController, QualitySettings};
use drishti::core::types::{ScanningConditions, ScanningMode};
use drishti::error::ScanError;
use drishti::quality::{AggregatorConfig, QualityAggregator};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Quality Aggregator
// ============================================================================

#[test]
fn current_metrics_is_always_the_latest_sample() {
    let mut rng = SmallRng::seed_from_u64(11);
    let mut aggregator = QualityAggregator::new(AggregatorConfig::default());
    assert!(aggregator.current_metrics().is_none());

    let mut pushed = Vec::new();
    for i in 0..200u64 {
        let mut sample = metrics(rng.r#gen(), rng.r#gen(), rng.r#gen());
        sample.timestamp_us = i;
        aggregator.push(sample);
        pushed.push(sample);
        assert_eq!(aggregator.current_metrics(), Some(sample));
    }

    // Window holds the newest samples in arrival order
    let history = aggregator.history();
    assert_eq!(history.len(), 30);
    assert_eq!(history.as_slice(), &pushed[170..]);
}

// ============================================================================
// Mode Arbitrator
// ============================================================================

#[test]
fn never_switches_twice_within_dwell() {
    let mut rng = SmallRng::seed_from_u64(5);
    let mut arb = arbitrator(true);
    let dwell_us = 5_000_000;

    let mut switches = Vec::new();
    // 30 Hz for two minutes, flipping between extremes
    for tick in 0..3_600u64 {
        let now = tick * 33_333;
        let conditions = if rng.gen_bool(0.5) {
            lidar_friendly()
        } else if rng.gen_bool(0.5) {
            photo_friendly()
        } else {
            ScanningConditions::new(rng.r#gen(), rng.r#gen(), rng.r#gen(), rng.r#gen())
        };
        if let Some(decision) = arb.evaluate(&conditions, now).unwrap() {
            switches.push(decision.timestamp_us);
        }
    }

    assert!(switches.len() > 2, "adversarial input should force switches");
    for pair in switches.windows(2) {
        assert!(pair[1] - pair[0] >= dwell_us, "switches at {pair:?}");
    }
}

#[test]
fn hybrid_eligible_exactly_at_floor() {
    let arb = arbitrator(true);
    let at_floor = ScanningConditions::new(0.5, 0.5, 0.5, 0.7);
    assert!(arb.eligible_modes(&at_floor).contains(&ScanningMode::Hybrid));

    let just_below = ScanningConditions::new(0.5, 0.5, 0.5, 0.699_99);
    assert!(!arb.eligible_modes(&just_below).contains(&ScanningMode::Hybrid));
}

#[test]
fn no_fallback_available_only_from_hybrid() {
    let mut arb = arbitrator(true);
    arb.evaluate(&lidar_friendly(), 0).unwrap();
    assert_eq!(arb.current(), Some(ScanningMode::Lidar));

    let first = arb.fallback(1).unwrap();
    assert_eq!(first.mode, ScanningMode::Photogrammetry);
    let second = arb.fallback(2).unwrap();
    assert_eq!(second.mode, ScanningMode::Hybrid);

    match arb.fallback(3) {
        Err(ScanError::NoFallbackAvailable(mode)) => assert_eq!(mode, ScanningMode::Hybrid),
        other => panic!("expected NoFallbackAvailable, got {other:?}"),
    }
}

// ============================================================================
// Adaptive Quality Controller
// ============================================================================

#[test]
fn forcing_same_settings_twice_records_one_event() {
    let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
    let target = QualitySettings {
        lighting_threshold: 0.8,
        ..QualitySettings::default()
    };

    assert!(controller.force_quality_update(target, 0).is_some());
    assert!(controller.force_quality_update(target, 1_000_000).is_none());
    assert_eq!(controller.events().len(), 1);
    assert_eq!(controller.settings(), target);
}
