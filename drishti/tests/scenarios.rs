//! End-to-end scenarios
//!
//! | Scenario | Setup                                   | Expected                         |
//! |----------|-----------------------------------------|----------------------------------|
//! | A        | bright, steady, simple, LiDAR device    | lidar selected                   |
//! | B        | dark, shaky, complex, no LiDAR          | photogrammetry selected          |
//! | C        | three quality failures in lidar         | lidar→photo→hybrid→error         |
//! | D        | thermal nominal→critical mid-session    | thermal-safe settings at once    |
//! | E        | 31 state updates                        | newest 30 retained               |
//!
//! Run with: `cargo test --test scenarios`

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{RecoveryRig, arbitrator, frame, metrics};
use drishti::DrishtiConfig;
use drishti::adaptive::{
    AdaptationConfig, AdaptationReason, AdaptiveQualityController, ProcessingTier,
    QualitySettings,
};
use drishti::core::types::{
    CameraImage, CameraPose, Frame, PauseReason, ResourceMetrics, ScanningConditions,
    ScanningMode, ScanningState, ThermalState,
};
use drishti::error::ErrorKind;
use drishti::events::ScanEvent;
use drishti::quality::{QualityAnalysis, QualityTrend};
use drishti::session::{
    FrameOutcome, InMemorySessionStore, RecoveryAction, RecoveryOutcome, ScanSession,
    ScanningStateMachine, SessionStore, StateMachineConfig,
};

#[test]
fn scenario_a_good_conditions_select_lidar() {
    let mut arb = arbitrator(true);
    let conditions = ScanningConditions::new(0.9, 0.9, 0.1, 0.9);
    let decision = arb.evaluate(&conditions, 0).unwrap().unwrap();
    assert_eq!(decision.mode, ScanningMode::Lidar);

    let lidar = arb.score(ScanningMode::Lidar, &conditions);
    assert!(lidar > arb.score(ScanningMode::Hybrid, &conditions));
    assert!(lidar > arb.score(ScanningMode::Photogrammetry, &conditions));
}

#[test]
fn scenario_b_no_lidar_selects_photogrammetry() {
    let mut arb = arbitrator(false);
    let conditions = ScanningConditions::new(0.2, 0.4, 0.8, 0.5);
    assert_eq!(
        arb.eligible_modes(&conditions),
        vec![ScanningMode::Photogrammetry]
    );
    let decision = arb.evaluate(&conditions, 0).unwrap().unwrap();
    assert_eq!(decision.mode, ScanningMode::Photogrammetry);
}

#[test]
fn scenario_c_fallback_chain_ends_in_error() {
    let mut rig = RecoveryRig::scanning_lidar();
    let modes = rig.arbitrator.publisher().subscribe();
    let failure = || drishti::ScanError::QualityBelowThreshold("streak".to_string());

    let outcome = rig.handle(failure(), 10);
    assert!(matches!(
        outcome,
        RecoveryOutcome::Recovered(RecoveryAction::ModeFallback(ref d))
            if d.mode == ScanningMode::Photogrammetry
    ));
    assert_eq!(rig.state.state(), ScanningState::Recovering { attempt: 1 });
    rig.state.transition(ScanningState::Scanning, 11).unwrap();

    let outcome = rig.handle(failure(), 20);
    assert!(matches!(
        outcome,
        RecoveryOutcome::Recovered(RecoveryAction::ModeFallback(ref d))
            if d.mode == ScanningMode::Hybrid
    ));
    rig.state.transition(ScanningState::Scanning, 21).unwrap();

    match rig.handle(failure(), 30) {
        RecoveryOutcome::Escalate(escalation) => {
            assert_eq!(escalation.kind, ErrorKind::UnrecoverableError);
            assert_eq!(escalation.cause, ErrorKind::NoFallbackAvailable);
            assert_eq!(escalation.attempts, 3);
        }
        other => panic!("expected escalation, got {other:?}"),
    }
    assert_eq!(
        rig.state.state(),
        ScanningState::Error(ErrorKind::UnrecoverableError)
    );

    // Lidar is never tried again
    let visited: Vec<ScanningMode> = modes
        .try_iter()
        .filter_map(|e| match e {
            ScanEvent::ModeChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(visited, vec![ScanningMode::Photogrammetry, ScanningMode::Hybrid]);
    assert_eq!(rig.arbitrator.current(), Some(ScanningMode::Hybrid));
}

#[test]
fn scenario_c_through_session_falls_back_on_streak() {
    let mut session = ScanSession::from_config(&DrishtiConfig::default()).unwrap();
    assert_eq!(session.start(0).unwrap().mode, ScanningMode::Lidar);

    // No depth: LiDAR density fails every frame
    let mut outcomes = Vec::new();
    for i in 1..=15u64 {
        let ts = i * 33_333;
        let f = Frame::new(ts, frame(ts, 250).image, CameraPose::default());
        outcomes.push(session.process_frame(&f, ts).unwrap());
    }

    assert!(
        outcomes[..14]
            .iter()
            .all(|o| matches!(o, FrameOutcome::Rejected(_)))
    );
    assert!(matches!(
        outcomes[14],
        FrameOutcome::Recovered(RecoveryAction::ModeFallback(ref d))
            if d.mode == ScanningMode::Photogrammetry
    ));
    assert_eq!(session.state(), ScanningState::Scanning);
    assert_eq!(session.mode(), Some(ScanningMode::Photogrammetry));
    assert_eq!(session.stats().recoveries, 1);
}

#[test]
fn scenario_d_thermal_spike_bypasses_gates() {
    let config = AdaptationConfig::default();
    let safe = config.thermal_safe();
    let mut controller = AdaptiveQualityController::new(config);

    let target = QualitySettings {
        lighting_threshold: 0.8,
        ..QualitySettings::default()
    };
    controller.force_quality_update(target, 0).unwrap();

    let analysis = QualityAnalysis::new(metrics(0.9, 0.9, 0.9), QualityTrend::default(), true);
    let hot = ResourceMetrics {
        thermal_state: ThermalState::Critical,
        ..Default::default()
    };
    // 100ms after the last update: well inside the 500ms interval gate
    let event = controller.adapt(&analysis, &hot, 100_000).unwrap();
    assert_eq!(event.reason, AdaptationReason::ThermalMitigation);
    assert_eq!(event.previous, target);
    assert_eq!(event.new, safe);
    assert_eq!(controller.settings().processing_tier, ProcessingTier::Low);
    assert_relative_eq!(controller.settings().lighting_threshold, 0.3);

    // Cooling down restores the pre-throttle settings
    let event = controller
        .adapt(&analysis, &ResourceMetrics::default(), 200_000)
        .unwrap();
    assert_eq!(event.new, target);
}

#[test]
fn scenario_e_history_keeps_newest_thirty() {
    let mut sm = ScanningStateMachine::new(StateMachineConfig::default());
    sm.transition(ScanningState::Initializing, 1).unwrap();
    sm.transition(ScanningState::Scanning, 2).unwrap();
    let mut t = 3;
    while t <= 31 {
        let to = if sm.state() == ScanningState::Scanning {
            ScanningState::Paused(PauseReason::UserRequested)
        } else {
            ScanningState::Scanning
        };
        sm.transition(to, t).unwrap();
        t += 1;
    }

    let history = sm.history();
    assert_eq!(history.len(), 30);
    // Idle -> Initializing was the oldest and is gone
    assert_eq!(history[0].from, ScanningState::Initializing);
    assert_eq!(history[0].timestamp_us, 2);
    assert_eq!(history[29].timestamp_us, 31);
}

#[test]
fn session_persists_snapshot_on_stop() {
    let store = Arc::new(InMemorySessionStore::new());
    let mut session = ScanSession::from_config(&DrishtiConfig::default())
        .unwrap()
        .with_store(store.clone());
    let events = session.subscribe();
    session.start(0).unwrap();

    for i in 1..=40u64 {
        let ts = i * 33_333;
        session.process_frame(&frame(ts, 230), ts).unwrap();
        assert_eq!(session.current_metrics().map(|m| m.timestamp_us), Some(ts));
    }
    let summary = session.stop(2_000_000).unwrap();
    assert_eq!(summary.final_state, ScanningState::Complete);
    assert_eq!(summary.stats.frames_received, 40);

    let snapshot = store.load("scan").unwrap().unwrap();
    assert_eq!(snapshot.metrics_history.len(), 30);
    assert_eq!(snapshot.region, "default");
    assert!(
        events
            .drain()
            .iter()
            .any(|e| matches!(e, ScanEvent::StateChanged(t) if t.to == ScanningState::Complete))
    );
}

#[test]
fn invalid_frames_are_skipped() {
    let mut session = ScanSession::from_config(&DrishtiConfig::default()).unwrap();
    session.start(0).unwrap();
    let broken = Frame::new(
        1,
        CameraImage::new(8, 8, vec![[0, 0, 0]; 10]),
        CameraPose::default(),
    );
    assert_eq!(
        session.process_frame(&broken, 1).unwrap(),
        FrameOutcome::Invalid
    );
    assert_eq!(session.stats().frames_invalid, 1);
    assert_eq!(session.state(), ScanningState::Scanning);
}
