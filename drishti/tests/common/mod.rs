//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use drishti::adaptive::{AdaptationConfig, AdaptiveQualityController};
use drishti::arbitration::{ArbitrationConfig, ModeArbitrator};
use drishti::core::types::{
    CameraImage, CameraPose, DepthMap, DeviceCapability, Frame, QualityMetrics,
    ScanningConditions, ScanningState,
};
use drishti::error::ScanError;
use drishti::session::{
    ErrorRecoveryCoordinator, RecoveryConfig, RecoveryContext, RecoveryOutcome,
    ScanningStateMachine, StateMachineConfig,
};

/// Conditions under which LiDAR scores highest.
pub fn lidar_friendly() -> ScanningConditions {
    ScanningConditions::new(0.9, 0.9, 0.1, 0.9)
}

/// Conditions under which photogrammetry scores highest.
pub fn photo_friendly() -> ScanningConditions {
    ScanningConditions::new(1.0, 1.0, 1.0, 0.2)
}

pub fn arbitrator(has_lidar: bool) -> ModeArbitrator {
    ModeArbitrator::new(
        ArbitrationConfig::default(),
        DeviceCapability::new(has_lidar, 1.0),
    )
    .unwrap()
}

pub fn metrics(lighting: f32, motion: f32, feature: f32) -> QualityMetrics {
    QualityMetrics {
        lighting_score: lighting,
        motion_score: motion,
        feature_preservation: feature,
        texture_quality: feature,
        ..Default::default()
    }
}

/// Textured frame with a uniform depth plane.
pub fn frame(timestamp_us: u64, brightness: u8) -> Frame {
    let (w, h) = (64u32, 48u32);
    let pixels = (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            let v = if (x / 4 + y / 4) % 2 == 0 {
                brightness
            } else {
                brightness / 2
            };
            [v, v, v]
        })
        .collect();
    Frame::new(timestamp_us, CameraImage::new(w, h, pixels), CameraPose::default())
        .with_depth(DepthMap::new(16, 12, vec![0.8; 192]).with_confidence(vec![2; 192]))
}

/// Recovery components wired together outside a session.
pub struct RecoveryRig {
    pub state: ScanningStateMachine,
    pub arbitrator: ModeArbitrator,
    pub controller: AdaptiveQualityController,
    pub coordinator: ErrorRecoveryCoordinator,
}

impl RecoveryRig {
    /// Scanning in LiDAR mode at t = 1us.
    pub fn scanning_lidar() -> Self {
        let mut state = ScanningStateMachine::new(StateMachineConfig::default());
        state.transition(ScanningState::Initializing, 0).unwrap();
        state.transition(ScanningState::Scanning, 1).unwrap();
        let mut arbitrator = arbitrator(true);
        arbitrator.evaluate(&lidar_friendly(), 1).unwrap();
        Self {
            state,
            arbitrator,
            controller: AdaptiveQualityController::new(AdaptationConfig::default()),
            coordinator: ErrorRecoveryCoordinator::new(RecoveryConfig::default()),
        }
    }

    pub fn handle(&mut self, error: ScanError, now_us: u64) -> RecoveryOutcome {
        self.coordinator.handle(
            error,
            RecoveryContext {
                state: &mut self.state,
                arbitrator: &mut self.arbitrator,
                controller: &mut self.controller,
                metrics: None,
                now_us,
            },
        )
    }
}
