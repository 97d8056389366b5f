//! Session persistence contract.
//!
//! The durable store itself lives outside this crate; sessions only need
//! something implementing [`SessionStore`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::state_machine::RecoveryPoint;
use crate::adaptive::{AdaptationEvent, QualitySettings};
use crate::core::clock::TimestampUs;
use crate::core::types::{QualityMetrics, ScanningMode, ScanningState};
use crate::error::Result;
use crate::quality::QualityThresholds;

/// Everything needed to resume a crashed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: ScanningState,
    pub mode: Option<ScanningMode>,
    pub region: String,
    pub thresholds: QualityThresholds,
    pub settings: QualitySettings,
    pub metrics_history: Vec<QualityMetrics>,
    pub recovery_points: Vec<RecoveryPoint>,
    pub adaptation_events: Vec<AdaptationEvent>,
    pub timestamp_us: TimestampUs,
}

pub trait SessionStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    fn remove(&self, session_id: &str) -> Result<()>;
}

/// Process-local store, for tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    snapshots: Mutex<HashMap<String, SessionSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshots.lock().get(session_id).cloned())
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        self.snapshots.lock().remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, ts: TimestampUs) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            state: ScanningState::Scanning,
            mode: Some(ScanningMode::Lidar),
            region: "default".to_string(),
            thresholds: QualityThresholds::default(),
            settings: QualitySettings::default(),
            metrics_history: vec![QualityMetrics::default()],
            recovery_points: Vec::new(),
            adaptation_events: Vec::new(),
            timestamp_us: ts,
        }
    }

    #[test]
    fn test_latest_save_wins() {
        let store = InMemorySessionStore::new();
        store.save(&snapshot("a", 1)).unwrap();
        store.save(&snapshot("a", 2)).unwrap();
        store.save(&snapshot("b", 3)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.load("a").unwrap().unwrap().timestamp_us, 2);
        store.remove("a").unwrap();
        assert!(store.load("a").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_serializes_to_toml() {
        let text = toml::to_string(&snapshot("a", 5)).unwrap();
        let back: SessionSnapshot = toml::from_str(&text).unwrap();
        assert_eq!(back.mode, Some(ScanningMode::Lidar));
        assert_eq!(back.timestamp_us, 5);
    }
}
