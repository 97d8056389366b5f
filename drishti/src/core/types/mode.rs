//! Capture modes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanningMode {
    /// Depth sensor only.
    Lidar,
    /// Camera-only multi-view reconstruction.
    Photogrammetry,
    /// Depth + camera fusion.
    Hybrid,
}

impl ScanningMode {
    pub const ALL: [ScanningMode; 3] = [
        ScanningMode::Lidar,
        ScanningMode::Photogrammetry,
        ScanningMode::Hybrid,
    ];

    /// Fallback order on repeated quality failure.
    pub const FALLBACK_CHAIN: [ScanningMode; 3] = [
        ScanningMode::Lidar,
        ScanningMode::Photogrammetry,
        ScanningMode::Hybrid,
    ];

    /// Whether the mode needs LiDAR hardware.
    #[inline]
    pub fn requires_lidar(self) -> bool {
        matches!(self, ScanningMode::Lidar | ScanningMode::Hybrid)
    }

    /// Position in the fallback chain.
    pub fn chain_position(self) -> usize {
        match self {
            ScanningMode::Lidar => 0,
            ScanningMode::Photogrammetry => 1,
            ScanningMode::Hybrid => 2,
        }
    }
}

impl fmt::Display for ScanningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanningMode::Lidar => "lidar",
            ScanningMode::Photogrammetry => "photogrammetry",
            ScanningMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}
