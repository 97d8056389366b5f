//! Depth-derived signals.
//!
//! Every function takes the depth map as `Option` and reports
//! `ScanError::SignalUnavailable` when it is absent. Callers treat that as
//! "signal unavailable", never as a frame failure.

use crate::core::math::{std_dev, unit};
use crate::core::types::{DepthMap, MAX_CONFIDENCE_LEVEL, SignalKind};
use crate::error::{Result, ScanError};

fn require(depth: Option<&DepthMap>, kind: SignalKind) -> Result<&DepthMap> {
    depth.ok_or(ScanError::SignalUnavailable(kind))
}

/// Valid-sample density compared against a sensor floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityReading {
    /// Fraction of valid depth samples, 0..1.
    pub density: f32,
    pub valid_samples: usize,
    pub meets_floor: bool,
}

pub fn point_density(depth: Option<&DepthMap>, floor: f32) -> Result<DensityReading> {
    let depth = require(depth, SignalKind::PointDensity)?;
    let total = depth.depths.len();
    let valid_samples = depth
        .depths
        .iter()
        .filter(|&&d| DepthMap::is_valid(d))
        .count();
    let density = if total == 0 {
        0.0
    } else {
        valid_samples as f32 / total as f32
    };
    Ok(DensityReading {
        density,
        valid_samples,
        meets_floor: density >= floor,
    })
}

/// Mean confidence level normalised to [0, 1].
pub fn depth_confidence(depth: Option<&DepthMap>) -> Result<f32> {
    let depth = require(depth, SignalKind::DepthConfidence)?;
    let conf = depth
        .confidence
        .as_ref()
        .ok_or(ScanError::SignalUnavailable(SignalKind::DepthConfidence))?;
    if conf.is_empty() {
        return Ok(0.0);
    }
    let sum: u32 = conf
        .iter()
        .map(|&c| c.min(MAX_CONFIDENCE_LEVEL) as u32)
        .sum();
    Ok(sum as f32 / (conf.len() as f32 * MAX_CONFIDENCE_LEVEL as f32))
}

/// Standard deviation of local gradient magnitude, normalised by `reference`
/// metres and clamped to [0, 1].
pub fn surface_complexity(depth: Option<&DepthMap>, reference: f32) -> Result<f32> {
    let depth = require(depth, SignalKind::SurfaceComplexity)?;
    if depth.width < 2 || depth.height < 2 {
        return Ok(0.0);
    }

    let mut gradients = Vec::new();
    for y in 0..depth.height - 1 {
        for x in 0..depth.width - 1 {
            let (Some(d), Some(right), Some(below)) = (
                depth.depth(x, y),
                depth.depth(x + 1, y),
                depth.depth(x, y + 1),
            ) else {
                continue;
            };
            let gx = right - d;
            let gy = below - d;
            gradients.push((gx * gx + gy * gy).sqrt());
        }
    }

    if reference <= 0.0 {
        return Ok(0.0);
    }
    Ok(unit(std_dev(&gradients) / reference))
}

/// Mean absolute deviation of each sample from its valid 4-neighbour mean,
/// normalised by `reference` metres. A map with no usable neighbourhoods is
/// maximally noisy.
pub fn noise_level(depth: Option<&DepthMap>, reference: f32) -> Result<f32> {
    let depth = require(depth, SignalKind::NoiseLevel)?;

    let mut deviation_sum = 0.0;
    let mut count = 0usize;
    for y in 0..depth.height {
        for x in 0..depth.width {
            let Some(d) = depth.depth(x, y) else {
                continue;
            };
            let mut neighbour_sum = 0.0;
            let mut neighbours = 0;
            let candidates = [
                (x.checked_sub(1), Some(y)),
                ((x + 1 < depth.width).then_some(x + 1), Some(y)),
                (Some(x), y.checked_sub(1)),
                (Some(x), (y + 1 < depth.height).then_some(y + 1)),
            ];
            for (nx, ny) in candidates {
                if let (Some(nx), Some(ny)) = (nx, ny)
                    && let Some(n) = depth.depth(nx, ny)
                {
                    neighbour_sum += n;
                    neighbours += 1;
                }
            }
            if neighbours >= 2 {
                deviation_sum += (d - neighbour_sum / neighbours as f32).abs();
                count += 1;
            }
        }
    }

    if count == 0 || reference <= 0.0 {
        return Ok(1.0);
    }
    Ok(unit(deviation_sum / count as f32 / reference))
}

/// Fraction of `grid`×`grid` blocks that contain at least one valid sample.
pub fn surface_completeness(depth: Option<&DepthMap>, grid: usize) -> Result<f32> {
    let depth = require(depth, SignalKind::SurfaceCompleteness)?;
    let grid = grid.max(1) as u32;

    let mut blocks = 0u32;
    let mut covered = 0u32;
    for by in 0..grid {
        let y0 = by * depth.height / grid;
        let y1 = (by + 1) * depth.height / grid;
        for bx in 0..grid {
            let x0 = bx * depth.width / grid;
            let x1 = (bx + 1) * depth.width / grid;
            if x0 == x1 || y0 == y1 {
                continue;
            }
            blocks += 1;
            let any_valid = (y0..y1).any(|y| (x0..x1).any(|x| depth.depth(x, y).is_some()));
            if any_valid {
                covered += 1;
            }
        }
    }

    if blocks == 0 {
        return Ok(0.0);
    }
    Ok(covered as f32 / blocks as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane(width: u32, height: u32, depth: f32) -> DepthMap {
        DepthMap::new(width, height, vec![depth; (width * height) as usize])
    }

    #[test]
    fn test_missing_depth_is_signal_unavailable() {
        for result in [
            surface_complexity(None, 0.05),
            noise_level(None, 0.01),
            surface_completeness(None, 8),
            depth_confidence(None),
        ] {
            assert!(matches!(result, Err(ScanError::SignalUnavailable(_))));
        }
        assert!(matches!(
            point_density(None, 0.5),
            Err(ScanError::SignalUnavailable(SignalKind::PointDensity))
        ));
    }

    #[test]
    fn test_density_against_floor() {
        let mut map = plane(4, 4, 1.0);
        for d in map.depths.iter_mut().take(10) {
            *d = 0.0;
        }
        let reading = point_density(Some(&map), 0.5).unwrap();
        assert_eq!(reading.valid_samples, 6);
        assert_relative_eq!(reading.density, 6.0 / 16.0);
        assert!(!reading.meets_floor);
        assert!(point_density(Some(&map), 0.3).unwrap().meets_floor);
    }

    #[test]
    fn test_flat_plane_is_simple_and_quiet() {
        let map = plane(16, 16, 0.8);
        assert_eq!(surface_complexity(Some(&map), 0.05).unwrap(), 0.0);
        assert_eq!(noise_level(Some(&map), 0.01).unwrap(), 0.0);
        assert_eq!(surface_completeness(Some(&map), 8).unwrap(), 1.0);
    }

    #[test]
    fn test_ramp_has_uniform_gradient() {
        // Constant slope: every gradient is equal, so the spread is zero.
        let depths = (0..64).map(|i| 0.5 + (i % 8) as f32 * 0.01).collect();
        let map = DepthMap::new(8, 8, depths);
        assert_relative_eq!(surface_complexity(Some(&map), 0.05).unwrap(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_steps_raise_complexity() {
        let depths = (0..64)
            .map(|i| if (i % 8) < 4 { 0.5 } else { 0.53 })
            .collect();
        let map = DepthMap::new(8, 8, depths);
        assert!(surface_complexity(Some(&map), 0.05).unwrap() > 0.1);
    }

    #[test]
    fn test_completeness_counts_blocks() {
        let mut map = plane(8, 8, 0.0);
        // Fill only the left half
        for y in 0..8 {
            for x in 0..4 {
                map.depths[y * 8 + x] = 1.0;
            }
        }
        assert_relative_eq!(surface_completeness(Some(&map), 4).unwrap(), 0.5);
    }

    #[test]
    fn test_confidence_normalised() {
        let map = plane(2, 2, 1.0).with_confidence(vec![2, 2, 1, 0]);
        assert_relative_eq!(depth_confidence(Some(&map)).unwrap(), 5.0 / 8.0);
        assert!(depth_confidence(Some(&plane(2, 2, 1.0))).is_err());
    }

    #[test]
    fn test_empty_map_is_noisy() {
        assert_eq!(noise_level(Some(&plane(4, 4, 0.0)), 0.01).unwrap(), 1.0);
    }
}
