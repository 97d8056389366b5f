//! Texture quality via Laplacian variance.
//!
//! Flat or blurred frames give photogrammetry nothing to match; a sharp,
//! textured frame has strong high-frequency content and a large variance of
//! the Laplacian response.

use super::lighting::LumaGrid;
use crate::core::math::unit;

/// Variance of the 3x3 Laplacian over the sampled luma grid.
///
/// ```text
/// [ 0  1  0 ]
/// [ 1 -4  1 ]
/// [ 0  1  0 ]
/// ```
pub fn laplacian_variance(grid: &LumaGrid) -> f32 {
    if grid.width < 3 || grid.height < 3 {
        return 0.0;
    }

    let mut responses = Vec::with_capacity((grid.width - 2) * (grid.height - 2));
    for y in 1..grid.height - 1 {
        for x in 1..grid.width - 1 {
            let lap = grid.at(x, y - 1) + grid.at(x, y + 1) + grid.at(x - 1, y)
                + grid.at(x + 1, y)
                - 4.0 * grid.at(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f32;
    let mean = responses.iter().sum::<f32>() / n;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n
}

/// Texture quality in [0, 1], normalised against `reference` variance.
pub fn texture_quality(grid: &LumaGrid, reference: f32) -> f32 {
    if reference <= 0.0 {
        return 0.0;
    }
    unit(laplacian_variance(grid) / reference)
}
