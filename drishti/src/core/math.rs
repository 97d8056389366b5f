//! Small numeric helpers shared by the extractors and the aggregator.

use std::f32::consts::PI;

/// Clamp to the unit interval, mapping NaN to 0.
#[inline]
pub fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Wrap an angle to [-π, π].
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

/// Population standard deviation (0 for fewer than two values).
pub fn std_dev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

/// Least-squares slope of `values` against their index (x = 0, 1, 2, ...).
///
/// Returns 0 for fewer than two values.
pub fn regression_slope(values: &[f32]) -> f32 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f32;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f32>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f32 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

/// Relative change from `from` to `to`, falling back to the absolute change
/// when `from` is zero.
#[inline]
pub fn relative_change(from: f32, to: f32) -> f32 {
    if from.abs() < f32::EPSILON {
        (to - from).abs()
    } else {
        ((to - from) / from).abs()
    }
}
