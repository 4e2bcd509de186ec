//! Evenly spaced sweep values across a parameter range

/// Round to 3 decimal places to keep binary float noise out of the
/// generated values
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Produce `steps` evenly spaced values across [min, max], endpoints
/// included. `steps <= 1` degenerates to the single value `[min]`.
///
/// The range is taken as given: callers reject min >= max before
/// generating, and an inverted range simply interpolates downward.
pub fn interpolate(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps <= 1 {
        return vec![min];
    }

    let span = max - min;
    let last = (steps - 1) as f64;
    (0..steps)
        .map(|i| round3(min + i as f64 * span / last))
        .collect()
}
