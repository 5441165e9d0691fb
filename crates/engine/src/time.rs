/// Number of decimals shown for segment boundaries.
pub const DISPLAY_DECIMALS: i32 = 2;

/// Rounds `seconds` to [`DISPLAY_DECIMALS`] places for display only.
///
/// Stored and serialized values keep full precision.
///
/// # Example
/// ```
/// use seam_engine::time::round_for_display;
///
/// assert_eq!(round_for_display(12.345_6), 12.35);
/// ```
pub fn round_for_display(seconds: f64) -> f64 {
    let scale = 10_f64.powi(DISPLAY_DECIMALS);
    (seconds * scale).round() / scale
}

/// Formats `seconds` with [`DISPLAY_DECIMALS`] places.
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.*}", DISPLAY_DECIMALS as usize, round_for_display(seconds))
}

/// Clamps `seconds` into `[0, +inf)`; NaN maps to `0`.
pub fn clamp_non_negative(seconds: f64) -> f64 {
    if seconds.is_nan() { 0.0 } else { seconds.max(0.0) }
}

/// Returns true when a seek from `current` to `target` can be skipped.
pub fn within_seek_epsilon(current: f64, target: f64, epsilon: f64) -> bool {
    (current - target).abs() < epsilon
}
