use chrono::{Duration, NaiveDateTime, Timelike};

/// Rounds a wall-clock instant to the nearest multiple of `grid_minutes`
/// measured from midnight, clearing seconds and sub-second precision.
///
/// Ties at exactly half a grid step round away from midnight (`f64::round`
/// semantics, i.e. half-up for the positive minute counts used here).
pub fn round_to_grid(instant: NaiveDateTime, grid_minutes: u32) -> NaiveDateTime {
    let grid = f64::from(grid_minutes.max(1));
    let total_minutes = f64::from(instant.hour()) * 60.0
        + f64::from(instant.minute())
        + f64::from(instant.second()) / 60.0;
    let rounded_total = (total_minutes / grid).round() * grid;
    let diff_secs = ((rounded_total - total_minutes) * 60.0).round() as i64;

    let rounded = instant + Duration::seconds(diff_secs);
    rounded
        .with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(rounded)
}

/// Adds the forecast horizon to an already-quantized instant. Calendar
/// rollover (midnight, month boundaries) is handled by chrono.
pub fn forecast_from(quantized: NaiveDateTime, horizon_minutes: u32) -> NaiveDateTime {
    quantized + Duration::minutes(i64::from(horizon_minutes))
}
