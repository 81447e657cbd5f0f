const DEGREES_PER_HOUR: f64 = 30.0;
const DEGREES_PER_MINUTE: f64 = 0.5;

/// Wraps any finite angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Parses an inspection clock reading such as `"09:00"`, `"3:30"` or
/// `"11:45:10"` into degrees, with 12 o'clock at 0° and 3 o'clock at 90°.
pub fn parse_clock(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut parts = trimmed.split(':').map(str::trim);
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: f64 = match parts.next() {
        Some(raw) => raw.parse().ok()?,
        None => 0.0,
    };
    let seconds: f64 = match parts.next() {
        Some(raw) => raw.parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() || !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds)
    {
        return None;
    }

    let degrees = f64::from(hours % 12) * DEGREES_PER_HOUR
        + minutes * DEGREES_PER_MINUTE
        + seconds * DEGREES_PER_MINUTE / 60.0;
    Some(normalize_degrees(degrees))
}

/// Shortest angular distance between two clock positions, in [0, 180].
pub fn circular_difference(left: f64, right: f64) -> f64 {
    let diff = (left - right).abs() % 360.0;
    diff.min(360.0 - diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_clock_strings() {
        assert_eq!(parse_clock("12:00"), Some(0.0));
        assert_eq!(parse_clock("3:00"), Some(90.0));
        assert_eq!(parse_clock("06:00"), Some(180.0));
        assert_eq!(parse_clock("09:30"), Some(285.0));
        assert_eq!(parse_clock("9"), Some(270.0));
    }

    #[test]
    fn rejects_malformed_clock_strings() {
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("noon"), None);
        assert_eq!(parse_clock("3:75"), None);
        assert_eq!(parse_clock("1:2:3:4"), None);
    }

    #[test]
    fn normalizes_into_half_open_range() {
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }

    #[test]
    fn circular_difference_wraps_through_twelve() {
        assert_eq!(circular_difference(350.0, 10.0), 20.0);
        assert_eq!(circular_difference(10.0, 350.0), 20.0);
        assert_eq!(circular_difference(0.0, 180.0), 180.0);
        assert_eq!(circular_difference(90.0, 90.0), 0.0);
    }
}
