//! Parsing for ffmpeg's `-progress` key/value output.
//!
//! With `-progress pipe:1` ffmpeg writes blocks such as
//!
//! ```text
//! out_time_us=2500000
//! out_time=00:00:02.500000
//! progress=continue
//! ```
//!
//! to stdout. Only `out_time` is consumed; every other key is ignored.

use std::time::Duration;

/// Parse a time string in `HH:MM:SS.frac` format.
///
/// # Returns
/// * `Some(Duration)` if the string is a non-negative timestamp
/// * `None` for malformed input, `N/A`, or negative values (ffmpeg emits
///   those before the first packet is muxed)
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use ffmpeg_runner::progress::parse_time;
///
/// assert_eq!(parse_time("00:00:10.500000"), Some(Duration::from_millis(10_500)));
/// assert_eq!(parse_time("01:30:00.00"), Some(Duration::from_secs(5400)));
/// assert_eq!(parse_time("N/A"), None);
/// ```
pub fn parse_time(time_str: &str) -> Option<Duration> {
    let time_str = time_str.trim();
    if time_str.starts_with('-') {
        return None;
    }

    let mut parts = time_str.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = hours * 3600 + minutes * 60;
    Some(Duration::from_secs(whole) + Duration::from_secs_f64(seconds))
}

/// Extract the elapsed output time from one `-progress` line.
///
/// Returns `None` for any line that is not an `out_time=` entry or whose
/// value cannot be parsed.
pub fn parse_out_time(line: &str) -> Option<Duration> {
    line.trim().strip_prefix("out_time=").and_then(parse_time)
}

/// Parse a seconds value as printed by ffprobe (`12.345000`).
pub fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:00:00.00"), Some(Duration::ZERO));
        assert_eq!(parse_time("00:00:10.50"), Some(Duration::from_millis(10_500)));
        assert_eq!(parse_time("00:01:00.00"), Some(Duration::from_secs(60)));
        assert_eq!(parse_time("01:30:45.25"), Some(Duration::from_millis(5_445_250)));
        assert_eq!(parse_time("100:00:00.000000"), Some(Duration::from_secs(360_000)));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert_eq!(parse_time("invalid"), None);
        assert_eq!(parse_time("00:00"), None);
        assert_eq!(parse_time("00:00:00:00"), None);
        assert_eq!(parse_time("N/A"), None);
        assert_eq!(parse_time("-00:00:00.023220"), None);
        assert_eq!(parse_time("00:00:-1.0"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_parse_out_time() {
        assert_eq!(
            parse_out_time("out_time=00:00:02.500000"),
            Some(Duration::from_millis(2_500))
        );
        assert_eq!(
            parse_out_time("  out_time=00:01:00.000000\r"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(parse_out_time("out_time=N/A"), None);
        assert_eq!(parse_out_time("out_time_us=2500000"), None);
        assert_eq!(parse_out_time("out_time_ms=2500000"), None);
        assert_eq!(parse_out_time("progress=continue"), None);
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("12.500000"), Some(Duration::from_millis(12_500)));
        assert_eq!(parse_seconds(" 3\n"), Some(Duration::from_secs(3)));
        assert_eq!(parse_seconds("N/A"), None);
        assert_eq!(parse_seconds("-1.0"), None);
        assert_eq!(parse_seconds("inf"), None);
    }
}
