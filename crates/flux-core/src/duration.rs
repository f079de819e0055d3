//! Duration parsing helpers for `timeout` and `retry_delay` (§4.7, §8).

use std::time::Duration;

/// Parses a `retry_delay` string; an empty or unparseable value falls back
/// to one second (§4.7).
pub fn parse_retry_delay(raw: Option<&str>) -> Duration {
    match raw {
        Some(s) if !s.trim().is_empty() => {
            humantime::parse_duration(s.trim()).unwrap_or(Duration::from_secs(1))
        }
        _ => Duration::from_secs(1),
    }
}

/// Parses a `timeout` string. `None`, empty, or `"0"` mean "no timeout"
/// (§8 boundary case). An unparseable non-empty value is an error the
/// caller should surface as `ExecError::BadDuration`.
pub fn parse_timeout(raw: Option<&str>) -> Result<Option<Duration>, ()> {
    let Some(s) = raw else { return Ok(None) };
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "0" || trimmed == "0s" {
        return Ok(None);
    }
    humantime::parse_duration(trimmed).map(Some).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_defaults_on_empty() {
        assert_eq!(parse_retry_delay(None), Duration::from_secs(1));
        assert_eq!(parse_retry_delay(Some("")), Duration::from_secs(1));
        assert_eq!(parse_retry_delay(Some("not-a-duration")), Duration::from_secs(1));
    }

    #[test]
    fn retry_delay_parses_units() {
        assert_eq!(parse_retry_delay(Some("5s")), Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(parse_timeout(Some("0")).unwrap(), None);
        assert_eq!(parse_timeout(None).unwrap(), None);
    }

    #[test]
    fn bad_timeout_is_error() {
        assert!(parse_timeout(Some("banana")).is_err());
    }

    #[test]
    fn valid_timeout_parses() {
        assert_eq!(
            parse_timeout(Some("30s")).unwrap(),
            Some(Duration::from_secs(30))
        );
    }
}
