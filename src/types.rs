//! Core domain types for candle data.

use std::time::{SystemTime, UNIX_EPOCH};

/// One OHLCV candle. Cache-line aligned, fixed layout for bulk binary I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(64))]
pub struct Ohlcv {
    /// Candle open time, milliseconds since the Unix epoch.
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Notional traded over the candle.
    pub cost: f64,
}

/// Candle period in milliseconds for a wire resolution string.
///
/// Accepted resolutions: `"1"`, `"5"`, `"15"`, `"60"`, `"1D"`. `"1D"` counts
/// as 1440 minutes here; the string sent on the wire stays `"1D"`.
#[must_use]
pub fn resolution_period_ms(resolution: &str) -> Option<i64> {
    let minutes: i64 = match resolution {
        "1" => 1,
        "5" => 5,
        "15" => 15,
        "60" => 60,
        "1D" => 1440,
        _ => return None,
    };
    Some(minutes * 60_000)
}

/// Wall-clock milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_minutes() {
        assert_eq!(resolution_period_ms("1"), Some(60_000));
        assert_eq!(resolution_period_ms("5"), Some(300_000));
        assert_eq!(resolution_period_ms("15"), Some(900_000));
        assert_eq!(resolution_period_ms("60"), Some(3_600_000));
    }

    #[test]
    fn resolution_one_day_is_1440_minutes() {
        assert_eq!(resolution_period_ms("1D"), Some(86_400_000));
    }

    #[test]
    fn resolution_rejects_unknown() {
        assert_eq!(resolution_period_ms("1440"), None);
        assert_eq!(resolution_period_ms("2"), None);
        assert_eq!(resolution_period_ms(""), None);
        assert_eq!(resolution_period_ms("1d"), None);
    }

    #[test]
    fn now_ms_is_past_2020() {
        // 2020-01-01 in ms -- sanity bound, not an exact clock test.
        assert!(now_ms() > 1_577_836_800_000);
    }
}
