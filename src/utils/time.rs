use jiff::Timestamp;

/// Offset between the Windows epoch (1601-01-01) and the Unix epoch,
/// in 100ns FILETIME ticks.
const EPOCH_DELTA_TICKS: u64 = 116_444_736_000_000_000;

/// Convert a FILETIME to fractional seconds since the Unix epoch.
///
/// The subtraction happens in the integer domain; converting the raw tick
/// count to `f64` first would cost another ~3us of precision at modern dates.
pub fn filetime_to_unix_secs(filetime: u64) -> f64 {
    (i128::from(filetime) - i128::from(EPOCH_DELTA_TICKS)) as f64 / 10_000_000.0
}

/// Convert a FILETIME to a [`Timestamp`], clamping garbage values (as seen
/// in dirty record headers) to the Unix epoch.
pub fn timestamp_from_filetime(filetime: u64) -> Timestamp {
    let nanos = (i128::from(filetime) - i128::from(EPOCH_DELTA_TICKS)) * 100;
    Timestamp::from_nanosecond(nanos).unwrap_or(Timestamp::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_windows_epoch_maps_to_negative_unix_time() {
        assert_eq!(filetime_to_unix_secs(0), -11_644_473_600.0);
    }

    #[test]
    fn test_unix_epoch() {
        assert_eq!(filetime_to_unix_secs(EPOCH_DELTA_TICKS), 0.0);
        assert_eq!(
            timestamp_from_filetime(EPOCH_DELTA_TICKS),
            Timestamp::UNIX_EPOCH
        );
    }

    #[test]
    fn test_known_timestamp() {
        // 2016-07-08T18:12:51.681640100Z, from a Security.evtx record header.
        let filetime = 131_127_223_716_816_401;
        let ts = timestamp_from_filetime(filetime);
        assert_eq!(ts.to_string(), "2016-07-08T18:12:51.6816401Z");
    }

    #[test]
    fn test_round_trip_is_exact_when_seconds_are_representable() {
        let filetime = EPOCH_DELTA_TICKS + 16_000_000_000_000_000;
        let secs = filetime_to_unix_secs(filetime);
        let back = (secs * 10_000_000.0).round() as u64 + EPOCH_DELTA_TICKS;
        assert_eq!(filetime, back);
    }

    #[test]
    fn test_round_trip_stays_within_f64_granularity() {
        // f64 seconds carry ~100ns granularity at modern dates, so the
        // round trip cannot be better than a few ticks here.
        let filetime = 131_127_223_716_816_401_u64;
        let secs = filetime_to_unix_secs(filetime);
        let back = (secs * 10_000_000.0).round() as u64 + EPOCH_DELTA_TICKS;
        assert!(filetime.abs_diff(back) <= 3);
    }
}
