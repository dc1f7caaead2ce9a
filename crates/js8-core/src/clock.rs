use chrono::Utc;

/// Offset subtracted from wall time for STATION.STATUS ids
/// (2017-07-06T00:00:00Z, the service's status epoch).
pub const STATUS_EPOCH_MS: i64 = 1_499_299_200_000;

/// Wall time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The `_ID` carried by STATION.STATUS frames.
pub fn status_id() -> i64 {
    now_ms() - STATUS_EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_id_is_past_the_status_epoch() {
        let id = status_id();
        assert!(id > 0);
        assert!(id < now_ms());
    }
}
