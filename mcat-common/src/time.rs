//! Timestamp utilities
//!
//! All catalog timestamps are epoch milliseconds stored as `i64`.

use chrono::Utc;

/// Current UTC time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a track length as `M:SS`
///
/// Whole seconds only (floor). Minutes are not wrapped into hours, so a
/// 75-minute recording reads `75:03`. Zero or negative input yields `0:00`.
pub fn format_duration_ms(duration_ms: i64) -> String {
    let total_secs = duration_ms.max(0) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_ms_returns_recent_timestamp() {
        let ts = now_ms();
        assert!(ts > 946_684_800_000); // 2000-01-01
        assert!(ts < 4_102_444_800_000); // 2100-01-01
    }

    #[tokio::test]
    async fn test_now_ms_successive_calls_advance() {
        let t1 = now_ms();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let t2 = now_ms();
        assert!(t2 > t1);
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(0), Duration::from_millis(0));
        assert_eq!(millis_to_duration(1000), Duration::from_secs(1));
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0:00");
        assert_eq!(format_duration_ms(-500), "0:00");
        assert_eq!(format_duration_ms(999), "0:00");
        assert_eq!(format_duration_ms(5_000), "0:05");
        assert_eq!(format_duration_ms(61_000), "1:01");
        assert_eq!(format_duration_ms(215_999), "3:35");
        assert_eq!(format_duration_ms(4_503_000), "75:03");
    }
}
