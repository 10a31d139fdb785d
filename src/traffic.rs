/// Whether the buffer is under high traffic.
///
/// Queued calls count toward the load alongside sends still inside the window,
/// so a deep backlog alone can trip the stricter throttle and the low-priority
/// drop rule.
pub fn is_high_traffic(threshold: f64, sent_limit: u32, sent: u32, queued: usize) -> bool {
    let capacity = f64::from(sent_limit.saturating_sub(1));
    threshold * capacity <= f64::from(sent) + queued as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_trips_at_capacity() {
        assert!(!is_high_traffic(1.0, 20, 18, 0));
        assert!(is_high_traffic(1.0, 20, 19, 0));
        assert!(is_high_traffic(1.0, 20, 10, 9));
    }

    #[test]
    fn test_queued_calls_count_as_load() {
        assert!(!is_high_traffic(0.5, 11, 0, 4));
        assert!(is_high_traffic(0.5, 11, 0, 5));
    }

    #[test]
    fn test_zero_threshold_is_always_high() {
        assert!(is_high_traffic(0.0, 20, 0, 0));
    }
}
