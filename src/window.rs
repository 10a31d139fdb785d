use std::collections::VecDeque;

/// Per-tick history of sends, newest tick first.
///
/// `sent` always equals the sum of the history.
#[derive(Debug, Clone)]
pub struct SendWindow {
    tick_count: u64,
    sent: u32,
    per_tick: VecDeque<u32>,
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SendWindow {
    pub fn new() -> Self {
        Self {
            tick_count: 0,
            sent: 0,
            per_tick: VecDeque::from([0]),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Sends still counted inside the window
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn history_len(&self) -> usize {
        self.per_tick.len()
    }

    /// Count a send against the current tick
    pub fn record_send(&mut self) {
        self.sent += 1;
        match self.per_tick.front_mut() {
            Some(current) => *current += 1,
            None => self.per_tick.push_front(1),
        }
    }

    /// Open a new tick and drop history older than `span` ticks.
    ///
    /// Returns true when history aged out, which is when room may have appeared.
    pub fn advance(&mut self, span: usize) -> bool {
        self.per_tick.push_front(0);

        let mut aged = false;
        while self.per_tick.len() > span {
            if let Some(expired) = self.per_tick.pop_back() {
                self.sent -= expired;
            }
            aged = true;
        }
        aged
    }

    pub fn finish_tick(&mut self) {
        self.tick_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_send_counts_current_tick() {
        let mut window = SendWindow::new();
        window.record_send();
        window.record_send();
        assert_eq!(window.sent(), 2);
        assert_eq!(window.history_len(), 1);
    }

    #[test]
    fn test_sends_age_out_after_span() {
        let mut window = SendWindow::new();
        window.record_send();

        for _ in 0..2 {
            assert!(!window.advance(3));
            window.finish_tick();
        }
        assert_eq!(window.sent(), 1);

        assert!(window.advance(3));
        window.finish_tick();
        assert_eq!(window.sent(), 0);
        assert_eq!(window.history_len(), 3);
        assert_eq!(window.tick_count(), 3);
    }

    #[test]
    fn test_later_sends_survive_aging() {
        let mut window = SendWindow::new();
        window.record_send();
        window.advance(2);
        window.record_send();
        window.record_send();

        assert!(window.advance(2));
        assert_eq!(window.sent(), 2);
        assert!(window.advance(2));
        assert_eq!(window.sent(), 0);
    }

    #[test]
    fn test_shrinking_span_trims_history() {
        let mut window = SendWindow::new();
        for _ in 0..5 {
            window.record_send();
            window.advance(10);
        }
        assert_eq!(window.sent(), 5);
        assert_eq!(window.history_len(), 6);

        window.record_send();
        assert!(window.advance(2));
        assert_eq!(window.history_len(), 2);
        assert_eq!(window.sent(), 1);
    }
}
