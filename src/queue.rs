//! Priority classes and the three FIFO lanes calls wait in.

use crate::client::ManagedCall;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Priority class of a managed call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// May be dropped under high traffic or expire in queue
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    /// Map a raw priority tag; only 0 and 2 are special, anything else is normal
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Priority::Low,
            2 => Priority::High,
            _ => Priority::Normal,
        }
    }

    fn lane(self) -> usize {
        self as usize
    }
}

impl From<Option<i64>> for Priority {
    fn from(raw: Option<i64>) -> Self {
        raw.map(Priority::from_raw).unwrap_or_default()
    }
}

/// A call held back until capacity frees up
#[derive(Debug, Clone)]
pub struct QueuedCall {
    /// Tick at which the call was queued
    pub enqueued_at: u64,
    pub call: ManagedCall,
    /// Sends counted in the window when the call was queued
    pub sent_snapshot: u32,
}

#[derive(Debug, Default)]
pub struct PriorityQueues {
    lanes: [VecDeque<QueuedCall>; 3],
}

impl PriorityQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: Priority, queued: QueuedCall) {
        self.lanes[priority.lane()].push_back(queued);
    }

    pub fn len(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].len()
    }

    pub fn total_len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Take the next call to deliver: high, then normal, then low.
    ///
    /// Low-priority calls older than `low_priority_timeout` ticks are discarded
    /// on the way; a timeout of 0 keeps them forever.
    pub fn pop_next(&mut self, tick_count: u64, low_priority_timeout: u64) -> Option<QueuedCall> {
        if let Some(queued) = self.lanes[Priority::High.lane()].pop_front() {
            return Some(queued);
        }
        if let Some(queued) = self.lanes[Priority::Normal.lane()].pop_front() {
            return Some(queued);
        }

        let low = &mut self.lanes[Priority::Low.lane()];
        while let Some(queued) = low.pop_front() {
            let expired = low_priority_timeout != 0
                && queued.enqueued_at.saturating_add(low_priority_timeout) <= tick_count;
            if !expired {
                return Some(queued);
            }
            debug!(
                channel = %queued.call.channel,
                enqueued_at = queued.enqueued_at,
                tick_count,
                "Discarding expired low-priority call"
            );
        }
        None
    }
}
