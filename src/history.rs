use crate::channel::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entries kept per channel
pub const HISTORY_CAPACITY: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub raw: f64,
    pub filtered: f64,
    /// Seconds since the monitor started
    pub timestamp: f64,
}

/// Fixed-capacity FIFO window of recent samples for each channel.
///
/// Survives reconnects; only the filter state is reset when a new session starts.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    windows: [VecDeque<HistoryEntry>; 3],
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            windows: std::array::from_fn(|_| VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    pub fn append(&mut self, channel: ChannelId, raw: f64, filtered: f64, timestamp: f64) {
        let window = &mut self.windows[channel.index()];
        if window.len() >= HISTORY_CAPACITY {
            window.pop_front();
        }
        window.push_back(HistoryEntry {
            raw,
            filtered,
            timestamp,
        });
    }

    /// Entries oldest to newest.
    pub fn snapshot(&self, channel: ChannelId) -> Vec<HistoryEntry> {
        self.windows[channel.index()].iter().copied().collect()
    }

    pub fn len(&self, channel: ChannelId) -> usize {
        self.windows[channel.index()].len()
    }

    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.windows[channel.index()].is_empty()
    }
}
