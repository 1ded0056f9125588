use crate::adaptive_filter::FilterPhase;
use crate::channel::ChannelId;
use crate::history::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Point-in-time view of one channel, handed from the ingestion loop to readers
///
/// Readers get an `Arc` to an immutable value; the ingestion loop builds a
/// fresh snapshot per reading and swaps it in, so a reader never observes a
/// half-updated channel and never holds a lock while it works with the data.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelSnapshot {
    pub channel: ChannelId,

    /// Current filtered value in wire units (ppm, ADC counts, volts)
    pub filtered: f64,

    /// Raw value of the most recent accepted reading
    pub raw: f64,

    /// Filtered value in display units (ppm, ADC counts, °C)
    pub display: f64,

    /// Warning flag (for light: the "unhealthy" flag)
    pub warning: bool,

    /// Filter phase that produced `filtered`
    pub phase: FilterPhase,

    /// Recent samples, oldest first
    pub history: Vec<HistoryEntry>,
}

impl ChannelSnapshot {
    pub fn empty(channel: ChannelId) -> Self {
        ChannelSnapshot {
            channel,
            filtered: 0.0,
            raw: 0.0,
            display: 0.0,
            warning: false,
            phase: FilterPhase::Calibrating,
            history: Vec::new(),
        }
    }
}

/// Counters maintained by the ingestion loop
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct IngestStats {
    /// Non-empty lines framed
    pub lines: u64,
    /// Readings that reached the filter
    pub readings: u64,
    /// Readings consumed by the post-connect skip gate
    pub skipped: u64,
    /// Acknowledgements received from the controller
    pub acks: u64,
    /// Lines that failed to parse
    pub parse_errors: u64,
    /// Transient read errors survived
    pub read_errors: u64,
    /// Most recent line, for debugging
    pub last_line: Option<String>,
}

/// All channels plus counters, for serialisation
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TelemetrySnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub stats: IngestStats,
}

/// Single-writer, many-reader handoff of snapshots
#[derive(Debug)]
pub struct SnapshotStore {
    channels: [RwLock<Arc<ChannelSnapshot>>; 3],
    stats: RwLock<Arc<IngestStats>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore {
            channels: ChannelId::ALL.map(|ch| RwLock::new(Arc::new(ChannelSnapshot::empty(ch)))),
            stats: RwLock::new(Arc::new(IngestStats::default())),
        }
    }

    pub fn publish(&self, snapshot: ChannelSnapshot) {
        let slot = &self.channels[snapshot.channel.index()];
        let fresh = Arc::new(snapshot);
        *slot.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    pub fn publish_stats(&self, stats: IngestStats) {
        let fresh = Arc::new(stats);
        *self.stats.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    pub fn channel(&self, channel: ChannelId) -> Arc<ChannelSnapshot> {
        self.channels[channel.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            channels: ChannelId::ALL
                .iter()
                .map(|&ch| (*self.channel(ch)).clone())
                .collect(),
            stats: (*self.stats()).clone(),
        }
    }
}
