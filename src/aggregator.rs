//! Telemetry Aggregator - owner of all per-channel state
//!
//! Applies the pipeline to each line in arrival order:
//! 1. **Framing**: raw bytes are split into lines
//! 2. **Parsing**: each line becomes a reading, an acknowledgement, or an error
//! 3. **Skip gate**: the first readings per channel after connect are dropped
//! 4. **Filtering**: the adaptive filter produces the display value
//! 5. **History**: (raw, filtered, timestamp) goes into the channel window
//! 6. **Thresholds**: the warning flag is recomputed
//!
//! The aggregator is moved into the ingestion thread for the lifetime of a
//! connection and is the only writer of this state. Readers see it through
//! the [`SnapshotStore`], which receives a complete new snapshot per reading.

use crate::adaptive_filter::{FilterBank, FilterPhase};
use crate::channel::ChannelId;
use crate::framer::LineFramer;
use crate::history::HistoryStore;
use crate::error::ParseError;
use crate::parser::{parse_line, AckEvent, Reading, Telemetry};
use crate::skip_gate::{SkipGate, SKIP_COUNT};
use crate::status::{ChannelSnapshot, IngestStats, SnapshotStore};
use crate::thresholds;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// What happened to one line
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Reading went through the filter; carries the new filtered value
    Accepted { channel: ChannelId, filtered: f64 },
    /// Reading consumed by the post-connect skip gate
    Skipped(ChannelId),
    /// Controller acknowledgement (logged only)
    Ack(AckEvent),
    /// Malformed line, dropped
    Rejected(ParseError),
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    raw: f64,
    filtered: f64,
    warning: bool,
    phase: FilterPhase,
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState {
            raw: 0.0,
            filtered: 0.0,
            warning: false,
            phase: FilterPhase::Calibrating,
        }
    }
}

pub struct TelemetryAggregator {
    framer: LineFramer,
    gate: SkipGate,
    filters: FilterBank,
    history: HistoryStore,
    current: [ChannelState; 3],
    stats: IngestStats,
    store: Arc<SnapshotStore>,
    started: Instant,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::with_store(Arc::new(SnapshotStore::new()))
    }

    pub fn with_store(store: Arc<SnapshotStore>) -> Self {
        TelemetryAggregator {
            framer: LineFramer::new(),
            gate: SkipGate::new(),
            filters: FilterBank::new(),
            history: HistoryStore::new(),
            current: [ChannelState::default(); 3],
            stats: IngestStats::default(),
            store,
            started: Instant::now(),
        }
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    pub fn snapshot(&self, channel: ChannelId) -> Arc<ChannelSnapshot> {
        self.store.channel(channel)
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn filter_phase(&self, channel: ChannelId) -> FilterPhase {
        self.filters.get(channel).phase()
    }

    pub fn skipped(&self, channel: ChannelId) -> u32 {
        self.gate.skipped(channel)
    }

    /// Seconds since the aggregator was created (history timestamps)
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Start of a new connection: filters and skip gate restart for every
    /// channel. History and current values are kept; the published phase
    /// goes back to `Calibrating` with the filters.
    pub fn on_connect(&mut self) {
        self.filters.reset_all();
        self.gate.reset();
        self.framer.reset();
        for channel in ChannelId::ALL {
            self.current[channel.index()].phase = self.filters.get(channel).phase();
            self.publish(channel);
        }
        info!("[Ingest] New session: filters recalibrating, skip gate armed");
    }

    /// Feed raw transport bytes, returning the outcome of every completed line.
    pub fn ingest_bytes(&mut self, bytes: &[u8], at: f64) -> Vec<IngestOutcome> {
        let lines = self.framer.feed(bytes);
        lines.iter().map(|line| self.ingest_line(line, at)).collect()
    }

    /// Apply one framed line.
    pub fn ingest_line(&mut self, line: &str, at: f64) -> IngestOutcome {
        self.stats.lines += 1;
        self.stats.last_line = Some(line.to_string());

        let outcome = match parse_line(line) {
            Ok(Telemetry::Reading(reading)) => self.apply_reading(reading, at),
            Ok(Telemetry::Ack(ack)) => {
                self.stats.acks += 1;
                log_ack(&ack);
                IngestOutcome::Ack(ack)
            }
            Err(e) => {
                self.stats.parse_errors += 1;
                debug!("[Ingest] Dropped '{}': {}", line, e);
                IngestOutcome::Rejected(e)
            }
        };

        self.store.publish_stats(self.stats.clone());
        outcome
    }

    /// Count a transient transport read failure.
    pub fn note_read_error(&mut self) {
        self.stats.read_errors += 1;
        self.store.publish_stats(self.stats.clone());
    }

    // ========================================================================
    // READING PIPELINE
    // ========================================================================

    fn apply_reading(&mut self, reading: Reading, at: f64) -> IngestOutcome {
        let channel = reading.channel;

        if !self.gate.admit(channel) {
            self.stats.skipped += 1;
            debug!(
                "[Ingest] Skipped {} reading {} ({}/{})",
                channel,
                reading.value,
                self.gate.skipped(channel),
                SKIP_COUNT
            );
            return IngestOutcome::Skipped(channel);
        }

        let out = self.filters.filter(channel, reading.value);
        self.history.append(channel, reading.value, out.value, at);
        self.stats.readings += 1;

        let state = ChannelState {
            raw: reading.value,
            filtered: out.value,
            warning: thresholds::evaluate(channel, out.value),
            phase: out.phase,
        };
        let previous = std::mem::replace(&mut self.current[channel.index()], state);
        if previous.warning != state.warning {
            info!(
                "[Ingest] {} warning {} (filtered={:.2})",
                channel,
                if state.warning { "raised" } else { "cleared" },
                state.filtered
            );
        }

        self.publish(channel);
        IngestOutcome::Accepted {
            channel,
            filtered: out.value,
        }
    }

    fn publish(&self, channel: ChannelId) {
        let state = &self.current[channel.index()];
        self.store.publish(ChannelSnapshot {
            channel,
            filtered: state.filtered,
            raw: state.raw,
            display: thresholds::display_value(channel, state.filtered),
            warning: state.warning,
            phase: state.phase,
            history: self.history.snapshot(channel),
        });
    }
}

fn log_ack(ack: &AckEvent) {
    match ack {
        AckEvent::LedStatus { gas, light, voltage } => {
            info!("[Device] LED status: gas={} ldr={} volt={}", gas, light, voltage)
        }
        AckEvent::ModeChanged(mode) => info!("[Device] Mode changed to: {}", mode),
        AckEvent::Led { led, on } => {
            info!("[Device] {} turned {}", led, if *on { "ON" } else { "OFF" })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive_filter::CALIBRATION_SAMPLES;
    use crate::history::HISTORY_CAPACITY;

    fn feed_gas(agg: &mut TelemetryAggregator, value: f64, n: usize) {
        for i in 0..n {
            agg.ingest_line(&format!("GAS:{},350", value), i as f64);
        }
    }

    #[test]
    fn test_sentinels_never_reach_filter_or_history() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();

        feed_gas(&mut agg, 9999.0, SKIP_COUNT as usize);
        assert!(agg.snapshot(ChannelId::Gas).history.is_empty());
        assert_eq!(agg.stats().skipped, SKIP_COUNT as u64);

        let outcome = agg.ingest_line("GAS:120,350", 1.0);
        assert_eq!(
            outcome,
            IngestOutcome::Accepted { channel: ChannelId::Gas, filtered: 120.0 }
        );
        let snap = agg.snapshot(ChannelId::Gas);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].raw, 120.0);
        assert!(snap.history.iter().all(|e| e.raw != 9999.0 && e.filtered != 9999.0));
    }

    #[test]
    fn test_calibration_output_through_pipeline() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        feed_gas(&mut agg, 0.0, SKIP_COUNT as usize);

        let values = [5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0, 100.0, 0.0, 5.5, 4.5, 6.5, 3.5];
        let mut last = None;
        for (i, v) in values.iter().enumerate() {
            last = Some(agg.ingest_line(&format!("GAS:{},350", v), i as f64));
        }
        // Sorted middle of the 15 values
        assert_eq!(
            last,
            Some(IngestOutcome::Accepted { channel: ChannelId::Gas, filtered: 5.0 })
        );
        assert_eq!(agg.filter_phase(ChannelId::Gas), FilterPhase::Stabilizing);
    }

    #[test]
    fn test_parse_error_leaves_channel_untouched() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        feed_gas(&mut agg, 100.0, SKIP_COUNT as usize + 3);
        let before = agg.snapshot(ChannelId::Gas);
        let skipped_before = agg.skipped(ChannelId::Gas);

        let outcome = agg.ingest_line("GAS:abc", 5.0);
        assert!(matches!(outcome, IngestOutcome::Rejected(_)));
        assert_eq!(agg.stats().parse_errors, 1);
        assert_eq!(*agg.snapshot(ChannelId::Gas), *before);
        assert_eq!(agg.skipped(ChannelId::Gas), skipped_before);
        assert_eq!(agg.store().stats().parse_errors, 1);
    }

    #[test]
    fn test_parse_errors_do_not_advance_skip_gate() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        for _ in 0..20 {
            agg.ingest_line("LDR:oops", 0.0);
            agg.ingest_line("GAS:1,2", 0.0);
        }
        assert_eq!(agg.skipped(ChannelId::Light), 0);
        assert_eq!(agg.skipped(ChannelId::Gas), SKIP_COUNT);
    }

    #[test]
    fn test_warning_flag_follows_filtered_value() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        feed_gas(&mut agg, 0.0, SKIP_COUNT as usize);
        agg.ingest_line("GAS:500,350", 0.0);
        let snap = agg.snapshot(ChannelId::Gas);
        assert!(snap.warning);
        assert_eq!(snap.display, 500.0);

        for _ in 0..SKIP_COUNT {
            agg.ingest_line("VOLT:0,1.0,3.3", 0.0);
        }
        agg.ingest_line("VOLT:0,2.5,3.3", 0.0);
        let snap = agg.snapshot(ChannelId::Temperature);
        assert!(snap.warning);
        assert!((snap.display - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_reconnect_keeps_history_and_resets_filters() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        for ch in ["GAS:10,1", "LDR:0,10", "VOLT:0,1.0,2"] {
            for i in 0..(SKIP_COUNT as usize + CALIBRATION_SAMPLES + 2) {
                agg.ingest_line(ch, i as f64);
            }
        }
        for ch in ChannelId::ALL {
            assert_eq!(agg.filter_phase(ch), FilterPhase::Stabilizing);
        }
        let history_before = agg.snapshot(ChannelId::Light).history.clone();
        assert_eq!(history_before.len(), CALIBRATION_SAMPLES + 2);
        let snaps_before: Vec<_> = ChannelId::ALL.into_iter().map(|ch| agg.snapshot(ch)).collect();
        assert!(snaps_before.iter().all(|s| s.phase == FilterPhase::Stabilizing));

        agg.on_connect();
        for ch in ChannelId::ALL {
            assert_eq!(agg.filter_phase(ch), FilterPhase::Calibrating);
            assert_eq!(agg.skipped(ch), 0);
        }
        assert_eq!(agg.snapshot(ChannelId::Light).history, history_before);
        for (ch, before) in ChannelId::ALL.into_iter().zip(&snaps_before) {
            let snap = agg.snapshot(ch);
            assert_eq!(snap.phase, FilterPhase::Calibrating);
            assert_eq!(snap.filtered, before.filtered);
            assert_eq!(snap.warning, before.warning);
        }

        // Gate is armed again: the next reading is skipped, not appended
        assert_eq!(agg.ingest_line("LDR:0,77", 99.0), IngestOutcome::Skipped(ChannelId::Light));
        assert_eq!(agg.snapshot(ChannelId::Light).history, history_before);
    }

    #[test]
    fn test_history_bounded_over_long_runs() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        for i in 0..500 {
            agg.ingest_line(&format!("LDR:{},{}", i, i), i as f64);
            assert!(agg.snapshot(ChannelId::Light).history.len() <= HISTORY_CAPACITY);
        }
        let history = &agg.snapshot(ChannelId::Light).history;
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.last().map(|e| e.raw), Some(499.0));
        assert_eq!(history.first().map(|e| e.raw), Some((500 - HISTORY_CAPACITY) as f64));
    }

    #[test]
    fn test_bytes_are_framed_and_acks_counted() {
        let mut agg = TelemetryAggregator::new();
        agg.on_connect();
        let mut outcomes = agg.ingest_bytes(b"MODE_CHANGED:AUTO\nLED1:O", 0.0);
        outcomes.extend(agg.ingest_bytes(b"N\nLED_STATUS:0,1,0\n", 0.0));
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o, IngestOutcome::Ack(_))));
        assert_eq!(agg.stats().acks, 3);
        assert_eq!(agg.stats().last_line.as_deref(), Some("LED_STATUS:0,1,0"));
    }

    #[test]
    fn test_overlong_line_never_becomes_a_reading() {
        let mut stream = b"JUNK".to_vec();
        stream.extend(std::iter::repeat(b'x').take(4500));
        stream.extend_from_slice(b"GAS:999,1\nLED1:ON\n");

        let mut whole = TelemetryAggregator::new();
        whole.on_connect();
        let expected = whole.ingest_bytes(&stream, 0.0);
        assert_eq!(expected.len(), 1);
        assert!(matches!(expected[0], IngestOutcome::Ack(_)));

        // Split right before the trailing GAS reading and at an arbitrary size
        for split in [4504, 4096, 4500] {
            let mut agg = TelemetryAggregator::new();
            agg.on_connect();
            let mut got = Vec::new();
            for chunk in stream.chunks(split) {
                got.extend(agg.ingest_bytes(chunk, 0.0));
            }
            assert_eq!(got, expected, "split at {}", split);
            assert_eq!(agg.skipped(ChannelId::Gas), 0);
            assert_eq!(agg.stats().skipped, 0);
            assert_eq!(agg.stats().lines, 1);
        }
    }
}
