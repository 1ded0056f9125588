//! Newline framing for the telemetry byte stream.
//!
//! Serial reads return whatever bytes happen to be available, so a single
//! telemetry line may arrive split over several reads (or several lines may
//! arrive in one). The framer keeps the trailing partial segment between
//! calls; feeding a stream in any chunking yields the same line sequence.
//!
//! A line longer than [`MAX_LINE_LEN`] bytes is dropped whole: once the limit
//! is crossed the framer discards input up to the next newline, so no part of
//! an over-long line is ever emitted, however the bytes were split.

/// Longest accepted line, excluding the newline.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
    /// Inside an over-long line; bytes are dropped until the next newline
    discarding: bool,
    overflowed: u64,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by them.
    ///
    /// Lines are decoded lossily (non-UTF-8 bytes become U+FFFD), trimmed,
    /// and dropped when empty.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos]);
            if self.discarding {
                self.discarding = false;
            } else if let Some(line) = Self::finish(&self.partial) {
                lines.push(line);
            }
            self.partial.clear();
            rest = &rest[pos + 1..];
        }

        self.append(rest);
        lines
    }

    /// Drop any carried-over partial line (used when a new session starts).
    pub fn reset(&mut self) {
        self.partial.clear();
        self.discarding = false;
    }

    /// True while the rest of an over-long line is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Bytes currently held waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    /// Number of times an over-long partial line was discarded.
    pub fn overflow_count(&self) -> u64 {
        self.overflowed
    }

    fn append(&mut self, segment: &[u8]) {
        if self.discarding {
            return;
        }
        if self.partial.len() + segment.len() > MAX_LINE_LEN {
            self.overflowed += 1;
            log::warn!(
                "[Framer] Dropping line longer than {} bytes",
                MAX_LINE_LEN
            );
            self.partial.clear();
            self.discarding = true;
            return;
        }
        self.partial.extend_from_slice(segment);
    }

    fn finish(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
