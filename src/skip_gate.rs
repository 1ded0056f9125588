use crate::channel::ChannelId;

/// Readings discarded per channel after every (re)connect.
pub const SKIP_COUNT: u32 = 10;

/// Drops the first readings of each channel after a connect to suppress
/// controller power-on transients.
#[derive(Debug, Clone, Default)]
pub struct SkipGate {
    skipped: [u32; 3],
}

impl SkipGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the reading may pass; false if it was consumed by the gate.
    pub fn admit(&mut self, channel: ChannelId) -> bool {
        let count = &mut self.skipped[channel.index()];
        if *count < SKIP_COUNT {
            *count += 1;
            false
        } else {
            true
        }
    }

    pub fn skipped(&self, channel: ChannelId) -> u32 {
        self.skipped[channel.index()]
    }

    pub fn reset(&mut self) {
        self.skipped = [0; 3];
    }
}
