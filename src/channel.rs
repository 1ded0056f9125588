use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical channels reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    Gas,
    Light,
    Temperature,
}

impl ChannelId {
    pub const ALL: [ChannelId; 3] = [ChannelId::Gas, ChannelId::Light, ChannelId::Temperature];

    /// Slot in fixed per-channel tables.
    pub fn index(self) -> usize {
        match self {
            ChannelId::Gas => 0,
            ChannelId::Light => 1,
            ChannelId::Temperature => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Gas => "gas",
            ChannelId::Light => "light",
            ChannelId::Temperature => "temperature",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Actuator LEDs on the controller (LED1 = gas, LED2 = light, LED3 = voltage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedId {
    Led1,
    Led2,
    Led3,
}

impl LedId {
    pub const ALL: [LedId; 3] = [LedId::Led1, LedId::Led2, LedId::Led3];

    pub fn index(self) -> usize {
        match self {
            LedId::Led1 => 0,
            LedId::Led2 => 1,
            LedId::Led3 => 2,
        }
    }

    /// Wire name, e.g. `LED2`.
    pub fn wire_name(self) -> &'static str {
        match self {
            LedId::Led1 => "LED1",
            LedId::Led2 => "LED2",
            LedId::Led3 => "LED3",
        }
    }

    pub fn from_number(n: u8) -> Option<LedId> {
        match n {
            1 => Some(LedId::Led1),
            2 => Some(LedId::Led2),
            3 => Some(LedId::Led3),
            _ => None,
        }
    }
}

impl fmt::Display for LedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Auto,
    Manual,
}

impl ControlMode {
    pub fn wire_name(self) -> &'static str {
        match self {
            ControlMode::Auto => "AUTO",
            ControlMode::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_indices_are_distinct() {
        let mut seen = [false; 3];
        for ch in ChannelId::ALL {
            assert!(!seen[ch.index()]);
            seen[ch.index()] = true;
        }
    }

    #[test]
    fn test_led_from_number() {
        assert_eq!(LedId::from_number(2), Some(LedId::Led2));
        assert_eq!(LedId::from_number(0), None);
        assert_eq!(LedId::from_number(4), None);
        assert_eq!(LedId::Led3.to_string(), "LED3");
    }
}
