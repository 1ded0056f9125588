//! Operator console intents.
//!
//! ```text
//! led <1|2|3> <on|off|toggle>
//! mode <auto|manual>
//! status
//! quit
//! ```

use crate::channel::{ControlMode, LedId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAction {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Led { led: LedId, action: LedAction },
    Mode(ControlMode),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try: led, mode, status, quit)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

const LED_USAGE: &str = "led <1|2|3> <on|off|toggle>";
const MODE_USAGE: &str = "mode <auto|manual>";

pub fn parse_intent(line: &str) -> Result<Intent, IntentError> {
    let words: Vec<String> = line.split_whitespace().map(|w| w.to_ascii_lowercase()).collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    match words.as_slice() {
        [] => Err(IntentError::Empty),
        ["led", n, action] => {
            let led = n
                .trim_start_matches("led")
                .parse::<u8>()
                .ok()
                .and_then(LedId::from_number)
                .ok_or(IntentError::Usage(LED_USAGE))?;
            let action = match *action {
                "on" => LedAction::On,
                "off" => LedAction::Off,
                "toggle" => LedAction::Toggle,
                _ => return Err(IntentError::Usage(LED_USAGE)),
            };
            Ok(Intent::Led { led, action })
        }
        ["led", ..] => Err(IntentError::Usage(LED_USAGE)),
        ["mode", "auto"] => Ok(Intent::Mode(ControlMode::Auto)),
        ["mode", "manual"] => Ok(Intent::Mode(ControlMode::Manual)),
        ["mode", ..] => Err(IntentError::Usage(MODE_USAGE)),
        ["status"] => Ok(Intent::Status),
        ["quit"] | ["exit"] => Ok(Intent::Quit),
        [other, ..] => Err(IntentError::Unknown(other.to_string())),
    }
}
