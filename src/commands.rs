//! Actuator command path: LED toggles and mode switches sent to the controller.
//!
//! Outbound wire format:
//! ```text
//! LED<1|2|3>_<ON|OFF>\n
//! MODE_<AUTO|MANUAL>\n
//! ```
//!
//! LED desired-state is tracked locally and updated optimistically; a failed
//! write restores the previous value. It is independent of the LED
//! acknowledgements the controller sends back.

use crate::channel::{ControlMode, LedId};
use crate::error::{CommandError, TransportError};
use crate::traits::SharedTransport;
use log::{debug, error, info, warn};

pub fn encode_led(led: LedId, on: bool) -> String {
    format!("{}_{}\n", led.wire_name(), if on { "ON" } else { "OFF" })
}

pub fn encode_mode(mode: ControlMode) -> String {
    format!("MODE_{}\n", mode.wire_name())
}

#[derive(Default)]
pub struct ActuatorCommandSink {
    transport: Option<SharedTransport>,
    leds: [bool; 3],
    mode: Option<ControlMode>,
}

impl ActuatorCommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route commands to a newly opened transport.
    pub fn attach(&mut self, transport: SharedTransport) {
        self.transport = Some(transport);
    }

    /// Stop sending; returns the handle so the caller controls when it closes.
    pub fn detach(&mut self) -> Option<SharedTransport> {
        self.transport.take()
    }

    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    pub fn led(&self, led: LedId) -> bool {
        self.leds[led.index()]
    }

    pub fn leds(&self) -> [bool; 3] {
        self.leds
    }

    /// Last mode successfully sent, if any
    pub fn mode(&self) -> Option<ControlMode> {
        self.mode
    }

    pub fn set_led(&mut self, led: LedId, on: bool) -> Result<(), CommandError> {
        if self.transport.is_none() {
            return Err(CommandError::NotConnected);
        }

        let previous = self.leds[led.index()];
        self.leds[led.index()] = on;

        if let Err(e) = self.send(&encode_led(led, on)) {
            self.leds[led.index()] = previous;
            warn!("[Command] {} {} failed, reverted: {}", led, on_off(on), e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Flip the desired state of one LED; returns the new state.
    pub fn toggle_led(&mut self, led: LedId) -> Result<bool, CommandError> {
        let next = !self.led(led);
        self.set_led(led, next)?;
        Ok(next)
    }

    /// Switch controller mode. Entering manual mode also forces every LED
    /// off locally and sends an OFF per LED; failures of those OFF commands
    /// are logged only.
    pub fn set_mode(&mut self, mode: ControlMode) -> Result<(), CommandError> {
        if self.transport.is_none() {
            return Err(CommandError::NotConnected);
        }

        let result = self.send(&encode_mode(mode));
        match &result {
            Ok(()) => {
                self.mode = Some(mode);
                info!("[Command] Switching to {} mode", mode);
            }
            Err(e) => error!("[Command] Failed to send mode {}: {}", mode, e),
        }

        if mode == ControlMode::Manual {
            self.force_leds_off();
        }

        result.map_err(CommandError::from)
    }

    fn force_leds_off(&mut self) {
        self.leds = [false; 3];
        for led in LedId::ALL {
            if let Err(e) = self.send(&encode_led(led, false)) {
                warn!("[Command] Error sending {}_OFF: {}", led, e);
            }
        }
    }

    fn send(&self, command: &str) -> Result<(), TransportError> {
        let transport = match &self.transport {
            Some(t) => t,
            None => return Err(TransportError::Gone("transport detached".into())),
        };
        let mut port = transport.lock().unwrap_or_else(|e| e.into_inner());
        port.write_all(command.as_bytes())?;
        debug!("[Command] Sent {}", command.trim_end());
        Ok(())
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
