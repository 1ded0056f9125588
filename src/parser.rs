//! Telemetry line parser.
//!
//! One framed line becomes either a channel reading or an acknowledgement
//! from the controller. Dispatch is by literal prefix:
//!
//! ```text
//! GAS:<raw>,<dangerLevel>          -> Gas reading (raw)
//! LDR:<time>,<value>               -> Light reading (value)
//! VOLT:<min>,<value>,<max>         -> Temperature reading (value, volts)
//! LED_STATUS:<gas>,<ldr>,<volt>    -> ack
//! MODE_CHANGED:<mode>              -> ack
//! LED<1|2|3>:<ON|OFF>              -> ack
//! ```
//!
//! Only the extracted field of a reading has to be numeric; the ignored
//! fields are counted but not interpreted.

use crate::channel::{ChannelId, LedId};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub channel: ChannelId,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AckEvent {
    /// Device-side LED states (0/1) for the gas, light and voltage LEDs.
    LedStatus { gas: i64, light: i64, voltage: i64 },
    ModeChanged(String),
    Led { led: LedId, on: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Reading(Reading),
    Ack(AckEvent),
}

pub fn parse_line(line: &str) -> Result<Telemetry, ParseError> {
    if let Some(body) = line.strip_prefix("GAS:") {
        let fields = split_fields(body, "GAS", 2)?;
        let value = parse_value(fields[0], "raw")?;
        return Ok(reading(ChannelId::Gas, value));
    }

    if let Some(body) = line.strip_prefix("LDR:") {
        let fields = split_fields(body, "LDR", 2)?;
        let value = parse_value(fields[1], "value")?;
        return Ok(reading(ChannelId::Light, value));
    }

    if let Some(body) = line.strip_prefix("VOLT:") {
        let fields = split_fields(body, "VOLT", 3)?;
        let value = parse_value(fields[1], "value")?;
        return Ok(reading(ChannelId::Temperature, value));
    }

    // Must be checked before the LED<n>: acknowledgements
    if let Some(body) = line.strip_prefix("LED_STATUS:") {
        let fields = split_fields(body, "LED_STATUS", 3)?;
        return Ok(Telemetry::Ack(AckEvent::LedStatus {
            gas: parse_flag(fields[0], "gas")?,
            light: parse_flag(fields[1], "ldr")?,
            voltage: parse_flag(fields[2], "volt")?,
        }));
    }

    if let Some(body) = line.strip_prefix("MODE_CHANGED:") {
        let mode = body.trim();
        if mode.is_empty() {
            return Err(ParseError::FieldCount {
                prefix: "MODE_CHANGED",
                expected: 1,
                found: 0,
            });
        }
        return Ok(Telemetry::Ack(AckEvent::ModeChanged(mode.to_string())));
    }

    for led in LedId::ALL {
        if let Some(state) = line
            .strip_prefix(led.wire_name())
            .and_then(|rest| rest.strip_prefix(':'))
        {
            let on = match state.trim() {
                "ON" => true,
                "OFF" => false,
                other => return Err(ParseError::InvalidState(other.to_string())),
            };
            return Ok(Telemetry::Ack(AckEvent::Led { led, on }));
        }
    }

    Err(ParseError::UnknownPrefix)
}

fn reading(channel: ChannelId, value: f64) -> Telemetry {
    Telemetry::Reading(Reading { channel, value })
}

fn split_fields<'a>(
    body: &'a str,
    prefix: &'static str,
    expected: usize,
) -> Result<Vec<&'a str>, ParseError> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != expected {
        return Err(ParseError::FieldCount {
            prefix,
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

fn parse_value(raw: &str, field: &'static str) -> Result<f64, ParseError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(raw: &str, field: &'static str) -> Result<i64, ParseError> {
    raw.trim().parse::<i64>().map_err(|_| ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}
