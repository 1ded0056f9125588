//! Warning thresholds for filtered channel values.
//!
//! All comparisons are strict: a value sitting exactly on a limit does not warn.

use crate::channel::ChannelId;

/// Gas readings above this are unhealthy (ppm)
pub const GAS_WARNING_PPM: f64 = 350.0;
/// Light readings above this mean the burner flame indicator is lit (ADC counts)
pub const LIGHT_UNHEALTHY_LEVEL: f64 = 1500.0;
/// Temperatures above this are unhealthy (°C)
pub const TEMPERATURE_WARNING_C: f64 = 200.0;
/// Sensor output scale: 10 mV per °C
const DEGREES_PER_VOLT: f64 = 100.0;
/// Upper end of the sensor range (°C)
const TEMPERATURE_MAX_C: f64 = 300.0;

pub fn gas_warning(filtered_ppm: f64) -> bool {
    filtered_ppm > GAS_WARNING_PPM
}

pub fn temperature_celsius(filtered_volts: f64) -> f64 {
    (filtered_volts * DEGREES_PER_VOLT).min(TEMPERATURE_MAX_C)
}

pub fn temperature_warning(filtered_volts: f64) -> bool {
    temperature_celsius(filtered_volts) > TEMPERATURE_WARNING_C
}

pub fn light_unhealthy(filtered_level: f64) -> bool {
    filtered_level > LIGHT_UNHEALTHY_LEVEL
}

/// Warning flag for a channel's current filtered value
pub fn evaluate(channel: ChannelId, filtered: f64) -> bool {
    match channel {
        ChannelId::Gas => gas_warning(filtered),
        ChannelId::Light => light_unhealthy(filtered),
        ChannelId::Temperature => temperature_warning(filtered),
    }
}

/// Value in display units: ppm, ADC counts, or °C
pub fn display_value(channel: ChannelId, filtered: f64) -> f64 {
    match channel {
        ChannelId::Gas | ChannelId::Light => filtered,
        ChannelId::Temperature => temperature_celsius(filtered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_boundary() {
        assert!(!gas_warning(350.0));
        assert!(gas_warning(350.0001));
        assert!(!evaluate(ChannelId::Gas, 120.0));
    }

    #[test]
    fn test_temperature_derivation() {
        assert!((temperature_celsius(2.5) - 250.0).abs() < 1e-9);
        assert!(temperature_warning(2.5));
        assert_eq!(temperature_celsius(3.5), 300.0);
        assert!(!temperature_warning(2.0));
        assert!(temperature_warning(2.0001));
    }

    #[test]
    fn test_light_boundary() {
        assert!(!light_unhealthy(1500.0));
        assert!(light_unhealthy(1500.0001));
        assert!(evaluate(ChannelId::Light, 2000.0));
    }

    #[test]
    fn test_display_values() {
        assert_eq!(display_value(ChannelId::Gas, 42.0), 42.0);
        assert!((display_value(ChannelId::Temperature, 1.25) - 125.0).abs() < 1e-9);
    }
}
