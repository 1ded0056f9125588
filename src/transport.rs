//! serialport-backed implementation of [`SerialTransport`].

use crate::config::SerialConfig;
use crate::error::{ConnectError, TransportError};
use crate::traits::SerialTransport;
use log::{debug, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};

pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ConnectError> {
        if config.port.is_empty() {
            return Err(ConnectError::EmptyPort);
        }

        let baud = config.baud.as_u32();
        let port = serialport::new(&config.port, baud)
            .timeout(config.poll_timeout())
            .open()
            .map_err(|source| ConnectError::Open {
                port: config.port.clone(),
                source,
            })?;

        info!("Opened {} at {} baud", config.port, baud);
        Ok(SerialPortTransport {
            port,
            name: config.port.clone(),
        })
    }
}

impl SerialTransport for SerialPortTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let want = pending.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

impl Drop for SerialPortTransport {
    fn drop(&mut self) {
        debug!("Closing {}", self.name);
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
