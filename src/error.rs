//! Error kinds surfaced by the telemetry core.
//!
//! Each failure path has its own type so callers can apply the matching
//! policy: a `ConnectError` ends the connect attempt, a transient
//! `TransportError` is retried after a backoff, a `ParseError` drops one
//! line, and a `CommandError` is returned to whoever asked for the command.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no serial port selected")]
    EmptyPort,

    #[error("unsupported baud rate {0} (expected 9600, 19200, 38400, 57600 or 115200)")]
    InvalidBaud(u32),

    #[error("failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("already connected to '{0}'")]
    AlreadyConnected(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial device gone: {0}")]
    Gone(String),
}

impl TransportError {
    /// True when the link cannot recover without a new connect.
    pub fn is_fatal(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            TransportError::Gone(_) => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotFound
                    | ErrorKind::PermissionDenied
            ),
        }
    }
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::Gone(e.description),
            serialport::ErrorKind::Io(kind) => {
                TransportError::Io(std::io::Error::new(kind, e.description))
            }
            _ => TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.description)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unrecognised line prefix")]
    UnknownPrefix,

    #[error("{prefix} expects {expected} fields, found {found}")]
    FieldCount {
        prefix: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid LED state '{0}'")]
    InvalidState(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not connected to a serial port")]
    NotConnected,

    #[error("command write failed: {0}")]
    Write(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported baud rate {0}")]
    InvalidBaud(u32),
}
