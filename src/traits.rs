use crate::error::TransportError;
use std::sync::{Arc, Mutex};

#[cfg_attr(test, mockall::automock)]
pub trait SerialTransport {
    /// Read the bytes currently available. Returns Ok(0) if nothing arrived
    /// (poll timeout); never blocks longer than the configured read timeout.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write one complete command.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Transport handle shared by the ingestion loop (reads) and the command
/// sink (writes); the mutex serialises the two.
pub type SharedTransport = Arc<Mutex<Box<dyn SerialTransport + Send>>>;

pub fn share<T: SerialTransport + Send + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}
