//! Connection lifecycle and the ingestion loop.
//!
//! `Monitor` is the surface the presentation side talks to. A connect moves
//! the [`TelemetryAggregator`] into a dedicated ingestion thread, which is the
//! only writer of channel state for the lifetime of the connection. A
//! disconnect stops the thread, takes the aggregator back (so history carries
//! over to the next session) and closes the transport. Snapshot reads go
//! through the shared [`SnapshotStore`] and never wait on the ingestion loop.

use crate::aggregator::TelemetryAggregator;
use crate::channel::{ChannelId, ControlMode, LedId};
use crate::commands::ActuatorCommandSink;
use crate::config::{BaudRate, MonitorConfig, SerialConfig};
use crate::error::{CommandError, ConnectError};
use crate::status::{ChannelSnapshot, IngestStats, SnapshotStore, TelemetrySnapshot};
use crate::traits::{share, SerialTransport, SharedTransport};
use crate::transport::SerialPortTransport;
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected { port: String, baud: u32 },
    /// The ingestion loop stopped on a fatal read error; call `disconnect`
    /// or `connect` to continue.
    Lost { port: String },
}

/// Identifies one connection; returned by `connect`, passed to `disconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: u64,
    pub port: String,
    pub baud: u32,
    pub opened_at: DateTime<Local>,
}

struct Session {
    handle: ConnectionHandle,
    running: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    worker: JoinHandle<TelemetryAggregator>,
}

pub struct Monitor {
    config: MonitorConfig,
    store: Arc<SnapshotStore>,
    /// Parked here between sessions
    aggregator: Option<TelemetryAggregator>,
    session: Option<Session>,
    commands: ActuatorCommandSink,
    next_id: u64,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        let store = Arc::new(SnapshotStore::new());
        Monitor {
            config,
            aggregator: Some(TelemetryAggregator::with_store(store.clone())),
            store,
            session: None,
            commands: ActuatorCommandSink::new(),
            next_id: 1,
        }
    }

    // ========================================================================
    // CONNECTION
    // ========================================================================

    /// Open the serial port and start ingesting.
    pub fn connect(&mut self, port: &str, baud: u32) -> Result<ConnectionHandle, ConnectError> {
        let baud = BaudRate::try_from(baud).map_err(|_| ConnectError::InvalidBaud(baud))?;
        if port.is_empty() {
            return Err(ConnectError::EmptyPort);
        }
        self.ensure_idle()?;

        let serial = SerialConfig {
            port: port.to_string(),
            baud,
            ..self.config.serial.clone()
        };
        let transport = match SerialPortTransport::open(&serial) {
            Ok(t) => t,
            Err(e) => {
                error!("Connection failed: {}", e);
                return Err(e);
            }
        };
        self.connect_transport(transport, port, baud.as_u32())
    }

    /// Start ingesting from an already-open transport.
    pub fn connect_transport<T>(
        &mut self,
        transport: T,
        port: &str,
        baud: u32,
    ) -> Result<ConnectionHandle, ConnectError>
    where
        T: SerialTransport + Send + 'static,
    {
        self.ensure_idle()?;

        let mut aggregator = self
            .aggregator
            .take()
            .unwrap_or_else(|| TelemetryAggregator::with_store(self.store.clone()));
        aggregator.on_connect();

        let shared = share(transport);
        self.commands.attach(shared.clone());

        let running = Arc::new(AtomicBool::new(true));
        let lost = Arc::new(AtomicBool::new(false));
        let serial = self.config.serial.clone();
        let worker = {
            let running = running.clone();
            let lost = lost.clone();
            thread::spawn(move || run_ingest(aggregator, shared, serial, running, lost))
        };

        let handle = ConnectionHandle {
            id: self.next_id,
            port: port.to_string(),
            baud,
            opened_at: Local::now(),
        };
        self.next_id += 1;
        self.session = Some(Session {
            handle: handle.clone(),
            running,
            lost,
            worker,
        });

        info!("Connected to {} at {} bps", port, baud);
        Ok(handle)
    }

    /// Stop the session identified by `handle`. Stale handles are ignored.
    pub fn disconnect(&mut self, handle: &ConnectionHandle) {
        match &self.session {
            Some(s) if s.handle.id == handle.id => self.stop_session(),
            _ => warn!("Ignoring disconnect for stale connection to {}", handle.port),
        }
    }

    /// Stop whatever session is running.
    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            self.stop_session();
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.session {
            None => ConnectionState::Disconnected,
            Some(s) if s.lost.load(Ordering::SeqCst) => ConnectionState::Lost {
                port: s.handle.port.clone(),
            },
            Some(s) => ConnectionState::Connected {
                port: s.handle.port.clone(),
                baud: s.handle.baud,
            },
        }
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    fn ensure_idle(&mut self) -> Result<(), ConnectError> {
        match self.state() {
            ConnectionState::Disconnected => Ok(()),
            ConnectionState::Lost { port } => {
                info!("Reaping lost connection to {}", port);
                self.stop_session();
                Ok(())
            }
            ConnectionState::Connected { port, .. } => Err(ConnectError::AlreadyConnected(port)),
        }
    }

    fn stop_session(&mut self) {
        let session = match self.session.take() {
            Some(s) => s,
            None => return,
        };

        session.running.store(false, Ordering::SeqCst);
        // The worker holds the other reference; the port closes when both are gone
        let _ = self.commands.detach();

        let aggregator = match session.worker.join() {
            Ok(agg) => agg,
            Err(_) => {
                error!("Ingestion thread panicked; history from this session is lost");
                TelemetryAggregator::with_store(self.store.clone())
            }
        };
        self.aggregator = Some(aggregator);
        info!("Disconnected from {}", session.handle.port);
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    pub fn snapshot(&self, channel: ChannelId) -> Arc<ChannelSnapshot> {
        self.store.channel(channel)
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.store.stats()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.store.telemetry()
    }

    /// Store handle for readers on other threads
    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    pub fn set_led(&mut self, led: LedId, on: bool) -> Result<(), CommandError> {
        self.commands.set_led(led, on)
    }

    pub fn toggle_led(&mut self, led: LedId) -> Result<bool, CommandError> {
        self.commands.toggle_led(led)
    }

    pub fn set_mode(&mut self, mode: ControlMode) -> Result<(), CommandError> {
        self.commands.set_mode(mode)
    }

    pub fn leds(&self) -> [bool; 3] {
        self.commands.leds()
    }

    pub fn mode(&self) -> Option<ControlMode> {
        self.commands.mode()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_ingest(
    mut aggregator: TelemetryAggregator,
    transport: SharedTransport,
    serial: SerialConfig,
    running: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
) -> TelemetryAggregator {
    let mut buf = [0u8; READ_CHUNK];

    while running.load(Ordering::SeqCst) {
        let read = {
            let mut port = transport.lock().unwrap_or_else(|e| e.into_inner());
            port.read_available(&mut buf)
        };

        match read {
            Ok(0) => thread::sleep(serial.poll_interval()),
            Ok(n) => {
                let at = aggregator.elapsed_secs();
                aggregator.ingest_bytes(&buf[..n], at);
            }
            Err(e) if e.is_fatal() => {
                error!("Serial link lost: {}", e);
                lost.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                warn!("Serial read error: {}", e);
                aggregator.note_read_error();
                thread::sleep(serial.read_backoff());
            }
        }
    }

    aggregator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Transport fed from a script of read results; writes are recorded.
    struct ScriptedTransport {
        reads: Arc<Mutex<VecDeque<Result<Vec<u8>, TransportError>>>>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    impl SerialTransport for ScriptedTransport {
        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            match self.reads.lock().unwrap().pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    fn scripted(
        reads: Vec<Result<Vec<u8>, TransportError>>,
    ) -> (ScriptedTransport, Arc<Mutex<Vec<String>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            reads: Arc::new(Mutex::new(reads.into())),
            writes: writes.clone(),
        };
        (transport, writes)
    }

    fn fast_config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.serial.poll_interval_ms = 1;
        config.serial.read_backoff_ms = 1;
        config
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn gas_lines(value: f64, n: usize) -> Vec<u8> {
        (0..n).map(|_| format!("GAS:{},350\n", value)).collect::<String>().into_bytes()
    }

    #[test]
    fn test_invalid_baud_is_rejected_before_open() {
        let mut monitor = Monitor::new(MonitorConfig::default());
        assert!(matches!(
            monitor.connect("/dev/null-port", 1234),
            Err(ConnectError::InvalidBaud(1234))
        ));
        assert!(matches!(monitor.connect("", 9600), Err(ConnectError::EmptyPort)));
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_failure_leaves_state_untouched() {
        let mut monitor = Monitor::new(MonitorConfig::default());
        let result = monitor.connect("/dev/this-port-does-not-exist", 115200);
        assert!(matches!(result, Err(ConnectError::Open { .. })));
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        assert!(monitor.snapshot(ChannelId::Gas).history.is_empty());
    }

    #[test]
    fn test_ingest_then_disconnect() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (transport, _) = scripted(vec![Ok(gas_lines(200.0, 12))]);
        let mut monitor = Monitor::new(fast_config());
        let handle = monitor.connect_transport(transport, "sim0", 115200).expect("connect");
        assert_eq!(
            monitor.state(),
            ConnectionState::Connected { port: "sim0".into(), baud: 115200 }
        );

        assert!(wait_for(|| monitor.stats().lines == 12));
        let snap = monitor.snapshot(ChannelId::Gas);
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.filtered, 200.0);

        monitor.disconnect(&handle);
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        assert!(matches!(
            monitor.set_led(LedId::Led1, true),
            Err(CommandError::NotConnected)
        ));
    }

    #[test]
    fn test_already_connected() {
        let (a, _) = scripted(vec![]);
        let (b, _) = scripted(vec![]);
        let mut monitor = Monitor::new(fast_config());
        monitor.connect_transport(a, "sim0", 9600).expect("first");
        assert!(matches!(
            monitor.connect_transport(b, "sim1", 9600),
            Err(ConnectError::AlreadyConnected(_))
        ));
    }

    #[test]
    fn test_stale_handle_is_ignored() {
        let (a, _) = scripted(vec![]);
        let (b, _) = scripted(vec![]);
        let mut monitor = Monitor::new(fast_config());
        let first = monitor.connect_transport(a, "sim0", 9600).expect("first");
        monitor.disconnect(&first);
        monitor.connect_transport(b, "sim1", 9600).expect("second");

        monitor.disconnect(&first);
        assert!(matches!(monitor.state(), ConnectionState::Connected { .. }));
        monitor.shutdown();
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_history_survives_reconnect() {
        let (first, _) = scripted(vec![Ok(gas_lines(50.0, 15))]);
        let mut monitor = Monitor::new(fast_config());
        let handle = monitor.connect_transport(first, "sim0", 9600).expect("connect");
        assert!(wait_for(|| monitor.stats().lines == 15));
        monitor.disconnect(&handle);
        let kept = monitor.snapshot(ChannelId::Gas).history.clone();
        assert_eq!(kept.len(), 5);

        // New session: the first ten readings are skipped again
        let (second, _) = scripted(vec![Ok(gas_lines(75.0, 10))]);
        let handle = monitor.connect_transport(second, "sim0", 9600).expect("reconnect");
        assert!(wait_for(|| monitor.stats().lines == 25));
        assert_eq!(monitor.snapshot(ChannelId::Gas).history, kept);
        monitor.disconnect(&handle);
    }

    #[test]
    fn test_transient_error_backs_off_and_continues() {
        let reads = vec![
            Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "x"))),
            Ok(b"LED1:ON\n".to_vec()),
        ];
        let (transport, _) = scripted(reads);
        let mut monitor = Monitor::new(fast_config());
        monitor.connect_transport(transport, "sim0", 9600).expect("connect");
        assert!(wait_for(|| monitor.stats().acks == 1));
        assert_eq!(monitor.stats().read_errors, 1);
        assert!(matches!(monitor.state(), ConnectionState::Connected { .. }));
    }

    #[test]
    fn test_fatal_error_marks_connection_lost() {
        let reads = vec![Err(TransportError::Gone("unplugged".into()))];
        let (transport, _) = scripted(reads);
        let mut monitor = Monitor::new(fast_config());
        monitor.connect_transport(transport, "sim0", 9600).expect("connect");
        assert!(wait_for(|| matches!(monitor.state(), ConnectionState::Lost { .. })));

        // A new connect reaps the lost session
        let (next, _) = scripted(vec![]);
        monitor.connect_transport(next, "sim1", 9600).expect("reconnect");
        assert!(matches!(monitor.state(), ConnectionState::Connected { .. }));
    }

    #[test]
    fn test_commands_reach_transport() {
        let (transport, writes) = scripted(vec![]);
        let mut monitor = Monitor::new(fast_config());
        monitor.connect_transport(transport, "sim0", 9600).expect("connect");

        monitor.set_led(LedId::Led2, true).expect("led");
        monitor.set_mode(ControlMode::Manual).expect("mode");
        assert_eq!(monitor.leds(), [false; 3]);
        assert_eq!(monitor.mode(), Some(ControlMode::Manual));
        assert_eq!(
            *writes.lock().unwrap(),
            vec!["LED2_ON\n", "MODE_MANUAL\n", "LED1_OFF\n", "LED2_OFF\n", "LED3_OFF\n"]
        );
    }
}
