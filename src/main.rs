use anyhow::{anyhow, Context, Result};
use clap::Parser;
use gashealth::channel::{ChannelId, ControlMode};
use gashealth::config::{BaudRate, MonitorConfig};
use gashealth::console::{parse_intent, Intent, LedAction};
use gashealth::monitor::{ConnectionState, Monitor};
use gashealth::ticker::Ticker;
use gashealth::transport;
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port (defaults to the last port found)
    #[arg(short, long)]
    port: Option<String>,

    /// 9600, 19200, 38400, 57600 or 115200
    #[arg(short, long)]
    baud: Option<u32>,

    /// Serial read timeout in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    list_ports: bool,

    /// Mode to switch the controller into after connecting
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ControlMode>,

    /// Print status as JSON instead of log lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Do not read operator commands from stdin
    #[arg(long, default_value_t = false)]
    no_console: bool,
}

fn parse_mode(s: &str) -> Result<ControlMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "auto" => Ok(ControlMode::Auto),
        "manual" => Ok(ControlMode::Manual),
        other => Err(format!("unknown mode '{}' (auto or manual)", other)),
    }
}

fn build_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud = BaudRate::try_from(baud)?;
    }
    if let Some(ms) = args.poll_ms {
        config.serial.poll_timeout_ms = ms;
    }

    if config.serial.port.is_empty() {
        let ports = transport::available_ports().context("Failed to enumerate serial ports")?;
        config.serial.port = ports
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("No serial port given and none found"))?;
        info!("Selected port {}", config.serial.port);
    }

    Ok(config)
}

fn spawn_console(running: Arc<AtomicBool>) -> Receiver<Intent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            };
            match parse_intent(&line) {
                Ok(intent) => {
                    if tx.send(intent).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
            if !running.load(Ordering::SeqCst) {
                break;
            }
        }
    });
    rx
}

/// Returns false when the operator asked to quit.
fn apply_intent(monitor: &mut Monitor, intent: Intent, json: bool) -> Result<bool> {
    match intent {
        Intent::Led { led, action } => {
            let result = match action {
                LedAction::On => monitor.set_led(led, true).map(|_| true),
                LedAction::Off => monitor.set_led(led, false).map(|_| false),
                LedAction::Toggle => monitor.toggle_led(led),
            };
            match result {
                Ok(on) => info!("{} -> {}", led, if on { "ON" } else { "OFF" }),
                Err(e) => warn!("{} command failed: {}", led, e),
            }
        }
        Intent::Mode(mode) => {
            if let Err(e) = monitor.set_mode(mode) {
                warn!("Mode change failed: {}", e);
            }
        }
        Intent::Status => log_status(monitor, json)?,
        Intent::Quit => return Ok(false),
    }
    Ok(true)
}

fn log_status(monitor: &Monitor, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&monitor.telemetry())?);
        return Ok(());
    }

    for channel in ChannelId::ALL {
        let snap = monitor.snapshot(channel);
        let value = match channel {
            ChannelId::Gas => format!("Value: {:.0} PPM", snap.filtered),
            ChannelId::Light => format!("Value: {:.0}", snap.filtered),
            ChannelId::Temperature => {
                format!("Value: {:.2}V ({:.1}°C)", snap.filtered, snap.display)
            }
        };
        info!(
            "[Status] {:<11} {} raw={:.2} phase={:?}{}",
            channel,
            value,
            snap.raw,
            snap.phase,
            if snap.warning { " WARNING" } else { "" }
        );
    }

    let stats = monitor.stats();
    let leds = monitor.leds();
    info!(
        "[Status] lines={} readings={} skipped={} acks={} parse_errors={} read_errors={} leds={:?}",
        stats.lines,
        stats.readings,
        stats.skipped,
        stats.acks,
        stats.parse_errors,
        stats.read_errors,
        leds
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    if args.list_ports {
        for port in transport::available_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = build_config(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut monitor = Monitor::new(config.clone());
    let port = config.serial.port.clone();
    let handle = monitor
        .connect(&port, config.serial.baud.as_u32())
        .with_context(|| format!("Could not connect to {}", port))?;

    if let Some(mode) = args.mode {
        if let Err(e) = monitor.set_mode(mode) {
            warn!("Initial mode change failed: {}", e);
        }
    }

    let intents = if args.no_console {
        None
    } else {
        Some(spawn_console(running.clone()))
    };

    info!("Monitoring {} (type 'status', 'led 1 on', 'mode manual', 'quit')", port);
    let mut ticker = Ticker::new(config.tick());
    let status_every = u64::from(config.status_every_ticks.max(1));

    'main: while running.load(Ordering::SeqCst) {
        let tick = ticker.wait();

        if let Some(rx) = &intents {
            loop {
                match rx.try_recv() {
                    Ok(intent) => {
                        if !apply_intent(&mut monitor, intent, args.json)? {
                            break 'main;
                        }
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }

        if let ConnectionState::Lost { port } = monitor.state() {
            error!("Connection to {} lost. Reconnect to continue.", port);
            break;
        }

        if tick % status_every == 0 {
            log_status(&monitor, args.json)?;
        }
    }

    monitor.disconnect(&handle);
    info!("Exiting.");
    Ok(())
}
