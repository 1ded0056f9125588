pub mod channel;
pub mod error;
pub mod framer;
pub mod parser;
pub mod skip_gate;
pub mod adaptive_filter;
pub mod history;
pub mod thresholds;
pub mod status;
pub mod aggregator;
pub mod traits;
pub mod transport;
pub mod commands;
pub mod monitor;
pub mod ticker;
pub mod config;
pub mod console;
