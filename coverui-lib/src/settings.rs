use std::time::Duration;

use crate::handshake::DEFAULT_BACKOFF;
use crate::link::{DEFAULT_CAPACITY, DEFAULT_READ_TIMEOUT};
use crate::mainboard::{emulated, MainboardKind};

pub const DEFAULT_BAUDRATE: u32 = 115200;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Runtime knobs of the bridge and its tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Cover UI port, `auto` to pick the first compatible adapter.
    pub cover_ui_port: String,
    /// Only used with a hardware mainboard.
    pub mainboard_port: Option<String>,
    pub baudrate: u32,
    pub mainboard: MainboardKind,
    /// Open ports even when another process holds them.
    pub force: bool,
    pub emit_period: Duration,
    pub handshake_backoff: Duration,
    pub settle_delay: Duration,
    pub buffer_capacity: usize,
    pub read_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            cover_ui_port: "auto".to_string(),
            mainboard_port: None,
            baudrate: DEFAULT_BAUDRATE,
            mainboard: MainboardKind::Virtual,
            force: false,
            emit_period: emulated::DEFAULT_PERIOD,
            handshake_backoff: DEFAULT_BACKOFF,
            settle_delay: DEFAULT_SETTLE_DELAY,
            buffer_capacity: DEFAULT_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}
