/// Centralized configuration constants for the network tools bridge
use std::path::PathBuf;
use std::time::Duration;

// Channel names
pub const REQUEST_CHANNEL: &str = "network_tools";
pub const STREAM_CHANNEL: &str = "network_tools/stream";

// Ping defaults
pub const DEFAULT_PING_HOST: &str = "8.8.8.8";
pub const DEFAULT_PING_COUNT: i64 = 10;
pub const PING_BINARY: &str = "/system/bin/ping";
pub const PING_WAIT_SECS: u32 = 1;

// Timing
pub const SCAN_DELAY_MS: u64 = 2000;
pub const BROADCAST_POLL_MS: u64 = 1000;
pub const SIMULATED_JITTER_MS: u64 = 1000;

// Sentinels
pub const RSSI_UNAVAILABLE: i32 = -100;
pub const BSSID_UNKNOWN: &str = "Unknown";
pub const FREQUENCY_UNAVAILABLE: i32 = 0;

// Error codes
pub const PING_ERROR: &str = "PING_ERROR";

// Linux provider
pub const DEFAULT_INTERFACE: &str = "wlan0";

/// Runtime knobs for a bridge session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Settling interval between starting a scan and reading its results
    pub settle_delay: Duration,
    pub ping_binary: PathBuf,
    pub ping_wait_secs: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            settle_delay: Duration::from_millis(SCAN_DELAY_MS),
            ping_binary: PathBuf::from(PING_BINARY),
            ping_wait_secs: PING_WAIT_SECS,
        }
    }
}

impl BridgeConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_ping_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ping_binary = binary.into();
        self
    }
}
