//! Wi-Fi provider module for the network tools bridge
//!
//! This module defines the provider ports the bridge queries (association,
//! scans, broadcasts, connectivity), the records they return and their
//! projection onto the consumer-facing shapes, plus Linux and simulated
//! implementations.

mod broadcast;
pub mod linux;
mod provider;
pub mod simulated;
mod types;

// Re-export public API
pub use broadcast::{BroadcastAction, BroadcastReceiver, ReceiverId};
pub use linux::{LinuxConnectivity, LinuxWifi};
pub use provider::{ConnectivityProvider, WifiProvider};
pub use simulated::{SimulatedConnectivity, SimulatedWifi};
pub use types::{
    ConnectionInfo, NetworkCapabilities, ScanEntry, ScanRecord, Transport, WifiLinkInfo,
    format_ipv4, normalize_ssid, pack_ipv4,
};
