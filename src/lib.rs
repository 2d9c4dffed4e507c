//! Wi-Fi telemetry and reachability bridge
//!
//! Answers link, scan and ping queries on the `network_tools` request channel
//! and streams RSSI updates on `network_tools/stream`, on top of pluggable
//! Wi-Fi, connectivity and echo-probe providers.

mod app;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod probe;
pub mod transport;
pub mod wifi;

pub use app::Providers;
pub use bridge::{Bridge, BridgeHandle};
pub use error::{BridgeError, BridgeResult};
