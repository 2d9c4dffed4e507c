use crate::error::BridgeResult;
use crate::wifi::broadcast::{BroadcastReceiver, ReceiverId};
use crate::wifi::types::{ConnectionInfo, NetworkCapabilities, ScanRecord};

/// Port onto the platform Wi-Fi service.
///
/// Queries run on the blocking pool and may shell out. Receiver registration
/// is called from the bridge's reply loop and must return promptly.
/// `Ok(None)` / `Ok(vec![])` mean "no data" and are reported to the consumer
/// as sentinels, not errors.
pub trait WifiProvider: Send + Sync {
    /// Current association, or `None` when not associated.
    fn connection_info(&self) -> BridgeResult<Option<ConnectionInfo>>;

    /// Ask the radio to start a scan. `false` means the request was refused.
    fn start_scan(&self) -> BridgeResult<bool>;

    /// Most recent cached scan results.
    fn scan_results(&self) -> BridgeResult<Vec<ScanRecord>>;

    /// Start delivering matching broadcasts to `receiver`.
    fn register_receiver(&self, receiver: BroadcastReceiver) -> BridgeResult<()>;

    /// Stop delivering broadcasts to the receiver with this id.
    fn unregister_receiver(&self, id: ReceiverId) -> BridgeResult<()>;
}

/// Port onto the platform connectivity service.
pub trait ConnectivityProvider: Send + Sync {
    /// Capabilities of the active default network, or `None` without one.
    fn active_network(&self) -> BridgeResult<Option<NetworkCapabilities>>;
}
