use crate::app::BridgeState;
use crate::bridge::{scan, spawn_worker};
use crate::channel::{MethodCall, Reply, Responder};
use crate::config;
use crate::error::BridgeError;
use crate::probe::{PingRequest, run_ping};
use crate::wifi::{ConnectivityProvider, Transport, WifiLinkInfo, WifiProvider};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// A recognized call on the request channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    IsWifiConnected,
    GetWifiRssi,
    GetCurrentWifiInfo,
    ScanWifiNetworks,
    PingTest(PingRequest),
}

impl Request {
    /// `None` for methods this bridge does not implement
    pub fn parse(call: &MethodCall) -> Option<Request> {
        match call.method.as_str() {
            "isWifiConnected" => Some(Request::IsWifiConnected),
            "getWifiRssi" => Some(Request::GetWifiRssi),
            "getCurrentWifiInfo" => Some(Request::GetCurrentWifiInfo),
            "scanWifiNetworks" => Some(Request::ScanWifiNetworks),
            "pingTest" => Some(Request::PingTest(PingRequest::from_call(call))),
            _ => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::IsWifiConnected => "isWifiConnected",
            Request::GetWifiRssi => "getWifiRssi",
            Request::GetCurrentWifiInfo => "getCurrentWifiInfo",
            Request::ScanWifiNetworks => "scanWifiNetworks",
            Request::PingTest(_) => "pingTest",
        }
    }
}

/// Route one call to its handler. Every path answers `responder` exactly once,
/// either here or from a worker continuation.
pub(crate) fn dispatch(state: &BridgeState, call: MethodCall, responder: Responder) {
    let Some(request) = Request::parse(&call) else {
        debug!(method = %call.method, "Method not implemented");
        responder.not_implemented();
        return;
    };
    let method = request.method();
    debug!(method, "Dispatching request");

    let providers = &state.providers;
    match request {
        Request::IsWifiConnected => {
            let connectivity = providers.connectivity.clone();
            query(state, method, responder, Value::Bool(false), move || {
                Value::Bool(is_wifi_connected(connectivity.as_ref()))
            });
        }
        Request::GetWifiRssi => {
            let wifi = providers.wifi.clone();
            let fallback = Value::from(config::RSSI_UNAVAILABLE);
            query(state, method, responder, fallback, move || {
                Value::from(current_rssi(wifi.as_ref()))
            });
        }
        Request::GetCurrentWifiInfo => {
            let wifi = providers.wifi.clone();
            query(state, method, responder, Value::Null, move || {
                match current_link_info(wifi.as_ref()) {
                    Some(info) => to_json(&info, Value::Null),
                    None => Value::Null,
                }
            });
        }
        Request::ScanWifiNetworks => scan::start(state, responder),
        Request::PingTest(request) => start_ping(state, request, responder),
    }
}

/// Answer with a provider read done on the blocking pool.
///
/// Providers may shell out, so even the sentinel queries stay off the reply
/// loop. `fallback` is sent if the read panics.
fn query<F>(
    state: &BridgeState,
    method: &'static str,
    responder: Responder,
    fallback: Value,
    read: F,
) where
    F: FnOnce() -> Value + Send + 'static,
{
    spawn_worker(state, method, responder, async move {
        match tokio::task::spawn_blocking(read).await {
            Ok(value) => Reply::success(value),
            Err(e) => {
                warn!(method, "Provider query failed: {e}");
                Reply::success(fallback)
            }
        }
    });
}

/// Encode a reply payload, or `fallback` if it cannot be encoded
pub(crate) fn to_json<T: Serialize>(value: &T, fallback: Value) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!("Could not encode reply payload: {e}");
        fallback
    })
}

/// True iff the default network carries a Wi-Fi transport
pub fn is_wifi_connected(connectivity: &dyn ConnectivityProvider) -> bool {
    match connectivity.active_network() {
        Ok(Some(capabilities)) => capabilities.has_transport(Transport::Wifi),
        Ok(None) => false,
        Err(e) => {
            warn!("Connectivity query failed: {e}");
            false
        }
    }
}

/// Current RSSI in dBm, or the `-100` sentinel without an association
pub fn current_rssi(wifi: &dyn WifiProvider) -> i32 {
    match wifi.connection_info() {
        Ok(Some(info)) => info.rssi,
        Ok(None) => config::RSSI_UNAVAILABLE,
        Err(e) => {
            warn!("Connection info query failed: {e}");
            config::RSSI_UNAVAILABLE
        }
    }
}

pub fn current_link_info(wifi: &dyn WifiProvider) -> Option<WifiLinkInfo> {
    match wifi.connection_info() {
        Ok(info) => info.as_ref().map(WifiLinkInfo::from),
        Err(e) => {
            warn!("Connection info query failed: {e}");
            None
        }
    }
}

fn ping_error(err: BridgeError) -> Reply {
    warn!("Ping failed: {err}");
    Reply::error(config::PING_ERROR, err.to_string())
}

fn start_ping(state: &BridgeState, request: PingRequest, responder: Responder) {
    let probe = state.providers.probe.clone();
    spawn_worker(state, "pingTest", responder, async move {
        let result = tokio::task::spawn_blocking(move || run_ping(probe.as_ref(), &request))
            .await
            .unwrap_or_else(|e| Err(e.into()));
        match result {
            Ok(loss) => Reply::success(loss),
            Err(e) => ping_error(e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::{
        ConnectionInfo, NetworkCapabilities, SimulatedConnectivity, SimulatedWifi,
    };
    use serde_json::json;

    #[test]
    fn parse_known_and_unknown_methods() {
        let call = MethodCall::new("getWifiRssi", Value::Null);
        assert_eq!(Request::parse(&call), Some(Request::GetWifiRssi));

        let call = MethodCall::new("pingTest", json!({"count": 2}));
        assert_eq!(
            Request::parse(&call),
            Some(Request::PingTest(PingRequest {
                host: "8.8.8.8".to_string(),
                count: 2
            }))
        );

        let call = MethodCall::new("fooBar", Value::Null);
        assert_eq!(Request::parse(&call), None);

        // Names from the abandoned channel drafts are not served.
        let call = MethodCall::new("getWifiSignalStrength", Value::Null);
        assert_eq!(Request::parse(&call), None);
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            "isWifiConnected",
            "getWifiRssi",
            "getCurrentWifiInfo",
            "scanWifiNetworks",
            "pingTest",
        ] {
            let request = Request::parse(&MethodCall::new(method, Value::Null)).unwrap();
            assert_eq!(request.method(), method);
        }
    }

    #[test]
    fn wifi_connected_requires_wifi_transport() {
        let connectivity = SimulatedConnectivity::wifi();
        assert!(is_wifi_connected(&connectivity));

        connectivity.set_active(Some(NetworkCapabilities::new(vec![Transport::Cellular])));
        assert!(!is_wifi_connected(&connectivity));

        connectivity.set_active(None);
        assert!(!is_wifi_connected(&connectivity));
    }

    #[test]
    fn rssi_and_link_info_sentinels() {
        let wifi = SimulatedWifi::new();
        assert_eq!(current_rssi(&wifi), -100);
        assert_eq!(current_link_info(&wifi), None);

        wifi.set_connection(Some(ConnectionInfo {
            ssid: "\"Cafe\"".to_string(),
            bssid: Some("aa:bb:cc:dd:ee:ff".to_string()),
            rssi: -61,
            link_speed: 65,
            frequency: Some(5180),
            ip_address: 0x0A00000A,
        }));
        assert_eq!(current_rssi(&wifi), -61);
        let info = current_link_info(&wifi).unwrap();
        assert_eq!(info.ssid, "Cafe");
        assert_eq!(info.ip_address, "10.0.0.10");
    }
}
