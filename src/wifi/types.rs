use crate::config;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Current association as reported by a Wi-Fi provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Raw SSID, possibly wrapped in double quotes
    pub ssid: String,
    pub bssid: Option<String>,
    pub rssi: i32,
    /// Mbit/s, provider-defined
    pub link_speed: i32,
    pub frequency: Option<i32>,
    /// IPv4 address packed little-endian (first octet in the low byte)
    pub ip_address: u32,
}

/// One access point from the provider's cached scan results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ssid: String,
    pub bssid: String,
    pub level: i32,
    pub frequency: i32,
    pub capabilities: String,
}

/// Transport of the default network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Wifi,
    Cellular,
    Ethernet,
    Vpn,
}

/// What the connectivity provider knows about the active default network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCapabilities {
    pub transports: Vec<Transport>,
}

impl NetworkCapabilities {
    pub fn new(transports: Vec<Transport>) -> Self {
        NetworkCapabilities { transports }
    }

    pub fn has_transport(&self, transport: Transport) -> bool {
        self.transports.contains(&transport)
    }
}

/// Fixed-shape snapshot of the current association
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiLinkInfo {
    pub ssid: String,
    pub bssid: String,
    pub rssi: i32,
    pub link_speed: i32,
    pub frequency: i32,
    pub ip_address: String,
}

impl From<&ConnectionInfo> for WifiLinkInfo {
    fn from(info: &ConnectionInfo) -> Self {
        WifiLinkInfo {
            ssid: normalize_ssid(&info.ssid),
            bssid: info
                .bssid
                .clone()
                .unwrap_or_else(|| config::BSSID_UNKNOWN.to_string()),
            rssi: info.rssi,
            link_speed: info.link_speed,
            frequency: info.frequency.unwrap_or(config::FREQUENCY_UNAVAILABLE),
            ip_address: format_ipv4(info.ip_address),
        }
    }
}

/// Neighboring access point as reported to the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub bssid: String,
    pub level: i32,
    pub frequency: i32,
    pub capabilities: String,
}

impl From<&ScanRecord> for ScanEntry {
    fn from(record: &ScanRecord) -> Self {
        ScanEntry {
            ssid: normalize_ssid(&record.ssid),
            bssid: record.bssid.clone(),
            level: record.level,
            frequency: record.frequency,
            capabilities: record.capabilities.clone(),
        }
    }
}

/// Strip every ASCII double quote from an SSID
pub fn normalize_ssid(ssid: &str) -> String {
    ssid.replace('"', "")
}

/// Render a little-endian packed IPv4 address, low byte first
pub fn format_ipv4(packed: u32) -> String {
    Ipv4Addr::from(packed.to_le_bytes()).to_string()
}

/// Inverse of [`format_ipv4`]
pub fn pack_ipv4(addr: Ipv4Addr) -> u32 {
    u32::from_le_bytes(addr.octets())
}
