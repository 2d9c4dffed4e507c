//! Providers for Linux hosts backed by `iw`, `ip` and sysfs.
//!
//! Association and scan data come from `iw dev <iface> link` and
//! `iw dev <iface> scan dump`. Linux has no RSSI broadcast, so while any
//! receiver is registered a polling thread samples the link and emits
//! `RssiChanged` / `NetworkStateChanged` on change.

use crate::config;
use crate::error::{BridgeError, BridgeResult};
use crate::wifi::broadcast::{BroadcastAction, BroadcastReceiver, ReceiverId};
use crate::wifi::provider::{ConnectivityProvider, WifiProvider};
use crate::wifi::types::{ConnectionInfo, NetworkCapabilities, ScanRecord, Transport, pack_ipv4};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

type ReceiverMap = Arc<Mutex<BTreeMap<ReceiverId, BroadcastReceiver>>>;

fn run(program: &str, args: &[&str]) -> BridgeResult<Output> {
    Command::new(program)
        .args(args)
        .output()
        .map_err(|e| BridgeError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            reason: e.to_string(),
        })
}

fn run_checked(program: &str, args: &[&str]) -> BridgeResult<String> {
    let output = run(program, args)?;
    if !output.status.success() {
        return Err(BridgeError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            reason: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Wi-Fi provider for one wireless interface
#[derive(Debug)]
pub struct LinuxWifi {
    interface: String,
    poll_interval: Duration,
    receivers: ReceiverMap,
    poller: Mutex<Option<Arc<AtomicBool>>>,
}

impl LinuxWifi {
    pub fn new(interface: impl Into<String>, poll_interval: Duration) -> Self {
        LinuxWifi {
            interface: interface.into(),
            poll_interval,
            receivers: Arc::new(Mutex::new(BTreeMap::new())),
            poller: Mutex::new(None),
        }
    }

    fn receivers(&self) -> BridgeResult<MutexGuard<'_, BTreeMap<ReceiverId, BroadcastReceiver>>> {
        self.receivers
            .lock()
            .map_err(|_| BridgeError::Internal("receiver table poisoned".to_string()))
    }

    fn start_poller(&self) -> BridgeResult<()> {
        let mut poller = self
            .poller
            .lock()
            .map_err(|_| BridgeError::Internal("poller state poisoned".to_string()))?;
        if poller.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let receivers = self.receivers.clone();
        let interface = self.interface.clone();
        let interval = self.poll_interval;

        std::thread::Builder::new()
            .name(format!("wifi-poll-{interface}"))
            .spawn(move || poll_link(&interface, interval, &receivers, &thread_stop))
            .map_err(|e| BridgeError::ReceiverRegistrationFailed(e.to_string()))?;

        info!(interface = %self.interface, "Started link poller");
        *poller = Some(stop);
        Ok(())
    }

    fn stop_poller(&self) {
        if let Ok(mut poller) = self.poller.lock()
            && let Some(stop) = poller.take()
        {
            stop.store(true, Ordering::Relaxed);
            info!(interface = %self.interface, "Stopped link poller");
        }
    }
}

fn read_link(interface: &str) -> BridgeResult<Option<ConnectionInfo>> {
    let link = run_checked("iw", &["dev", interface, "link"])?;
    let Some(mut info) = parse_iw_link_output(&link) else {
        return Ok(None);
    };

    match run_checked("ip", &["-4", "-o", "addr", "show", "dev", interface]) {
        Ok(addr) => {
            if let Some(ip) = parse_ipv4_addr(&addr) {
                info.ip_address = pack_ipv4(ip);
            }
        }
        Err(e) => debug!("No IPv4 address for {interface}: {e}"),
    }
    Ok(Some(info))
}

/// Broadcasts implied by the RSSI moving from `last` to `current`, where
/// `None` means no association
pub fn link_actions(last: Option<i32>, current: Option<i32>) -> Vec<BroadcastAction> {
    match (last, current) {
        (Some(before), Some(now)) if before != now => vec![BroadcastAction::RssiChanged],
        (Some(_), None) | (None, Some(_)) => vec![BroadcastAction::NetworkStateChanged],
        _ => Vec::new(),
    }
}

fn poll_link(interface: &str, interval: Duration, receivers: &ReceiverMap, stop: &AtomicBool) {
    let mut last = read_link(interface).ok().flatten().map(|c| c.rssi);

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(interval);
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let current = match read_link(interface) {
            Ok(info) => info.map(|c| c.rssi),
            Err(e) => {
                warn!("Link poll failed: {e}");
                continue;
            }
        };

        let actions = link_actions(last, current);
        last = current;

        if actions.is_empty() {
            continue;
        }
        let targets: Vec<BroadcastReceiver> = match receivers.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => break,
        };
        for action in actions {
            for receiver in &targets {
                receiver.on_receive(action);
            }
        }
    }
}

impl WifiProvider for LinuxWifi {
    fn connection_info(&self) -> BridgeResult<Option<ConnectionInfo>> {
        read_link(&self.interface)
    }

    fn start_scan(&self) -> BridgeResult<bool> {
        let output = run("iw", &["dev", &self.interface, "scan", "trigger"])?;
        if !output.status.success() {
            debug!(
                "Scan trigger refused: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }

    fn scan_results(&self) -> BridgeResult<Vec<ScanRecord>> {
        let dump = run_checked("iw", &["dev", &self.interface, "scan", "dump"])?;
        Ok(parse_iw_scan_dump(&dump))
    }

    fn register_receiver(&self, receiver: BroadcastReceiver) -> BridgeResult<()> {
        self.receivers()?.insert(receiver.id(), receiver);
        self.start_poller()
    }

    fn unregister_receiver(&self, id: ReceiverId) -> BridgeResult<()> {
        let mut receivers = self.receivers()?;
        if receivers.remove(&id).is_none() {
            return Err(BridgeError::Internal(format!("{id} was not registered")));
        }
        let now_empty = receivers.is_empty();
        drop(receivers);
        if now_empty {
            self.stop_poller();
        }
        Ok(())
    }
}

impl Drop for LinuxWifi {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

/// Connectivity provider reading the default route
#[derive(Debug)]
pub struct LinuxConnectivity {
    sysfs_net: PathBuf,
}

impl Default for LinuxConnectivity {
    fn default() -> Self {
        LinuxConnectivity {
            sysfs_net: PathBuf::from("/sys/class/net"),
        }
    }
}

impl ConnectivityProvider for LinuxConnectivity {
    fn active_network(&self) -> BridgeResult<Option<NetworkCapabilities>> {
        let routes = run_checked("ip", &["route", "show", "default"])?;
        Ok(parse_default_route(&routes)
            .map(|dev| NetworkCapabilities::new(vec![classify_device(&dev, &self.sysfs_net)])))
    }
}

/// Transport of a network device, judged from sysfs and its name
pub fn classify_device(device: &str, sysfs_net: &Path) -> Transport {
    if sysfs_net.join(device).join("wireless").exists() {
        Transport::Wifi
    } else if ["tun", "tap", "wg", "ppp"]
        .iter()
        .any(|prefix| device.starts_with(prefix))
    {
        Transport::Vpn
    } else if device.starts_with("wwan") || device.starts_with("rmnet") {
        Transport::Cellular
    } else {
        Transport::Ethernet
    }
}

/// Device name of the first `default` route in `ip route show default` output
pub fn parse_default_route(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.starts_with("default"))
        .find_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|t| *t == "dev")?;
            tokens.next().map(str::to_owned)
        })
}

/// First IPv4 address in `ip -4 -o addr show` output
pub fn parse_ipv4_addr(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|t| *t == "inet")?;
        let cidr = tokens.next()?;
        cidr.split('/').next()?.parse().ok()
    })
}

/// Parse `iw dev <iface> link`; `None` when not connected
pub fn parse_iw_link_output(output: &str) -> Option<ConnectionInfo> {
    let mut lines = output.lines();
    let header = lines.next()?.trim();
    let rest = header.strip_prefix("Connected to ")?;
    let bssid = rest
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .filter(|mac| mac.len() == 17)
        .map(str::to_lowercase);

    let mut info = ConnectionInfo {
        ssid: String::new(),
        bssid,
        rssi: config::RSSI_UNAVAILABLE,
        // Unknown until a "tx bitrate" line is seen
        link_speed: -1,
        frequency: None,
        ip_address: 0,
    };

    for line in lines {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("SSID:") {
            info.ssid = rest.trim().to_owned();
        } else if let Some(rest) = trimmed.strip_prefix("freq:") {
            info.frequency = parse_leading_number(rest).map(|f| f as i32);
        } else if let Some(rest) = trimmed.strip_prefix("signal:") {
            if let Some(dbm) = parse_leading_number(rest) {
                info.rssi = dbm as i32;
            }
        } else if let Some(rest) = trimmed.strip_prefix("tx bitrate:") {
            if let Some(mbps) = parse_leading_number(rest) {
                info.link_speed = mbps as i32;
            }
        }
    }
    Some(info)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecuritySection {
    Rsn,
    Wpa,
}

#[derive(Default)]
struct BssStanza {
    bssid: Option<String>,
    ssid: Option<String>,
    signal_dbm: Option<f64>,
    freq_mhz: Option<f64>,
    ess: bool,
    privacy: bool,
    rsn_auth: Option<String>,
    wpa_auth: Option<String>,
    section: Option<SecuritySection>,
}

impl BssStanza {
    fn flush(self) -> Option<ScanRecord> {
        let bssid = self.bssid?;
        let mut capabilities = String::new();
        if let Some(auth) = &self.rsn_auth {
            capabilities.push_str(&format!("[WPA2-{auth}-CCMP]"));
        }
        if let Some(auth) = &self.wpa_auth {
            capabilities.push_str(&format!("[WPA-{auth}-TKIP]"));
        }
        if self.privacy && self.rsn_auth.is_none() && self.wpa_auth.is_none() {
            capabilities.push_str("[WEP]");
        }
        if self.ess {
            capabilities.push_str("[ESS]");
        }

        Some(ScanRecord {
            ssid: self.ssid.unwrap_or_default(),
            bssid,
            level: self
                .signal_dbm
                .map(|s| s as i32)
                .unwrap_or(config::RSSI_UNAVAILABLE),
            frequency: self.freq_mhz.map(|f| f as i32).unwrap_or(0),
            capabilities,
        })
    }

    fn set_auth(&mut self, suites: &str) {
        let auth = if suites.contains("SAE") {
            "SAE"
        } else if suites.contains("802.1X") {
            "EAP"
        } else {
            "PSK"
        };
        match self.section {
            Some(SecuritySection::Rsn) => self.rsn_auth = Some(auth.to_string()),
            Some(SecuritySection::Wpa) => self.wpa_auth = Some(auth.to_string()),
            None => {}
        }
    }
}

/// Parse `iw dev <iface> scan dump` into one record per BSS stanza
pub fn parse_iw_scan_dump(output: &str) -> Vec<ScanRecord> {
    let mut results = Vec::new();
    let mut current: Option<BssStanza> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("BSS ") {
            if let Some(record) = current.take().and_then(BssStanza::flush) {
                results.push(record);
            }
            // "BSS aa:bb:cc:dd:ee:ff(on wlan0) -- associated"
            let mac_end = rest
                .find(|c: char| !c.is_ascii_hexdigit() && c != ':')
                .unwrap_or(rest.len());
            let mac = &rest[..mac_end];
            if mac.len() == 17 {
                current = Some(BssStanza {
                    bssid: Some(mac.to_lowercase()),
                    ..BssStanza::default()
                });
            }
            continue;
        }

        let Some(stanza) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("SSID:") {
            stanza.ssid = Some(rest.trim().to_owned());
        } else if let Some(rest) = trimmed.strip_prefix("signal:") {
            stanza.signal_dbm = parse_leading_number(rest);
        } else if let Some(rest) = trimmed.strip_prefix("freq:") {
            stanza.freq_mhz = parse_leading_number(rest);
        } else if let Some(rest) = trimmed.strip_prefix("capability:") {
            stanza.ess = rest.contains("ESS");
            stanza.privacy = rest.contains("Privacy");
        } else if trimmed.starts_with("RSN:") {
            stanza.section = Some(SecuritySection::Rsn);
            stanza.rsn_auth.get_or_insert_with(|| "PSK".to_string());
        } else if trimmed.starts_with("WPA:") {
            stanza.section = Some(SecuritySection::Wpa);
            stanza.wpa_auth.get_or_insert_with(|| "PSK".to_string());
        } else if let Some(rest) = trimmed.strip_prefix("* Authentication suites:") {
            stanza.set_auth(rest);
        } else if !line.starts_with("\t\t") {
            // Any other top-level field closes the security section.
            stanza.section = None;
        }
    }

    if let Some(record) = current.take().and_then(BssStanza::flush) {
        results.push(record);
    }
    results
}

/// Parse "-52.00 dBm" / "2437.0" / "150.0 MBit/s" style values
fn parse_leading_number(s: &str) -> Option<f64> {
    s.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_changes_map_to_broadcasts() {
        assert_eq!(
            link_actions(Some(-50), Some(-55)),
            vec![BroadcastAction::RssiChanged]
        );
        assert!(link_actions(Some(-50), Some(-50)).is_empty());
        assert_eq!(
            link_actions(None, Some(-50)),
            vec![BroadcastAction::NetworkStateChanged]
        );
        assert_eq!(
            link_actions(Some(-50), None),
            vec![BroadcastAction::NetworkStateChanged]
        );
        assert!(link_actions(None, None).is_empty());
    }

    fn polling(wifi: &LinuxWifi) -> bool {
        wifi.poller.lock().unwrap().is_some()
    }

    #[test]
    fn poller_runs_while_any_receiver_is_registered() {
        // Long interval keeps the thread asleep after its first read.
        let wifi = LinuxWifi::new("nonexistent0", Duration::from_secs(3600));
        assert!(!polling(&wifi));

        let first = BroadcastReceiver::new(vec![BroadcastAction::RssiChanged], |_, _| {});
        let second = BroadcastReceiver::new(vec![BroadcastAction::RssiChanged], |_, _| {});
        let (first_id, second_id) = (first.id(), second.id());

        wifi.register_receiver(first).unwrap();
        assert!(polling(&wifi));
        let stop = wifi.poller.lock().unwrap().clone().unwrap();

        wifi.register_receiver(second).unwrap();
        let same = wifi.poller.lock().unwrap().clone().unwrap();
        assert!(Arc::ptr_eq(&stop, &same), "poller restarted");

        wifi.unregister_receiver(first_id).unwrap();
        assert!(polling(&wifi));
        assert!(!stop.load(Ordering::Relaxed));

        wifi.unregister_receiver(second_id).unwrap();
        assert!(!polling(&wifi));
        assert!(stop.load(Ordering::Relaxed));

        assert!(wifi.unregister_receiver(second_id).is_err());
    }

    const SAMPLE_LINK: &str = "\
Connected to AA:BB:CC:DD:EE:FF (on wlan0)
\tSSID: HomeNet
\tfreq: 2437.0
\tRX: 1234 bytes (10 packets)
\tTX: 567 bytes (5 packets)
\tsignal: -55 dBm
\trx bitrate: 72.2 MBit/s
\ttx bitrate: 150.0 MBit/s MCS 7 40MHz short GI
";

    const SAMPLE_DUMP: &str = "\
BSS aa:bb:cc:dd:ee:ff(on wlan0) -- associated
\tfreq: 5180
\tcapability: ESS Privacy (0x0011)
\tsignal: -52.00 dBm
\tSSID: HomeNetwork
\tRSN:\t * Version: 1
\t\t * Group cipher: CCMP
\t\t * Authentication suites: PSK
\tDS Parameter set: channel 36
BSS 11:22:33:44:55:66(on wlan0)
\tfreq: 2437
\tcapability: ESS (0x0001)
\tsignal: -71.00 dBm
\tSSID: GuestWifi
BSS de:ad:be:ef:ca:fe(on wlan0)
\tfreq: 5745
\tcapability: ESS Privacy (0x0011)
\tsignal: -80.00 dBm
\tSSID: Corp
\tRSN:\t * Version: 1
\t\t * Authentication suites: IEEE 802.1X
\tWPA:\t * Version: 1
\t\t * Authentication suites: PSK
";

    #[test]
    fn parse_connected_link() {
        let info = parse_iw_link_output(SAMPLE_LINK).unwrap();
        assert_eq!(info.ssid, "HomeNet");
        assert_eq!(info.bssid.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(info.rssi, -55);
        assert_eq!(info.frequency, Some(2437));
        assert_eq!(info.link_speed, 150);
    }

    #[test]
    fn parse_disconnected_link() {
        assert!(parse_iw_link_output("Not connected.\n").is_none());
        assert!(parse_iw_link_output("").is_none());
    }

    #[test]
    fn parse_scan_dump_stanzas() {
        let records = parse_iw_scan_dump(SAMPLE_DUMP);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].ssid, "HomeNetwork");
        assert_eq!(records[0].bssid, "aa:bb:cc:dd:ee:ff");
        assert_eq!(records[0].level, -52);
        assert_eq!(records[0].frequency, 5180);
        assert_eq!(records[0].capabilities, "[WPA2-PSK-CCMP][ESS]");

        assert_eq!(records[1].capabilities, "[ESS]");
        assert_eq!(records[1].frequency, 2437);

        assert_eq!(records[2].capabilities, "[WPA2-EAP-CCMP][WPA-PSK-TKIP][ESS]");
    }

    #[test]
    fn parse_empty_dump() {
        assert!(parse_iw_scan_dump("").is_empty());
    }

    #[test]
    fn parse_route_and_address() {
        let routes = "default via 192.168.1.1 dev wlan0 proto dhcp metric 600\n";
        assert_eq!(parse_default_route(routes).as_deref(), Some("wlan0"));
        assert_eq!(parse_default_route(""), None);

        let addr = concat!(
            "3: wlan0    inet 192.168.1.23/24 brd 192.168.1.255 scope global dynamic wlan0\\",
            "       valid_lft 86000sec preferred_lft 86000sec\n",
        );
        assert_eq!(parse_ipv4_addr(addr), Some(Ipv4Addr::new(192, 168, 1, 23)));
        assert_eq!(parse_ipv4_addr(""), None);
    }

    #[test]
    fn classify_without_sysfs_entry() {
        let root = Path::new("/nonexistent-sysfs");
        assert_eq!(classify_device("eth0", root), Transport::Ethernet);
        assert_eq!(classify_device("wg0", root), Transport::Vpn);
        assert_eq!(classify_device("wwan0", root), Transport::Cellular);
    }
}
