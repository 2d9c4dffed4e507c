use crate::app::BridgeState;
use crate::bridge::handlers::to_json;
use crate::bridge::spawn_worker;
use crate::channel::{Reply, Responder};
use crate::wifi::{ScanEntry, WifiProvider};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Start a scan and answer with the results after the settling interval.
///
/// A refused scan answers with an empty list straight away. The whole
/// exchange runs on a worker so the reply loop never waits on the radio.
pub(crate) fn start(state: &BridgeState, responder: Responder) {
    let wifi = state.providers.wifi.clone();
    let settle = state.config.settle_delay;

    spawn_worker(state, "scanWifiNetworks", responder, async move {
        let trigger = wifi.clone();
        let started = tokio::task::spawn_blocking(move || trigger.start_scan())
            .await
            .unwrap_or_else(|e| Err(e.into()));
        match started {
            Ok(true) => {}
            Ok(false) => {
                info!("Scan refused by provider");
                return Reply::success(Value::Array(Vec::new()));
            }
            Err(e) => {
                warn!("Scan could not be started: {e}");
                return Reply::success(Value::Array(Vec::new()));
            }
        }

        tokio::time::sleep(settle).await;

        let entries = tokio::task::spawn_blocking(move || snapshot(wifi.as_ref()))
            .await
            .unwrap_or_else(|e| {
                warn!("Scan snapshot worker failed: {e}");
                Vec::new()
            });
        info!(count = entries.len(), "Scan finished");
        Reply::success(to_json(&entries, Value::Array(Vec::new())))
    });
}

/// Project the provider's cached scan results
pub fn snapshot(wifi: &dyn WifiProvider) -> Vec<ScanEntry> {
    match wifi.scan_results() {
        Ok(records) => {
            debug!(count = records.len(), "Read cached scan results");
            records.iter().map(ScanEntry::from).collect()
        }
        Err(e) => {
            warn!("Reading scan results failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::{ScanRecord, SimulatedWifi};

    #[test]
    fn snapshot_keeps_provider_length_and_order() {
        let wifi = SimulatedWifi::new();
        assert!(snapshot(&wifi).is_empty());

        wifi.set_scan_results(vec![
            ScanRecord {
                ssid: "\"Alpha\"".to_string(),
                bssid: "aa:aa:aa:aa:aa:aa".to_string(),
                level: -40,
                frequency: 2412,
                capabilities: "[WPA2-PSK-CCMP][ESS]".to_string(),
            },
            ScanRecord {
                ssid: "Beta".to_string(),
                bssid: "bb:bb:bb:bb:bb:bb".to_string(),
                level: -80,
                frequency: 5180,
                capabilities: "[ESS]".to_string(),
            },
        ]);

        let entries = snapshot(&wifi);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ssid, "Alpha");
        assert_eq!(entries[1].bssid, "bb:bb:bb:bb:bb:bb");
    }
}
