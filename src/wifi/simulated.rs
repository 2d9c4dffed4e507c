//! In-memory providers whose state is driven programmatically.

use crate::error::{BridgeError, BridgeResult};
use crate::wifi::broadcast::{BroadcastAction, BroadcastReceiver, ReceiverId};
use crate::wifi::provider::{ConnectivityProvider, WifiProvider};
use crate::wifi::types::{ConnectionInfo, NetworkCapabilities, ScanRecord, Transport};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct SimulatedState {
    connection: Option<ConnectionInfo>,
    scan_results: Vec<ScanRecord>,
    scan_allowed: bool,
    scans_started: usize,
    receivers: BTreeMap<ReceiverId, BroadcastReceiver>,
    registrations: usize,
    unregistrations: usize,
}

/// Wi-Fi provider backed by mutable in-memory state
#[derive(Debug)]
pub struct SimulatedWifi {
    state: Mutex<SimulatedState>,
}

impl Default for SimulatedWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedWifi {
    pub fn new() -> Self {
        SimulatedWifi {
            state: Mutex::new(SimulatedState {
                connection: None,
                scan_results: Vec::new(),
                scan_allowed: true,
                scans_started: 0,
                receivers: BTreeMap::new(),
                registrations: 0,
                unregistrations: 0,
            }),
        }
    }

    fn lock(&self) -> BridgeResult<MutexGuard<'_, SimulatedState>> {
        self.state
            .lock()
            .map_err(|_| BridgeError::Internal("simulated wifi state poisoned".to_string()))
    }

    // Setters recover from poisoning; they are only driven by tests and demos.
    fn lock_state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connection(&self, connection: Option<ConnectionInfo>) {
        self.lock_state().connection = connection;
    }

    /// Change the RSSI of the current association, if any
    pub fn set_rssi(&self, rssi: i32) {
        if let Some(connection) = self.lock_state().connection.as_mut() {
            connection.rssi = rssi;
        }
    }

    pub fn set_scan_results(&self, results: Vec<ScanRecord>) {
        self.lock_state().scan_results = results;
    }

    pub fn set_scan_allowed(&self, allowed: bool) {
        self.lock_state().scan_allowed = allowed;
    }

    pub fn scans_started(&self) -> usize {
        self.lock_state().scans_started
    }

    pub fn registrations(&self) -> usize {
        self.lock_state().registrations
    }

    pub fn unregistrations(&self) -> usize {
        self.lock_state().unregistrations
    }

    pub fn active_receivers(&self) -> usize {
        self.lock_state().receivers.len()
    }

    /// Deliver a broadcast to every registered receiver, in registration order
    pub fn emit(&self, action: BroadcastAction) {
        // Clone out so callbacks run without the lock held.
        let receivers: Vec<BroadcastReceiver> =
            self.lock_state().receivers.values().cloned().collect();
        for receiver in receivers {
            receiver.on_receive(action);
        }
    }
}

impl WifiProvider for SimulatedWifi {
    fn connection_info(&self) -> BridgeResult<Option<ConnectionInfo>> {
        Ok(self.lock()?.connection.clone())
    }

    fn start_scan(&self) -> BridgeResult<bool> {
        let mut state = self.lock()?;
        if state.scan_allowed {
            state.scans_started += 1;
        }
        Ok(state.scan_allowed)
    }

    fn scan_results(&self) -> BridgeResult<Vec<ScanRecord>> {
        Ok(self.lock()?.scan_results.clone())
    }

    fn register_receiver(&self, receiver: BroadcastReceiver) -> BridgeResult<()> {
        let mut state = self.lock()?;
        if state.receivers.contains_key(&receiver.id()) {
            return Err(BridgeError::ReceiverRegistrationFailed(format!(
                "{} is already registered",
                receiver.id()
            )));
        }
        state.receivers.insert(receiver.id(), receiver);
        state.registrations += 1;
        Ok(())
    }

    fn unregister_receiver(&self, id: ReceiverId) -> BridgeResult<()> {
        let mut state = self.lock()?;
        match state.receivers.remove(&id) {
            Some(_) => {
                state.unregistrations += 1;
                Ok(())
            }
            None => Err(BridgeError::Internal(format!("{id} was not registered"))),
        }
    }
}

/// Connectivity provider with a settable default network
#[derive(Debug, Default)]
pub struct SimulatedConnectivity {
    active: Mutex<Option<NetworkCapabilities>>,
}

impl SimulatedConnectivity {
    pub fn new(active: Option<NetworkCapabilities>) -> Self {
        SimulatedConnectivity {
            active: Mutex::new(active),
        }
    }

    pub fn wifi() -> Self {
        Self::new(Some(NetworkCapabilities::new(vec![Transport::Wifi])))
    }

    pub fn set_active(&self, active: Option<NetworkCapabilities>) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = active;
    }
}

impl ConnectivityProvider for SimulatedConnectivity {
    fn active_network(&self) -> BridgeResult<Option<NetworkCapabilities>> {
        self.active
            .lock()
            .map(|active| active.clone())
            .map_err(|_| BridgeError::Internal("simulated connectivity poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn registration_counts_pair_up() {
        let wifi = SimulatedWifi::new();
        let receiver = BroadcastReceiver::new(vec![BroadcastAction::RssiChanged], |_, _| {});
        let id = receiver.id();

        wifi.register_receiver(receiver.clone()).unwrap();
        assert!(wifi.register_receiver(receiver).is_err());
        wifi.unregister_receiver(id).unwrap();
        assert!(wifi.unregister_receiver(id).is_err());

        assert_eq!(wifi.registrations(), 1);
        assert_eq!(wifi.unregistrations(), 1);
        assert_eq!(wifi.active_receivers(), 0);
    }

    #[test]
    fn emit_reaches_registered_receivers_only() {
        let wifi = SimulatedWifi::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let receiver = BroadcastReceiver::new(vec![BroadcastAction::RssiChanged], move |_, _| {
            *counter.lock().unwrap() += 1
        });
        let id = receiver.id();

        wifi.register_receiver(receiver).unwrap();
        wifi.emit(BroadcastAction::RssiChanged);
        wifi.unregister_receiver(id).unwrap();
        wifi.emit(BroadcastAction::RssiChanged);

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn refused_scan_is_not_counted() {
        let wifi = SimulatedWifi::new();
        wifi.set_scan_allowed(false);
        assert!(!wifi.start_scan().unwrap());
        assert_eq!(wifi.scans_started(), 0);
    }
}
