use crate::bridge::{Inbound, StreamState};
use crate::channel::EventSink;
use crate::config::BridgeConfig;
use crate::probe::EchoProbe;
use crate::wifi::{
    BroadcastAction, BroadcastReceiver, ConnectivityProvider, ReceiverId, WifiProvider,
};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tracing::debug;

/// Platform services a bridge session queries
#[derive(Clone)]
pub struct Providers {
    pub wifi: Arc<dyn WifiProvider>,
    pub connectivity: Arc<dyn ConnectivityProvider>,
    pub probe: Arc<dyn EchoProbe>,
}

impl Providers {
    pub fn new(
        wifi: Arc<dyn WifiProvider>,
        connectivity: Arc<dyn ConnectivityProvider>,
        probe: Arc<dyn EchoProbe>,
    ) -> Self {
        Providers {
            wifi,
            connectivity,
            probe,
        }
    }
}

/// Session state, owned by the reply loop
pub(crate) struct BridgeState {
    pub providers: Providers,
    pub config: BridgeConfig,
    pub stream: StreamState,
    pub mailbox: WeakUnboundedSender<Inbound>,
    /// Receivers whose broadcast needs an RSSI sample
    pub sampler: UnboundedSender<ReceiverId>,
}

impl BridgeState {
    pub fn new(
        providers: Providers,
        config: BridgeConfig,
        mailbox: WeakUnboundedSender<Inbound>,
        sampler: UnboundedSender<ReceiverId>,
    ) -> BridgeState {
        BridgeState {
            providers,
            config,
            stream: StreamState::Idle,
            mailbox,
            sampler,
        }
    }

    /// Receiver that forwards RSSI and network-state broadcasts into the reply loop
    pub fn new_receiver(&self) -> BroadcastReceiver {
        let mailbox = self.mailbox.clone();
        BroadcastReceiver::new(
            vec![
                BroadcastAction::RssiChanged,
                BroadcastAction::NetworkStateChanged,
            ],
            move |receiver, action| {
                // Broadcasts racing a teardown have nowhere to go.
                if let Some(tx) = mailbox.upgrade() {
                    let _ = tx.send(Inbound::Broadcast { receiver, action });
                }
            },
        )
    }

    /// Begin a stream subscription, superseding any active one
    pub fn listen(&mut self, sink: EventSink) {
        let receiver = self.new_receiver();
        self.stream.listen(self.providers.wifi.as_ref(), sink, receiver);
    }

    /// Forward a broadcast from the active receiver to the RSSI sampler
    pub fn on_broadcast(&self, receiver: ReceiverId, action: BroadcastAction) {
        if self.stream.on_broadcast(receiver, action) && self.sampler.send(receiver).is_err() {
            debug!("RSSI sampler gone, broadcast dropped");
        }
    }

    /// Cancel subscriptions and release provider registrations
    pub fn teardown(&mut self) {
        self.stream.close(self.providers.wifi.as_ref());
    }
}
