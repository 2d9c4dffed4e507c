use crate::bridge::Inbound;
use crate::bridge::handlers::current_rssi;
use crate::channel::EventSink;
use crate::config;
use crate::wifi::{BroadcastAction, BroadcastReceiver, ReceiverId, WifiProvider};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tracing::{debug, info, warn};

/// Signal-strength stream subscription.
///
/// Registration and unregistration of the broadcast receiver are paired
/// through the `Idle` / `Listening` transitions; at most one receiver is
/// registered at any time.
#[derive(Debug, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Listening {
        sink: EventSink,
        receiver: ReceiverId,
    },
}

impl StreamState {
    pub fn is_listening(&self) -> bool {
        matches!(self, StreamState::Listening { .. })
    }

    /// Register `receiver` and start forwarding RSSI to `sink`.
    ///
    /// An active subscription is released first. If the provider refuses the
    /// registration the stream is ended and the state stays `Idle`.
    pub fn listen(
        &mut self,
        wifi: &dyn WifiProvider,
        sink: EventSink,
        receiver: BroadcastReceiver,
    ) {
        if self.cancel(wifi) {
            debug!("Superseded previous stream subscription");
        }

        let id = receiver.id();
        match wifi.register_receiver(receiver) {
            Ok(()) => {
                info!(%id, "Stream listening");
                *self = StreamState::Listening { sink, receiver: id };
            }
            Err(e) => {
                warn!("Could not start stream: {e}");
                sink.end_of_stream();
            }
        }
    }

    /// Unregister the active receiver and drop its sink. Returns whether a
    /// subscription was active.
    pub fn cancel(&mut self, wifi: &dyn WifiProvider) -> bool {
        match std::mem::take(self) {
            StreamState::Listening { receiver, .. } => {
                release(wifi, receiver);
                info!(id = %receiver, "Stream cancelled");
                true
            }
            StreamState::Idle => false,
        }
    }

    /// Like [`cancel`](Self::cancel), but tells the consumer the stream is over.
    pub fn close(&mut self, wifi: &dyn WifiProvider) {
        if let StreamState::Listening { sink, receiver } = std::mem::take(self) {
            release(wifi, receiver);
            sink.end_of_stream();
            info!(id = %receiver, "Stream closed");
        }
    }

    /// Whether a broadcast from `receiver` should be answered with an RSSI
    /// sample.
    ///
    /// Broadcasts from a receiver that is no longer active were queued before
    /// it was released and are dropped.
    pub fn on_broadcast(&self, receiver: ReceiverId, action: BroadcastAction) -> bool {
        match self {
            StreamState::Listening {
                receiver: active, ..
            } if *active == receiver => {
                debug!(%receiver, action = action.as_str(), "Sampling RSSI");
                true
            }
            StreamState::Listening { .. } => {
                debug!(%receiver, "Broadcast from released receiver, ignored");
                false
            }
            StreamState::Idle => {
                debug!(%receiver, "Broadcast while idle, ignored");
                false
            }
        }
    }

    /// Push an RSSI sample taken for `receiver`. Samples for a receiver that
    /// was released while it was being read are dropped.
    pub fn deliver(&self, receiver: ReceiverId, rssi: i32) {
        match self {
            StreamState::Listening {
                sink,
                receiver: active,
            } if *active == receiver => {
                debug!(rssi, "Forwarding RSSI update");
                if !sink.success(rssi) {
                    debug!("Stream consumer went away");
                }
            }
            _ => debug!(%receiver, "Sample for released receiver, ignored"),
        }
    }
}

/// Read the RSSI for each requested broadcast on the blocking pool, one at a
/// time, and post the samples back to the reply loop in request order.
///
/// Ends when the reply loop drops its request sender or goes away.
pub(crate) async fn sample_rssi(
    wifi: Arc<dyn WifiProvider>,
    mut requests: UnboundedReceiver<ReceiverId>,
    mailbox: WeakUnboundedSender<Inbound>,
) {
    while let Some(receiver) = requests.recv().await {
        let reader = wifi.clone();
        let rssi = tokio::task::spawn_blocking(move || current_rssi(reader.as_ref()))
            .await
            .unwrap_or_else(|e| {
                warn!("RSSI sample failed: {e}");
                config::RSSI_UNAVAILABLE
            });
        let Some(tx) = mailbox.upgrade() else {
            break;
        };
        if tx.send(Inbound::Sample { receiver, rssi }).is_err() {
            break;
        }
    }
    debug!("RSSI sampler stopped");
}

fn release(wifi: &dyn WifiProvider, receiver: ReceiverId) {
    if let Err(e) = wifi.unregister_receiver(receiver) {
        warn!("Failed to unregister {receiver}: {e}");
    }
}
