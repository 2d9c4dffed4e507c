//! Bridge lifecycle and reply loop
//!
//! A single task owns all session state and drains one mailbox. Inbound calls,
//! stream listen/cancel, provider broadcasts and worker continuations are all
//! messages in that mailbox, so state transitions never race and stream
//! updates leave in broadcast arrival order. Provider queries, scans and pings
//! run on workers that post their reply back to the mailbox instead of
//! answering directly, and RSSI for the stream is read by a single sampler
//! task, so the loop itself never waits on a provider.

mod handlers;
mod scan;
mod subscription;

use crate::app::{BridgeState, Providers};
use crate::channel::{
    EventSink, EventStream, MethodCall, Reply, Responder, event_channel, reply_channel,
};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::wifi::{BroadcastAction, ReceiverId};
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use handlers::{Request, current_link_info, current_rssi, is_wifi_connected};
pub use scan::snapshot;
pub use subscription::StreamState;

/// Messages processed by the reply loop
#[derive(Debug)]
pub(crate) enum Inbound {
    Call {
        call: MethodCall,
        responder: Responder,
    },
    Listen {
        arguments: Value,
        sink: EventSink,
    },
    Cancel {
        arguments: Value,
    },
    Broadcast {
        receiver: ReceiverId,
        action: BroadcastAction,
    },
    Sample {
        receiver: ReceiverId,
        rssi: i32,
    },
    Complete {
        method: &'static str,
        responder: Responder,
        reply: Reply,
    },
    Teardown,
}

/// Run `job` on a worker and deliver its reply through the reply loop.
///
/// If the session was torn down meanwhile the reply is dropped.
pub(crate) fn spawn_worker<F>(
    state: &BridgeState,
    method: &'static str,
    responder: Responder,
    job: F,
) where
    F: Future<Output = Reply> + Send + 'static,
{
    let mailbox = state.mailbox.clone();
    tokio::spawn(async move {
        let reply = job.await;
        let delivered = mailbox.upgrade().is_some_and(|tx| {
            tx.send(Inbound::Complete {
                method,
                responder,
                reply,
            })
            .is_ok()
        });
        if !delivered {
            debug!(method, "Bridge torn down, dropping worker reply");
        }
    });
}

/// Cloneable sender side of an active bridge session
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    mailbox: UnboundedSender<Inbound>,
}

impl BridgeHandle {
    fn post(&self, message: Inbound) -> BridgeResult<()> {
        self.mailbox
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Submit a call; the receiver resolves with its single reply
    pub fn invoke(&self, call: MethodCall) -> BridgeResult<oneshot::Receiver<Reply>> {
        let (responder, rx) = reply_channel();
        self.post(Inbound::Call { call, responder })?;
        Ok(rx)
    }

    /// Submit a call and wait for its reply
    pub async fn call(&self, method: impl Into<String>, arguments: Value) -> BridgeResult<Reply> {
        let rx = self.invoke(MethodCall::new(method, arguments))?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Subscribe to RSSI updates on the stream channel
    pub fn listen(&self, arguments: Value) -> BridgeResult<EventStream> {
        let (sink, stream) = event_channel();
        self.post(Inbound::Listen { arguments, sink })?;
        Ok(stream)
    }

    pub fn cancel(&self, arguments: Value) -> BridgeResult<()> {
        self.post(Inbound::Cancel { arguments })
    }
}

/// An activated bridge session
#[derive(Debug)]
pub struct Bridge {
    handle: BridgeHandle,
    task: JoinHandle<()>,
}

impl Bridge {
    /// Install the dispatcher and stream handler and start the reply loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(providers: Providers, config: BridgeConfig) -> Bridge {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sampler, samples) = mpsc::unbounded_channel();
        tokio::spawn(subscription::sample_rssi(
            providers.wifi.clone(),
            samples,
            tx.downgrade(),
        ));
        let state = BridgeState::new(providers, config, tx.downgrade(), sampler);
        let task = tokio::spawn(run(state, rx));
        info!("Bridge activated");
        Bridge {
            handle: BridgeHandle { mailbox: tx },
            task,
        }
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Stop routing calls, close any active stream and release the providers
    pub async fn teardown(self) {
        // The loop may already be gone; teardown is idempotent from here.
        let _ = self.handle.post(Inbound::Teardown);
        if let Err(e) = self.task.await {
            warn!("Reply loop ended abnormally: {e}");
        }
    }
}

async fn run(mut state: BridgeState, mut inbox: UnboundedReceiver<Inbound>) {
    while let Some(message) = inbox.recv().await {
        match message {
            Inbound::Call { call, responder } => handlers::dispatch(&state, call, responder),
            Inbound::Listen { arguments, sink } => {
                debug!(%arguments, "Stream listen");
                state.listen(sink);
            }
            Inbound::Cancel { arguments } => {
                debug!(%arguments, "Stream cancel");
                state.stream.cancel(state.providers.wifi.as_ref());
            }
            Inbound::Broadcast { receiver, action } => state.on_broadcast(receiver, action),
            Inbound::Sample { receiver, rssi } => state.stream.deliver(receiver, rssi),
            Inbound::Complete {
                method,
                responder,
                reply,
            } => {
                debug!(method, "Delivering worker reply");
                responder.reply(reply);
            }
            Inbound::Teardown => break,
        }
    }

    // Anything still queued is dropped with the inbox, unanswered.
    inbox.close();
    state.teardown();
    info!("Bridge torn down");
}
