//! JSON-lines channel transport
//!
//! Each input line is one frame addressed to the request channel or the stream
//! channel; each output line is a reply or a stream event. Replies to
//! concurrent calls are written as they complete, tagged with the call's id.

use crate::bridge::{Bridge, BridgeHandle};
use crate::channel::{MethodCall, Reply, StreamEvent};
use crate::config::{REQUEST_CHANNEL, STREAM_CHANNEL};
use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamCommand {
    Listen,
    Cancel,
}

/// A frame read from the consumer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "channel")]
pub enum InboundFrame {
    #[serde(rename = "network_tools")]
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        arguments: Value,
    },
    #[serde(rename = "network_tools/stream")]
    Stream {
        event: StreamCommand,
        #[serde(default)]
        arguments: Value,
    },
}

/// A frame written to the consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel")]
pub enum OutboundFrame {
    #[serde(rename = "network_tools")]
    Reply { id: u64, reply: Reply },
    #[serde(rename = "network_tools/stream")]
    Event { event: StreamEvent },
}

async fn write_frames<W>(
    mut writer: W,
    mut frames: UnboundedReceiver<OutboundFrame>,
) -> BridgeResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn route(
    handle: &BridgeHandle,
    frame: InboundFrame,
    out: &UnboundedSender<OutboundFrame>,
    pending: &mut JoinSet<()>,
) -> BridgeResult<()> {
    match frame {
        InboundFrame::Call {
            id,
            method,
            arguments,
        } => {
            debug!(channel = REQUEST_CHANNEL, id, %method, "Routing call");
            let rx = handle.invoke(MethodCall::new(method, arguments))?;
            let out = out.clone();
            pending.spawn(async move {
                match rx.await {
                    Ok(reply) => {
                        let _ = out.send(OutboundFrame::Reply { id, reply });
                    }
                    Err(_) => debug!(id, "Call dropped without reply"),
                }
            });
        }
        InboundFrame::Stream {
            event: StreamCommand::Listen,
            arguments,
        } => {
            debug!(channel = STREAM_CHANNEL, "Routing listen");
            let mut stream = handle.listen(arguments)?;
            let out = out.clone();
            // Ends when the subscription is cancelled, superseded or closed.
            tokio::spawn(async move {
                while let Some(event) = stream.recv().await {
                    if out.send(OutboundFrame::Event { event }).is_err() {
                        break;
                    }
                }
            });
        }
        InboundFrame::Stream {
            event: StreamCommand::Cancel,
            arguments,
        } => {
            debug!(channel = STREAM_CHANNEL, "Routing cancel");
            handle.cancel(arguments)?;
        }
    }
    Ok(())
}

/// Serve `bridge` over a line-oriented reader/writer pair until EOF.
///
/// At EOF the outstanding calls are allowed to finish, then the bridge is
/// torn down and the writer drained.
pub async fn serve<R, W>(bridge: Bridge, reader: R, writer: W) -> BridgeResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let handle = bridge.handle();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_frames(writer, out_rx));
    let mut pending = JoinSet::new();

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame = match serde_json::from_str::<InboundFrame>(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping malformed frame: {e}");
                continue;
            }
        };
        route(&handle, frame, &out_tx, &mut pending)?;
    }

    info!(outstanding = pending.len(), "Input closed, finishing outstanding calls");
    while pending.join_next().await.is_some() {}

    drop(handle);
    bridge.teardown().await;
    drop(out_tx);
    writer_task.await??;
    Ok(())
}
