//! Wire types shared by the request channel and the stream channel
//!
//! A [`Responder`] answers one method call and is consumed by the answer, so a
//! call can never be replied to twice. An [`EventSink`] pushes values onto the
//! stream channel until it is dropped or ended.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// An inbound call on the request channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        MethodCall {
            method: method.into(),
            arguments,
        }
    }

    /// String argument, or `None` when missing or of another type
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.as_object()?.get(key)?.as_str()
    }

    /// Integer argument, or `None` when missing or of another type
    pub fn argument_i64(&self, key: &str) -> Option<i64> {
        self.arguments.as_object()?.get(key)?.as_i64()
    }
}

/// Terminal answer to a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Success {
        value: Value,
    },
    Error {
        code: String,
        message: String,
        details: Value,
    },
    NotImplemented,
}

impl Reply {
    pub fn success(value: impl Into<Value>) -> Self {
        Reply::Success {
            value: value.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Reply::Error {
            code: code.into(),
            message: message.into(),
            details: Value::Null,
        }
    }
}

/// One item pushed onto the stream channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    Success {
        value: Value,
    },
    Error {
        code: String,
        message: String,
        details: Value,
    },
    EndOfStream,
}

/// Reply handle for exactly one method call
#[derive(Debug)]
#[must_use = "every method call must be answered"]
pub struct Responder {
    tx: oneshot::Sender<Reply>,
}

/// Create a responder and the receiver its reply arrives on
pub fn reply_channel() -> (Responder, oneshot::Receiver<Reply>) {
    let (tx, rx) = oneshot::channel();
    (Responder { tx }, rx)
}

impl Responder {
    pub fn reply(self, reply: Reply) {
        // The consumer may already be gone; delivery to it is not an error.
        if self.tx.send(reply).is_err() {
            debug!("Reply dropped, consumer no longer waiting");
        }
    }

    pub fn success(self, value: impl Into<Value>) {
        self.reply(Reply::success(value));
    }

    pub fn error(self, code: impl Into<String>, message: impl Into<String>) {
        self.reply(Reply::error(code, message));
    }

    pub fn not_implemented(self) {
        self.reply(Reply::NotImplemented);
    }
}

/// Consumer side of the stream channel
pub type EventStream = mpsc::UnboundedReceiver<StreamEvent>;

/// Producer side of the stream channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Push a value; returns false once the consumer has gone away
    pub fn success(&self, value: impl Into<Value>) -> bool {
        self.tx
            .send(StreamEvent::Success {
                value: value.into(),
            })
            .is_ok()
    }

    pub fn error(&self, code: impl Into<String>, message: impl Into<String>) -> bool {
        self.tx
            .send(StreamEvent::Error {
                code: code.into(),
                message: message.into(),
                details: Value::Null,
            })
            .is_ok()
    }

    pub fn end_of_stream(self) {
        let _ = self.tx.send(StreamEvent::EndOfStream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_of_wrong_type_read_as_missing() {
        let call = MethodCall::new("pingTest", json!({"host": 42, "count": "four"}));
        assert_eq!(call.argument_str("host"), None);
        assert_eq!(call.argument_i64("count"), None);

        let call = MethodCall::new("pingTest", Value::Null);
        assert_eq!(call.argument_str("host"), None);

        let call = MethodCall::new("pingTest", json!({"host": "10.0.0.1", "count": 4}));
        assert_eq!(call.argument_str("host"), Some("10.0.0.1"));
        assert_eq!(call.argument_i64("count"), Some(4));
    }

    #[test]
    fn replies_use_tagged_wire_shape() {
        let encoded = serde_json::to_value(Reply::success(50)).unwrap();
        assert_eq!(encoded, json!({"type": "success", "value": 50}));

        let encoded = serde_json::to_value(Reply::error("PING_ERROR", "boom")).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "error", "code": "PING_ERROR", "message": "boom", "details": null})
        );

        let encoded = serde_json::to_value(Reply::NotImplemented).unwrap();
        assert_eq!(encoded, json!({"type": "notImplemented"}));

        let encoded = serde_json::to_value(StreamEvent::EndOfStream).unwrap();
        assert_eq!(encoded, json!({"type": "endOfStream"}));
    }

    #[tokio::test]
    async fn responder_delivers_once() {
        let (responder, rx) = reply_channel();
        responder.success(true);
        assert_eq!(rx.await.unwrap(), Reply::success(true));
    }

    #[test]
    fn responder_tolerates_dropped_consumer() {
        let (responder, rx) = reply_channel();
        drop(rx);
        responder.not_implemented();
    }

    #[test]
    fn sink_reports_closed_stream() {
        let (sink, mut stream) = event_channel();
        assert!(sink.success(-40));
        assert_eq!(
            stream.try_recv().unwrap(),
            StreamEvent::Success { value: json!(-40) }
        );
        drop(stream);
        assert!(!sink.success(-41));
    }
}
