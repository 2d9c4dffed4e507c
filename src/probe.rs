//! ICMP reachability probe
//!
//! A ping request runs `count` independent single-echo attempts and reports
//! the share that failed as a truncated integer percentage. Each attempt is
//! its own subprocess, so a result never depends on parsing the tool's
//! summary output.

use crate::channel::MethodCall;
use crate::config::{self, BridgeConfig};
use crate::error::{BridgeError, BridgeResult};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Arguments of a `pingTest` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub host: String,
    pub count: i64,
}

impl Default for PingRequest {
    fn default() -> Self {
        PingRequest {
            host: config::DEFAULT_PING_HOST.to_string(),
            count: config::DEFAULT_PING_COUNT,
        }
    }
}

impl PingRequest {
    /// Read `host` and `count`, falling back to defaults for missing or mistyped values
    pub fn from_call(call: &MethodCall) -> Self {
        let defaults = PingRequest::default();
        PingRequest {
            host: call
                .argument_str("host")
                .map(str::to_owned)
                .unwrap_or(defaults.host),
            count: call.argument_i64("count").unwrap_or(defaults.count),
        }
    }
}

/// Result of one echo attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Reachable,
    Lost,
}

/// Performs a single echo attempt against a host.
pub trait EchoProbe: Send + Sync {
    /// An `Err` aborts the whole ping request; an unreachable host is `Ok(Lost)`.
    fn attempt(&self, host: &str) -> BridgeResult<AttemptOutcome>;
}

/// Echo probe that spawns `<binary> -c 1 -W <wait> <host>` per attempt
#[derive(Debug, Clone)]
pub struct SubprocessProbe {
    binary: PathBuf,
    wait_secs: u32,
}

impl SubprocessProbe {
    pub fn new(binary: impl Into<PathBuf>, wait_secs: u32) -> Self {
        SubprocessProbe {
            binary: binary.into(),
            wait_secs,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.ping_binary.clone(), config.ping_wait_secs)
    }
}

impl EchoProbe for SubprocessProbe {
    fn attempt(&self, host: &str) -> BridgeResult<AttemptOutcome> {
        let wait = self.wait_secs.to_string();
        let spawned = Command::new(&self.binary)
            .args(["-c", "1", "-W", &wait, host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {e}", self.binary.display());
                return Ok(AttemptOutcome::Lost);
            }
        };

        let status = child.wait().map_err(|source| BridgeError::PingInterrupted {
            host: host.to_string(),
            source,
        })?;

        Ok(if status.success() {
            AttemptOutcome::Reachable
        } else {
            AttemptOutcome::Lost
        })
    }
}

/// `lost * 100 / count` with integer truncation; `count` must be non-zero
pub fn loss_percent(lost: u64, count: u64) -> u8 {
    (lost.min(count) * 100 / count) as u8
}

/// Run every attempt of `request` and aggregate the packet loss.
///
/// All-or-nothing: any attempt error discards the partial tally.
pub fn run_ping(probe: &dyn EchoProbe, request: &PingRequest) -> BridgeResult<u8> {
    if request.count < 1 {
        return Err(BridgeError::InvalidPingCount {
            count: request.count,
        });
    }
    let count = request.count as u64;

    let mut lost = 0u64;
    for attempt in 1..=count {
        if probe.attempt(&request.host)? == AttemptOutcome::Lost {
            lost += 1;
            debug!(host = %request.host, attempt, "Echo attempt lost");
        }
    }

    let loss = loss_percent(lost, count);
    info!(host = %request.host, count, lost, loss, "Ping finished");
    Ok(loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted(Mutex<VecDeque<BridgeResult<AttemptOutcome>>>);

    impl Scripted {
        fn new(outcomes: Vec<BridgeResult<AttemptOutcome>>) -> Self {
            Scripted(Mutex::new(outcomes.into()))
        }
    }

    impl EchoProbe for Scripted {
        fn attempt(&self, _host: &str) -> BridgeResult<AttemptOutcome> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(AttemptOutcome::Reachable))
        }
    }

    fn request(count: i64) -> PingRequest {
        PingRequest {
            host: "10.0.0.1".to_string(),
            count,
        }
    }

    #[test]
    fn defaults_apply_to_missing_and_mistyped_arguments() {
        let call = MethodCall::new("pingTest", json!({}));
        assert_eq!(PingRequest::from_call(&call), PingRequest::default());

        let call = MethodCall::new("pingTest", json!({"host": 1, "count": "x"}));
        let parsed = PingRequest::from_call(&call);
        assert_eq!(parsed.host, "8.8.8.8");
        assert_eq!(parsed.count, 10);

        let call = MethodCall::new("pingTest", json!({"host": "1.1.1.1", "count": 3}));
        assert_eq!(
            PingRequest::from_call(&call),
            PingRequest {
                host: "1.1.1.1".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn loss_truncates() {
        assert_eq!(loss_percent(0, 3), 0);
        assert_eq!(loss_percent(1, 3), 33);
        assert_eq!(loss_percent(2, 3), 66);
        assert_eq!(loss_percent(3, 3), 100);
        assert_eq!(loss_percent(1, 7), 14);
    }

    #[test]
    fn alternating_losses_give_half() {
        use AttemptOutcome::*;
        let probe = Scripted::new(vec![Ok(Lost), Ok(Reachable), Ok(Lost), Ok(Reachable)]);
        assert_eq!(run_ping(&probe, &request(4)).unwrap(), 50);
    }

    #[test]
    fn single_attempt_is_all_or_nothing() {
        let probe = Scripted::new(vec![Ok(AttemptOutcome::Lost)]);
        assert_eq!(run_ping(&probe, &request(1)).unwrap(), 100);
        let probe = Scripted::new(vec![Ok(AttemptOutcome::Reachable)]);
        assert_eq!(run_ping(&probe, &request(1)).unwrap(), 0);
    }

    #[test]
    fn zero_count_is_rejected() {
        let probe = Scripted::new(vec![]);
        let err = run_ping(&probe, &request(0)).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPingCount { count: 0 }));
    }

    #[test]
    fn attempt_error_discards_progress() {
        let probe = Scripted::new(vec![
            Ok(AttemptOutcome::Lost),
            Err(BridgeError::Internal("boom".to_string())),
        ]);
        assert!(run_ping(&probe, &request(3)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_exit_status_decides_outcome() {
        let ok = SubprocessProbe::new("true", 1);
        assert_eq!(ok.attempt("127.0.0.1").unwrap(), AttemptOutcome::Reachable);

        let fail = SubprocessProbe::new("false", 1);
        assert_eq!(fail.attempt("127.0.0.1").unwrap(), AttemptOutcome::Lost);
    }

    #[test]
    fn missing_binary_counts_as_lost() {
        let probe = SubprocessProbe::new("/nonexistent/ping-binary", 1);
        assert_eq!(probe.attempt("127.0.0.1").unwrap(), AttemptOutcome::Lost);
    }
}
