use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// OS broadcast actions a receiver can filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastAction {
    RssiChanged,
    NetworkStateChanged,
    ScanResultsAvailable,
}

impl BroadcastAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastAction::RssiChanged => "android.net.wifi.RSSI_CHANGED",
            BroadcastAction::NetworkStateChanged => "android.net.wifi.STATE_CHANGE",
            BroadcastAction::ScanResultsAvailable => "android.net.wifi.SCAN_RESULTS",
        }
    }
}

/// Identity of one registered receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

impl ReceiverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ReceiverId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver#{}", self.0)
    }
}

type Callback = Arc<dyn Fn(ReceiverId, BroadcastAction) + Send + Sync>;

/// A filtered listener handed to a provider for registration
#[derive(Clone)]
pub struct BroadcastReceiver {
    id: ReceiverId,
    filter: Vec<BroadcastAction>,
    callback: Callback,
}

impl fmt::Debug for BroadcastReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastReceiver")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl BroadcastReceiver {
    pub fn new(
        filter: Vec<BroadcastAction>,
        callback: impl Fn(ReceiverId, BroadcastAction) + Send + Sync + 'static,
    ) -> Self {
        BroadcastReceiver {
            id: ReceiverId::next(),
            filter,
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> ReceiverId {
        self.id
    }

    pub fn accepts(&self, action: BroadcastAction) -> bool {
        self.filter.contains(&action)
    }

    /// Deliver a broadcast; actions outside the filter are ignored
    pub fn on_receive(&self, action: BroadcastAction) {
        if self.accepts(action) {
            (self.callback)(self.id, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn receiver_filters_actions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let receiver = BroadcastReceiver::new(vec![BroadcastAction::RssiChanged], move |_, a| {
            sink.lock().unwrap().push(a)
        });

        receiver.on_receive(BroadcastAction::ScanResultsAvailable);
        receiver.on_receive(BroadcastAction::RssiChanged);

        assert_eq!(*seen.lock().unwrap(), vec![BroadcastAction::RssiChanged]);
    }

    #[test]
    fn receiver_ids_are_unique() {
        let a = BroadcastReceiver::new(vec![], |_, _| {});
        let b = BroadcastReceiver::new(vec![], |_, _| {});
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
