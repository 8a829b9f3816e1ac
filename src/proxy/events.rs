//! Event listener bookkeeping and dispatch
//!
//! Local listeners subscribe to (proxy id, event name) pairs. The remote
//! side is told to start reporting an event only when the first local
//! listener attaches and to stop only when the last one detaches, so many
//! local listeners on one remote event source cost a single remote
//! subscription.
//!
//! Events are read off the dedicated event channel by one reader thread
//! and dispatched in arrival order. No ordering is guaranteed relative to
//! synchronous calls in flight on the call channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::datastream::PxValue;

/// An event notification delivered from the remote side
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyEvent {
    pub px_id: u64,
    pub event_name: String,
    pub payload: PxValue,
}

/// A local event listener
pub trait ProxyEventListener: Send + Sync {
    fn event_raised(&self, event: &ProxyEvent);
}

/// Reference-counted subscription table keyed by (proxy id, event name)
#[derive(Default)]
pub struct ListenerTable {
    inner: Mutex<HashMap<(u64, String), Vec<Arc<dyn ProxyEventListener>>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener; returns true on the 0 -> 1 transition, meaning
    /// the caller must send the remote "start reporting" request
    pub fn add(&self, px_id: u64, event_name: &str, listener: Arc<dyn ProxyEventListener>) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entry((px_id, event_name.to_string())).or_default();
        entry.push(listener);
        entry.len() == 1
    }

    /// Detach one matching listener; returns true on the 1 -> 0 transition,
    /// meaning the caller must send the remote "stop reporting" request.
    /// A listener that was never attached detaches nothing.
    pub fn remove(
        &self,
        px_id: u64,
        event_name: &str,
        listener: &Arc<dyn ProxyEventListener>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = (px_id, event_name.to_string());
        let Some(entry) = inner.get_mut(&key) else {
            return false;
        };
        let before = entry.len();
        if let Some(pos) = entry.iter().position(|l| Arc::ptr_eq(l, listener)) {
            entry.remove(pos);
        }
        if entry.is_empty() && before > 0 {
            inner.remove(&key);
            true
        } else {
            false
        }
    }

    /// Drop all subscriptions for a proxy id, used on finalize; returns the
    /// event names that had live subscriptions
    pub fn remove_all_for(&self, px_id: u64) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<(u64, String)> = inner
            .keys()
            .filter(|(id, _)| *id == px_id)
            .cloned()
            .collect();
        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            inner.remove(&key);
            names.push(key.1);
        }
        names
    }

    /// Dispatch one event to every listener subscribed to it
    ///
    /// Listeners are cloned out of the table before being invoked so a
    /// listener can detach itself (or others) during dispatch without
    /// deadlocking on the table lock.
    pub fn dispatch(&self, event: &ProxyEvent) {
        let listeners: Vec<Arc<dyn ProxyEventListener>> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match inner.get(&(event.px_id, event.event_name.clone())) {
                Some(entry) => entry.clone(),
                None => {
                    debug!(
                        "event '{}' for px_id {} arrived with no listeners",
                        event.event_name, event.px_id
                    );
                    return;
                }
            }
        };
        if listeners.is_empty() {
            warn!("empty listener entry for ({}, {})", event.px_id, event.event_name);
        }
        for listener in listeners {
            listener.event_raised(event);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl ProxyEventListener for Counter {
        fn event_raised(&self, _event: &ProxyEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter(AtomicUsize::new(0)))
    }

    #[test]
    fn test_add_reports_first_transition_only() {
        let table = ListenerTable::new();
        let a = counter();
        let b = counter();
        assert!(table.add(1, "fileChanged", a));
        assert!(!table.add(1, "fileChanged", b));
        // different event name is an independent subscription
        assert!(table.add(1, "recordAdded", counter()));
    }

    #[test]
    fn test_remove_reports_last_transition_only() {
        let table = ListenerTable::new();
        let a = counter();
        let b = counter();
        let a_dyn: Arc<dyn ProxyEventListener> = a.clone();
        let b_dyn: Arc<dyn ProxyEventListener> = b.clone();
        table.add(1, "fileChanged", a_dyn.clone());
        table.add(1, "fileChanged", b_dyn.clone());
        assert!(!table.remove(1, "fileChanged", &a_dyn));
        assert!(table.remove(1, "fileChanged", &b_dyn));
        // removing from an empty table is a no-op
        assert!(!table.remove(1, "fileChanged", &a_dyn));
    }

    #[test]
    fn test_dispatch_reaches_all_listeners() {
        let table = ListenerTable::new();
        let a = counter();
        let b = counter();
        table.add(9, "msgWaiting", a.clone());
        table.add(9, "msgWaiting", b.clone());
        table.dispatch(&ProxyEvent {
            px_id: 9,
            event_name: "msgWaiting".to_string(),
            payload: PxValue::Null,
        });
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_without_listeners_is_silent() {
        let table = ListenerTable::new();
        table.dispatch(&ProxyEvent {
            px_id: 1,
            event_name: "nobody".to_string(),
            payload: PxValue::Null,
        });
    }

    #[test]
    fn test_remove_all_for_clears_subscriptions() {
        let table = ListenerTable::new();
        table.add(3, "a", counter());
        table.add(3, "b", counter());
        table.add(4, "a", counter());
        let mut names = table.remove_all_for(3);
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(table.subscription_count(), 1);
    }
}
