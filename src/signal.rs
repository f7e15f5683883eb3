//! Ordered, synchronous signals.
//!
//! Listeners run in connection order on the emitting thread. A listener that
//! returns an error or panics is logged and skipped; the remaining listeners
//! still run and the emitter never sees the failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::ListenerError;

/// Identifies a connected listener. Ids are unique across every signal in
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type Listener<T> = Arc<dyn Fn(&T) -> Result<(), ListenerError> + Send + Sync>;

pub struct Signal<T> {
    name: &'static str,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Signal<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn connect<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the listener was not connected.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `value` to every listener connected at the time of the call.
    ///
    /// Listeners may connect or disconnect (including themselves) while the
    /// signal is being emitted; changes apply to the next emission.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(signal = self.name, error = %e, "listener failed"),
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(signal = self.name, panic = %message, "listener panicked");
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_connection_order() {
        let signal = Signal::<u32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = log.clone();
            signal.connect(move |v: &u32| {
                log.lock().push(format!("{tag}{v}"));
                Ok(())
            });
        }

        signal.emit(&7);
        assert_eq!(*log.lock(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let signal = Signal::<u32>::new("test");
        let hits = Arc::new(Mutex::new(0));

        signal.connect(|_: &u32| Err("boom".into()));
        signal.connect(|_: &u32| panic!("listener exploded"));
        let sink = hits.clone();
        signal.connect(move |_: &u32| {
            *sink.lock() += 1;
            Ok(())
        });

        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn disconnect_during_emit_applies_next_time() {
        let signal = Arc::new(Signal::<u32>::new("test"));
        let hits = Arc::new(Mutex::new(0));
        let id = Arc::new(Mutex::new(None));

        let sink = hits.clone();
        let weak = Arc::downgrade(&signal);
        let own_id = id.clone();
        let listener = signal.connect(move |_: &u32| {
            *sink.lock() += 1;
            if let (Some(signal), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                signal.disconnect(id);
            }
            Ok(())
        });
        *id.lock() = Some(listener);

        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(*hits.lock(), 1);
        assert_eq!(signal.listener_count(), 0);
        assert!(!signal.disconnect(listener));
    }

    #[test]
    fn ids_are_not_shared_between_signals() {
        let first = Signal::<u32>::new("first");
        let second = Signal::<u32>::new("second");
        let a = first.connect(|_: &u32| Ok(()));
        let b = second.connect(|_: &u32| Ok(()));
        assert_ne!(a, b);

        assert!(!first.disconnect(b));
        assert_eq!(first.listener_count(), 1);
        assert!(second.disconnect(b));
        assert_eq!(second.listener_count(), 0);
    }
}
