//! # Synchronous Listeners
//!
//! Named publish/subscribe for in-process callbacks. Unlike the broadcast
//! [`EventBus`](crate::events::EventBus), dispatch happens synchronously on
//! the emitting thread and in subscription order, so a handler observes the
//! payload before the emitter moves on.
//!
//! Handlers may call back into the emitter (including subscribing or
//! unsubscribing): the callback list is snapshotted before dispatch and no
//! lock is held while handlers run. `once` handlers are removed after the
//! dispatch loop that fired them completes.
//!
//! ```rust
//! use core_runtime::pubsub::Listeners;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let listeners: Listeners<u32> = Listeners::new();
//! let total = Arc::new(AtomicUsize::new(0));
//! let sink = total.clone();
//! listeners.subscribe("changed", move |v| {
//!     sink.fetch_add(*v as usize, Ordering::SeqCst);
//! });
//!
//! listeners.emit("changed", &5);
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`Listeners::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            once: self.once,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Name → ordered callback list.
pub struct Listeners<T> {
    entries: Mutex<HashMap<String, Vec<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `callback` for every emission of `name`.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(name, false, Arc::new(callback))
    }

    /// Registers `callback` for the next emission of `name` only.
    pub fn once<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(name, true, Arc::new(callback))
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, name: &str, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            entries.remove(name);
        }
        removed
    }

    /// Invokes every callback registered for `name`, in subscription order.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, name: &str, payload: &T) -> usize {
        let snapshot: Vec<Entry<T>> = match self.entries.lock().get(name) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for entry in &snapshot {
            (entry.callback)(payload);
        }

        let fired_once: Vec<ListenerId> = snapshot
            .iter()
            .filter(|e| e.once)
            .map(|e| e.id)
            .collect();
        if !fired_once.is_empty() {
            let mut entries = self.entries.lock();
            if let Some(list) = entries.get_mut(name) {
                list.retain(|e| !fired_once.contains(&e.id));
                if list.is_empty() {
                    entries.remove(name);
                }
            }
        }

        snapshot.len()
    }

    /// Number of callbacks registered for `name`.
    pub fn count(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, Vec::len)
    }

    fn insert(&self, name: &str, once: bool, callback: Callback<T>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Entry { id, once, callback });
        id
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut names: Vec<(&String, usize)> =
            entries.iter().map(|(k, v)| (k, v.len())).collect();
        names.sort();
        f.debug_struct("Listeners").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Listeners<String>) {
        (Arc::new(Mutex::new(Vec::new())), Listeners::new())
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let (log, listeners) = recorder();
        for tag in ["a", "b", "c"] {
            let log = log.clone();
            listeners.subscribe("changed", move |v: &String| {
                log.lock().push(format!("{}:{}", tag, v));
            });
        }

        assert_eq!(listeners.emit("changed", &"x".to_string()), 3);
        assert_eq!(*log.lock(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn test_emit_unknown_name() {
        let listeners: Listeners<()> = Listeners::new();
        assert_eq!(listeners.emit("nothing", &()), 0);
    }

    #[test]
    fn test_once_fires_once() {
        let (log, listeners) = recorder();
        let sink = log.clone();
        listeners.once("changed", move |v: &String| sink.lock().push(v.clone()));

        listeners.emit("changed", &"first".to_string());
        listeners.emit("changed", &"second".to_string());

        assert_eq!(*log.lock(), vec!["first"]);
        assert_eq!(listeners.count("changed"), 0);
    }

    #[test]
    fn test_once_removed_after_whole_loop() {
        let (log, listeners) = recorder();
        let first = log.clone();
        listeners.once("changed", move |_: &String| first.lock().push("once".into()));
        let second = log.clone();
        listeners.subscribe("changed", move |_: &String| second.lock().push("always".into()));

        listeners.emit("changed", &String::new());
        listeners.emit("changed", &String::new());

        assert_eq!(*log.lock(), vec!["once", "always", "always"]);
    }

    #[test]
    fn test_unsubscribe() {
        let (log, listeners) = recorder();
        let sink = log.clone();
        let id = listeners.subscribe("changed", move |v: &String| sink.lock().push(v.clone()));

        assert!(listeners.unsubscribe("changed", id));
        assert!(!listeners.unsubscribe("changed", id));
        listeners.emit("changed", &"ignored".to_string());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_reentrant_subscribe_during_emit() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let inner = listeners.clone();
        listeners.subscribe("changed", move |_| {
            inner.subscribe("changed", |_| {});
        });

        assert_eq!(listeners.emit("changed", &1), 1);
        assert_eq!(listeners.count("changed"), 2);
    }
}
