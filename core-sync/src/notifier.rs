//! User-facing notices.
//!
//! Every user-visible failure goes through one [`Notifier`]. Notices are keyed
//! by source (an endpoint path or a component name); raising the same message
//! again from the same source bumps a repeat counter instead of producing a
//! new notice, so a flapping endpoint shows up once with a count.

use core_runtime::events::{CoreEvent, EventBus, Notice};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug)]
pub struct Notifier {
    bus: EventBus,
    last: Mutex<HashMap<String, (String, u32)>>,
}

impl Notifier {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Raises `message` for `source` and publishes it on the event bus.
    pub fn notify(&self, source: &str, message: impl Into<String>) -> Notice {
        let message = message.into();
        let repeat = {
            let mut last = self.last.lock();
            let entry = last
                .entry(source.to_string())
                .or_insert_with(|| (message.clone(), 0));
            if entry.0 != message {
                *entry = (message.clone(), 0);
            }
            entry.1 += 1;
            entry.1
        };

        warn!(source, message = %message, repeat, "Notice");
        let notice = Notice {
            source: source.to_string(),
            message,
            repeat,
        };
        let _ = self.bus.emit(CoreEvent::Notice(notice.clone()));
        notice
    }

    /// Forgets the last notice of `source`, so the next one starts over.
    pub fn clear(&self, source: &str) {
        self.last.lock().remove(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeats_are_coalesced() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let notifier = Notifier::new(bus);

        assert_eq!(notifier.notify("/api/music", "timeout").repeat, 1);
        assert_eq!(notifier.notify("/api/music", "timeout").repeat, 2);
        assert_eq!(notifier.notify("/api/music/playlist", "timeout").repeat, 1);
        assert_eq!(notifier.notify("/api/music", "HTTP 500").repeat, 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            CoreEvent::Notice(Notice {
                source: "/api/music".to_string(),
                message: "timeout".to_string(),
                repeat: 1,
            })
        );
    }

    #[test]
    fn test_clear_resets_counter() {
        let notifier = Notifier::new(EventBus::new(4));
        notifier.notify("watcher", "reconnecting");
        notifier.notify("watcher", "reconnecting");
        notifier.clear("watcher");
        assert_eq!(notifier.notify("watcher", "reconnecting").repeat, 1);
    }
}
