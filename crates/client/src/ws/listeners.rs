//! Subscriber registry for inbound events.
//!
//! Handlers run synchronously on the connection task, in registration order:
//! catch-all handlers first, then handlers registered for the event's kind.
//! A panicking handler is logged and skipped; the rest still run.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use chillow_shared::{EventKind, ServerEvent};

pub(crate) type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    any: BTreeMap<u64, Handler>,
    typed: HashMap<EventKind, BTreeMap<u64, Handler>>,
}

#[derive(Default, Clone)]
pub(crate) struct Listeners {
    registry: Arc<Mutex<Registry>>,
}

impl Listeners {
    pub(crate) fn add(&self, kind: Option<EventKind>, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        match kind {
            None => {
                registry.any.insert(id, handler);
            }
            Some(kind) => {
                registry.typed.entry(kind).or_default().insert(id, handler);
            }
        }
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            kind,
        }
    }

    pub(crate) fn dispatch(&self, event: &ServerEvent) {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let typed = registry
                .typed
                .get(&event.kind())
                .into_iter()
                .flat_map(|set| set.values());
            let handlers = registry.any.values().chain(typed).cloned().collect();
            handlers
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                crate::log_error!(
                    "subscriber panicked while handling {}",
                    event.kind().as_str()
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.any.len() + registry.typed.values().map(BTreeMap::len).sum::<usize>()
    }
}

/// Registration handle returned by `subscribe`; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
    kind: Option<EventKind>,
}

impl Subscription {
    /// Remove the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn remove(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
        match self.kind {
            None => {
                registry.any.remove(&self.id);
            }
            Some(kind) => {
                if let Some(set) = registry.typed.get_mut(&kind) {
                    set.remove(&self.id);
                    if set.is_empty() {
                        registry.typed.remove(&kind);
                    }
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
