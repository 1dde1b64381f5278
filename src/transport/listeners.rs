use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::api::events::{EventKind, ServerEvent};
use crate::utils::lock;

type Callback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(u64, Callback)>>,
}

/// Per-channel callback registry shared by a socket and its subscribers.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<Registry>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut reg = lock(&self.inner);
        reg.next_id += 1;
        let id = reg.next_id;
        reg.by_kind.entry(kind).or_default().push((id, Arc::new(callback)));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Invokes every callback registered for the event's channel and
    /// returns how many ran. Callbacks run outside the registry lock.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let callbacks: Vec<Callback> = {
            let reg = lock(&self.inner);
            reg.by_kind
                .get(&event.kind())
                .map(|v| v.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };
        if callbacks.is_empty() {
            log::debug!("no listeners for {}", event.kind().name());
        }
        for cb in &callbacks {
            cb(event);
        }
        callbacks.len()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        lock(&self.inner).by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        lock(&self.inner).by_kind.clear();
    }
}

/// Keeps a listener registered. Dropping it removes the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut reg = lock(&registry);
        if let Some(list) = reg.by_kind.get_mut(&self.kind) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}
