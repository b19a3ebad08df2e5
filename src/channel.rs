//! Shared push channel handle and its handler registry.
//!
//! One [`PushChannel`] exists per session. Consumers register handlers once,
//! at construction, and keep the returned [`Subscription`] guard for as long
//! as they want events; dropping the guard removes exactly that handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use uuid::Uuid;

use crate::event::{EventKind, PushEvent};

/// A registered event handler.
pub type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

pub(crate) struct ChannelInner {
    registry: RwLock<Registry>,
    /// Identifies this client session to the server; stable for the lifetime
    /// of the channel.
    pub(crate) session_id: Uuid,
}

/// Shared handle to the push channel.
///
/// Routes decoded [`PushEvent`]s to the handlers registered for their
/// [`EventKind`]. The live transport (see [`PushChannel::connect`]) feeds it
/// from a WebSocket; tests call [`dispatch`](PushChannel::dispatch) directly.
///
/// `Clone` is cheap: all clones share one registry.
///
/// # Panics
///
/// Registry methods panic if the inner lock is poisoned, which only happens
/// if a thread panicked while mutating the registry.
#[derive(Clone)]
pub struct PushChannel {
    pub(crate) inner: Arc<ChannelInner>,
}

impl fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushChannel")
            .field("session_id", &self.inner.session_id)
            .finish()
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannel {
    /// Create a channel with an empty registry and a fresh session id.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                registry: RwLock::new(Registry::default()),
                session_id: Uuid::new_v4(),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Register a handler for one event kind.
    ///
    /// Handlers for the same kind accumulate; each is removed when its
    /// [`Subscription`] is dropped.
    ///
    /// # Arguments
    ///
    /// * `kind` - The event to listen for.
    /// * `handler` - Called with every dispatched event of that kind.
    ///
    /// # Returns
    ///
    /// The guard that keeps the handler registered.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.write().expect("registry lock poisoned");
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        tracing::trace!(event = %kind, subscription = id, "handler registered");
        Subscription {
            channel: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Remove every handler registered for `kind`.
    ///
    /// Guards for the removed handlers become inert; dropping them later is a
    /// no-op.
    ///
    /// # Returns
    ///
    /// How many handlers were removed.
    pub fn off(&self, kind: EventKind) -> usize {
        let mut registry = self.inner.registry.write().expect("registry lock poisoned");
        registry.handlers.remove(&kind).map_or(0, |regs| regs.len())
    }

    /// Make `handler` the only handler for `kind`.
    ///
    /// Equivalent to [`off`](Self::off) followed by [`on`](Self::on), performed
    /// under one lock so no event slips between the two. Calling it any number
    /// of times in a row leaves exactly one handler registered.
    pub fn replace<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.write().expect("registry lock poisoned");
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.insert(
            kind,
            vec![Registration {
                id,
                handler: Arc::new(handler),
            }],
        );
        Subscription {
            channel: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let registry = self.inner.registry.read().expect("registry lock poisoned");
        registry.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to every handler registered for its kind.
    ///
    /// Handlers are collected under the read lock and invoked after it is
    /// released, so a handler may subscribe or unsubscribe without
    /// deadlocking.
    ///
    /// # Returns
    ///
    /// How many handlers were invoked.
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self.inner.registry.read().expect("registry lock poisoned");
            registry
                .handlers
                .get(&event.kind())
                .map(|regs| regs.iter().map(|r| Arc::clone(&r.handler)).collect())
                .unwrap_or_default()
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// Scoped registration of one handler on a [`PushChannel`].
///
/// Dropping the guard unregisters the handler. Outliving the channel is
/// harmless.
#[must_use = "dropping a Subscription unregisters its handler immediately"]
pub struct Subscription {
    channel: Weak<ChannelInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.channel.upgrade() else {
            return;
        };
        // A poisoned registry is left alone: panicking inside drop would abort.
        let Ok(mut registry) = inner.registry.write() else {
            return;
        };
        if let Some(regs) = registry.handlers.get_mut(&self.kind) {
            regs.retain(|r| r.id != self.id);
            if regs.is_empty() {
                registry.handlers.remove(&self.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallEnded, ClientDisconnected};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call_ended(id: &str) -> PushEvent {
        PushEvent::CallEnded(CallEnded {
            real_estate_id: id.into(),
        })
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&PushEvent) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        (hits, move |_: &PushEvent| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dispatch_reaches_only_matching_kind() {
        let channel = PushChannel::new();
        let (ended, on_ended) = counter();
        let (gone, on_gone) = counter();
        let _a = channel.on(EventKind::CallEnded, on_ended);
        let _b = channel.on(EventKind::ClientDisconnected, on_gone);

        assert_eq!(channel.dispatch(&call_ended("a")), 1);

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(gone.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_removes_only_its_handler() {
        let channel = PushChannel::new();
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        let sub_first = channel.on(EventKind::CallEnded, on_first);
        let _sub_second = channel.on(EventKind::CallEnded, on_second);
        assert_eq!(channel.handler_count(EventKind::CallEnded), 2);

        drop(sub_first);
        channel.dispatch(&call_ended("a"));

        assert_eq!(channel.handler_count(EventKind::CallEnded), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replace_twice_leaves_exactly_one_handler() {
        let channel = PushChannel::new();
        let (old, on_old) = counter();
        let (new, on_new) = counter();
        let _first = channel.replace(EventKind::CallEnded, on_old);
        let _second = channel.replace(EventKind::CallEnded, on_new);

        assert_eq!(channel.handler_count(EventKind::CallEnded), 1);
        channel.dispatch(&call_ended("a"));
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_guard_does_not_remove_replacement() {
        let channel = PushChannel::new();
        let (_, on_old) = counter();
        let (hits, on_new) = counter();
        let first = channel.replace(EventKind::CallEnded, on_old);
        let _second = channel.replace(EventKind::CallEnded, on_new);

        drop(first);

        assert_eq!(channel.handler_count(EventKind::CallEnded), 1);
        channel.dispatch(&call_ended("a"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_all_handlers_for_kind() {
        let channel = PushChannel::new();
        let (_, h1) = counter();
        let (_, h2) = counter();
        let _a = channel.on(EventKind::CallEnded, h1);
        let _b = channel.on(EventKind::CallEnded, h2);

        assert_eq!(channel.off(EventKind::CallEnded), 2);
        assert_eq!(channel.dispatch(&call_ended("a")), 0);
        assert_eq!(channel.off(EventKind::CallEnded), 0);
    }

    #[test]
    fn handler_may_unsubscribe_during_dispatch() {
        let channel = PushChannel::new();
        let slot: Arc<std::sync::Mutex<Option<Subscription>>> = Arc::default();
        let slot_clone = Arc::clone(&slot);
        let sub = channel.on(EventKind::ClientDisconnected, move |_| {
            slot_clone.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        let event = PushEvent::ClientDisconnected(ClientDisconnected {
            user_id: "u1".into(),
        });
        assert_eq!(channel.dispatch(&event), 1);
        assert_eq!(channel.handler_count(EventKind::ClientDisconnected), 0);
    }

    #[test]
    fn subscription_outliving_channel_is_harmless() {
        let channel = PushChannel::new();
        let (_, h) = counter();
        let sub = channel.on(EventKind::CallEnded, h);
        drop(channel);
        drop(sub);
    }

    #[test]
    fn clones_share_registry() {
        let channel = PushChannel::new();
        let clone = channel.clone();
        let (hits, h) = counter();
        let _sub = clone.on(EventKind::CallEnded, h);
        channel.dispatch(&call_ended("a"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(channel.session_id(), clone.session_id());
    }
}
