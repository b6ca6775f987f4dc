//! In-process publish/subscribe.
//!
//! An [`Emitter`] holds listeners keyed by subscription id. Publishing a
//! message evaluates every listener's query against the message tags and
//! invokes the callbacks of those that match. A callback returning `false`
//! is unsubscribed after that delivery.
//!
//! Listener callbacks run on the publishing thread, outside the registry
//! lock, so they may subscribe or unsubscribe without deadlocking.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{EventResult, SubscriptionError};
use crate::events::EVENT_ID_KEY;
use crate::query::{Query, Queryable};
use crate::tags::{TagMap, Tagged};

/// Bounded-channel subscriptions.
pub mod channel;
/// Fan-out over several emitters.
pub mod multiplex;

pub use channel::ChannelSubscription;
pub use multiplex::Multiplexed;

/// Invoked with each matching message. Returning `false` unsubscribes.
pub type Callback<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<M, F>(f: F) -> Callback<M>
where
    F: Fn(&M) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Accepts messages for delivery.
pub trait Publisher<M>: Send + Sync {
    /// Delivers `message` to every subscriber whose query matches `tags`.
    ///
    /// # Errors
    ///
    /// Implementations return a `PublishError` when delivery fails.
    fn publish(&self, ctx: &Context, message: M, tags: &dyn Tagged) -> EventResult<()>;

    /// Publishes under the single tag `EventID = event_id`.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    fn fire(&self, event_id: &str, message: M) -> EventResult<()> {
        let tags = TagMap::new().with(EVENT_ID_KEY, event_id);
        self.publish(&Context::background(), message, &tags)
    }
}

/// Registers and removes listeners.
pub trait Subscribable<M>: Send + Sync {
    /// Registers `callback` under `sub_id` for messages matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a query error if `query` does not compile, and
    /// `SubscriptionError::AlreadySubscribed` if `sub_id` is taken.
    fn subscribe(&self, sub_id: &str, query: &dyn Queryable, callback: Callback<M>) -> EventResult<()>;

    /// Removes the listener registered under `sub_id`. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Implementations backed by a remote registry may fail.
    fn unsubscribe(&self, sub_id: &str) -> EventResult<()>;
}

/// Both halves of an emitter, usable as a trait object.
pub trait EventEmitter<M>: Publisher<M> + Subscribable<M> {}

impl<M, T: Publisher<M> + Subscribable<M> + ?Sized> EventEmitter<M> for T {}

struct Listener<M> {
    query: Query,
    callback: Callback<M>,
}

/// Query-matching publish/subscribe hub.
pub struct Emitter<M> {
    listeners: RwLock<HashMap<String, Arc<Listener<M>>>>,
}

impl<M> Emitter<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered subscription ids, sorted.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn matching(&self, tags: &dyn Tagged) -> Vec<(String, Arc<Listener<M>>)> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners
            .iter()
            .filter(|(_, listener)| listener.query.matches(tags))
            .map(|(id, listener)| (id.clone(), Arc::clone(listener)))
            .collect()
    }

    // Only removes the entry if it still holds the listener that asked to
    // leave; the id may have been reused meanwhile.
    fn remove_listener(&self, sub_id: &str, listener: &Arc<Listener<M>>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if listeners.get(sub_id).is_some_and(|current| Arc::ptr_eq(current, listener)) {
            listeners.remove(sub_id);
            debug!(sub_id, "listener unsubscribed by callback");
        }
    }
}

impl<M> Default for Emitter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Emitter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("listeners", &self.len()).finish()
    }
}

impl<M> Publisher<M> for Emitter<M> {
    fn publish(&self, _ctx: &Context, message: M, tags: &dyn Tagged) -> EventResult<()> {
        let matching = self.matching(tags);
        trace!(matched = matching.len(), "publishing message");
        for (sub_id, listener) in matching {
            trace!(sub_id = %sub_id, "delivering message");
            if !(listener.callback)(&message) {
                self.remove_listener(&sub_id, &listener);
            }
        }
        Ok(())
    }
}

impl<M> Subscribable<M> for Emitter<M> {
    fn subscribe(&self, sub_id: &str, query: &dyn Queryable, callback: Callback<M>) -> EventResult<()> {
        let query = query.query()?;
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if listeners.contains_key(sub_id) {
            return Err(SubscriptionError::AlreadySubscribed { id: sub_id.to_string() }.into());
        }
        debug!(sub_id, query = %query, "subscribed");
        listeners.insert(sub_id.to_string(), Arc::new(Listener { query, callback }));
        Ok(())
    }

    fn unsubscribe(&self, sub_id: &str) -> EventResult<()> {
        let removed = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sub_id);
        if removed.is_some() {
            debug!(sub_id, "unsubscribed");
        }
        Ok(())
    }
}
