//! Polling subscriptions.
//!
//! [`Subscriptions`] layers a poll-based model over any [`Subscribable`]:
//! each subscription collects matching messages into its own buffer, and
//! [`poll`](Subscriptions::poll) hands back everything collected since the
//! previous poll. A background reaper removes subscriptions that have not
//! been polled within the configured threshold.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, error, info, warn};

use crate::config::SubscriptionsConfig;
use crate::context::CancelToken;
use crate::emitter::{callback, Subscribable};
use crate::error::{EventResult, SubscriptionError};
use crate::query::Queryable;

/// Random bytes in a subscription id.
pub const SUBSCRIPTION_ID_BYTES: usize = 32;

struct SubscriptionBuffer<M> {
    events: Mutex<Vec<M>>,
    last_accessed: Mutex<Instant>,
}

impl<M> SubscriptionBuffer<M> {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            last_accessed: Mutex::new(Instant::now()),
        }
    }

    fn push(&self, message: M) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(message);
    }

    fn drain(&self) -> Vec<M> {
        *self.last_accessed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn idle_for(&self) -> Duration {
        self.last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

struct Registry<M> {
    source: Arc<dyn Subscribable<M>>,
    buffers: RwLock<HashMap<String, Arc<SubscriptionBuffer<M>>>>,
}

impl<M> Registry<M> {
    fn unsubscribe_all(&self, ids: &[String]) -> usize {
        let mut failed = 0;
        for id in ids {
            if let Err(e) = self.source.unsubscribe(id) {
                warn!(sub_id = %id, error = %e, "failed to unsubscribe");
                failed += 1;
            }
        }
        failed
    }

    fn reap(&self, threshold: Duration) -> usize {
        let stale: Vec<String> = {
            let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
            let stale: Vec<String> = buffers
                .iter()
                .filter(|(_, buffer)| buffer.idle_for() > threshold)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                buffers.remove(id);
            }
            stale
        };
        if !stale.is_empty() {
            let failed = self.unsubscribe_all(&stale);
            info!(reaped = stale.len(), failed, "reaped idle subscriptions");
        }
        stale.len()
    }
}

/// Polling subscription registry with an idle reaper.
pub struct Subscriptions<M: Clone + Send + 'static> {
    registry: Arc<Registry<M>>,
    cancel: CancelToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Clone + Send + 'static> Subscriptions<M> {
    /// Creates a registry over `source` and starts the reaper if enabled.
    pub fn new(source: Arc<dyn Subscribable<M>>, config: SubscriptionsConfig) -> Self {
        let registry = Arc::new(Registry {
            source,
            buffers: RwLock::new(HashMap::new()),
        });
        let cancel = CancelToken::new();

        let reaper = if config.reaper_enabled {
            spawn_reaper(Arc::clone(&registry), cancel.clone(), &config)
        } else {
            None
        };

        Self {
            registry,
            cancel,
            reaper: Mutex::new(reaper),
        }
    }

    /// Subscribes to messages matching `query`, returning the new
    /// subscription id (64 uppercase hex characters).
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::Entropy` if no random id could be drawn,
    /// or the source's subscribe error.
    pub fn add(&self, query: &dyn Queryable) -> EventResult<String> {
        let id = new_subscription_id()?;
        let buffer = Arc::new(SubscriptionBuffer::new());
        let sink = Arc::clone(&buffer);
        let subscribed = self.registry.source.subscribe(
            &id,
            query,
            callback(move |message: &M| {
                sink.push(message.clone());
                true
            }),
        );
        if let Err(e) = subscribed {
            // The source may have registered the listener partially.
            if let Err(cleanup) = self.registry.source.unsubscribe(&id) {
                warn!(sub_id = %id, error = %cleanup, "failed to undo partial subscription");
            }
            return Err(e);
        }

        self.registry
            .buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), buffer);
        debug!(sub_id = %id, "subscription added");
        Ok(id)
    }

    /// Returns and clears the messages collected since the last poll.
    ///
    /// Polling keeps the subscription alive.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotActive` for unknown or reaped ids.
    pub fn poll(&self, sub_id: &str) -> EventResult<Vec<M>> {
        let buffer = self
            .registry
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sub_id)
            .cloned()
            .ok_or_else(|| SubscriptionError::NotActive { id: sub_id.to_string() })?;
        Ok(buffer.drain())
    }

    /// Removes a subscription.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotActive` for unknown ids, or the
    /// source's unsubscribe error.
    pub fn remove(&self, sub_id: &str) -> EventResult<()> {
        let removed = self
            .registry
            .buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sub_id);
        if removed.is_none() {
            return Err(SubscriptionError::NotActive { id: sub_id.to_string() }.into());
        }
        self.registry.source.unsubscribe(sub_id)?;
        debug!(sub_id, "subscription removed");
        Ok(())
    }

    /// Removes every subscription idle for longer than `threshold` and
    /// returns how many were removed.
    pub fn reap(&self, threshold: Duration) -> usize {
        self.registry.reap(threshold)
    }

    #[must_use]
    pub fn contains(&self, sub_id: &str) -> bool {
        self.registry
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(sub_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the reaper and removes every remaining subscription from the
    /// source. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.reaper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("subscription reaper panicked");
            }
        }

        let remaining: Vec<String> = self
            .registry
            .buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(id, _)| id)
            .collect();
        if !remaining.is_empty() {
            self.registry.unsubscribe_all(&remaining);
            debug!(removed = remaining.len(), "subscriptions shut down");
        }
    }
}

impl<M: Clone + Send + 'static> fmt::Debug for Subscriptions<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("active", &self.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<M: Clone + Send + 'static> Drop for Subscriptions<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_reaper<M: Send + 'static>(
    registry: Arc<Registry<M>>,
    cancel: CancelToken,
    config: &SubscriptionsConfig,
) -> Option<JoinHandle<()>> {
    let interval = config.reap_interval;
    let threshold = config.reap_threshold;
    let spawned = thread::Builder::new()
        .name("chain-events-reaper".to_string())
        .spawn(move || {
            info!(?interval, ?threshold, "subscription reaper started");
            while !cancel.wait_timeout(interval) {
                registry.reap(threshold);
            }
            info!("subscription reaper stopped");
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "failed to spawn subscription reaper");
            None
        }
    }
}

/// Draws a fresh subscription id from the OS random source.
///
/// # Errors
///
/// Returns `SubscriptionError::Entropy` if the OS source fails.
pub fn new_subscription_id() -> Result<String, SubscriptionError> {
    let mut bytes = [0u8; SUBSCRIPTION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SubscriptionError::Entropy { reason: e.to_string() })?;
    Ok(hex::encode_upper(bytes))
}
