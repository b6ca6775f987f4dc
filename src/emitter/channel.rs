use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError, TrySendError};
use tracing::warn;

use crate::error::{EventResult, PublishError};
use crate::query::Queryable;

use super::{callback, Subscribable};

/// A subscription that delivers matching messages into a bounded channel.
///
/// Delivery never blocks the publisher: when the channel is full the message
/// is dropped and counted. Dropping the subscription unsubscribes it.
pub struct ChannelSubscription<M> {
    sub_id: String,
    rx: Receiver<M>,
    source: Arc<dyn Subscribable<M>>,
    dropped: Arc<AtomicU64>,
    unsubscribed: AtomicBool,
}

impl<M: Send + 'static> ChannelSubscription<M> {
    /// Subscribes `sub_id` on `source` with a channel of `capacity` messages.
    ///
    /// # Errors
    ///
    /// Propagates the subscribe error from `source`.
    pub fn subscribe(
        source: Arc<dyn Subscribable<M>>,
        sub_id: &str,
        query: &dyn Queryable,
        capacity: usize,
    ) -> EventResult<Self>
    where
        M: Clone,
    {
        let (tx, rx) = bounded::<M>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);
        let id = sub_id.to_string();

        source.subscribe(
            sub_id,
            query,
            callback(move |message: &M| match tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(sub_id = %id, dropped = total, "channel full, message dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }),
        )?;

        Ok(Self {
            sub_id: sub_id.to_string(),
            rx,
            source,
            dropped,
            unsubscribed: AtomicBool::new(false),
        })
    }
}

impl<M> ChannelSubscription<M> {
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.sub_id
    }

    /// Messages discarded because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Receives the next message (blocking).
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Closed` once unsubscribed and drained.
    pub fn recv(&self) -> EventResult<M> {
        self.rx.recv().map_err(|_| PublishError::Closed.into())
    }

    /// Receives the next message, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Closed` once unsubscribed and drained.
    pub fn recv_timeout(&self, timeout: Duration) -> EventResult<Option<M>> {
        match self.rx.recv_timeout(timeout) {
            Ok(m) => Ok(Some(m)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PublishError::Closed.into()),
        }
    }

    /// Receives a message if one is queued.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Closed` once unsubscribed and drained.
    pub fn try_recv(&self) -> EventResult<Option<M>> {
        match self.rx.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PublishError::Closed.into()),
        }
    }

    /// Removes the listener from its source. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the source's unsubscribe error.
    pub fn unsubscribe(&self) -> EventResult<()> {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.source.unsubscribe(&self.sub_id)
    }
}

impl<M> fmt::Debug for ChannelSubscription<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSubscription")
            .field("sub_id", &self.sub_id)
            .field("queued", &self.rx.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<M> Drop for ChannelSubscription<M> {
    fn drop(&mut self) {
        if let Err(e) = self.unsubscribe() {
            warn!(sub_id = %self.sub_id, error = %e, "unsubscribe on drop failed");
        }
    }
}
