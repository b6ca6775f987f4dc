//! Deferred delivery of published messages.
//!
//! An [`EventCache`] buffers messages published while a block is being
//! executed and hands them to a real publisher on [`flush`](EventCache::flush),
//! for example once the block commits. Tags are snapshotted at publish time.

use tracing::{debug, warn};

use crate::context::Context;
use crate::emitter::Publisher;
use crate::error::EventResult;
use crate::tags::{TagMap, Tagged};

/// A buffered publish call.
#[derive(Debug, Clone)]
pub struct CachedMessage<M> {
    pub context: Context,
    pub message: M,
    pub tags: TagMap,
}

/// Ordered buffer of published messages awaiting a flush.
#[derive(Debug)]
pub struct EventCache<M> {
    buffer: Vec<CachedMessage<M>>,
}

impl<M> EventCache<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Buffers a message. Never fails.
    pub fn publish(&mut self, ctx: &Context, message: M, tags: &dyn Tagged) {
        self.buffer.push(CachedMessage {
            context: ctx.clone(),
            message,
            tags: TagMap::from_tagged(tags),
        });
    }

    /// Publishes every buffered message to `publisher` in insertion order and
    /// empties the buffer.
    ///
    /// Delivery continues past failures. After a small flush following a
    /// large one, the buffer's allocation is released.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by `publisher`.
    pub fn flush(&mut self, publisher: &dyn Publisher<M>) -> EventResult<()> {
        let flushed = self.buffer.len();
        let mut first_err = None;
        for cached in self.buffer.drain(..) {
            if let Err(e) = publisher.publish(&cached.context, cached.message, &cached.tags) {
                warn!(error = %e, "cached message failed to publish");
                first_err.get_or_insert(e);
            }
        }
        if self.buffer.capacity() > 2 * flushed {
            self.buffer = Vec::with_capacity(flushed);
        }
        debug!(flushed, capacity = self.buffer.capacity(), "event cache flushed");
        first_err.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Allocated slots in the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl<M> Default for EventCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{callback, Emitter, Subscribable};
    use crate::error::PublishError;
    use crate::query::Query;
    use std::sync::{Arc, Mutex};

    fn fill(cache: &mut EventCache<usize>, n: usize) {
        for i in 0..n {
            cache.publish(&Context::background(), i, &TagMap::from([("Height", i)]));
        }
    }

    #[test]
    fn test_flush_delivers_in_order() {
        let emitter = Emitter::<usize>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        emitter
            .subscribe(
                "all",
                &Query::Empty,
                callback(move |m: &usize| {
                    sink.lock().unwrap().push(*m);
                    true
                }),
            )
            .unwrap();

        let mut cache = EventCache::new();
        fill(&mut cache, 5);
        assert!(seen.lock().unwrap().is_empty());

        cache.flush(&emitter).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tags_snapshotted_at_publish() {
        let mut tags = TagMap::from([("Height", 1u64)]);
        let mut cache = EventCache::new();
        cache.publish(&Context::background(), (), &tags);
        tags.insert("Height", 2u64);

        let emitter = Emitter::<()>::new();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        emitter
            .subscribe(
                "h1",
                &"Height = 1",
                callback(move |_| {
                    *h.lock().unwrap() += 1;
                    true
                }),
            )
            .unwrap();
        cache.flush(&emitter).unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_capacity_shrinks_after_small_flush() {
        let emitter = Emitter::<usize>::new();
        let mut cache = EventCache::new();

        fill(&mut cache, 100);
        cache.flush(&emitter).unwrap();
        assert!(cache.capacity() >= 100);
        let after_burst = cache.capacity();

        fill(&mut cache, 70);
        cache.flush(&emitter).unwrap();
        assert_eq!(cache.capacity(), after_burst);

        fill(&mut cache, 10);
        cache.flush(&emitter).unwrap();
        assert!(cache.capacity() >= 10 && cache.capacity() <= 20, "{}", cache.capacity());
    }

    struct Rejecting;

    impl Publisher<usize> for Rejecting {
        fn publish(&self, _ctx: &Context, message: usize, _tags: &dyn Tagged) -> EventResult<()> {
            if message % 2 == 1 {
                return Err(PublishError::Rejected {
                    publisher: "rejecting".into(),
                    reason: format!("odd {message}"),
                }
                .into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_flush_keeps_going_and_returns_first_error() {
        let mut cache = EventCache::new();
        fill(&mut cache, 4);
        let err = cache.flush(&Rejecting).unwrap_err();
        assert!(err.to_string().contains("odd 1"));
        assert!(cache.is_empty());
    }
}
