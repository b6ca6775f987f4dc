use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::context::Context;
use crate::error::{EventResult, PublishError};
use crate::query::Queryable;
use crate::tags::Tagged;

use super::{Callback, EventEmitter, Publisher, Subscribable};

/// Several emitters behind one interface.
///
/// Subscribing registers with every emitter in order and stops at the first
/// failure. Unsubscribing attempts every emitter and reports the first
/// failure. Publishing attempts every emitter and fails only if none of
/// them accepted the message.
pub struct Multiplexed<M> {
    emitters: Vec<Arc<dyn EventEmitter<M>>>,
}

impl<M> Multiplexed<M> {
    #[must_use]
    pub fn new(emitters: Vec<Arc<dyn EventEmitter<M>>>) -> Self {
        Self { emitters }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl<M> fmt::Debug for Multiplexed<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexed").field("emitters", &self.emitters.len()).finish()
    }
}

impl<M: Clone + Send + Sync> Publisher<M> for Multiplexed<M> {
    fn publish(&self, ctx: &Context, message: M, tags: &dyn Tagged) -> EventResult<()> {
        let mut first_err = None;
        let mut delivered = false;
        for (i, emitter) in self.emitters.iter().enumerate() {
            match emitter.publish(ctx, message.clone(), tags) {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(emitter = i, error = %e, "multiplexed publish failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(first) if !delivered => Err(PublishError::Multiplex {
                attempted: self.emitters.len(),
                first: Box::new(first),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

impl<M: Send + Sync> Subscribable<M> for Multiplexed<M> {
    fn subscribe(&self, sub_id: &str, query: &dyn Queryable, callback: Callback<M>) -> EventResult<()> {
        for emitter in &self.emitters {
            emitter.subscribe(sub_id, query, Arc::clone(&callback))?;
        }
        Ok(())
    }

    fn unsubscribe(&self, sub_id: &str) -> EventResult<()> {
        let mut first_err = None;
        for emitter in &self.emitters {
            if let Err(e) = emitter.unsubscribe(sub_id) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{callback, Emitter};
    use crate::error::EventError;
    use crate::query::Query;
    use crate::tags::TagMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    impl Publisher<u32> for Failing {
        fn publish(&self, _ctx: &Context, _message: u32, _tags: &dyn Tagged) -> EventResult<()> {
            Err(PublishError::Closed.into())
        }
    }

    impl Subscribable<u32> for Failing {
        fn subscribe(&self, _sub_id: &str, _query: &dyn Queryable, _callback: Callback<u32>) -> EventResult<()> {
            Err(PublishError::Closed.into())
        }

        fn unsubscribe(&self, _sub_id: &str) -> EventResult<()> {
            Err(PublishError::Closed.into())
        }
    }

    fn shared(emitter: &Arc<Emitter<u32>>) -> Arc<dyn EventEmitter<u32>> {
        Arc::clone(emitter) as Arc<dyn EventEmitter<u32>>
    }

    fn failing() -> Arc<dyn EventEmitter<u32>> {
        Arc::new(Failing)
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Callback<u32> {
        let c = Arc::clone(counter);
        callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })
    }

    #[test]
    fn test_fans_out_to_every_emitter() {
        let a = Arc::new(Emitter::<u32>::new());
        let b = Arc::new(Emitter::<u32>::new());
        let mux = Multiplexed::new(vec![shared(&a), shared(&b)]);
        let count = Arc::new(AtomicUsize::new(0));

        mux.subscribe("s", &Query::Empty, counting(&count)).unwrap();
        assert_eq!((a.len(), b.len()), (1, 1));

        mux.publish(&Context::background(), 1, &TagMap::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        mux.unsubscribe("s").unwrap();
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn test_publish_succeeds_if_any_emitter_accepts() {
        let ok = Arc::new(Emitter::<u32>::new());
        let mux = Multiplexed::new(vec![failing(), shared(&ok)]);
        assert!(mux.publish(&Context::background(), 1, &TagMap::new()).is_ok());
    }

    #[test]
    fn test_publish_fails_when_all_fail() {
        let mux = Multiplexed::new(vec![failing(), failing()]);
        let err = mux.publish(&Context::background(), 1, &TagMap::new()).unwrap_err();
        assert_eq!(
            err,
            EventError::Publish(PublishError::Multiplex {
                attempted: 2,
                first: Box::new(PublishError::Closed.into()),
            })
        );
    }

    #[test]
    fn test_subscribe_stops_at_first_failure() {
        let before = Arc::new(Emitter::<u32>::new());
        let after = Arc::new(Emitter::<u32>::new());
        let mux = Multiplexed::new(vec![shared(&before), failing(), shared(&after)]);
        let count = Arc::new(AtomicUsize::new(0));
        assert!(mux.subscribe("s", &Query::Empty, counting(&count)).is_err());
        assert_eq!((before.len(), after.len()), (1, 0));
    }

    #[test]
    fn test_unsubscribe_attempts_all() {
        let a = Arc::new(Emitter::<u32>::new());
        let count = Arc::new(AtomicUsize::new(0));
        a.subscribe("s", &Query::Empty, counting(&count)).unwrap();
        let mux = Multiplexed::new(vec![failing(), shared(&a)]);
        assert!(mux.unsubscribe("s").is_err());
        assert!(a.is_empty());
    }

    #[test]
    fn test_empty_multiplex_is_noop() {
        let mux = Multiplexed::<u32>::new(Vec::new());
        assert!(mux.is_empty());
        assert!(mux.publish(&Context::background(), 1, &TagMap::new()).is_ok());
    }
}
