use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chain_events::events::{
    account_call_event_id, event_id_query, publish_with_header, EVENT_TYPE_KEY, HEIGHT_KEY,
};
use chain_events::{
    callback, ChannelSubscription, Context, EventCache, EventEmitter, EventHeader, EventType, Emitter,
    Multiplexed, Publisher, QueryBuilder, QueryString, Subscribable, TagMap,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct BlockEvent {
    height: u64,
    kind: EventType,
}

fn header(height: u64, event_type: EventType, index: u64) -> EventHeader {
    EventHeader {
        tx_type: "CallTx".to_string(),
        tx_hash: vec![0xAA; 4],
        event_type,
        event_id: account_call_event_id(&[0x01; 20]),
        height,
        index,
    }
}

#[test]
fn cached_block_events_are_delivered_on_commit() {
    init_tracing();
    let emitter = Arc::new(Emitter::<BlockEvent>::new());
    let source = Arc::clone(&emitter) as Arc<dyn Subscribable<BlockEvent>>;
    let calls = ChannelSubscription::subscribe(
        source,
        "calls",
        &QueryBuilder::new().and_equals(EVENT_TYPE_KEY, EventType::Call.as_str()),
        64,
    )
    .unwrap();

    let mut cache = EventCache::new();
    for (i, kind) in [EventType::Call, EventType::Log, EventType::Call].into_iter().enumerate() {
        let h = header(7, kind, i as u64);
        let tags = chain_events::FieldTags::new(&h);
        cache.publish(&Context::background(), BlockEvent { height: 7, kind }, &tags);
    }

    assert_eq!(calls.try_recv().unwrap(), None);
    cache.flush(emitter.as_ref()).unwrap();

    let first = calls.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    let second = calls.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(first, BlockEvent { height: 7, kind: EventType::Call });
    assert_eq!(second, first);
    assert_eq!(calls.try_recv().unwrap(), None);
}

#[test]
fn header_and_extra_tags_are_queryable_together() {
    init_tracing();
    let emitter = Emitter::<BlockEvent>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    emitter
        .subscribe(
            "tall-calls",
            &QueryString::new("EventType = 'CallEvent' AND Height > 10 AND Origin = 'ext'"),
            callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
        )
        .unwrap();

    let extra = TagMap::new().with("Origin", "ext");
    for height in [5, 11, 12] {
        publish_with_header(
            &emitter,
            &Context::background(),
            BlockEvent { height, kind: EventType::Call },
            &header(height, EventType::Call, 0),
            &extra,
        )
        .unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_publishers_reach_every_subscriber() {
    init_tracing();
    let emitter = Arc::new(Emitter::<u64>::new());
    let received = Arc::new(Mutex::new(Vec::new()));
    for sub in 0..4 {
        let sink = Arc::clone(&received);
        emitter
            .subscribe(
                &format!("sub-{sub}"),
                &QueryBuilder::new().and_greater_than_or_equal(HEIGHT_KEY, 0u64),
                callback(move |h: &u64| {
                    sink.lock().unwrap().push(*h);
                    true
                }),
            )
            .unwrap();
    }

    let publishers: Vec<_> = (0..8u64)
        .map(|p| {
            let emitter = Arc::clone(&emitter);
            thread::spawn(move || {
                for i in 0..50u64 {
                    let height = p * 1000 + i;
                    let tags = TagMap::new().with(HEIGHT_KEY, height);
                    emitter.publish(&Context::background(), height, &tags).unwrap();
                }
            })
        })
        .collect();
    for p in publishers {
        p.join().unwrap();
    }

    assert_eq!(received.lock().unwrap().len(), 8 * 50 * 4);
}

#[test]
fn multiplexed_emitters_share_subscriptions() {
    init_tracing();
    let local = Arc::new(Emitter::<String>::new());
    let remote = Arc::new(Emitter::<String>::new());
    let mux = Multiplexed::new(vec![
        Arc::clone(&local) as Arc<dyn EventEmitter<String>>,
        Arc::clone(&remote) as Arc<dyn EventEmitter<String>>,
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    mux.subscribe(
        "both",
        &event_id_query("Acc/01/Call"),
        callback(move |m: &String| {
            sink.lock().unwrap().push(m.clone());
            true
        }),
    )
    .unwrap();

    local.fire("Acc/01/Call", "from-local".to_string()).unwrap();
    remote.fire("Acc/01/Call", "from-remote".to_string()).unwrap();
    remote.fire("Acc/02/Call", "elsewhere".to_string()).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["from-local", "from-remote"]);

    mux.unsubscribe("both").unwrap();
    assert!(local.is_empty() && remote.is_empty());
}

#[test]
fn slow_channel_consumer_does_not_block_publisher() {
    init_tracing();
    let emitter = Arc::new(Emitter::<u32>::new());
    let source = Arc::clone(&emitter) as Arc<dyn Subscribable<u32>>;
    let sub = ChannelSubscription::subscribe(source, "slow", &"empty", 4).unwrap();

    for i in 0..100 {
        emitter.fire("tick", i).unwrap();
    }
    assert_eq!(sub.dropped(), 96);
    let drained: Vec<u32> = std::iter::from_fn(|| sub.try_recv().unwrap()).collect();
    assert_eq!(drained, vec![0, 1, 2, 3]);
}
