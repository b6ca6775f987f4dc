//! # chain-events
//!
//! Event tagging, query matching and publish/subscribe for a blockchain node.
//!
//! ## Core Concepts
//!
//! - **Tags**: records exposed as ordered key/value sets ([`Tagged`])
//! - **Query**: a boolean expression over tags, parsed from text or built with [`QueryBuilder`]
//! - **Emitter**: delivers published messages to every subscriber whose query matches
//! - **EventCache**: defers publishing until a flush, e.g. on block commit
//! - **Subscriptions**: poll-based subscriptions with idle reaping
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use chain_events::{callback, Context, Emitter, Publisher, QueryBuilder, Subscribable, TagMap};
//!
//! let emitter = Emitter::<String>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let query = QueryBuilder::new()
//!     .and_equals("EventType", "CallEvent")
//!     .and_greater_than_or_equal("Height", 45u64);
//! emitter.subscribe("calls", &query, callback(move |m: &String| {
//!     sink.lock().unwrap().push(m.clone());
//!     true
//! }))?;
//!
//! let tags = TagMap::new().with("EventType", "CallEvent").with("Height", 50u64);
//! emitter.publish(&Context::background(), "call".to_string(), &tags)?;
//! assert_eq!(*seen.lock().unwrap(), vec!["call"]);
//! # Ok::<(), chain_events::EventError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Tags and queries
pub mod error;
pub mod query;
pub mod tags;
pub mod value;

// Delivery
pub mod cache;
pub mod config;
pub mod context;
pub mod emitter;
pub mod events;
pub mod subscriptions;

pub use cache::{CachedMessage, EventCache};
pub use config::{load_config, ChannelConfig, EventsConfig, SubscriptionsConfig};
pub use context::{CancelToken, Context};
pub use emitter::{
    callback, Callback, ChannelSubscription, Emitter, EventEmitter, Multiplexed, Publisher, Subscribable,
};
pub use error::{
    ConfigError, EventError, EventResult, PublishError, QueryError, SubscriptionError, TagError,
};
pub use events::{EventHeader, EventType};
pub use query::{match_all, Query, QueryArg, QueryBuilder, QueryString, Queryable};
pub use subscriptions::Subscriptions;
pub use tags::{CombineMode, CombinedTags, FieldTags, TagFields, TagMap, Tagged};
pub use value::{TagValue, ToTagValue};
