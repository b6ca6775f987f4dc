//! Standard tag keys and the event envelope published by the node.

use std::fmt;
use std::str::FromStr;

use crate::context::Context;
use crate::emitter::Publisher;
use crate::error::{EventResult, QueryError};
use crate::query::QueryBuilder;
use crate::tag_fields;
use crate::tags::{CombinedTags, FieldTags, Tagged};
use crate::value::{TagValue, ToTagValue};

pub const EVENT_ID_KEY: &str = "EventID";
pub const EVENT_TYPE_KEY: &str = "EventType";
pub const TX_TYPE_KEY: &str = "TxType";
pub const TX_HASH_KEY: &str = "TxHash";
pub const HEIGHT_KEY: &str = "Height";
pub const INDEX_KEY: &str = "Index";
pub const ADDRESS_KEY: &str = "Address";

/// Kind of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NewBlock,
    Tx,
    Call,
    Log,
    AccountInput,
    AccountOutput,
}

impl EventType {
    pub const ALL: [Self; 6] = [
        Self::NewBlock,
        Self::Tx,
        Self::Call,
        Self::Log,
        Self::AccountInput,
        Self::AccountOutput,
    ];

    /// Tag value of this type under [`EVENT_TYPE_KEY`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewBlock => "NewBlockEvent",
            Self::Tx => "TxEvent",
            Self::Call => "CallEvent",
            Self::Log => "LogEvent",
            Self::AccountInput => "AccountInputEvent",
            Self::AccountOutput => "AccountOutputEvent",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| QueryError::InvalidOperand {
                tag: EVENT_TYPE_KEY.to_string(),
                reason: format!("unknown event type '{s}'"),
            })
    }
}

impl ToTagValue for EventType {
    fn to_tag_value(&self) -> TagValue {
        TagValue::String(self.as_str().to_string())
    }
}

/// Envelope carried by every transaction-scoped event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub tx_type: String,
    pub tx_hash: Vec<u8>,
    pub event_type: EventType,
    pub event_id: String,
    pub height: u64,
    pub index: u64,
}

tag_fields!(EventHeader {
    "TxType" => tx_type,
    "TxHash" => tx_hash,
    "EventType" => event_type,
    "EventID" => event_id,
    "Height" => height,
    "Index" => index,
});

/// Matches events published under `event_id`.
#[must_use]
pub fn event_id_query(event_id: &str) -> QueryBuilder {
    QueryBuilder::new().and_equals(EVENT_ID_KEY, event_id)
}

/// Matches events of one type.
#[must_use]
pub fn event_type_query(event_type: EventType) -> QueryBuilder {
    QueryBuilder::new().and_equals(EVENT_TYPE_KEY, event_type.as_str())
}

/// Event id for value sent from an account.
#[must_use]
pub fn account_input_event_id(address: &[u8]) -> String {
    format!("Acc/{}/Input", hex::encode_upper(address))
}

/// Event id for value received by an account.
#[must_use]
pub fn account_output_event_id(address: &[u8]) -> String {
    format!("Acc/{}/Output", hex::encode_upper(address))
}

/// Event id for calls into an account.
#[must_use]
pub fn account_call_event_id(address: &[u8]) -> String {
    format!("Acc/{}/Call", hex::encode_upper(address))
}

/// Event id for logs emitted by an account.
#[must_use]
pub fn log_event_id(address: &[u8]) -> String {
    format!("Log/{}", hex::encode_upper(address))
}

/// Event id for the execution of a transaction.
#[must_use]
pub fn tx_execution_event_id(tx_hash: &[u8]) -> String {
    format!("Execution/Tx/{}", hex::encode_upper(tx_hash))
}

/// Publishes `message` tagged with the header fields, followed by `extra`.
///
/// Header fields take precedence over keys of the same name in `extra`.
///
/// # Errors
///
/// Propagates the publisher's error.
pub fn publish_with_header<M>(
    publisher: &dyn Publisher<M>,
    ctx: &Context,
    message: M,
    header: &EventHeader,
    extra: &dyn Tagged,
) -> EventResult<()> {
    let header_tags = FieldTags::new(header);
    let tags = CombinedTags::merge(&[&header_tags, extra]);
    publisher.publish(ctx, message, &tags)
}
