//! Error types for chain-events.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific failure instead of parsing messages.

use thiserror::Error;

/// Errors produced while compiling query text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query text does not conform to the grammar.
    #[error("parse error near {near:?} (line {line} symbol {column}): {message}")]
    Parse {
        /// 1-based line of the offending input.
        line: usize,
        /// 1-based column (in characters) of the offending input.
        column: usize,
        /// The input text at the error position.
        near: String,
        /// What the parser expected.
        message: String,
    },

    /// An operand value is not valid for the tag it is compared with.
    #[error("invalid operand for tag '{tag}': {reason}")]
    InvalidOperand {
        /// Tag the operand was attached to.
        tag: String,
        /// Why the operand was rejected.
        reason: String,
    },
}

/// Errors constructing tag providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("'{field}' is not a tag field of {type_name}")]
    UnknownField {
        field: String,
        type_name: &'static str,
    },
}

/// Errors from the subscription registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("subscription not active: {id}")]
    NotActive {
        id: String,
    },

    #[error("subscription id already in use: {id}")]
    AlreadySubscribed {
        id: String,
    },

    #[error("could not generate random bytes for a subscription id: {reason}")]
    Entropy {
        reason: String,
    },
}

/// Errors delivering a published message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("publisher is closed")]
    Closed,

    #[error("message rejected by {publisher}: {reason}")]
    Rejected {
        publisher: String,
        reason: String,
    },

    #[error("none of the {attempted} multiplexed publishers accepted the message: {first}")]
    Multiplex {
        attempted: usize,
        first: Box<EventError>,
    },
}

/// Errors loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read {
        path: String,
        message: String,
    },

    #[error("failed to parse configuration: {message}")]
    Parse {
        message: String,
    },

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Top-level error type for chain-events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl EventError {
    /// Returns true if this is a query parse error.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Query(QueryError::Parse { .. }))
    }

    /// Returns true if this error refers to an unknown subscription.
    #[must_use]
    pub const fn is_not_active(&self) -> bool {
        matches!(self, Self::Subscription(SubscriptionError::NotActive { .. }))
    }

    /// Returns true if this is a delivery error.
    #[must_use]
    pub const fn is_publish(&self) -> bool {
        matches!(self, Self::Publish(_))
    }
}

/// Result type alias for chain-events operations.
pub type EventResult<T> = Result<T, EventError>;
