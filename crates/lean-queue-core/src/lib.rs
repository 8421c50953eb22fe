//! # Lean Queue Core
//!
//! Core domain logic for the lease-based work queue.
//!
//! Producers publish named messages; consumers atomically claim a bounded batch
//! of messages that are not currently leased, process them under a time-boxed
//! lease and remove them on success. This crate owns the rules of that lease
//! protocol:
//!
//! - [`message`] - the `Message` entity, its reservation history and the
//!   visibility predicate
//! - [`store`] - the `MessageStore` abstraction and the atomic claim contract
//! - [`service`] - the use-case layer (publish, reserve-next, list, remove)
//! - [`adapters`] - in-memory and PostgreSQL store implementations
//! - [`clock`] - injectable time source
//!
//! ## Architecture
//!
//! Business logic depends only on the [`MessageStore`] and [`Clock`] traits.
//! Concrete stores are constructed by the caller and passed in; there is no
//! process-wide connection state.
//!
//! ## Usage
//!
//! ```rust
//! use lean_queue_core::{MessageId, QueueName};
//!
//! let queue = QueueName::new("jobs").unwrap();
//! let id = MessageId::new();
//! assert_eq!(queue.as_str(), "jobs");
//! assert!(!id.to_string().is_empty());
//! ```

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use uuid::Uuid;

/// Standard result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a queued message
///
/// Assigned once at publish time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (used when rehydrating stored messages)
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        let id = Uuid::parse_str(trimmed).map_err(|_| ValidationError::InvalidFormat {
            field: "message_id".to_string(),
            message: "must be a UUID".to_string(),
        })?;

        Ok(Self(id))
    }
}

/// Name of a queue partition
///
/// Messages are only ever claimed within one queue name at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Maximum length, matching the storage column width
    pub const MAX_LENGTH: usize = 255;

    /// Create new queue name with validation
    ///
    /// # Validation Rules
    /// - Must not be empty or whitespace only
    /// - Must be at most 255 characters
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "queue_name".to_string(),
            });
        }

        if name.chars().count() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "queue_name".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        Ok(Self(name))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Opaque producer-defined message content
///
/// The queue never interprets the payload; the only rule is that it is not empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Payload(String);

impl Payload {
    /// Create new payload, rejecting the empty string
    pub fn new(content: impl Into<String>) -> Result<Self, ValidationError> {
        let content = content.into();

        if content.is_empty() {
            return Err(ValidationError::Required {
                field: "message".to_string(),
            });
        }

        Ok(Self(content))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the payload has no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Payload {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Payload> for String {
    fn from(value: Payload) -> Self {
        value.0
    }
}

/// Identity of the consumer holding (or requesting) a lease
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Maximum length, matching the storage column width
    pub const MAX_LENGTH: usize = 255;

    /// Create new consumer ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "reserved_by".to_string(),
            });
        }

        if id.chars().count() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "reserved_by".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        Ok(Self(id))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConsumerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConsumerId> for String {
    fn from(value: ConsumerId) -> Self {
        value.0
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
///
/// Sub-microsecond digits are truncated on construction so that a value held in
/// memory compares equal to the same value read back from a `TIMESTAMPTZ`
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wire format used in API responses: `2024-01-31 12:00:00.000000`
    pub const WIRE_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S%.6f";

    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Create timestamp from a `DateTime`, truncating to microseconds
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(6))
    }

    /// Get underlying `DateTime`
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Add a duration, returning `None` on overflow
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let delta = TimeDelta::from_std(duration).ok()?;
        self.0.checked_add_signed(delta).map(Self::from_datetime)
    }

    /// Render in the wire format
    pub fn to_wire_string(&self) -> String {
        self.0.format(Self::WIRE_FORMAT).to_string()
    }

    /// Parse from the wire format or from RFC 3339
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_datetime(dt.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .map_err(|_| ValidationError::InvalidFormat {
                field: "timestamp".to_string(),
                message: format!("'{}' is not a UTC timestamp", s),
            })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::WIRE_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_wire_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that are safe to retry
    Transient,
    /// Failures that will not succeed on retry
    Permanent,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' is out of range: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

/// Top-level error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A required field is missing or malformed; rejected before any storage call
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// The storage backend could not complete the transaction; nothing was applied
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// A stored record violates the message invariants
    #[error("Corrupt record: {message}")]
    CorruptRecord { message: String },
}

impl QueueError {
    /// Build a storage failure from any displayable cause
    pub fn storage(cause: impl fmt::Display) -> Self {
        Self::StorageUnavailable {
            message: cause.to_string(),
        }
    }

    /// Check if error is transient and the caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => false,
            Self::StorageUnavailable { .. } => true,
            Self::CorruptRecord { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        if self.is_transient() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        }
    }

    /// Short stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::StorageUnavailable { .. } => "storage_unavailable",
            Self::CorruptRecord { .. } => "corrupt_record",
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Injectable time source
pub mod clock;

/// Message entity and reservation state
pub mod message;

/// Message store abstraction and claim contract
pub mod store;

/// Queue use cases
pub mod service;

/// Store implementations
pub mod adapters;

// Re-export key types for convenience
pub use adapters::InMemoryMessageStore;
#[cfg(feature = "postgres")]
pub use adapters::{PostgresMessageStore, PostgresStoreOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use message::{LeaseGrant, Message, MessageRecord, Reservation};
pub use service::{QueueService, ReservationDefaults, ReserveRequest};
pub use store::{ClaimRequest, MessageStore};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
