//! Message store abstraction.
//!
//! Stores own persistence and the atomicity of the claim operation. The
//! visibility rules themselves live on [`Message`]; a store only has to make
//! sure that the select-then-lease sequence is observed as a single step by
//! every other claimer.

use crate::{message::LeaseGrant, Message, MessageId, QueueName, QueueResult};
use async_trait::async_trait;

/// A request to lease up to `limit` messages from one queue
///
/// `grant.granted_at` doubles as the instant against which visibility is
/// evaluated, so selection and stamping use the same "now".
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub queue_name: QueueName,
    pub limit: u32,
    pub grant: LeaseGrant,
}

/// Persistence for queued messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a newly published message
    async fn insert(&self, message: &Message) -> QueueResult<()>;

    /// Atomically select and lease available messages
    ///
    /// Implementations must guarantee that:
    /// - only messages in `request.queue_name` that are claimable at
    ///   `request.grant.granted_at` are considered
    /// - at most `request.limit` messages are returned, oldest `published_at`
    ///   first
    /// - no message is returned to two overlapping claims
    /// - on error, no message has been modified
    async fn claim_batch(&self, request: &ClaimRequest) -> QueueResult<Vec<Message>>;

    /// Read up to `limit` messages of a queue regardless of lease state
    async fn list_pending(&self, queue_name: &QueueName, limit: u32) -> QueueResult<Vec<Message>>;

    /// Fetch one message by ID
    async fn get(&self, id: &MessageId) -> QueueResult<Option<Message>>;

    /// Delete a message; returns whether a row existed
    async fn delete(&self, id: &MessageId) -> QueueResult<bool>;

    /// Verify the backing storage is reachable
    async fn health_check(&self) -> QueueResult<()>;
}
