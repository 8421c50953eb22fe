//! Queue use cases.
//!
//! [`QueueService`] validates caller input, applies defaults, reads the clock
//! and delegates to a [`MessageStore`]. It never holds a lock across calls;
//! all coordination between concurrent claimers happens inside the store.

use crate::{
    clock::{Clock, SystemClock},
    message::{normalize_info, LeaseGrant},
    store::{ClaimRequest, MessageStore},
    ConsumerId, Message, MessageId, Payload, QueueName, QueueResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Defaults applied to reserve and list requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDefaults {
    /// Batch size used when the caller sends no limit or zero
    pub default_limit: u32,
    /// Upper bound on a single batch; larger requests are clamped
    pub max_limit: u32,
    /// Lease length used when the caller sends no lease
    pub default_lease: Duration,
}

impl Default for ReservationDefaults {
    fn default() -> Self {
        Self {
            default_limit: 1,
            max_limit: 1000,
            default_lease: Duration::from_secs(60),
        }
    }
}

impl ReservationDefaults {
    /// Resolve a caller-supplied limit
    pub fn resolve_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.default_limit.max(1),
            Some(n) if n > self.max_limit => {
                warn!(
                    requested = n,
                    max_limit = self.max_limit,
                    "Requested limit exceeds maximum, clamping"
                );
                self.max_limit
            }
            Some(n) => n,
        }
    }

    /// Resolve a caller-supplied lease length; an explicit zero is kept
    pub fn resolve_lease(&self, requested_seconds: Option<u64>) -> Duration {
        requested_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_lease)
    }
}

/// Input to [`QueueService::reserve_next`]
#[derive(Debug, Clone, Default)]
pub struct ReserveRequest {
    pub queue_name: String,
    pub consumer_id: String,
    pub limit: Option<u32>,
    pub lease_seconds: Option<u64>,
    pub reserved_info: Option<String>,
}

impl ReserveRequest {
    pub fn new(queue_name: impl Into<String>, consumer_id: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            consumer_id: consumer_id.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_lease_seconds(mut self, seconds: u64) -> Self {
        self.lease_seconds = Some(seconds);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.reserved_info = Some(info.into());
        self
    }
}

/// Publish, claim, inspect and remove messages
#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    defaults: ReservationDefaults,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("clock", &self.clock)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl QueueService {
    /// Create a service over `store` using the system clock and default limits
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            defaults: ReservationDefaults::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_defaults(mut self, defaults: ReservationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &ReservationDefaults {
        &self.defaults
    }

    /// Append a message to a queue
    #[instrument(skip(self, payload), fields(payload_bytes = payload.len()))]
    pub async fn publish(&self, queue_name: &str, payload: &str) -> QueueResult<MessageId> {
        let queue_name = QueueName::new(queue_name)?;
        let payload = Payload::new(payload)?;

        let message = Message::new(queue_name, payload, self.clock.now());
        self.store.insert(&message).await?;

        info!(message_id = %message.id(), "Message published");
        Ok(*message.id())
    }

    /// Lease up to `limit` available messages, oldest first
    ///
    /// An empty result is a normal outcome when nothing is available.
    #[instrument(
        skip(self, request),
        fields(
            queue_name = %request.queue_name,
            consumer_id = %request.consumer_id,
        )
    )]
    pub async fn reserve_next(&self, request: ReserveRequest) -> QueueResult<Vec<Message>> {
        let queue_name = QueueName::new(request.queue_name)?;
        let consumer = ConsumerId::new(request.consumer_id)?;
        let limit = self.defaults.resolve_limit(request.limit);
        let lease = self.defaults.resolve_lease(request.lease_seconds);

        let grant = LeaseGrant::new(
            consumer,
            normalize_info(request.reserved_info),
            self.clock.now(),
            lease,
        )?;

        let claim = ClaimRequest {
            queue_name,
            limit,
            grant,
        };

        let messages = self.store.claim_batch(&claim).await?;

        if messages.is_empty() {
            debug!(limit, "No messages available");
        } else {
            info!(
                claimed = messages.len(),
                limit,
                lease_seconds = lease.as_secs(),
                "Messages reserved"
            );
        }

        Ok(messages)
    }

    /// Read messages of a queue without leasing them
    #[instrument(skip(self))]
    pub async fn list_pending(
        &self,
        queue_name: &str,
        limit: Option<u32>,
    ) -> QueueResult<Vec<Message>> {
        let queue_name = QueueName::new(queue_name)?;
        let limit = self.defaults.resolve_limit(limit);

        self.store.list_pending(&queue_name, limit).await
    }

    /// Delete a message; succeeds whether or not it existed
    #[instrument(skip(self), fields(message_id = %id))]
    pub async fn remove(&self, id: &MessageId) -> QueueResult<bool> {
        let existed = self.store.delete(id).await?;

        if existed {
            info!("Message removed");
        } else {
            debug!("Remove requested for unknown message");
        }

        Ok(existed)
    }

    /// Fetch a single message by ID
    #[instrument(skip(self), fields(message_id = %id))]
    pub async fn get(&self, id: &MessageId) -> QueueResult<Option<Message>> {
        self.store.get(id).await
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
