//! Message entity and lease state.
//!
//! A message is either *available* (never leased, or its lease has expired) or
//! *leased* (its `reserve_expires` is at or after the observation instant).
//! Availability is a pure function of stored state and the clock; no timer or
//! background job ever touches a message.

use crate::{
    ConsumerId, MessageId, Payload, QueueError, QueueName, Timestamp, Uuid, ValidationError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// Lease Types
// ============================================================================

/// Lease parameters applied to every message in one claim
///
/// All messages in a batch receive the same holder, info and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGrant {
    pub consumer: ConsumerId,
    pub info: Option<String>,
    pub granted_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LeaseGrant {
    /// Build a grant that starts at `granted_at` and lasts `lease`
    ///
    /// A zero-length lease is valid and expires at `granted_at`, which makes the
    /// message claimable again as soon as the clock moves past that instant.
    pub fn new(
        consumer: ConsumerId,
        info: Option<String>,
        granted_at: Timestamp,
        lease: Duration,
    ) -> Result<Self, ValidationError> {
        let expires_at =
            granted_at
                .checked_add(lease)
                .ok_or_else(|| ValidationError::OutOfRange {
                    field: "reserve_by_seconds".to_string(),
                    message: format!("lease of {}s is not representable", lease.as_secs()),
                })?;

        Ok(Self {
            consumer,
            info,
            granted_at,
            expires_at,
        })
    }
}

/// Reservation history of a message that has been claimed at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub reserved_at: Timestamp,
    pub reserved_by: ConsumerId,
    pub reserved_count: u32,
    pub reserved_info: Option<String>,
    pub reserve_expires: Timestamp,
}

impl Reservation {
    /// Highest count the storage column can hold
    pub const MAX_COUNT: u32 = i32::MAX as u32;

    /// True while the lease still excludes other consumers at `at`
    pub fn is_active(&self, at: Timestamp) -> bool {
        self.reserve_expires >= at
    }
}

// ============================================================================
// Message
// ============================================================================

/// A unit of work in a named queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    id: MessageId,
    queue_name: QueueName,
    payload: Payload,
    published_at: Timestamp,
    reservation: Option<Reservation>,
}

impl Message {
    /// Create a freshly published, never-leased message
    pub fn new(queue_name: QueueName, payload: Payload, published_at: Timestamp) -> Self {
        Self {
            id: MessageId::new(),
            queue_name,
            payload,
            published_at,
            reservation: None,
        }
    }

    /// Rebuild a message from its stored columns, checking every invariant
    pub fn restore(record: MessageRecord) -> Result<Self, QueueError> {
        let id = MessageId::from_uuid(record.id);
        let corrupt = |detail: String| QueueError::CorruptRecord {
            message: format!("message {}: {}", id, detail),
        };

        let queue_name = QueueName::new(record.queue_name).map_err(|e| corrupt(e.to_string()))?;
        let payload = Payload::new(record.payload).map_err(|e| corrupt(e.to_string()))?;

        if record.reserved_count < 0 {
            return Err(corrupt(format!(
                "negative reserved_count {}",
                record.reserved_count
            )));
        }

        let reservation = match record.reserved_by {
            None => {
                if record.reserved_count != 0 {
                    return Err(corrupt(
                        "reserved_count set without a reservation holder".to_string(),
                    ));
                }
                None
            }
            Some(reserved_by) => {
                let reserved_by =
                    ConsumerId::new(reserved_by).map_err(|e| corrupt(e.to_string()))?;
                let reserved_at = record
                    .reserved_at
                    .ok_or_else(|| corrupt("reserved_by set without reserved_at".to_string()))?;
                let reserve_expires = record.reserve_expires.ok_or_else(|| {
                    corrupt("reserved_by set without reserve_expires".to_string())
                })?;
                if record.reserved_count == 0 {
                    return Err(corrupt("reservation with zero reserved_count".to_string()));
                }

                Some(Reservation {
                    reserved_at: Timestamp::from_datetime(reserved_at),
                    reserved_by,
                    reserved_count: record.reserved_count as u32,
                    reserved_info: normalize_info(record.reserved_info),
                    reserve_expires: Timestamp::from_datetime(reserve_expires),
                })
            }
        };

        Ok(Self {
            id,
            queue_name,
            payload,
            published_at: Timestamp::from_datetime(record.published_at),
            reservation,
        })
    }

    /// Flatten into the stored column shape
    pub fn to_record(&self) -> MessageRecord {
        let reservation = self.reservation.as_ref();
        MessageRecord {
            id: self.id.as_uuid(),
            queue_name: self.queue_name.as_str().to_string(),
            payload: self.payload.as_str().to_string(),
            published_at: self.published_at.as_datetime(),
            reserved_at: reservation.map(|r| r.reserved_at.as_datetime()),
            reserved_by: reservation.map(|r| r.reserved_by.as_str().to_string()),
            reserved_count: reservation.map(|r| r.reserved_count as i32).unwrap_or(0),
            reserved_info: reservation.and_then(|r| r.reserved_info.clone()),
            reserve_expires: reservation.map(|r| r.reserve_expires.as_datetime()),
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn published_at(&self) -> Timestamp {
        self.published_at
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        self.reservation.as_ref()
    }

    /// Number of times this message has been claimed
    pub fn reserved_count(&self) -> u32 {
        self.reservation
            .as_ref()
            .map(|r| r.reserved_count)
            .unwrap_or(0)
    }

    /// Visibility predicate: never leased, or lease expired strictly before `at`
    pub fn is_claimable(&self, at: Timestamp) -> bool {
        match &self.reservation {
            None => true,
            Some(reservation) => !reservation.is_active(at),
        }
    }

    /// Apply a lease, incrementing the reservation count
    ///
    /// Leaves the message untouched on error.
    pub fn grant_lease(&mut self, grant: &LeaseGrant) -> Result<(), QueueError> {
        let previous = self.reserved_count();
        if previous >= Reservation::MAX_COUNT {
            return Err(QueueError::CorruptRecord {
                message: format!(
                    "message {}: reserved_count cannot exceed {}",
                    self.id,
                    Reservation::MAX_COUNT
                ),
            });
        }

        self.reservation = Some(Reservation {
            reserved_at: grant.granted_at,
            reserved_by: grant.consumer.clone(),
            reserved_count: previous + 1,
            reserved_info: grant.info.clone(),
            reserve_expires: grant.expires_at,
        });

        Ok(())
    }
}

/// Blank annotations are stored as absent
pub(crate) fn normalize_info(info: Option<String>) -> Option<String> {
    info.filter(|s| !s.trim().is_empty())
}

// ============================================================================
// Stored Shape
// ============================================================================

/// Column-level representation of a message
///
/// This is what storage adapters read and write. It carries no invariants of
/// its own; [`Message::restore`] is the only way back to a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct MessageRecord {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: String,
    pub published_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub reserved_by: Option<String>,
    pub reserved_count: i32,
    pub reserved_info: Option<String>,
    pub reserve_expires: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
