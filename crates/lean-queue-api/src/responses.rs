//! Request, response and query parameter types, plus health checking.

use crate::errors::ApiError;
use lean_queue_core::{Message, MessageId, MessageStore, ReserveRequest, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Request Bodies
// ============================================================================

/// Body of `POST /message`
#[derive(Debug, Deserialize)]
pub struct PublishMessageRequest {
    pub queue_name: String,
    pub message: String,
}

/// Body of `DELETE /message`
#[derive(Debug, Deserialize)]
pub struct RemoveMessageRequest {
    pub message_id: String,
}

// ============================================================================
// Query Parameter Types
// ============================================================================

/// Query string of `GET /message/next`
///
/// Numbers arrive as strings so that an empty value can be treated as absent
/// and a malformed one reported by name.
#[derive(Debug, Default, Deserialize)]
pub struct ReserveNextParams {
    pub queue_name: Option<String>,
    pub limit: Option<String>,
    pub reserved_by: Option<String>,
    pub reserve_by_seconds: Option<String>,
    pub reserved_info: Option<String>,
}

impl ReserveNextParams {
    pub fn into_request(self) -> Result<ReserveRequest, ApiError> {
        let queue_name = required("queue_name", self.queue_name)?;
        let consumer_id = required("reserved_by", self.reserved_by)?;

        Ok(ReserveRequest {
            queue_name,
            consumer_id,
            limit: optional_number("limit", self.limit)?,
            lease_seconds: optional_number("reserve_by_seconds", self.reserve_by_seconds)?,
            reserved_info: self.reserved_info,
        })
    }
}

/// Query string of `GET /message/queue/{queue_name}`
#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesParams {
    pub limit: Option<String>,
}

impl ListMessagesParams {
    pub fn limit(&self) -> Result<Option<u32>, ApiError> {
        optional_number("limit", self.limit.clone())
    }
}

fn required(name: &str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::MissingParameter {
            name: name.to_string(),
        }),
    }
}

fn optional_number<T>(name: &str, value: Option<String>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ApiError::InvalidParameter {
                name: name.to_string(),
                message: e.to_string(),
            }),
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Publish confirmation
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    pub message_id: MessageId,
}

impl PublishResponse {
    pub fn new(message_id: MessageId) -> Self {
        Self {
            status: "published".to_string(),
            message_id,
        }
    }
}

/// Remove confirmation
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub status: String,
    pub message_id: MessageId,
    pub existed: bool,
}

impl RemoveResponse {
    pub fn new(message_id: MessageId, existed: bool) -> Self {
        Self {
            status: "removed".to_string(),
            message_id,
            existed,
        }
    }
}

/// Wire representation of a message
///
/// Reservation fields are flattened and null for never-leased messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub queue_name: String,
    pub message: String,
    pub published_at: Timestamp,
    pub reserved_at: Option<Timestamp>,
    pub reserved_by: Option<String>,
    pub reserved_count: u32,
    pub reserved_info: Option<String>,
    pub reserve_expires: Option<Timestamp>,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        let reservation = message.reservation();
        Self {
            id: *message.id(),
            queue_name: message.queue_name().to_string(),
            message: message.payload().to_string(),
            published_at: message.published_at(),
            reserved_at: reservation.map(|r| r.reserved_at),
            reserved_by: reservation.map(|r| r.reserved_by.to_string()),
            reserved_count: message.reserved_count(),
            reserved_info: reservation.and_then(|r| r.reserved_info.clone()),
            reserve_expires: reservation.map(|r| r.reserve_expires),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub checks: HashMap<String, HealthCheckResult>,
    pub version: String,
}

impl HealthResponse {
    pub fn from_status(status: HealthStatus) -> Self {
        Self {
            status: if status.is_healthy {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            timestamp: Timestamp::now(),
            checks: status.checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ============================================================================
// Health Checking
// ============================================================================

/// Health check result for individual components
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Overall health status
#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub checks: HashMap<String, HealthCheckResult>,
}

/// Interface for system health monitoring
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Basic health check (fast, no I/O)
    async fn check_basic_health(&self) -> HealthStatus;

    /// Deep health check including the message store
    async fn check_deep_health(&self) -> HealthStatus;
}

/// Health checker that probes the message store
pub struct StoreHealthChecker {
    store: Arc<dyn MessageStore>,
}

impl StoreHealthChecker {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl HealthChecker for StoreHealthChecker {
    async fn check_basic_health(&self) -> HealthStatus {
        let start = Instant::now();
        let mut checks = HashMap::new();

        checks.insert(
            "service".to_string(),
            HealthCheckResult {
                healthy: true,
                message: "Service is running".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        HealthStatus {
            is_healthy: true,
            checks,
        }
    }

    async fn check_deep_health(&self) -> HealthStatus {
        let mut status = self.check_basic_health().await;

        let start = Instant::now();
        let result = match self.store.health_check().await {
            Ok(()) => HealthCheckResult {
                healthy: true,
                message: "Message store reachable".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => HealthCheckResult {
                healthy: false,
                message: e.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        };

        status.is_healthy &= result.healthy;
        status.checks.insert("message_store".to_string(), result);
        status
    }
}

#[cfg(test)]
#[path = "responses_tests.rs"]
mod tests;
