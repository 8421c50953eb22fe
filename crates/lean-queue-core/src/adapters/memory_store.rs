//! In-process message store.
//!
//! Messages are kept in a map ordered by `(published_at, sequence)`, which is
//! exactly the FIFO order claims must follow. A single async mutex serializes
//! claimers, so the select-then-lease sequence is atomic with respect to every
//! other operation on the store.

use crate::{
    store::{ClaimRequest, MessageStore},
    Message, MessageId, QueueError, QueueName, QueueResult, Timestamp,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::debug;

type OrderKey = (Timestamp, u64);

#[derive(Debug, Default)]
struct StoreState {
    messages: BTreeMap<OrderKey, Message>,
    index: HashMap<MessageId, OrderKey>,
    next_sequence: u64,
}

/// Message store held entirely in memory
///
/// Suitable for tests and single-process deployments. Contents are lost when
/// the process exits.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    state: Mutex<StoreState>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages across all queues
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.messages.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: &Message) -> QueueResult<()> {
        let mut state = self.state.lock().await;

        if state.index.contains_key(message.id()) {
            return Err(QueueError::storage(format!(
                "message {} already exists",
                message.id()
            )));
        }

        let key = (message.published_at(), state.next_sequence);
        state.next_sequence += 1;
        state.index.insert(*message.id(), key);
        state.messages.insert(key, message.clone());

        Ok(())
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> QueueResult<Vec<Message>> {
        let now = request.grant.granted_at;
        let mut state = self.state.lock().await;

        // Stage leases on copies; nothing is written back until all succeed.
        let mut staged = Vec::new();
        for (key, message) in state.messages.iter() {
            if staged.len() >= request.limit as usize {
                break;
            }
            if message.queue_name() != &request.queue_name || !message.is_claimable(now) {
                continue;
            }

            let mut leased = message.clone();
            leased.grant_lease(&request.grant)?;
            staged.push((*key, leased));
        }

        for (key, leased) in &staged {
            state.messages.insert(*key, leased.clone());
        }

        debug!(
            queue_name = %request.queue_name,
            claimed = staged.len(),
            "In-memory claim complete"
        );

        Ok(staged.into_iter().map(|(_, message)| message).collect())
    }

    async fn list_pending(&self, queue_name: &QueueName, limit: u32) -> QueueResult<Vec<Message>> {
        let state = self.state.lock().await;

        Ok(state
            .messages
            .values()
            .filter(|message| message.queue_name() == queue_name)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &MessageId) -> QueueResult<Option<Message>> {
        let state = self.state.lock().await;

        Ok(state
            .index
            .get(id)
            .and_then(|key| state.messages.get(key))
            .cloned())
    }

    async fn delete(&self, id: &MessageId) -> QueueResult<bool> {
        let mut state = self.state.lock().await;

        match state.index.remove(id) {
            Some(key) => {
                state.messages.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
