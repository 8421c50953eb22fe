//! Concrete [`MessageStore`](crate::MessageStore) implementations.

mod memory_store;
pub use memory_store::InMemoryMessageStore;

#[cfg(feature = "postgres")]
mod postgres_store;
#[cfg(feature = "postgres")]
pub use postgres_store::{PostgresMessageStore, PostgresStoreOptions};
