//! Storage adapters for address entries
//!
//! Every entry is one field of a single hash: field name is the canonical
//! phone, field value is the address.

pub mod factory;
pub mod memory;
pub mod redis;

use crate::{Phone, Result};
use async_trait::async_trait;

pub use factory::StoreBuilder;
pub use memory::MemoryAddressBook;
pub use redis::RedisAddressBook;

pub const DEFAULT_HASH_KEY: &str = "phone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateEntryOutcome {
    Created(String),
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEntryOutcome {
    Found(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEntryOutcome {
    Updated(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteEntryOutcome {
    Deleted,
    NotFound,
}

/// Record store for address entries.
///
/// `Err` is only returned when the backing store fails; missing or duplicate
/// entries are reported through the outcome enums.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Stores `address` only if `phone` has no entry yet.
    async fn create(&self, phone: &Phone, address: &str) -> Result<CreateEntryOutcome>;

    async fn get(&self, phone: &Phone) -> Result<ReadEntryOutcome>;

    /// Replaces the address of an existing entry.
    async fn update(&self, phone: &Phone, address: &str) -> Result<UpdateEntryOutcome>;

    async fn delete(&self, phone: &Phone) -> Result<DeleteEntryOutcome>;

    /// Liveness probe. Never fails: an unreachable store is `false`.
    async fn is_alive(&self) -> bool;

    /// Releases the store connection. Called once, after the server stopped.
    async fn close(&self);

    fn backend_name(&self) -> &'static str;
}
