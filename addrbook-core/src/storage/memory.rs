use super::{
    AddressBook, CreateEntryOutcome, DeleteEntryOutcome, ReadEntryOutcome, UpdateEntryOutcome,
};
use crate::{AddrBookError, Phone, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-process address book with the same per-field semantics as the Redis
/// hash. Entries are lost on restart.
pub struct MemoryAddressBook {
    entries: RwLock<HashMap<String, String>>,
    alive: AtomicBool,
}

impl Default for MemoryAddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAddressBook {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            alive: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the store. While down, every data
    /// operation fails and the liveness probe reports `false`.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AddrBookError::StoreUnavailable(
                "memory store is down".to_string(),
            ))
        }
    }
}

#[async_trait]
impl AddressBook for MemoryAddressBook {
    async fn create(&self, phone: &Phone, address: &str) -> Result<CreateEntryOutcome> {
        self.ensure_alive()?;
        let mut entries = self.entries.write().await;

        match entries.entry(phone.as_str().to_string()) {
            Entry::Occupied(_) => Ok(CreateEntryOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(address.to_string());
                Ok(CreateEntryOutcome::Created(address.to_string()))
            }
        }
    }

    async fn get(&self, phone: &Phone) -> Result<ReadEntryOutcome> {
        self.ensure_alive()?;
        let entries = self.entries.read().await;

        Ok(match entries.get(phone.as_str()) {
            Some(address) => ReadEntryOutcome::Found(address.clone()),
            None => ReadEntryOutcome::NotFound,
        })
    }

    async fn update(&self, phone: &Phone, address: &str) -> Result<UpdateEntryOutcome> {
        self.ensure_alive()?;
        let mut entries = self.entries.write().await;

        match entries.get_mut(phone.as_str()) {
            Some(current) => {
                *current = address.to_string();
                Ok(UpdateEntryOutcome::Updated(address.to_string()))
            }
            None => Ok(UpdateEntryOutcome::NotFound),
        }
    }

    async fn delete(&self, phone: &Phone) -> Result<DeleteEntryOutcome> {
        self.ensure_alive()?;
        let mut entries = self.entries.write().await;

        Ok(match entries.remove(phone.as_str()) {
            Some(_) => DeleteEntryOutcome::Deleted,
            None => DeleteEntryOutcome::NotFound,
        })
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.set_alive(false);
        tracing::debug!("Closed memory address book");
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
