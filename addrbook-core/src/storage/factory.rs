use super::{AddressBook, DEFAULT_HASH_KEY, memory::MemoryAddressBook, redis::RedisAddressBook};
use crate::{AddrBookError, Result};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    backend: Option<String>,
    redis_url: Option<String>,
    hash_key: Option<String>,
    ping_timeout: Option<Duration>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn hash_key(mut self, hash_key: impl Into<String>) -> Self {
        self.hash_key = Some(hash_key.into());
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(AddrBookError::Config(
                "store backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    fn resolve_hash_key(&self) -> Result<String> {
        let hash_key = self
            .hash_key
            .as_deref()
            .unwrap_or(DEFAULT_HASH_KEY)
            .trim()
            .to_string();

        if hash_key.is_empty() {
            return Err(AddrBookError::Config(
                "redis hash key cannot be empty".to_string(),
            ));
        }

        Ok(hash_key)
    }

    pub async fn build(&self) -> Result<Arc<dyn AddressBook>> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "redis" => {
                let url = self.redis_url.as_deref().unwrap_or_default().trim();
                if url.is_empty() {
                    return Err(AddrBookError::Config(
                        "redis url is required for redis backend".to_string(),
                    ));
                }

                let hash_key = self.resolve_hash_key()?;
                let ping_timeout = self.ping_timeout.unwrap_or(DEFAULT_PING_TIMEOUT);

                let store = RedisAddressBook::connect(url, &hash_key, ping_timeout).await?;
                Ok(Arc::new(store))
            }
            "memory" => {
                tracing::warn!("Using in-memory address book; entries are lost on restart");
                Ok(Arc::new(MemoryAddressBook::new()))
            }
            other => Err(AddrBookError::Config(format!(
                "unsupported store backend: {}",
                other
            ))),
        }
    }
}
