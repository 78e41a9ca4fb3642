use addrbook_core::{
    AddrBookError, DEFAULT_HASH_KEY, DEFAULT_REGION, PhoneValidator, Result, StoreBuilder,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const ENV_PREFIX: &str = "ADDRBOOK";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Production,
    Testing,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path prefix all routes are nested under, e.g. `/api`.
    #[serde(default)]
    pub root_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            root_path: String::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_hash_key")]
    pub hash_key: String,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            hash_key: default_hash_key(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_hash_key() -> String {
    DEFAULT_HASH_KEY.to_string()
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    #[serde(default = "default_region")]
    pub default_region: String,
    #[serde(default = "default_supported_regions")]
    pub supported_regions: Vec<String>,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            supported_regions: default_supported_regions(),
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_supported_regions() -> Vec<String> {
    vec![DEFAULT_REGION.to_string()]
}

impl Config {
    /// Loads `path` (optional, any format the `config` crate knows) layered
    /// under `ADDRBOOK_*` environment variables, e.g.
    /// `ADDRBOOK_STORE__REDIS__URL=redis://cache:6379`.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("phone.supported_regions")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AddrBookError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| AddrBookError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&mut self) -> Result<()> {
        self.server.root_path = normalize_root_path(&self.server.root_path)?;

        if self.server.bind_addr.trim().is_empty() {
            return Err(AddrBookError::Config(
                "server.bind_addr cannot be empty".to_string(),
            ));
        }

        if self.store.redis.hash_key.trim().is_empty() {
            return Err(AddrBookError::Config(
                "store.redis.hash_key cannot be empty".to_string(),
            ));
        }

        self.phone_validator()?;
        Ok(())
    }

    pub fn phone_validator(&self) -> Result<PhoneValidator> {
        PhoneValidator::new(&self.phone.default_region, &self.phone.supported_regions)
    }

    pub fn store_builder(&self) -> StoreBuilder {
        StoreBuilder::new()
            .backend(self.store.backend.as_str())
            .redis_url(self.store.redis.url.clone())
            .hash_key(self.store.redis.hash_key.clone())
            .ping_timeout(Duration::from_millis(self.store.redis.ping_timeout_ms))
    }
}

/// `""`, `"/"` -> `""`; `"api/"` -> `"/api"`.
fn normalize_root_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    if trimmed.contains(['*', ':', '{', '}']) {
        return Err(AddrBookError::Config(format!(
            "server.root_path must be a plain path: '{}'",
            raw
        )));
    }

    Ok(format!("/{}", trimmed))
}
