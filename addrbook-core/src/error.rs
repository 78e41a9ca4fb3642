use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddrBookError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AddrBookError>;
