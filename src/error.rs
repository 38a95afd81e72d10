//! Error types for Flashguard
//!
//! Only infrastructure failures live here. Business rejections (sale window
//! closed, sold out, duplicate purchase, lock contention) are ordinary typed
//! results and never surface as an [`Error`].

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Flashguard
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// External atomic store failure
    #[error("Atomic store error: {0}")]
    Store(String),

    /// Redis client error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Relational store failure
    #[error("Database error: {0}")]
    Database(String),

    /// Cached payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking lock acquisition ran out of attempts
    #[error("Timed out acquiring lock {name} after {attempts} attempts")]
    LockTimeout { name: String, attempts: u32 },

    /// Daily counter no longer fits in the id's sequence bits
    #[error("Id space exhausted for prefix {prefix}: counter reached {count}")]
    IdSpaceExhausted { prefix: String, count: i64 },

    /// Background rebuild queue rejected a task
    #[error("Rebuild queue full, dropped rebuild for {0}")]
    RebuildQueueFull(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of the shared infrastructure (store or database).
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Error::Store(_) | Error::Database(_) => true,
            #[cfg(feature = "redis")]
            Error::Redis(_) => true,
            _ => false,
        }
    }
}
