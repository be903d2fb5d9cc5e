//! Application-wide error types.

use thiserror::Error;

/// Startup plumbing errors. Only `main` turns these into a non-zero exit.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the identity store.
///
/// Hydration catches these where they happen and logs them; they never
/// escape the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert of an identity, credential or scope batch failed.
    #[error("store write failed: {0}")]
    Write(String),

    /// An existence check failed.
    #[error("store read failed: {0}")]
    Read(String),
}
