use thiserror::Error;

/// Shared error type used across all govpulse crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
