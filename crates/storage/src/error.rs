use thiserror::Error;

/// Failures of the delegation state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Plain insert of a key that already exists. Handlers only upsert, so
    /// this indicates a bug rather than a runtime condition.
    #[error("{entity} {key} already exists")]
    Conflict { entity: &'static str, key: String },

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}
