use govpulse_storage::StoreError;
use govpulse_storage::models::EventCursor;
use thiserror::Error;

/// Why an event (or batch) was not applied. Nothing is written in any case.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed event: {0}")]
    Malformed(String),

    /// The stream violated its ordering precondition.
    #[error("event at {got} arrived after {last}")]
    OutOfOrder { last: EventCursor, got: EventCursor },
}
