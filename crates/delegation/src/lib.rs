//! Delegation state derived from ERC20Votes events.
//!
//! [`handlers`] holds the two state transitions; [`Processor`] feeds them a
//! sequential event stream with dedup, ordering checks, checkpoints and
//! reorg replay.

pub mod error;
pub mod handlers;
pub mod processor;
pub mod record;

pub use error::IndexError;
pub use processor::{Applied, BatchSummary, Processor};
pub use record::to_record;
