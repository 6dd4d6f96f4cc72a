//! Sequential stream processor.
//!
//! Precondition on the event source: events arrive in non-decreasing
//! `(block_number, log_index)` order, and a block's logs arrive in log-index
//! order. Re-delivery of events that were already applied (at-least-once
//! replay from a checkpoint) is expected and absorbed by the journal;
//! anything else that goes backwards is rejected as [`IndexError::OutOfOrder`].

use govpulse_storage::models::{EventRecord, IndexedBlock};
use govpulse_storage::{Store, StoreTx};
use tracing::{debug, info, warn};

use crate::IndexError;
use crate::handlers::apply_event;
use crate::record::validate;

/// Outcome of offering one event to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Same (transaction hash, log index) was applied before; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub duplicates: usize,
}

/// Applies events to a [`Store`] one at a time, each inside a store
/// transaction, so that an event's `Delegation` and `Delegate` writes land
/// together or not at all.
#[derive(Debug, Clone)]
pub struct Processor<S> {
    store: S,
}

impl<S: Store> Processor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply a single event in its own transaction.
    pub async fn apply(&self, event: &EventRecord) -> Result<Applied, IndexError> {
        let mut tx = self.store.begin().await?;
        let outcome = apply_one(&mut tx, event).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Apply a batch of events and, optionally, the checkpoint of the last
    /// block they cover, all in one transaction. On any error nothing from
    /// the batch is kept.
    pub async fn apply_batch(
        &self,
        events: &[EventRecord],
        checkpoint: Option<&IndexedBlock>,
    ) -> Result<BatchSummary, IndexError> {
        let mut tx = self.store.begin().await?;
        let mut summary = BatchSummary::default();

        for event in events {
            match apply_one(&mut tx, event).await? {
                Applied::Applied => summary.applied += 1,
                Applied::Duplicate => summary.duplicates += 1,
            }
        }

        if let Some(block) = checkpoint {
            tx.set_checkpoint(block).await?;
        }
        tx.commit().await?;

        if summary.duplicates > 0 {
            warn!(
                duplicates = summary.duplicates,
                "Skipped events that were already applied"
            );
        }
        info!(
            applied = summary.applied,
            block = checkpoint.map(|b| b.block_number),
            "Batch committed"
        );
        Ok(summary)
    }

    /// Discard state derived from blocks after `fork_block` and re-derive it
    /// from the surviving journal. Returns the number of replayed events.
    pub async fn rollback_to(&self, fork_block: i64) -> Result<usize, IndexError> {
        let mut tx = self.store.begin().await?;
        let survivors = tx.rewind(fork_block).await?;

        for event in &survivors {
            apply_event(&mut tx, event).await?;
        }
        tx.commit().await?;

        warn!(
            fork_block = fork_block,
            replayed = survivors.len(),
            "Rolled back to fork block"
        );
        Ok(survivors.len())
    }
}

async fn apply_one<T: StoreTx>(tx: &mut T, event: &EventRecord) -> Result<Applied, IndexError> {
    validate(event)?;

    let last = tx.last_cursor().await?;
    if !tx.record_event(event).await? {
        debug!(
            tx = %event.transaction_hash,
            log_index = event.log_index,
            "Duplicate event"
        );
        return Ok(Applied::Duplicate);
    }

    if let Some(last) = last {
        if event.cursor() <= last {
            return Err(IndexError::OutOfOrder {
                last,
                got: event.cursor(),
            });
        }
    }

    apply_event(tx, event).await?;
    Ok(Applied::Applied)
}
