//! Store contract shared by the in-memory and PostgreSQL backends.
//!
//! Writers go through a [`StoreTx`]: everything staged in a transaction
//! becomes visible together on [`StoreTx::commit`], and dropping the
//! transaction discards it. A store admits one writer at a time; readers
//! only ever see committed state.

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::models::{Delegate, EventCursor, EventRecord, IndexedBlock};

/// One serialized unit of work against the store.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Look up a record by primary key, including writes staged in this transaction.
    async fn find<E: Entity>(&mut self, key: &str) -> Result<Option<E>, StoreError>;

    /// Unconditionally write a full record under its key.
    async fn put<E: Entity>(&mut self, record: E) -> Result<(), StoreError>;

    /// Insert a new record. Fails with [`StoreError::Conflict`] if the key exists.
    async fn insert<E: Entity>(&mut self, record: E) -> Result<(), StoreError> {
        if self.find::<E>(record.key()).await?.is_some() {
            return Err(StoreError::Conflict {
                entity: E::NAME,
                key: record.key().to_string(),
            });
        }
        self.put(record).await
    }

    /// Apply a partial update. Fails with [`StoreError::NotFound`] if the key is absent.
    async fn update<E: Entity>(&mut self, key: &str, patch: E::Patch) -> Result<E, StoreError> {
        let mut record = self
            .find::<E>(key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: E::NAME,
                key: key.to_string(),
            })?;
        record.apply(patch);
        self.put(record.clone()).await?;
        Ok(record)
    }

    /// Insert `insert` if `key` is absent, otherwise write `update(existing)`.
    /// Returns the record as written.
    async fn upsert<E, F>(&mut self, key: &str, insert: E, update: F) -> Result<E, StoreError>
    where
        E: Entity,
        F: FnOnce(E) -> E + Send,
    {
        let record = match self.find::<E>(key).await? {
            Some(existing) => update(existing),
            None => insert,
        };
        debug_assert_eq!(record.key(), key);
        self.put(record.clone()).await?;
        Ok(record)
    }

    /// Append an event to the journal. Returns `false` if an event with the
    /// same identity was already recorded, in which case nothing is written.
    async fn record_event(&mut self, event: &EventRecord) -> Result<bool, StoreError>;

    /// Position of the most recently applied event, if any.
    async fn last_cursor(&mut self) -> Result<Option<EventCursor>, StoreError>;

    /// Record a fully processed block and advance the indexer cursor to it.
    async fn set_checkpoint(&mut self, block: &IndexedBlock) -> Result<(), StoreError>;

    /// Drop everything derived from blocks above `fork_block`: journal
    /// entries and indexed blocks are deleted, both entity collections are
    /// cleared, and the cursor is reset to `fork_block`. Returns the
    /// surviving journal in stream order so the caller can re-derive state.
    async fn rewind(&mut self, fork_block: i64) -> Result<Vec<EventRecord>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// A delegation state store.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx + 'static;

    /// Start a write transaction. Waits while another writer is active.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Read a committed record without taking part in any transaction.
    async fn get<E: Entity>(&self, key: &str) -> Result<Option<E>, StoreError>;

    /// Delegates ordered by voting power, highest first.
    async fn top_delegates(&self, limit: i64) -> Result<Vec<Delegate>, StoreError>;

    /// Last block whose events are durably committed.
    async fn checkpoint(&self) -> Result<Option<i64>, StoreError>;

    /// Stored hash of an indexed block, used for reorg detection.
    async fn block_hash(&self, block_number: i64) -> Result<Option<String>, StoreError>;

    /// Indexed blocks strictly below `below`, newest first.
    async fn recent_blocks(&self, below: i64, limit: i64) -> Result<Vec<IndexedBlock>, StoreError>;
}
