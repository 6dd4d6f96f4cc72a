use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::entity::Entity;
use crate::error::StoreError;
use crate::models::{Delegate, EventCursor, EventRecord, IndexedBlock};
use crate::repos;
use crate::store::{Store, StoreTx};

/// Advisory lock key that serializes writers across processes.
const WRITER_LOCK_KEY: i64 = 0x676f_7670_756c_7365;

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A write transaction holding the writer lock until commit or rollback.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find<E: Entity>(&mut self, key: &str) -> Result<Option<E>, StoreError> {
        Ok(repos::find_record::<E, _>(&mut *self.tx, key, true).await?)
    }

    async fn put<E: Entity>(&mut self, record: E) -> Result<(), StoreError> {
        repos::put_record(&mut *self.tx, &record).await?;
        Ok(())
    }

    async fn record_event(&mut self, event: &EventRecord) -> Result<bool, StoreError> {
        Ok(repos::insert_event(&mut *self.tx, event).await?)
    }

    async fn last_cursor(&mut self) -> Result<Option<EventCursor>, StoreError> {
        Ok(repos::get_last_cursor(&mut *self.tx).await?)
    }

    async fn set_checkpoint(&mut self, block: &IndexedBlock) -> Result<(), StoreError> {
        repos::insert_block(&mut *self.tx, block).await?;
        repos::set_last_indexed_block(&mut *self.tx, block.block_number).await?;
        Ok(())
    }

    async fn rewind(&mut self, fork_block: i64) -> Result<Vec<EventRecord>, StoreError> {
        Ok(repos::rewind(&mut *self.tx, fork_block).await?)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Released automatically when the transaction ends.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(WRITER_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(PgTx { tx })
    }

    async fn get<E: Entity>(&self, key: &str) -> Result<Option<E>, StoreError> {
        Ok(repos::find_record::<E, _>(&self.pool, key, false).await?)
    }

    async fn top_delegates(&self, limit: i64) -> Result<Vec<Delegate>, StoreError> {
        Ok(repos::get_top_delegates(&self.pool, limit).await?)
    }

    async fn checkpoint(&self) -> Result<Option<i64>, StoreError> {
        Ok(repos::get_last_indexed_block(&self.pool).await?)
    }

    async fn block_hash(&self, block_number: i64) -> Result<Option<String>, StoreError> {
        Ok(repos::get_block_hash(&self.pool, block_number).await?)
    }

    async fn recent_blocks(&self, below: i64, limit: i64) -> Result<Vec<IndexedBlock>, StoreError> {
        Ok(repos::get_blocks_before(&self.pool, below, limit).await?)
    }
}
