//! In-process store used by tests.
//!
//! A transaction works on a private copy of the committed state taken when
//! it begins; `commit` swaps the copy in under the write lock. Writers are
//! serialized by an async gate, so the copy never goes stale.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::entity::Entity;
use crate::error::StoreError;
use crate::models::{Delegate, EventCursor, EventId, EventRecord, IndexedBlock, cmp_amounts};
use crate::store::{Store, StoreTx};

/// Entity rows by table name, then primary key.
#[derive(Debug, Clone, Default)]
struct Tables(BTreeMap<&'static str, BTreeMap<String, Value>>);

impl Tables {
    fn get<E: Entity>(&self, key: &str) -> Result<Option<E>, StoreError> {
        match self.0.get(E::TABLE).and_then(|rows| rows.get(key)) {
            Some(row) => Ok(Some(serde_json::from_value(row.clone())?)),
            None => Ok(None),
        }
    }

    fn put<E: Entity>(&mut self, record: &E) -> Result<(), StoreError> {
        let row = serde_json::to_value(record)?;
        self.0
            .entry(E::TABLE)
            .or_default()
            .insert(record.key().to_string(), row);
        Ok(())
    }

    fn all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.0
            .get(E::TABLE)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|row| serde_json::from_value(row.clone()).map_err(StoreError::from))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: Tables,
    journal: BTreeMap<EventId, EventRecord>,
    /// Newest journalled position, kept alongside the journal.
    last_cursor: Option<EventCursor>,
    blocks: BTreeMap<i64, IndexedBlock>,
    last_indexed_block: Option<i64>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<State>,
    writer: Arc<Mutex<()>>,
    unavailable: AtomicBool,
}

impl Shared {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store taken offline".into()));
        }
        Ok(())
    }
}

/// Cheaply cloneable handle to an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    /// (or succeed again). Used to exercise failure handling.
    pub fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of journalled events.
    pub fn journal_len(&self) -> usize {
        self.shared.state.read().journal.len()
    }

    /// All committed records of one entity type, in key order.
    pub fn all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.shared.state.read().tables.all()
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    working: State,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find<E: Entity>(&mut self, key: &str) -> Result<Option<E>, StoreError> {
        self.shared.check()?;
        self.working.tables.get(key)
    }

    async fn put<E: Entity>(&mut self, record: E) -> Result<(), StoreError> {
        self.shared.check()?;
        self.working.tables.put(&record)
    }

    async fn record_event(&mut self, event: &EventRecord) -> Result<bool, StoreError> {
        self.shared.check()?;
        let id = event.id();
        if self.working.journal.contains_key(&id) {
            return Ok(false);
        }
        self.working.journal.insert(id, event.clone());
        self.working.last_cursor = self.working.last_cursor.max(Some(event.cursor()));
        Ok(true)
    }

    async fn last_cursor(&mut self) -> Result<Option<EventCursor>, StoreError> {
        self.shared.check()?;
        Ok(self.working.last_cursor)
    }

    async fn set_checkpoint(&mut self, block: &IndexedBlock) -> Result<(), StoreError> {
        self.shared.check()?;
        self.working.blocks.insert(block.block_number, block.clone());
        self.working.last_indexed_block = Some(block.block_number);
        Ok(())
    }

    async fn rewind(&mut self, fork_block: i64) -> Result<Vec<EventRecord>, StoreError> {
        self.shared.check()?;
        self.working.journal.retain(|_, e| e.block_number <= fork_block);
        self.working.blocks.retain(|n, _| *n <= fork_block);
        self.working.tables = Tables::default();
        self.working.last_indexed_block = Some(fork_block);

        let mut survivors: Vec<EventRecord> = self.working.journal.values().cloned().collect();
        survivors.sort_by_key(EventRecord::cursor);
        self.working.last_cursor = survivors.last().map(EventRecord::cursor);
        Ok(survivors)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.shared.check()?;
        *self.shared.state.write() = self.working;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let writer = self.shared.writer.clone().lock_owned().await;
        self.shared.check()?;
        let working = self.shared.state.read().clone();
        Ok(MemoryTx {
            shared: self.shared.clone(),
            working,
            _writer: writer,
        })
    }

    async fn get<E: Entity>(&self, key: &str) -> Result<Option<E>, StoreError> {
        self.shared.check()?;
        self.shared.state.read().tables.get(key)
    }

    async fn top_delegates(&self, limit: i64) -> Result<Vec<Delegate>, StoreError> {
        self.shared.check()?;
        let mut delegates: Vec<Delegate> = self.all()?;
        delegates.sort_by(|a, b| {
            cmp_amounts(&b.voting_power, &a.voting_power).then_with(|| a.address.cmp(&b.address))
        });
        delegates.truncate(limit.max(0) as usize);
        Ok(delegates)
    }

    async fn checkpoint(&self) -> Result<Option<i64>, StoreError> {
        self.shared.check()?;
        Ok(self.shared.state.read().last_indexed_block)
    }

    async fn block_hash(&self, block_number: i64) -> Result<Option<String>, StoreError> {
        self.shared.check()?;
        Ok(self
            .shared
            .state
            .read()
            .blocks
            .get(&block_number)
            .map(|b| b.block_hash.clone()))
    }

    async fn recent_blocks(&self, below: i64, limit: i64) -> Result<Vec<IndexedBlock>, StoreError> {
        self.shared.check()?;
        Ok(self
            .shared
            .state
            .read()
            .blocks
            .range(..below)
            .rev()
            .take(limit.max(0) as usize)
            .map(|(_, b)| b.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Delegation, DelegationPatch};

    fn delegation(delegator: &str, delegate: &str, block: i64) -> Delegation {
        Delegation {
            delegator: delegator.into(),
            delegate: delegate.into(),
            block_number: block,
            timestamp: block * 12,
        }
    }

    #[tokio::test]
    async fn insert_conflicts_and_update_requires_existing_key() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        tx.insert(delegation("0xa", "0xb", 1)).await.unwrap();
        let err = tx.insert(delegation("0xa", "0xc", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "delegation", .. }));

        let err = tx
            .update::<Delegation>("0xz", DelegationPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let updated = tx
            .update::<Delegation>(
                "0xa",
                DelegationPatch {
                    delegate: Some("0xc".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.delegate, "0xc");
        assert_eq!(updated.block_number, 1);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_and_dropped() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.put(delegation("0xa", "0xb", 1)).await.unwrap();
        assert!(store.get::<Delegation>("0xa").await.unwrap().is_none());
        drop(tx);

        assert!(store.get::<Delegation>("0xa").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.put(delegation("0xa", "0xb", 1)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            store.get::<Delegation>("0xa").await.unwrap(),
            Some(delegation("0xa", "0xb", 1))
        );
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let first = tx
            .upsert("0xb", Delegate::new("0xb", 5), |mut d: Delegate| {
                d.delegators_count += 1;
                d
            })
            .await
            .unwrap();
        assert_eq!(first.delegators_count, 0);

        let second = tx
            .upsert("0xb", Delegate::new("0xb", 6), |mut d: Delegate| {
                d.delegators_count += 1;
                d
            })
            .await
            .unwrap();
        assert_eq!(second.delegators_count, 1);
        assert_eq!(second.last_active_block, 5);
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_an_open_writer() {
        let store = MemoryStore::new();
        let _tx = store.begin().await.unwrap();

        // The writer gate only serializes writers.
        assert!(store.get::<Delegate>("0xb").await.unwrap().is_none());
        assert_eq!(store.checkpoint().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(store.begin().await, Err(StoreError::Unavailable(_))));
        assert!(store.get::<Delegate>("0xb").await.is_err());

        store.set_available(true);
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn top_delegates_orders_by_numeric_voting_power() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (address, power) in [("0x1", "900"), ("0x2", "1000"), ("0x3", "25")] {
            let mut delegate = Delegate::new(address, 1);
            delegate.voting_power = power.into();
            tx.put(delegate).await.unwrap();
        }
        tx.commit().await.unwrap();

        let top = store.top_delegates(2).await.unwrap();
        let addresses: Vec<&str> = top.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(addresses, ["0x2", "0x1"]);
    }

    fn votes(block: i64, log_index: i64) -> EventRecord {
        EventRecord {
            transaction_hash: format!("0x{block:x}{log_index:x}"),
            block_number: block,
            log_index,
            kind: crate::models::EventKind::DelegateVotesChanged {
                delegate: "0xb".into(),
                previous_balance: "0".into(),
                new_balance: "1".into(),
            },
        }
    }

    #[tokio::test]
    async fn last_cursor_follows_the_journal_through_rewind() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.last_cursor().await.unwrap(), None);

        for (block, log_index) in [(3, 1), (5, 0), (4, 7)] {
            assert!(tx.record_event(&votes(block, log_index)).await.unwrap());
        }
        assert!(!tx.record_event(&votes(5, 0)).await.unwrap());
        assert_eq!(tx.last_cursor().await.unwrap().unwrap().block_number, 5);

        let survivors = tx.rewind(4).await.unwrap();
        assert_eq!(survivors.len(), 2);
        let last = tx.last_cursor().await.unwrap().unwrap();
        assert_eq!((last.block_number, last.log_index), (4, 7));

        tx.rewind(0).await.unwrap();
        assert_eq!(tx.last_cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn readers_see_committed_rows_while_a_rewind_is_open() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.put(Delegate::new("0xb", 1)).await.unwrap();
        tx.record_event(&votes(2, 0)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.rewind(1).await.unwrap();
        assert!(tx.find::<Delegate>("0xb").await.unwrap().is_none());

        let read = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.get::<Delegate>("0xb"),
        )
        .await
        .expect("reader waited on the writer");
        assert_eq!(read.unwrap(), Some(Delegate::new("0xb", 1)));

        drop(tx);
        assert_eq!(store.journal_len(), 1);
    }
}
