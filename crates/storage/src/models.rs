use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres};
use std::cmp::Ordering;

use crate::entity::Entity;

// ─── Delegation ─────────────────────────────────────────────────────────────

/// Current delegate assignment of one token holder.
///
/// A revoked delegation keeps its row with `delegate` set to the zero address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Delegation {
    pub delegator: String,
    pub delegate: String,
    pub block_number: i64,
    pub timestamp: i64,
}

/// Partial update of a [`Delegation`]. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct DelegationPatch {
    pub delegate: Option<String>,
    pub block_number: Option<i64>,
    pub timestamp: Option<i64>,
}

impl Entity for Delegation {
    const NAME: &'static str = "delegation";
    const TABLE: &'static str = "delegations";
    const KEY_COLUMN: &'static str = "delegator";
    const COLUMNS: &'static [&'static str] = &["delegator", "delegate", "block_number", "timestamp"];

    type Patch = DelegationPatch;

    fn key(&self) -> &str {
        &self.delegator
    }

    fn apply(&mut self, patch: DelegationPatch) {
        if let Some(delegate) = patch.delegate {
            self.delegate = delegate;
        }
        if let Some(block_number) = patch.block_number {
            self.block_number = block_number;
        }
        if let Some(timestamp) = patch.timestamp {
            self.timestamp = timestamp;
        }
    }

    fn push_row<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.delegator.clone())
            .push_bind(self.delegate.clone())
            .push_bind(self.block_number)
            .push_bind(self.timestamp);
    }
}

// ─── Delegate ───────────────────────────────────────────────────────────────

/// Aggregate state of an address that receives delegated voting power.
///
/// `voting_power` is a base-10 uint256 taken verbatim from the latest
/// `DelegateVotesChanged`; it is never derived from `delegators_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Delegate {
    pub address: String,
    pub voting_power: String,
    pub delegators_count: i64,
    pub votes_count: i64,
    pub proposals_created: i64,
    pub last_active_block: i64,
}

impl Delegate {
    /// A fresh record with every counter at zero.
    pub fn new(address: impl Into<String>, last_active_block: i64) -> Self {
        Self {
            address: address.into(),
            voting_power: "0".to_string(),
            delegators_count: 0,
            votes_count: 0,
            proposals_created: 0,
            last_active_block,
        }
    }
}

/// Partial update of a [`Delegate`].
#[derive(Debug, Clone, Default)]
pub struct DelegatePatch {
    pub voting_power: Option<String>,
    pub delegators_count: Option<i64>,
    pub votes_count: Option<i64>,
    pub proposals_created: Option<i64>,
    pub last_active_block: Option<i64>,
}

impl Entity for Delegate {
    const NAME: &'static str = "delegate";
    const TABLE: &'static str = "delegates";
    const KEY_COLUMN: &'static str = "address";
    const COLUMNS: &'static [&'static str] = &[
        "address",
        "voting_power",
        "delegators_count",
        "votes_count",
        "proposals_created",
        "last_active_block",
    ];

    type Patch = DelegatePatch;

    fn key(&self) -> &str {
        &self.address
    }

    fn apply(&mut self, patch: DelegatePatch) {
        if let Some(voting_power) = patch.voting_power {
            self.voting_power = voting_power;
        }
        if let Some(count) = patch.delegators_count {
            self.delegators_count = count;
        }
        if let Some(count) = patch.votes_count {
            self.votes_count = count;
        }
        if let Some(count) = patch.proposals_created {
            self.proposals_created = count;
        }
        if let Some(block) = patch.last_active_block {
            self.last_active_block = block;
        }
    }

    fn push_row<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.address.clone())
            .push_bind(self.voting_power.clone())
            .push_bind(self.delegators_count)
            .push_bind(self.votes_count)
            .push_bind(self.proposals_created)
            .push_bind(self.last_active_block);
    }
}

/// Orders base-10 uint256 strings numerically without parsing them.
pub fn cmp_amounts(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// ─── Event journal ──────────────────────────────────────────────────────────

/// Stable identity of one log: the same log delivered twice has the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub transaction_hash: String,
    pub log_index: i64,
}

/// Position of a log in the stream. Ordered by block, then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventCursor {
    pub block_number: i64,
    pub log_index: i64,
}

impl std::fmt::Display for EventCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.block_number, self.log_index)
    }
}

/// Decoded payload of a delegation event, as persisted in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    DelegateChanged {
        delegator: String,
        from_delegate: String,
        to_delegate: String,
        timestamp: i64,
    },
    DelegateVotesChanged {
        delegate: String,
        previous_balance: String,
        new_balance: String,
    },
}

/// One applied event: identity, stream position and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub transaction_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    pub kind: EventKind,
}

impl EventRecord {
    pub fn id(&self) -> EventId {
        EventId {
            transaction_hash: self.transaction_hash.clone(),
            log_index: self.log_index,
        }
    }

    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Journal row as read back from PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct JournalRow {
    pub transaction_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    pub payload: sqlx::types::Json<EventKind>,
    pub applied_at: NaiveDateTime,
}

impl From<JournalRow> for EventRecord {
    fn from(row: JournalRow) -> Self {
        Self {
            transaction_hash: row.transaction_hash,
            block_number: row.block_number,
            log_index: row.log_index,
            kind: row.payload.0,
        }
    }
}

// ─── IndexedBlock ───────────────────────────────────────────────────────────

/// A block that has been processed by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexedBlock {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
}
