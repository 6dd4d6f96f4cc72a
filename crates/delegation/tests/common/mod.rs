#![allow(dead_code)]

use govpulse_storage::models::{EventKind, EventRecord};

pub use govpulse_core::ZERO_ADDRESS as ZERO;

/// Deterministic, normalized test address ending in `n`.
pub fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}

fn tx_hash(block: i64, log_index: i64) -> String {
    format!("0x{:032x}{:032x}", block, log_index)
}

pub fn delegate_changed(delegator: &str, to: &str, block: i64, log_index: i64) -> EventRecord {
    EventRecord {
        transaction_hash: tx_hash(block, log_index),
        block_number: block,
        log_index,
        kind: EventKind::DelegateChanged {
            delegator: delegator.to_string(),
            from_delegate: ZERO.to_string(),
            to_delegate: to.to_string(),
            timestamp: 1_700_000_000 + block * 12,
        },
    }
}

pub fn votes_changed(delegate: &str, new_balance: &str, block: i64, log_index: i64) -> EventRecord {
    EventRecord {
        transaction_hash: tx_hash(block, log_index),
        block_number: block,
        log_index,
        kind: EventKind::DelegateVotesChanged {
            delegate: delegate.to_string(),
            previous_balance: "0".to_string(),
            new_balance: new_balance.to_string(),
        },
    }
}
