use govpulse_chain::{DecodedLog, GovernanceEvent};
use govpulse_core::normalize_address;
use govpulse_storage::models::{EventKind, EventRecord};

use crate::IndexError;

/// Map a decoded chain log onto the journal's storage representation.
pub fn to_record(log: &DecodedLog) -> Result<EventRecord, IndexError> {
    let kind = match &log.event {
        GovernanceEvent::DelegateChanged {
            delegator,
            from_delegate,
            to_delegate,
        } => EventKind::DelegateChanged {
            delegator: format!("{delegator:#x}"),
            from_delegate: format!("{from_delegate:#x}"),
            to_delegate: format!("{to_delegate:#x}"),
            timestamp: to_i64("block timestamp", log.block_timestamp)?,
        },
        GovernanceEvent::DelegateVotesChanged {
            delegate,
            previous_balance,
            new_balance,
        } => EventKind::DelegateVotesChanged {
            delegate: format!("{delegate:#x}"),
            previous_balance: previous_balance.to_string(),
            new_balance: new_balance.to_string(),
        },
    };

    Ok(EventRecord {
        transaction_hash: format!("{:#x}", log.transaction_hash),
        block_number: to_i64("block number", log.block_number)?,
        log_index: to_i64("log index", log.log_index)?,
        kind,
    })
}

/// Reject records that could not have come from a well-formed log.
pub fn validate(event: &EventRecord) -> Result<(), IndexError> {
    if event.block_number < 0 || event.log_index < 0 {
        return Err(IndexError::Malformed(format!(
            "negative position {} in {}",
            event.cursor(),
            event.transaction_hash
        )));
    }
    if event.transaction_hash.is_empty() {
        return Err(IndexError::Malformed("empty transaction hash".into()));
    }

    match &event.kind {
        EventKind::DelegateChanged {
            delegator,
            to_delegate,
            ..
        } => {
            check_address(delegator)?;
            check_address(to_delegate)?;
        }
        EventKind::DelegateVotesChanged {
            delegate,
            new_balance,
            ..
        } => {
            check_address(delegate)?;
            if new_balance.is_empty() || !new_balance.bytes().all(|b| b.is_ascii_digit()) {
                return Err(IndexError::Malformed(format!("voting power {new_balance:?}")));
            }
        }
    }
    Ok(())
}

fn check_address(raw: &str) -> Result<(), IndexError> {
    match normalize_address(raw) {
        Ok(normalized) if normalized == raw => Ok(()),
        _ => Err(IndexError::Malformed(format!("address {raw:?}"))),
    }
}

fn to_i64(field: &str, value: u64) -> Result<i64, IndexError> {
    i64::try_from(value).map_err(|_| IndexError::Malformed(format!("{field} {value} out of range")))
}
