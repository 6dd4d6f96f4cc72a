use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use govpulse_core::AppError;

use crate::abi::ERC20Votes;

/// Decoded delegation event of an ERC20Votes token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    DelegateChanged {
        delegator: Address,
        from_delegate: Address,
        to_delegate: Address,
    },
    DelegateVotesChanged {
        delegate: Address,
        previous_balance: U256,
        new_balance: U256,
    },
}

/// A governance event together with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub event: GovernanceEvent,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// Topic0 values of the two indexed events, for building log filters.
pub fn event_signatures() -> Vec<B256> {
    vec![
        ERC20Votes::DelegateChanged::SIGNATURE_HASH,
        ERC20Votes::DelegateVotesChanged::SIGNATURE_HASH,
    ]
}

/// Decode a log as `DelegateChanged` or `DelegateVotesChanged`.
///
/// Returns `Ok(None)` for logs of any other event. A log that carries one
/// of the two signatures but is missing envelope fields or fails ABI
/// decoding is malformed and reported as [`AppError::Decode`].
///
/// `fallback_timestamp` is used when the node does not populate
/// `blockTimestamp` on logs.
pub fn decode_governance_log(
    log: &Log,
    fallback_timestamp: Option<u64>,
) -> Result<Option<DecodedLog>, AppError> {
    let Some(topic0) = log.inner.data.topics().first().copied() else {
        return Ok(None);
    };

    let event = if topic0 == ERC20Votes::DelegateChanged::SIGNATURE_HASH {
        let d = log
            .log_decode::<ERC20Votes::DelegateChanged>()
            .map_err(|e| AppError::Decode(format!("DelegateChanged: {e}")))?
            .inner
            .data;
        GovernanceEvent::DelegateChanged {
            delegator: d.delegator,
            from_delegate: d.fromDelegate,
            to_delegate: d.toDelegate,
        }
    } else if topic0 == ERC20Votes::DelegateVotesChanged::SIGNATURE_HASH {
        let d = log
            .log_decode::<ERC20Votes::DelegateVotesChanged>()
            .map_err(|e| AppError::Decode(format!("DelegateVotesChanged: {e}")))?
            .inner
            .data;
        GovernanceEvent::DelegateVotesChanged {
            delegate: d.delegate,
            previous_balance: d.previousBalance,
            new_balance: d.newBalance,
        }
    } else {
        tracing::trace!(topic = %topic0, "Skipping unrelated log");
        return Ok(None);
    };

    let missing = |field: &str| AppError::Decode(format!("log is missing {field}"));

    Ok(Some(DecodedLog {
        event,
        block_number: log.block_number.ok_or_else(|| missing("block number"))?,
        block_timestamp: log
            .block_timestamp
            .or(fallback_timestamp)
            .ok_or_else(|| missing("block timestamp"))?,
        transaction_hash: log.transaction_hash.ok_or_else(|| missing("transaction hash"))?,
        log_index: log.log_index.ok_or_else(|| missing("log index"))?,
    }))
}
