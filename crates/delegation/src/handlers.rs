use govpulse_core::ZERO_ADDRESS;
use govpulse_storage::models::{Delegate, Delegation, EventKind, EventRecord};
use govpulse_storage::{StoreError, StoreTx};
use tracing::debug;

/// Apply a `DelegateChanged` event.
///
/// The delegator's row is overwritten unconditionally (last write wins in
/// processing order). A non-zero new delegate gains one delegator. The
/// previous delegate's `delegators_count` is never decremented, so counts
/// only grow across re-delegations.
pub async fn handle_delegate_changed<T: StoreTx>(
    tx: &mut T,
    delegator: &str,
    new_delegate: &str,
    block_number: i64,
    timestamp: i64,
) -> Result<(), StoreError> {
    let assignment = Delegation {
        delegator: delegator.to_string(),
        delegate: new_delegate.to_string(),
        block_number,
        timestamp,
    };
    tx.upsert(delegator, assignment.clone(), move |_previous: Delegation| assignment)
        .await?;

    if new_delegate == ZERO_ADDRESS {
        debug!(delegator, block = block_number, "Delegation revoked");
        return Ok(());
    }

    let mut fresh = Delegate::new(new_delegate, block_number);
    fresh.delegators_count = 1;

    let delegate = tx
        .upsert(new_delegate, fresh, move |mut existing: Delegate| {
            existing.delegators_count += 1;
            existing.last_active_block = block_number;
            existing
        })
        .await?;

    debug!(
        delegator,
        delegate = new_delegate,
        block = block_number,
        delegators = delegate.delegators_count,
        "Delegation changed"
    );
    Ok(())
}

/// Apply a `DelegateVotesChanged` event.
///
/// `new_voting_power` is an absolute snapshot; the event's previous balance
/// plays no part. Delegator and governance counters are left alone.
pub async fn handle_delegate_votes_changed<T: StoreTx>(
    tx: &mut T,
    delegate: &str,
    new_voting_power: &str,
    block_number: i64,
) -> Result<(), StoreError> {
    if delegate == ZERO_ADDRESS {
        debug!(block = block_number, "Ignoring voting power of the zero address");
        return Ok(());
    }

    let mut fresh = Delegate::new(delegate, block_number);
    fresh.voting_power = new_voting_power.to_string();

    let power = new_voting_power.to_string();
    tx.upsert(delegate, fresh, move |mut existing: Delegate| {
        existing.voting_power = power;
        existing.last_active_block = block_number;
        existing
    })
    .await?;

    debug!(
        delegate,
        voting_power = new_voting_power,
        block = block_number,
        "Voting power updated"
    );
    Ok(())
}

/// Dispatch a journalled event to its handler.
pub async fn apply_event<T: StoreTx>(tx: &mut T, event: &EventRecord) -> Result<(), StoreError> {
    match &event.kind {
        EventKind::DelegateChanged {
            delegator,
            to_delegate,
            timestamp,
            ..
        } => {
            handle_delegate_changed(tx, delegator, to_delegate, event.block_number, *timestamp)
                .await
        }
        EventKind::DelegateVotesChanged {
            delegate,
            new_balance,
            ..
        } => handle_delegate_votes_changed(tx, delegate, new_balance, event.block_number).await,
    }
}
