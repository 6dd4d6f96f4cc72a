mod common;

use common::*;
use govpulse_delegation::Processor;
use govpulse_storage::models::{Delegate, Delegation, EventRecord};
use govpulse_storage::{MemoryStore, Store};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// Ordered stream over a small address space: (delegator, target, is_votes, amount)
/// per step, each step in a new log position.
fn stream() -> impl Strategy<Value = Vec<EventRecord>> {
    prop::collection::vec((0u8..4, 0u8..5, any::<bool>(), 0u64..10_000, 0i64..3), 1..40).prop_map(
        |steps| {
            let mut block = 1i64;
            let mut log_index = 0i64;
            steps
                .into_iter()
                .map(|(delegator, target, is_votes, amount, gap)| {
                    if gap > 0 {
                        block += gap;
                        log_index = 0;
                    } else {
                        log_index += 1;
                    }
                    // Target 0 maps to the zero address.
                    let target = if target == 0 { ZERO.to_string() } else { addr(0x10 + target) };
                    if is_votes {
                        votes_changed(&target, &amount.to_string(), block, log_index)
                    } else {
                        delegate_changed(&addr(delegator + 1), &target, block, log_index)
                    }
                })
                .collect()
        },
    )
}

async fn snapshot(store: &MemoryStore) -> (Vec<Delegation>, Vec<Delegate>) {
    (store.all::<Delegation>().unwrap(), store.all::<Delegate>().unwrap())
}

proptest! {
    #[test]
    fn last_delegate_changed_wins_per_delegator(events in stream()) {
        runtime().block_on(async {
            let store = MemoryStore::new();
            let processor = Processor::new(store.clone());
            for event in &events {
                processor.apply(event).await.unwrap();
            }

            let mut expected: BTreeMap<String, (String, i64)> = BTreeMap::new();
            for event in &events {
                if let govpulse_storage::models::EventKind::DelegateChanged { delegator, to_delegate, .. } = &event.kind {
                    expected.insert(delegator.clone(), (to_delegate.clone(), event.block_number));
                }
            }

            for (delegator, (delegate, block)) in expected {
                let row = store.get::<Delegation>(&delegator).await.unwrap().unwrap();
                assert_eq!(row.delegate, delegate);
                assert_eq!(row.block_number, block);
            }
        });
    }

    #[test]
    fn duplicate_delivery_never_changes_state(events in stream(), split in 0usize..40) {
        runtime().block_on(async {
            let once = MemoryStore::new();
            let processor = Processor::new(once.clone());
            for event in &events {
                processor.apply(event).await.unwrap();
            }

            // Apply a prefix, then the whole stream again from the start.
            let twice = MemoryStore::new();
            let processor = Processor::new(twice.clone());
            let split = split.min(events.len());
            processor.apply_batch(&events[..split], None).await.unwrap();
            let summary = processor.apply_batch(&events, None).await.unwrap();
            assert_eq!(summary.duplicates, split);

            assert_eq!(snapshot(&once).await, snapshot(&twice).await);
        });
    }

    #[test]
    fn zero_address_never_accumulates_a_delegate(events in stream()) {
        runtime().block_on(async {
            let store = MemoryStore::new();
            let processor = Processor::new(store.clone());
            processor.apply_batch(&events, None).await.unwrap();
            assert!(store.get::<Delegate>(ZERO).await.unwrap().is_none());
        });
    }

    #[test]
    fn delegator_count_equals_non_zero_delegations_received(events in stream()) {
        runtime().block_on(async {
            let store = MemoryStore::new();
            let processor = Processor::new(store.clone());
            processor.apply_batch(&events, None).await.unwrap();

            let mut received: BTreeMap<String, i64> = BTreeMap::new();
            for event in &events {
                if let govpulse_storage::models::EventKind::DelegateChanged { to_delegate, .. } = &event.kind {
                    if to_delegate != ZERO {
                        *received.entry(to_delegate.clone()).or_default() += 1;
                    }
                }
            }

            for delegate in store.all::<Delegate>().unwrap() {
                assert_eq!(
                    delegate.delegators_count,
                    received.get(&delegate.address).copied().unwrap_or(0)
                );
            }
        });
    }
}
