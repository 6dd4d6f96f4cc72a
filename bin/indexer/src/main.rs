//! Govpulse Indexer: follows an ERC20Votes token and maintains the
//! delegation state store.
//!
//! Flow:
//! 1. Connect to the JSON-RPC node & PostgreSQL
//! 2. Resume from the last committed checkpoint
//! 3. Poll block windows, check every log against the canonical header of
//!    its block, decode DelegateChanged/DelegateVotesChanged logs
//! 4. Apply each window in one transaction, together with its checkpoint
//!
//! Reorgs are detected by comparing the parent hash of the next block with
//! the stored hash of the previous checkpoint. On mismatch the newest stored
//! block still on the canonical chain becomes the fork point, and derived
//! state is rebuilt from the surviving event journal.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::primitives::HeaderResponse,
    primitives::{Address, B256},
    providers::Provider,
    rpc::types::{Filter, Log},
};
use eyre::{Result, WrapErr, eyre};
use govpulse_chain::{ChainProvider, create_provider, decode_governance_log, event_signatures};
use govpulse_core::{Settings, telemetry};
use govpulse_delegation::{Processor, to_record};
use govpulse_storage::{
    self as storage, PgStore, Store,
    models::{EventRecord, IndexedBlock},
};

/// How many stored checkpoints to compare against the chain when looking
/// for a fork point.
const REORG_SEARCH_DEPTH: i64 = 128;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // ── Initialisation ──────────────────────────────────────────────────
    telemetry::init();
    let settings = Settings::from_env()?;
    let token: Address = settings.token_address.parse()?;

    tracing::info!(rpc = %settings.rpc_url, token = %settings.token_address, "Starting Govpulse Indexer");

    let pool = storage::connect(&settings.database_url).await?;
    tracing::info!("Connected to database");

    storage::MIGRATOR.run(&pool).await?;
    tracing::info!("Database migrations applied");

    let provider = create_provider(&settings.rpc_url)?;
    tracing::info!("Connected to RPC");

    let processor = Processor::new(PgStore::new(pool));

    // ── Main Indexing Loop ──────────────────────────────────────────────
    let floor = settings.start_block as i64 - 1;
    let mut last_block = processor.store().checkpoint().await?.unwrap_or(floor);

    tracing::info!(from_block = last_block + 1, "Starting indexing loop");

    let idle = Duration::from_millis(settings.poll_interval_ms);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully…");
                break;
            }
            result = index_next_batch(&provider, &processor, token, &mut last_block, &settings) => {
                match result {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(idle).await,
                    Err(e) => {
                        tracing::error!(error = %e, "Indexing error, retrying in 5s…");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
    }

    tracing::info!("Indexer stopped.");
    Ok(())
}

/// Index the next window of blocks. Returns `Ok(true)` if work was done,
/// `Ok(false)` if caught up.
///
/// A window either commits completely (every event plus the checkpoint of
/// its last block) or not at all, so `last_block` only moves after commit.
async fn index_next_batch(
    provider: &ChainProvider,
    processor: &Processor<PgStore>,
    token: Address,
    last_block: &mut i64,
    settings: &Settings,
) -> Result<bool> {
    let chain_head = provider.get_block_number().await? as i64;

    if *last_block >= chain_head {
        return Ok(false);
    }

    let from = *last_block + 1;
    let to = std::cmp::min(from + settings.batch_size as i64 - 1, chain_head);

    tracing::info!(from = from, to = to, head = chain_head, "Indexing batch");

    // ── Reorg Detection ────────────────────────────────────────────────
    if let Some(stored_hash) = processor.store().block_hash(from - 1).await? {
        let next = fetch_block(provider, from).await?;
        if next.parent_hash != stored_hash {
            tracing::warn!(
                block = from,
                expected = %stored_hash,
                got = %next.parent_hash,
                "Reorg detected! Rolling back…"
            );

            let fork_block = find_fork_block(provider, processor, from - 1, settings).await?;
            processor.rollback_to(fork_block).await?;
            *last_block = fork_block;
            return Ok(true);
        }
    }

    // ── Fetch delegation logs for the token ────────────────────────────
    // The window's last header is taken before its logs, so a reorg landing
    // between the two calls shows up as a hash mismatch below.
    let checkpoint = fetch_block(provider, to).await?;

    let filter = Filter::new()
        .address(token)
        .event_signature(event_signatures())
        .from_block(from as u64)
        .to_block(to as u64);

    let logs = provider.get_logs(&filter).await?;
    tracing::info!(count = logs.len(), "Fetched delegation logs");

    let mut headers: HashMap<i64, IndexedBlock> = HashMap::new();
    headers.insert(to, checkpoint.clone());
    for log in &logs {
        let (number, _) = log_block(log)?;
        if let Entry::Vacant(slot) = headers.entry(number) {
            slot.insert(fetch_block(provider, number).await?);
        }
    }

    verify_log_blocks(&logs, &headers)?;
    let records = decode_window(&logs, &headers)?;

    // ── Atomic write: events + checkpoint in one transaction ────────────
    let summary = processor.apply_batch(&records, Some(&checkpoint)).await?;

    *last_block = to;

    tracing::info!(
        block = to,
        applied = summary.applied,
        duplicates = summary.duplicates,
        "Batch complete"
    );

    Ok(true)
}

/// Newest stored checkpoint below `mismatched` whose hash the chain still
/// agrees with. Falls back to the block before `START_BLOCK` when none of
/// the recent checkpoints survive, which re-indexes from scratch.
async fn find_fork_block(
    provider: &ChainProvider,
    processor: &Processor<PgStore>,
    mismatched: i64,
    settings: &Settings,
) -> Result<i64> {
    let candidates = processor
        .store()
        .recent_blocks(mismatched, REORG_SEARCH_DEPTH)
        .await?;

    for stored in candidates {
        let canonical = fetch_block(provider, stored.block_number).await?;
        if canonical.block_hash == stored.block_hash {
            tracing::warn!(fork_block = stored.block_number, "Fork point found");
            return Ok(stored.block_number);
        }
    }

    let floor = settings.start_block as i64 - 1;
    tracing::warn!(
        fork_block = floor,
        "No stored checkpoint survives the reorg, re-indexing from start block"
    );
    Ok(floor)
}

/// Block number and hash a log claims to belong to.
fn log_block(log: &Log) -> Result<(i64, B256)> {
    match (log.block_number, log.block_hash) {
        (Some(number), Some(hash)) => Ok((i64::try_from(number)?, hash)),
        _ => Err(eyre!(
            "Log {:?} is missing its block number or hash",
            log.transaction_hash
        )),
    }
}

/// Every log must come from the block the chain currently has at its
/// height. A mismatch means the node served logs from an orphaned fork;
/// the window is rejected and retried once the chain settles.
fn verify_log_blocks(logs: &[Log], headers: &HashMap<i64, IndexedBlock>) -> Result<()> {
    for log in logs {
        let (number, hash) = log_block(log)?;
        let header = headers
            .get(&number)
            .ok_or_else(|| eyre!("No header fetched for block {}", number))?;
        let hash = format!("{:#x}", hash);
        if hash != header.block_hash {
            return Err(eyre!(
                "Log in block {} has hash {}, canonical is {}",
                number,
                hash,
                header.block_hash
            ));
        }
    }
    Ok(())
}

/// Decode a verified window into journal records. One malformed log fails
/// the whole window so that no event is silently lost.
fn decode_window(logs: &[Log], headers: &HashMap<i64, IndexedBlock>) -> Result<Vec<EventRecord>> {
    let mut records = Vec::with_capacity(logs.len());
    for log in logs {
        // Nodes that omit `blockTimestamp` on logs get it from the header.
        let fallback = log
            .block_number
            .and_then(|number| headers.get(&(number as i64)))
            .map(|header| header.timestamp as u64);

        let decoded = decode_governance_log(log, fallback)
            .wrap_err_with(|| format!("Undecodable log in tx {:?}", log.transaction_hash))?;
        if let Some(decoded) = decoded {
            records.push(
                to_record(&decoded)
                    .wrap_err_with(|| format!("Malformed event in tx {:?}", log.transaction_hash))?,
            );
        }
    }
    Ok(records)
}

async fn fetch_block(provider: &ChainProvider, number: i64) -> Result<IndexedBlock> {
    let block = provider
        .get_block_by_number(BlockNumberOrTag::Number(number as u64))
        .await?
        .ok_or_else(|| eyre!("Block {} not found on chain", number))?;

    Ok(IndexedBlock {
        block_number: number,
        block_hash: format!("{:#x}", block.header.hash()),
        parent_hash: format!("{:#x}", block.header.parent_hash()),
        timestamp: block.header.timestamp() as i64,
    })
}
