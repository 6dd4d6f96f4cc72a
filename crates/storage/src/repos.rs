use sqlx::{Executor, PgConnection, Postgres, QueryBuilder};

use crate::entity::Entity;
use crate::models::*;

// ─── Entity Queries ─────────────────────────────────────────────────────────

/// Fetch one record by primary key. With `for_update`, the row stays locked
/// until the surrounding transaction ends.
pub async fn find_record<'e, T, E>(
    executor: E,
    key: &str,
    for_update: bool,
) -> Result<Option<T>, sqlx::Error>
where
    T: Entity,
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1{}",
        T::COLUMNS.join(", "),
        T::TABLE,
        T::KEY_COLUMN,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, T>(&sql)
        .bind(key)
        .fetch_optional(executor)
        .await
}

/// Write a full record, replacing every column if the key already exists.
pub async fn put_record<'e, T, E>(executor: E, record: &T) -> Result<(), sqlx::Error>
where
    T: Entity,
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        T::TABLE,
        T::COLUMNS.join(", ")
    ));
    qb.push_values(std::iter::once(record), |mut row, r| r.push_row(&mut row));
    qb.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", T::KEY_COLUMN));

    let mut set = qb.separated(", ");
    for column in T::COLUMNS.iter().filter(|c| **c != T::KEY_COLUMN) {
        set.push(format!("{column} = EXCLUDED.{column}"));
    }

    qb.build().execute(executor).await?;
    Ok(())
}

/// Delegates ordered by voting power descending.
pub async fn get_top_delegates<'e, E>(executor: E, limit: i64) -> Result<Vec<Delegate>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Delegate>(
        r#"
        SELECT address, voting_power, delegators_count, votes_count, proposals_created, last_active_block
        FROM delegates
        ORDER BY CAST(voting_power AS NUMERIC) DESC, address
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await
}

// ─── Event Journal ──────────────────────────────────────────────────────────

/// Journal an applied event. Returns `false` if (transaction_hash, log_index)
/// was already present.
pub async fn insert_event<'e, E>(executor: E, event: &EventRecord) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO event_journal (transaction_hash, log_index, block_number, payload)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(&event.transaction_hash)
    .bind(event.log_index)
    .bind(event.block_number)
    .bind(sqlx::types::Json(&event.kind))
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Position of the newest journalled event.
pub async fn get_last_cursor<'e, E>(executor: E) -> Result<Option<EventCursor>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT block_number, log_index FROM event_journal ORDER BY block_number DESC, log_index DESC LIMIT 1",
    )
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(block_number, log_index)| EventCursor {
        block_number,
        log_index,
    }))
}

// ─── Block Queries ──────────────────────────────────────────────────────────

/// Insert a processed block.
pub async fn insert_block<'e, E>(executor: E, block: &IndexedBlock) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO indexed_blocks (block_number, block_hash, parent_hash, timestamp)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (block_number) DO UPDATE
        SET block_hash = $2, parent_hash = $3, timestamp = $4
        "#,
    )
    .bind(block.block_number)
    .bind(&block.block_hash)
    .bind(&block.parent_hash)
    .bind(block.timestamp)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get the stored block hash for a specific block number.
pub async fn get_block_hash<'e, E>(
    executor: E,
    block_number: i64,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> =
        sqlx::query_as("SELECT block_hash FROM indexed_blocks WHERE block_number = $1")
            .bind(block_number)
            .fetch_optional(executor)
            .await?;
    Ok(row.map(|r| r.0))
}

/// Indexed blocks strictly below `below`, newest first.
pub async fn get_blocks_before<'e, E>(
    executor: E,
    below: i64,
    limit: i64,
) -> Result<Vec<IndexedBlock>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, IndexedBlock>(
        r#"
        SELECT block_number, block_hash, parent_hash, timestamp
        FROM indexed_blocks
        WHERE block_number < $1
        ORDER BY block_number DESC
        LIMIT $2
        "#,
    )
    .bind(below)
    .bind(limit)
    .fetch_all(executor)
    .await
}

// ─── Indexer State ──────────────────────────────────────────────────────────

/// Get the last indexed block from persistent state.
pub async fn get_last_indexed_block<'e, E>(executor: E) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM indexer_state WHERE key = 'last_indexed_block'")
            .fetch_optional(executor)
            .await?;
    Ok(row.and_then(|r| r.0.parse::<i64>().ok()))
}

/// Set the last indexed block in persistent state.
pub async fn set_last_indexed_block<'e, E>(
    executor: E,
    block_number: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO indexer_state (key, value) VALUES ('last_indexed_block', $1)
        ON CONFLICT (key) DO UPDATE SET value = $1
        "#,
    )
    .bind(block_number.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

// ─── Reorg ──────────────────────────────────────────────────────────────────

/// Delete everything derived from blocks after `fork_block` and return the
/// surviving journal in stream order. Must run inside a transaction.
pub async fn rewind(
    conn: &mut PgConnection,
    fork_block: i64,
) -> Result<Vec<EventRecord>, sqlx::Error> {
    sqlx::query("DELETE FROM event_journal WHERE block_number > $1")
        .bind(fork_block)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM indexed_blocks WHERE block_number > $1")
        .bind(fork_block)
        .execute(&mut *conn)
        .await?;

    // Aggregates are re-derived from the journal by the caller. Row deletes
    // (not TRUNCATE) so readers keep the committed snapshot until commit.
    sqlx::query("DELETE FROM delegations")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM delegates")
        .execute(&mut *conn)
        .await?;

    set_last_indexed_block(&mut *conn, fork_block).await?;

    let rows = sqlx::query_as::<_, JournalRow>(
        r#"
        SELECT transaction_hash, block_number, log_index, payload, applied_at
        FROM event_journal
        ORDER BY block_number, log_index
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    tracing::warn!(
        fork_block = fork_block,
        surviving_events = rows.len(),
        "Rewound derived state to fork block"
    );

    Ok(rows.into_iter().map(EventRecord::from).collect())
}
