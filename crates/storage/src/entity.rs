use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres};

/// A keyed collection managed by the store.
///
/// Each entity has exactly one primary key column, stored as text. The
/// associated `Patch` type carries a partial update.
pub trait Entity:
    Clone
    + Send
    + Sync
    + Unpin
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, PgRow>
    + 'static
{
    /// Name used in errors and logs.
    const NAME: &'static str;
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    /// All columns, in the order `push_row` binds them.
    const COLUMNS: &'static [&'static str];

    type Patch: Send + 'static;

    fn key(&self) -> &str;

    fn apply(&mut self, patch: Self::Patch);

    /// Bind every column of this record as one `VALUES` tuple.
    fn push_row<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}
