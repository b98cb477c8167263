//! Traced statement execution.
//!
//! Every statement the patcher runs goes through these helpers, which wrap
//! the call in a `db.execute`/`db.query` debug span recording the SQL, the
//! parameter count, and the outcome size. They are generic over
//! [`GenericClient`] so the same code path serves a plain client and an open
//! transaction.

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, GenericClient, Row};
use tracing::Instrument;

/// Execute a statement, returning the number of rows affected.
pub async fn execute<C>(client: &C, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, Error>
where
    C: GenericClient + Sync,
{
    let span = tracing::debug_span!(
        "db.execute",
        sql = %sql,
        params = params.len(),
        affected = tracing::field::Empty,
    );
    let affected = client.execute(sql, params).instrument(span.clone()).await?;
    span.record("affected", affected);
    Ok(affected)
}

/// Execute a query, returning all rows.
pub async fn query<C>(
    client: &C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Row>, Error>
where
    C: GenericClient + Sync,
{
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = tracing::field::Empty,
    );
    let rows = client.query(sql, params).instrument(span.clone()).await?;
    span.record("rows", rows.len());
    Ok(rows)
}

/// Execute a query, returning at most one row.
pub async fn query_opt<C>(
    client: &C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Option<Row>, Error>
where
    C: GenericClient + Sync,
{
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = tracing::field::Empty,
    );
    let row = client
        .query_opt(sql, params)
        .instrument(span.clone())
        .await?;
    span.record("rows", if row.is_some() { 1u64 } else { 0u64 });
    Ok(row)
}

/// Execute a query, returning exactly one row.
///
/// Returns an error if the query returns zero or more than one row.
pub async fn query_one<C>(
    client: &C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Row, Error>
where
    C: GenericClient + Sync,
{
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = 1u64,
    );
    client.query_one(sql, params).instrument(span).await
}
