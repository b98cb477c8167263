//! Advisory locking for patch runs.
//!
//! Two runs racing on the same table could both see the column as missing
//! and both try to add it. Before touching the catalog, each run takes a
//! transaction-scoped advisory lock on a key derived from the table name;
//! Postgres releases it when the transaction commits or rolls back.

use tokio_postgres::GenericClient;

use crate::error::Error;
use crate::traced;

/// Derive the advisory lock key for a table.
///
/// The key is the first 8 bytes of the blake3 hash of the table name. It
/// is stable across runs and processes, and distinct tables get distinct
/// keys.
pub fn advisory_lock_key(table: &str) -> i64 {
    let hash = blake3::hash(table.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}

/// Take the transaction-scoped advisory lock for `table`, blocking until
/// the holder (if any) finishes.
pub(crate) async fn acquire<C>(client: &C, table: &str) -> Result<(), Error>
where
    C: GenericClient + Sync,
{
    let key = advisory_lock_key(table);
    traced::execute(client, "SELECT pg_advisory_xact_lock($1)", &[&key])
        .await
        .map_err(Error::classify)?;
    Ok(())
}
