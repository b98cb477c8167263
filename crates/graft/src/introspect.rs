//! Catalog introspection.
//!
//! Read-only lookups against `information_schema` and the system catalogs,
//! scoped to the connection's current schema. Everything here is generic
//! over [`GenericClient`] so the same queries run standalone or inside the
//! patch transaction.
//!
//! Textual catalog columns are cast to `text` in SQL: `information_schema`
//! exposes them under domain types (`sql_identifier`, `yes_or_no`, ...) that
//! do not map cleanly onto driver types.

use indexmap::IndexMap;
use tokio_postgres::{GenericClient, Row};

use crate::Result;
use crate::error::Error;
use crate::schema::{OnDelete, PgType};
use crate::traced;

/// A column as it exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Raw `data_type` string from the catalog
    pub data_type: String,
    /// Parsed type, when the catalog type is one this crate models
    pub pg_type: Option<PgType>,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Self {
        let data_type: String = row.get("data_type");
        let udt_name: String = row.get("udt_name");
        let is_nullable: String = row.get("is_nullable");
        Self {
            name: row.get("column_name"),
            pg_type: PgType::from_data_type(&data_type, &udt_name),
            data_type,
            nullable: is_nullable == "YES",
            default: row.get("column_default"),
        }
    }
}

/// A foreign key constraint as it exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    /// Table the constraint points at
    pub referenced_table: String,
    /// Delete action, `None` if the catalog reports a code this crate does
    /// not model
    pub on_delete: Option<OnDelete>,
}

/// The schema unqualified names currently resolve into.
///
/// `None` when the search_path names no usable schema.
pub async fn current_schema<C>(client: &C) -> Result<Option<String>>
where
    C: GenericClient + Sync,
{
    let row = traced::query_one(client, "SELECT current_schema()::text", &[])
        .await
        .map_err(Error::classify)?;
    Ok(row.get(0))
}

/// Look up a single column, `None` if the table has no such column.
///
/// A missing table also yields `None` here; use [`table_exists`] to tell
/// the two apart.
pub async fn column<C>(client: &C, table: &str, column: &str) -> Result<Option<ColumnInfo>>
where
    C: GenericClient + Sync,
{
    let row = traced::query_opt(
        client,
        "SELECT column_name::text, data_type::text, udt_name::text, \
                is_nullable::text, column_default::text \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() \
           AND table_name = $1 AND column_name = $2",
        &[&table, &column],
    )
    .await
    .map_err(Error::classify)?;
    Ok(row.as_ref().map(ColumnInfo::from_row))
}

/// All columns of a table in ordinal position order, keyed by name.
pub async fn table_columns<C>(client: &C, table: &str) -> Result<IndexMap<String, ColumnInfo>>
where
    C: GenericClient + Sync,
{
    let rows = traced::query(
        client,
        "SELECT column_name::text, data_type::text, udt_name::text, \
                is_nullable::text, column_default::text \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
        &[&table],
    )
    .await
    .map_err(Error::classify)?;
    Ok(rows
        .iter()
        .map(|row| {
            let info = ColumnInfo::from_row(row);
            (info.name.clone(), info)
        })
        .collect())
}

/// Whether a table exists in the current schema.
pub async fn table_exists<C>(client: &C, table: &str) -> Result<bool>
where
    C: GenericClient + Sync,
{
    let row = traced::query_opt(
        client,
        "SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1",
        &[&table],
    )
    .await
    .map_err(Error::classify)?;
    Ok(row.is_some())
}

/// Look up a foreign key constraint on `table` by name.
pub async fn foreign_key<C>(
    client: &C,
    table: &str,
    constraint: &str,
) -> Result<Option<ForeignKeyInfo>>
where
    C: GenericClient + Sync,
{
    let row = traced::query_opt(
        client,
        "SELECT refrel.relname::text AS referenced_table, con.confdeltype::text AS confdeltype \
         FROM pg_constraint con \
         JOIN pg_class rel ON rel.oid = con.conrelid \
         JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace \
         JOIN pg_class refrel ON refrel.oid = con.confrelid \
         WHERE nsp.nspname = current_schema() \
           AND rel.relname = $1 AND con.conname = $2 AND con.contype = 'f'",
        &[&table, &constraint],
    )
    .await
    .map_err(Error::classify)?;
    Ok(row.map(|row| {
        let code: String = row.get("confdeltype");
        ForeignKeyInfo {
            referenced_table: row.get("referenced_table"),
            on_delete: OnDelete::from_confdeltype(&code),
        }
    }))
}

/// Whether an index with the given name exists on `table`.
pub async fn index_exists<C>(client: &C, table: &str, index: &str) -> Result<bool>
where
    C: GenericClient + Sync,
{
    let row = traced::query_opt(
        client,
        "SELECT 1 FROM pg_indexes \
         WHERE schemaname = current_schema() AND tablename = $1 AND indexname = $2",
        &[&table, &index],
    )
    .await
    .map_err(Error::classify)?;
    Ok(row.is_some())
}

/// The server's version banner, e.g. `PostgreSQL 16.4 ...`.
pub async fn server_version<C>(client: &C) -> Result<String>
where
    C: GenericClient + Sync,
{
    let row = traced::query_one(client, "SELECT version()", &[])
        .await
        .map_err(Error::classify)?;
    Ok(row.get(0))
}
