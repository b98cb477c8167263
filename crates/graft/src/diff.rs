//! Patch planning - compare the desired column against the catalog.
//!
//! This module turns a [`ColumnPatch`] and the column's observed state into
//! the ordered list of changes a patch run will execute. A present, matching
//! column produces an empty plan; a present column whose shape differs is
//! handled according to the [`DriftPolicy`].

use std::fmt;

use crate::Result;
use crate::error::Error;
use crate::introspect::ColumnInfo;
use crate::patch::DriftPolicy;
use crate::schema::{Column, ColumnPatch, ForeignKey, PgType};
use crate::sql::{qualify, quote_ident};

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Add a new column.
    AddColumn(Column),
    /// Add a foreign key on a column.
    AddForeignKey { column: String, foreign_key: ForeignKey },
    /// Add an index.
    AddIndex { name: String, column: String },
    /// Change a column's type.
    AlterColumnType {
        name: String,
        from: String,
        to: PgType,
    },
    /// Change a column's nullability.
    AlterColumnNullable { name: String, from: bool, to: bool },
}

impl Change {
    /// Generate the SQL statement for this change.
    ///
    /// The target is rendered as `"schema"."table"`: the statement applies
    /// in the schema the catalog was checked against, not wherever the
    /// search_path points. The referenced side of a foreign key stays
    /// unqualified.
    pub fn to_sql(&self, schema: &str, table: &str) -> String {
        match self {
            Change::AddColumn(col) => {
                let not_null = if col.nullable { "" } else { " NOT NULL" };
                format!(
                    "ALTER TABLE {} ADD COLUMN {} {}{};",
                    qualify(schema, table),
                    quote_ident(&col.name),
                    col.pg_type,
                    not_null
                )
            }
            Change::AddForeignKey { column, foreign_key } => {
                let constraint = crate::sql::foreign_key_name(table, column);
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {};",
                    qualify(schema, table),
                    quote_ident(&constraint),
                    quote_ident(column),
                    quote_ident(&foreign_key.references_table),
                    quote_ident(&foreign_key.references_column),
                    foreign_key.on_delete
                )
            }
            Change::AddIndex { name, column } => {
                format!(
                    "CREATE INDEX {} ON {} ({});",
                    quote_ident(name),
                    qualify(schema, table),
                    quote_ident(column)
                )
            }
            Change::AlterColumnType { name, to, .. } => {
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                    qualify(schema, table),
                    quote_ident(name),
                    to,
                    quote_ident(name),
                    to
                )
            }
            Change::AlterColumnNullable { name, to, .. } => {
                if *to {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                        qualify(schema, table),
                        quote_ident(name)
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                        qualify(schema, table),
                        quote_ident(name)
                    )
                }
            }
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.pg_type, nullable)
            }
            Change::AddForeignKey { column, foreign_key } => {
                write!(
                    f,
                    "+ FOREIGN KEY ({}) -> {}.{} ON DELETE {}",
                    column,
                    foreign_key.references_table,
                    foreign_key.references_column,
                    foreign_key.on_delete
                )
            }
            Change::AddIndex { name, column } => write!(f, "+ INDEX {} ({})", name, column),
            Change::AlterColumnType { name, from, to } => {
                write!(f, "~ {}: {} -> {}", name, from, to)
            }
            Change::AlterColumnNullable { name, from, to } => {
                let from_str = if *from { "nullable" } else { "not null" };
                let to_str = if *to { "nullable" } else { "not null" };
                write!(f, "~ {}: {} -> {}", name, from_str, to_str)
            }
        }
    }
}

/// The ordered changes one patch run will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    /// Schema the table was resolved in.
    pub schema: String,
    /// Table the changes apply to.
    pub table: String,
    /// Changes in execution order.
    pub changes: Vec<Change>,
}

impl PatchPlan {
    /// Returns true if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Generate SQL statements for all changes, one per line.
    pub fn to_sql(&self) -> String {
        self.changes
            .iter()
            .map(|change| change.to_sql(&self.schema, &self.table))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Compute the plan for a patch given the column's observed state.
///
/// `schema` is the schema the observation was made in; every rendered
/// statement is qualified with it. `observed` is `None` when the column
/// does not exist yet. An existing column is taken as the witness that the
/// patch already ran: a matching one yields an empty plan (no constraint or
/// index backfill), a differing one either fails with
/// [`Error::SchemaMismatch`] or yields `ALTER`s, per `policy`.
pub fn plan(
    patch: &ColumnPatch,
    schema: &str,
    observed: Option<&ColumnInfo>,
    policy: DriftPolicy,
) -> Result<PatchPlan> {
    let mut changes = Vec::new();

    match observed {
        None => {
            changes.push(Change::AddColumn(patch.column.clone()));
            if let Some(fk) = &patch.foreign_key {
                changes.push(Change::AddForeignKey {
                    column: patch.column.name.clone(),
                    foreign_key: fk.clone(),
                });
            }
            if patch.index {
                changes.push(Change::AddIndex {
                    name: patch.index_name(),
                    column: patch.column.name.clone(),
                });
            }
        }
        Some(observed) => {
            let drift = drift_changes(&patch.column, observed);
            if !drift.is_empty() {
                match policy {
                    DriftPolicy::Reject => {
                        return Err(Error::SchemaMismatch(describe_drift(patch, observed)));
                    }
                    DriftPolicy::Reconcile => changes.extend(drift),
                }
            }
        }
    }

    Ok(PatchPlan {
        schema: schema.to_string(),
        table: patch.table.clone(),
        changes,
    })
}

/// Changes needed to bring an existing column to the desired shape.
fn drift_changes(desired: &Column, observed: &ColumnInfo) -> Vec<Change> {
    let mut changes = Vec::new();

    if observed.pg_type != Some(desired.pg_type) {
        changes.push(Change::AlterColumnType {
            name: desired.name.clone(),
            from: observed.data_type.clone(),
            to: desired.pg_type,
        });
    }

    if observed.nullable != desired.nullable {
        changes.push(Change::AlterColumnNullable {
            name: desired.name.clone(),
            from: observed.nullable,
            to: desired.nullable,
        });
    }

    changes
}

fn describe_drift(patch: &ColumnPatch, observed: &ColumnInfo) -> String {
    let expected_null = if patch.column.nullable {
        "nullable"
    } else {
        "not null"
    };
    let observed_null = if observed.nullable {
        "nullable"
    } else {
        "not null"
    };
    format!(
        "column {}.{} exists as {} ({}), expected {} ({})",
        patch.table,
        patch.column.name,
        observed.data_type,
        observed_null,
        patch.column.pg_type,
        expected_null
    )
}
