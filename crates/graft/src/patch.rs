//! Transactional application of column patches.

use tokio_postgres::{Client, GenericClient};

use crate::Result;
use crate::diff::{self, PatchPlan};
use crate::error::Error;
use crate::introspect;
use crate::lock;
use crate::schema::ColumnPatch;
use crate::traced;

/// What to do when the column exists but its shape differs from the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    /// Fail with [`Error::SchemaMismatch`] and change nothing.
    #[default]
    Reject,
    /// Alter the column's type and nullability to match the patch.
    Reconcile,
}

/// What a patch run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The column did not exist; it was created along with the requested
    /// foreign key and index.
    Applied(PatchPlan),
    /// The column already exists with the expected shape. Nothing was
    /// executed.
    AlreadyPresent,
    /// The column existed with a different shape and was altered to match
    /// (only under [`DriftPolicy::Reconcile`]).
    Reconciled(PatchPlan),
}

/// Applies column patches over a single database connection.
///
/// Each [`apply`](Patcher::apply) call runs in its own transaction: it takes
/// a per-table advisory lock, resolves the current schema, re-checks the
/// catalog under that lock, and executes DDL qualified with that schema.
/// Any failure rolls the whole transaction back, leaving the catalog
/// exactly as it was.
pub struct Patcher<'a> {
    client: &'a mut Client,
    policy: DriftPolicy,
}

impl<'a> Patcher<'a> {
    /// Create a patcher with the default (reject) drift policy.
    pub fn new(client: &'a mut Client) -> Self {
        Self {
            client,
            policy: DriftPolicy::default(),
        }
    }

    /// Set the drift policy.
    pub fn with_policy(mut self, policy: DriftPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compute the plan for `patch` without executing anything.
    ///
    /// This reads the live catalog but takes no lock, so the answer can go
    /// stale before a later [`apply`](Patcher::apply).
    pub async fn plan(&mut self, patch: &ColumnPatch) -> Result<PatchPlan> {
        let schema = resolve_schema(&*self.client).await?;
        let observed =
            introspect::column(&*self.client, &patch.table, &patch.column.name).await?;
        diff::plan(patch, &schema, observed.as_ref(), self.policy)
    }

    /// Ensure the patched column exists, creating it together with its
    /// foreign key and index when it does not.
    ///
    /// An existing column is the witness that the patch already ran: when it
    /// matches the descriptor this returns [`PatchOutcome::AlreadyPresent`]
    /// without executing any DDL, no matter how many times it is called.
    pub async fn apply(&mut self, patch: &ColumnPatch) -> Result<PatchOutcome> {
        let tx = self.client.transaction().await.map_err(Error::classify)?;
        lock::acquire(&tx, &patch.table).await?;

        let schema = resolve_schema(&tx).await?;
        let observed = introspect::column(&tx, &patch.table, &patch.column.name).await?;
        let plan = diff::plan(patch, &schema, observed.as_ref(), self.policy)?;

        if plan.is_empty() {
            tx.commit().await.map_err(Error::classify)?;
            tracing::debug!(
                table = %patch.table,
                column = %patch.column.name,
                "column already present"
            );
            return Ok(PatchOutcome::AlreadyPresent);
        }

        // An error on any statement drops `tx` before commit, which rolls
        // the whole batch back.
        for change in &plan.changes {
            let sql = change.to_sql(&plan.schema, &plan.table);
            traced::execute(&tx, &sql, &[]).await.map_err(Error::classify)?;
        }
        tx.commit().await.map_err(Error::classify)?;

        tracing::info!(
            table = %patch.table,
            column = %patch.column.name,
            changes = plan.len(),
            "patch applied"
        );

        if observed.is_some() {
            Ok(PatchOutcome::Reconciled(plan))
        } else {
            Ok(PatchOutcome::Applied(plan))
        }
    }
}

/// Resolve the schema this run patches in.
///
/// The existence check and every rendered statement target this schema, so
/// a same-named table elsewhere on the search_path is never touched.
async fn resolve_schema<C>(client: &C) -> Result<String>
where
    C: GenericClient + Sync,
{
    let Some(schema) = introspect::current_schema(client).await? else {
        return Err(Error::SchemaMismatch(
            "search_path resolves to no schema".to_string(),
        ));
    };
    Ok(schema)
}

/// Ensure a column exists, with the default drift policy.
///
/// Shorthand for [`Patcher::new`] followed by [`Patcher::apply`].
pub async fn ensure_column(client: &mut Client, patch: &ColumnPatch) -> Result<PatchOutcome> {
    Patcher::new(client).apply(patch).await
}
