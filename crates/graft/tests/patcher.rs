//! Integration tests against real PostgreSQL.
//!
//! These tests verify that:
//! 1. A patch run adds the column, foreign key, and index in one transaction
//! 2. Re-running a patch is a no-op, including under concurrency
//! 3. Failures roll back without leaving partial DDL behind
//!
//! Run with: cargo nextest run -p graft --test patcher
//!
//! Note: Requires Docker to be running.

use std::time::Duration;

use graft::{
    Column, ColumnPatch, DriftPolicy, Error, ForeignKey, OnDelete, PatchOutcome, Patcher, PgType,
    introspect,
};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::{ContainerAsync, ImageExt};
use tokio_postgres::{Client, NoTls};

/// Set up a PostgreSQL container and return a connected client.
async fn setup_postgres() -> (ContainerAsync<Postgres>, String, Client) {
    let container = Postgres::default()
        .with_tag("16-alpine")
        .start()
        .await
        .expect("failed to start postgres container");

    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");

    let conn_str =
        format!("host=127.0.0.1 port={port} user=postgres password=postgres dbname=postgres");
    let client = connect_with_retries(&conn_str).await;

    (container, conn_str, client)
}

/// Connect with retries (postgres may not be fully ready even after the
/// port is open).
async fn connect_with_retries(conn_str: &str) -> Client {
    let mut attempts = 0;
    let max_attempts = 10;
    let (client, connection) = loop {
        attempts += 1;
        match tokio_postgres::connect(conn_str, NoTls).await {
            Ok(result) => break result,
            Err(e) if attempts < max_attempts => {
                tracing::debug!("connection attempt {attempts} failed: {e}, retrying...");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!("failed to connect to postgres after {attempts} attempts: {e}"),
        }
    };

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {e}");
        }
    });

    client
}

/// Create the referenced table and the table to patch.
async fn create_fixture_tables(client: &Client) {
    client
        .batch_execute(
            r#"
            CREATE TABLE auth_user (
                id SERIAL PRIMARY KEY,
                email TEXT NOT NULL UNIQUE
            );

            CREATE TABLE employees_employee (
                id SERIAL PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL
            );
            "#,
        )
        .await
        .expect("failed to create fixture tables");
}

/// The canonical patch: nullable integer `user_id` on `employees_employee`,
/// referencing `auth_user(id)` with ON DELETE CASCADE, plus an index.
fn user_id_patch() -> ColumnPatch {
    ColumnPatch {
        table: "employees_employee".to_string(),
        column: Column::new("user_id", PgType::Integer),
        foreign_key: Some(ForeignKey {
            references_table: "auth_user".to_string(),
            references_column: "id".to_string(),
            on_delete: OnDelete::Cascade,
        }),
        index: true,
    }
}

#[tokio::test]
async fn test_apply_adds_column_foreign_key_and_index() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    let patch = user_id_patch();
    let outcome = graft::ensure_column(&mut client, &patch).await.unwrap();
    let PatchOutcome::Applied(plan) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(plan.len(), 3);

    let info = introspect::column(&client, "employees_employee", "user_id")
        .await
        .unwrap()
        .expect("user_id should exist after apply");
    assert_eq!(info.pg_type, Some(PgType::Integer));
    assert!(info.nullable);

    let fk = introspect::foreign_key(
        &client,
        "employees_employee",
        "employees_employee_user_id_fkey",
    )
    .await
    .unwrap()
    .expect("foreign key should exist after apply");
    assert_eq!(fk.referenced_table, "auth_user");
    assert_eq!(fk.on_delete, Some(OnDelete::Cascade));

    let indexed = introspect::index_exists(
        &client,
        "employees_employee",
        "employees_employee_user_id_idx",
    )
    .await
    .unwrap();
    assert!(indexed, "index should exist after apply");
}

#[tokio::test]
async fn test_cascade_delete_follows_the_new_foreign_key() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;
    graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();

    let row = client
        .query_one(
            "INSERT INTO auth_user (email) VALUES ('ann@example.com') RETURNING id",
            &[],
        )
        .await
        .unwrap();
    let user_id: i32 = row.get(0);

    client
        .execute(
            "INSERT INTO employees_employee (first_name, last_name, user_id) \
             VALUES ('Ann', 'Lee', $1)",
            &[&user_id],
        )
        .await
        .unwrap();
    client
        .execute(
            "INSERT INTO employees_employee (first_name, last_name) VALUES ('Bo', 'Rek')",
            &[],
        )
        .await
        .unwrap();

    client
        .execute("DELETE FROM auth_user WHERE id = $1", &[&user_id])
        .await
        .unwrap();

    // Only the row that referenced the deleted user goes away.
    let row = client
        .query_one("SELECT count(*) FROM employees_employee", &[])
        .await
        .unwrap();
    let remaining: i64 = row.get(0);
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn test_reapplying_is_idempotent() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    let patch = user_id_patch();
    let first = graft::ensure_column(&mut client, &patch).await.unwrap();
    assert!(matches!(first, PatchOutcome::Applied(_)));

    let before = introspect::table_columns(&client, "employees_employee")
        .await
        .unwrap();

    for _ in 0..3 {
        let outcome = graft::ensure_column(&mut client, &patch).await.unwrap();
        assert_eq!(outcome, PatchOutcome::AlreadyPresent);
    }

    let after = introspect::table_columns(&client, "employees_employee")
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_existing_column_short_circuits_without_backfill() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    // Column created out-of-band, with the shape the patch wants.
    client
        .batch_execute("ALTER TABLE employees_employee ADD COLUMN user_id INTEGER")
        .await
        .unwrap();

    let outcome = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();
    assert_eq!(outcome, PatchOutcome::AlreadyPresent);

    // Column presence alone is the witness: no constraint or index backfill.
    let fk = introspect::foreign_key(
        &client,
        "employees_employee",
        "employees_employee_user_id_fkey",
    )
    .await
    .unwrap();
    assert!(fk.is_none());

    let indexed = introspect::index_exists(
        &client,
        "employees_employee",
        "employees_employee_user_id_idx",
    )
    .await
    .unwrap();
    assert!(!indexed);
}

#[tokio::test]
async fn test_missing_referenced_table_rolls_back_the_column() {
    let (_container, _conn_str, mut client) = setup_postgres().await;

    // No auth_user table at all.
    client
        .batch_execute(
            "CREATE TABLE employees_employee (id SERIAL PRIMARY KEY, first_name TEXT NOT NULL)",
        )
        .await
        .unwrap();

    let err = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::ConstraintViolation(_)),
        "expected ConstraintViolation, got {err:?}"
    );
    // The driver's message comes through unmodified.
    assert!(err.to_string().contains("auth_user"), "got: {err}");

    // The ADD COLUMN from the same run must have rolled back with it.
    let info = introspect::column(&client, "employees_employee", "user_id")
        .await
        .unwrap();
    assert!(info.is_none(), "no partial application expected");
}

#[tokio::test]
async fn test_patching_respects_the_current_schema() {
    let (_container, _conn_str, mut client) = setup_postgres().await;

    // Fixture tables live in `app`, not in the current schema (`public`).
    client
        .batch_execute(
            r#"
            CREATE SCHEMA app;

            CREATE TABLE app.auth_user (
                id SERIAL PRIMARY KEY,
                email TEXT NOT NULL UNIQUE
            );

            CREATE TABLE app.employees_employee (
                id SERIAL PRIMARY KEY,
                first_name TEXT NOT NULL
            );

            SET search_path = public, app;
            "#,
        )
        .await
        .unwrap();

    // The table is reachable through the search_path, but both the existence
    // check and the DDL are pinned to the current schema, so the run fails
    // there instead of patching `app` blind.
    let err = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::ConstraintViolation(_)),
        "expected ConstraintViolation, got {err:?}"
    );

    client.batch_execute("SET search_path = app").await.unwrap();
    let info = introspect::column(&client, "employees_employee", "user_id")
        .await
        .unwrap();
    assert!(info.is_none(), "table in another schema must stay untouched");

    // With `app` current, the patch lands there.
    let outcome = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();
    let PatchOutcome::Applied(plan) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(plan.schema, "app");

    let outcome = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();
    assert_eq!(outcome, PatchOutcome::AlreadyPresent);
}

#[tokio::test]
async fn test_drifted_column_is_rejected_and_untouched() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    client
        .batch_execute("ALTER TABLE employees_employee ADD COLUMN user_id TEXT")
        .await
        .unwrap();

    let err = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::SchemaMismatch(_)),
        "expected SchemaMismatch, got {err:?}"
    );

    let info = introspect::column(&client, "employees_employee", "user_id")
        .await
        .unwrap()
        .expect("column still exists");
    assert_eq!(info.pg_type, Some(PgType::Text));
}

#[tokio::test]
async fn test_reconcile_alters_type_and_nullability() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    client
        .batch_execute("ALTER TABLE employees_employee ADD COLUMN user_id BIGINT NOT NULL")
        .await
        .unwrap();

    let patch = user_id_patch();
    let outcome = Patcher::new(&mut client)
        .with_policy(DriftPolicy::Reconcile)
        .apply(&patch)
        .await
        .unwrap();
    let PatchOutcome::Reconciled(plan) = outcome else {
        panic!("expected Reconciled, got {outcome:?}");
    };
    assert_eq!(plan.len(), 2);

    let info = introspect::column(&client, "employees_employee", "user_id")
        .await
        .unwrap()
        .expect("column exists");
    assert_eq!(info.pg_type, Some(PgType::Integer));
    assert!(info.nullable);
}

#[tokio::test]
async fn test_concurrent_applies_serialize() {
    let (_container, conn_str, client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    let mut first = connect_with_retries(&conn_str).await;
    let mut second = connect_with_retries(&conn_str).await;

    let patch = user_id_patch();
    let (a, b) = tokio::join!(
        graft::ensure_column(&mut first, &patch),
        graft::ensure_column(&mut second, &patch),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    let applied = outcomes
        .iter()
        .filter(|o| matches!(o, PatchOutcome::Applied(_)))
        .count();
    let already = outcomes
        .iter()
        .filter(|o| matches!(o, PatchOutcome::AlreadyPresent))
        .count();
    assert_eq!(
        (applied, already),
        (1, 1),
        "exactly one run should create the column: {outcomes:?}"
    );
}

#[tokio::test]
async fn test_unprivileged_role_gets_permission_error() {
    let (_container, conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;

    client
        .batch_execute("CREATE ROLE limited LOGIN PASSWORD 'limited'")
        .await
        .unwrap();

    let limited_conn_str = conn_str.replace(
        "user=postgres password=postgres",
        "user=limited password=limited",
    );
    let mut limited = connect_with_retries(&limited_conn_str).await;

    let err = graft::ensure_column(&mut limited, &user_id_patch())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Permission(_)),
        "expected Permission, got {err:?}"
    );
    assert!(err.to_string().contains("employees_employee"), "got: {err}");

    // The owner connection still succeeds afterwards.
    let outcome = graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();
    assert!(matches!(outcome, PatchOutcome::Applied(_)));
}

#[tokio::test]
async fn test_introspection_reports_catalog_state() {
    let (_container, _conn_str, mut client) = setup_postgres().await;
    create_fixture_tables(&client).await;
    graft::ensure_column(&mut client, &user_id_patch())
        .await
        .unwrap();

    assert!(
        introspect::table_exists(&client, "employees_employee")
            .await
            .unwrap()
    );
    assert!(!introspect::table_exists(&client, "no_such_table").await.unwrap());

    let columns = introspect::table_columns(&client, "employees_employee")
        .await
        .unwrap();
    let names: Vec<&str> = columns.keys().map(String::as_str).collect();
    assert_eq!(names, ["id", "first_name", "last_name", "user_id"]);
    assert!(!columns["id"].nullable);
    assert!(columns["id"].default.is_some(), "serial column has a default");
    assert!(columns["user_id"].nullable);
    assert_eq!(columns["user_id"].data_type, "integer");

    let version = introspect::server_version(&client).await.unwrap();
    assert!(version.starts_with("PostgreSQL"), "got: {version}");
}
