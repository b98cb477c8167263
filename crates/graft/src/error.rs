use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Errors surfaced by the patcher.
///
/// Database errors are classified by SQLSTATE but never rewritten: every
/// variant that wraps a [`tokio_postgres::Error`] displays the driver's
/// message as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(#[source] tokio_postgres::Error),

    #[error("permission denied: {0}")]
    Permission(#[source] tokio_postgres::Error),

    #[error("constraint violation: {0}")]
    ConstraintViolation(#[source] tokio_postgres::Error),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl Error {
    /// Sort a database error into the patcher's taxonomy.
    ///
    /// Missing referenced tables or columns, broken references, and type
    /// mismatches become [`Error::ConstraintViolation`]; insufficient
    /// privilege becomes [`Error::Permission`]; a dead connection becomes
    /// [`Error::Connection`]. Anything else stays a plain
    /// [`Error::Postgres`].
    pub fn classify(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return Error::Connection(err);
        }
        let Some(code) = err.code() else {
            return Error::Postgres(err);
        };
        if *code == SqlState::INSUFFICIENT_PRIVILEGE {
            Error::Permission(err)
        } else if *code == SqlState::UNDEFINED_TABLE
            || *code == SqlState::UNDEFINED_COLUMN
            || *code == SqlState::UNDEFINED_OBJECT
            || *code == SqlState::INVALID_FOREIGN_KEY
            || *code == SqlState::FOREIGN_KEY_VIOLATION
            || *code == SqlState::DATATYPE_MISMATCH
        {
            Error::ConstraintViolation(err)
        } else {
            Error::Postgres(err)
        }
    }
}
