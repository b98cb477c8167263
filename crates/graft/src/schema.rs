//! Schema types for the column patcher.
//!
//! These describe the *desired* state: the column a patch wants to exist,
//! plus its optional foreign key and index. What the database actually
//! contains is reported by the `introspect` module.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Postgres column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// TIME
    Time,
    /// UUID
    Uuid,
    /// JSONB
    Jsonb,
    /// TEXT[] (array of text)
    TextArray,
    /// BIGINT[] (array of bigint)
    BigIntArray,
    /// INTEGER[] (array of integer)
    IntegerArray,
}

impl PgType {
    /// Map an `information_schema.columns` type description back to a [`PgType`].
    ///
    /// `data_type` is the catalog's `data_type` column; for arrays it only
    /// says `ARRAY`, so the element type comes from `udt_name`. Returns
    /// `None` for types this crate does not model (the raw string is still
    /// available to callers for display and drift messages).
    pub fn from_data_type(data_type: &str, udt_name: &str) -> Option<PgType> {
        match data_type {
            "smallint" => Some(PgType::SmallInt),
            "integer" => Some(PgType::Integer),
            "bigint" => Some(PgType::BigInt),
            "real" => Some(PgType::Real),
            "double precision" => Some(PgType::DoublePrecision),
            "numeric" => Some(PgType::Numeric),
            "boolean" => Some(PgType::Boolean),
            "text" => Some(PgType::Text),
            "bytea" => Some(PgType::Bytea),
            "timestamp with time zone" => Some(PgType::Timestamptz),
            "date" => Some(PgType::Date),
            "time without time zone" => Some(PgType::Time),
            "uuid" => Some(PgType::Uuid),
            "jsonb" => Some(PgType::Jsonb),
            "ARRAY" => match udt_name {
                "_text" => Some(PgType::TextArray),
                "_int8" => Some(PgType::BigIntArray),
                "_int4" => Some(PgType::IntegerArray),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::Real => write!(f, "REAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Numeric => write!(f, "NUMERIC"),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::Bytea => write!(f, "BYTEA"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Date => write!(f, "DATE"),
            PgType::Time => write!(f, "TIME"),
            PgType::Uuid => write!(f, "UUID"),
            PgType::Jsonb => write!(f, "JSONB"),
            PgType::TextArray => write!(f, "TEXT[]"),
            PgType::BigIntArray => write!(f, "BIGINT[]"),
            PgType::IntegerArray => write!(f, "INTEGER[]"),
        }
    }
}

/// Error returned when a type name cannot be parsed as a [`PgType`].
#[derive(Debug, Clone, Error)]
#[error("unknown postgres type: {0}")]
pub struct UnknownPgType(pub String);

impl FromStr for PgType {
    type Err = UnknownPgType;

    /// Parse a type name as written on a command line or in config.
    ///
    /// Accepts the SQL names (case-insensitive, `-` allowed in place of a
    /// space) plus the usual short aliases (`int4`, `int8`, `bool`,
    /// `float8`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "smallint" | "int2" => Ok(PgType::SmallInt),
            "integer" | "int" | "int4" => Ok(PgType::Integer),
            "bigint" | "int8" => Ok(PgType::BigInt),
            "real" | "float4" => Ok(PgType::Real),
            "double precision" | "float8" => Ok(PgType::DoublePrecision),
            "numeric" | "decimal" => Ok(PgType::Numeric),
            "boolean" | "bool" => Ok(PgType::Boolean),
            "text" => Ok(PgType::Text),
            "bytea" => Ok(PgType::Bytea),
            "timestamptz" | "timestamp with time zone" => Ok(PgType::Timestamptz),
            "date" => Ok(PgType::Date),
            "time" | "time without time zone" => Ok(PgType::Time),
            "uuid" => Ok(PgType::Uuid),
            "jsonb" => Ok(PgType::Jsonb),
            "text[]" => Ok(PgType::TextArray),
            "bigint[]" | "int8[]" => Ok(PgType::BigIntArray),
            "integer[]" | "int4[]" | "int[]" => Ok(PgType::IntegerArray),
            _ => Err(UnknownPgType(s.to_string())),
        }
    }
}

/// Referential action taken when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    /// NO ACTION (Postgres' default)
    #[default]
    NoAction,
    /// RESTRICT
    Restrict,
    /// CASCADE
    Cascade,
    /// SET NULL
    SetNull,
    /// SET DEFAULT
    SetDefault,
}

impl OnDelete {
    /// Map a `pg_constraint.confdeltype` code to an action.
    pub fn from_confdeltype(code: &str) -> Option<OnDelete> {
        match code {
            "a" => Some(OnDelete::NoAction),
            "r" => Some(OnDelete::Restrict),
            "c" => Some(OnDelete::Cascade),
            "n" => Some(OnDelete::SetNull),
            "d" => Some(OnDelete::SetDefault),
            _ => None,
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::NoAction => write!(f, "NO ACTION"),
            OnDelete::Restrict => write!(f, "RESTRICT"),
            OnDelete::Cascade => write!(f, "CASCADE"),
            OnDelete::SetNull => write!(f, "SET NULL"),
            OnDelete::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// Error returned when a referential action cannot be parsed as an [`OnDelete`].
#[derive(Debug, Clone, Error)]
#[error("unknown ON DELETE action: {0} (expected cascade, restrict, set-null, set-default or no-action)")]
pub struct UnknownOnDelete(pub String);

impl FromStr for OnDelete {
    type Err = UnknownOnDelete;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "no action" => Ok(OnDelete::NoAction),
            "restrict" => Ok(OnDelete::Restrict),
            "cascade" => Ok(OnDelete::Cascade),
            "set null" => Ok(OnDelete::SetNull),
            "set default" => Ok(OnDelete::SetDefault),
            _ => Err(UnknownOnDelete(s.to_string())),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Postgres type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
}

impl Column {
    /// Create a nullable column. Set `nullable` to false for NOT NULL.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            nullable: true,
        }
    }
}

/// The referenced side of a single-column foreign key.
///
/// The constrained column is always the patch's own column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table
    pub references_table: String,
    /// Referenced column
    pub references_column: String,
    /// Action on delete of the referenced row
    pub on_delete: OnDelete,
}

/// Everything a patch wants to ensure about one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPatch {
    /// Table the column belongs to
    pub table: String,
    /// The column itself
    pub column: Column,
    /// Foreign key to add along with the column (if any)
    pub foreign_key: Option<ForeignKey>,
    /// Whether to create a supporting index on the column
    pub index: bool,
}

impl ColumnPatch {
    /// Create a patch with no foreign key and no index.
    pub fn new(table: impl Into<String>, column: Column) -> Self {
        Self {
            table: table.into(),
            column,
            foreign_key: None,
            index: false,
        }
    }

    /// The constraint name the patch uses for its foreign key.
    pub fn foreign_key_name(&self) -> String {
        crate::sql::foreign_key_name(&self.table, &self.column.name)
    }

    /// The index name the patch uses for its supporting index.
    pub fn index_name(&self) -> String {
        crate::sql::index_name(&self.table, &self.column.name)
    }
}

/// Parse a foreign key reference string.
///
/// Supports two formats:
/// - `table.column` (dot-separated)
/// - `table(column)` (parentheses)
///
/// Returns `Some((table, column))` on success, `None` on parse failure.
pub fn parse_fk_reference(fk_ref: &str) -> Option<(&str, &str)> {
    // "table.column" format
    if let Some((table, col)) = fk_ref.split_once('.')
        && !table.is_empty()
        && !col.is_empty()
    {
        return Some((table, col));
    }

    // "table(column)" format
    if let Some(paren_idx) = fk_ref.find('(')
        && fk_ref.ends_with(')')
    {
        let table = &fk_ref[..paren_idx];
        let col = &fk_ref[paren_idx + 1..fk_ref.len() - 1];
        if !table.is_empty() && !col.is_empty() {
            return Some((table, col));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fk_reference_dot_format() {
        assert_eq!(parse_fk_reference("auth_user.id"), Some(("auth_user", "id")));
        assert_eq!(
            parse_fk_reference("departments.manager_id"),
            Some(("departments", "manager_id"))
        );
    }

    #[test]
    fn test_parse_fk_reference_paren_format() {
        assert_eq!(parse_fk_reference("auth_user(id)"), Some(("auth_user", "id")));
        assert_eq!(
            parse_fk_reference("departments(manager_id)"),
            Some(("departments", "manager_id"))
        );
    }

    #[test]
    fn test_parse_fk_reference_invalid() {
        assert_eq!(parse_fk_reference(""), None);
        assert_eq!(parse_fk_reference("auth_user"), None);
        assert_eq!(parse_fk_reference(".id"), None);
        assert_eq!(parse_fk_reference("auth_user."), None);
        assert_eq!(parse_fk_reference("(id)"), None);
        assert_eq!(parse_fk_reference("auth_user("), None);
        assert_eq!(parse_fk_reference("auth_user()"), None);
        assert_eq!(parse_fk_reference("()"), None);
    }

    #[test]
    fn test_pg_type_from_str_aliases() {
        assert_eq!("integer".parse::<PgType>().unwrap(), PgType::Integer);
        assert_eq!("INT4".parse::<PgType>().unwrap(), PgType::Integer);
        assert_eq!("bigint".parse::<PgType>().unwrap(), PgType::BigInt);
        assert_eq!("double-precision".parse::<PgType>().unwrap(), PgType::DoublePrecision);
        assert_eq!("timestamptz".parse::<PgType>().unwrap(), PgType::Timestamptz);
        assert_eq!("text[]".parse::<PgType>().unwrap(), PgType::TextArray);
        assert!("varchar(255)".parse::<PgType>().is_err());
    }

    #[test]
    fn test_pg_type_from_data_type() {
        assert_eq!(PgType::from_data_type("integer", "int4"), Some(PgType::Integer));
        assert_eq!(
            PgType::from_data_type("timestamp with time zone", "timestamptz"),
            Some(PgType::Timestamptz)
        );
        assert_eq!(PgType::from_data_type("ARRAY", "_int8"), Some(PgType::BigIntArray));
        assert_eq!(PgType::from_data_type("character varying", "varchar"), None);
    }

    #[test]
    fn test_on_delete_round_trip() {
        assert_eq!("cascade".parse::<OnDelete>().unwrap(), OnDelete::Cascade);
        assert_eq!("set-null".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert_eq!("SET NULL".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert_eq!(OnDelete::from_confdeltype("c"), Some(OnDelete::Cascade));
        assert_eq!(OnDelete::from_confdeltype("a"), Some(OnDelete::NoAction));
        assert_eq!(OnDelete::from_confdeltype("x"), None);
        assert_eq!(format!("{}", OnDelete::Cascade), "CASCADE");
    }

    #[test]
    fn test_patch_object_names() {
        let patch = ColumnPatch::new("employees_employee", Column::new("user_id", PgType::Integer));
        assert_eq!(patch.foreign_key_name(), "employees_employee_user_id_fkey");
        assert_eq!(patch.index_name(), "employees_employee_user_id_idx");
    }
}
