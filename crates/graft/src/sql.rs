//! SQL identifier quoting and deterministic object naming.

use std::fmt;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use graft::sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote a schema-qualified table name.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     graft::sql::qualify("app", "employees_employee"),
///     "\"app\".\"employees_employee\"",
/// );
/// ```
pub fn qualify(schema: &str, table: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(table))
}

/// Generate the constraint name for a single-column foreign key.
///
/// Uses the convention `{table}_{column}_fkey`, matching what Postgres
/// itself picks for an unnamed foreign key on one column.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     graft::foreign_key_name("employees_employee", "user_id"),
///     "employees_employee_user_id_fkey",
/// );
/// ```
pub fn foreign_key_name(table: &str, column: &str) -> String {
    scoped_name(table, column, "_fkey")
}

/// Generate the index name for a single-column index.
///
/// Uses the convention `{table}_{column}_idx`, matching Postgres' default
/// naming for a one-column index.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     graft::index_name("employees_employee", "user_id"),
///     "employees_employee_user_id_idx",
/// );
/// ```
pub fn index_name(table: &str, column: &str) -> String {
    scoped_name(table, column, "_idx")
}

/// Join table, column, and suffix while staying inside Postgres' 63-byte
/// identifier limit. The suffix always survives. The table part is truncated
/// first; when the column and suffix alone fill the limit, the table part
/// gives way to a stable hash of the table/column pair, since these names
/// must stay unique within a schema.
fn scoped_name(table: &str, column: &str, suffix: &str) -> String {
    const PG_IDENT_MAX: usize = 63;

    let overhead = 1 + column.len() + suffix.len(); // "_" between table and column
    let max_table_len = PG_IDENT_MAX.saturating_sub(overhead);

    if max_table_len == 0 {
        let hex = blake3::hash(format!("{table}.{column}").as_bytes())
            .to_hex()
            .to_string();
        let hash = &hex[..16];
        let max_column_len = PG_IDENT_MAX - 1 - hash.len() - suffix.len();
        let column_part = truncate_ident(column, max_column_len);
        return format!("{}_{}{}", column_part, hash, suffix);
    }

    format!("{}_{}{}", truncate_ident(table, max_table_len), column, suffix)
}

fn truncate_ident(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    // Identifiers are expected to be ASCII snake_case; still, avoid splitting UTF-8.
    let mut len = max;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }
    &name[..len]
}
