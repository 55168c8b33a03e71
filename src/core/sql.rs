// Query templates with a table placeholder, plus catalog helpers.
use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::core::error::{Error, ErrorKind, store_error};
use crate::core::storage::StorageClass;

pub(crate) const TABLE_PLACEHOLDER: &str = ":table";

pub(crate) const UPSERT: &str = "REPLACE INTO :table (key, value) VALUES (?1, ?2)";
pub(crate) const DELETE_KEY: &str = "DELETE FROM :table WHERE key = ?1";
pub(crate) const COUNT: &str = "SELECT COUNT(*) FROM :table";
pub(crate) const EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM :table WHERE key = ?1)";
pub(crate) const DELETE_ALL: &str = "DELETE FROM :table";

const SELECT_TABLES: &str = "SELECT name FROM sqlite_master WHERE type = 'table'";

/// Which columns a multi-row query yields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Columns {
    Entries,
    Keys,
    Values,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Order {
    Forward,
    Reverse,
}

/// Replaces every `:table` with the double-quoted table name.
///
/// No escaping happens: a table name containing `"` or `:table` itself
/// yields broken SQL.
pub fn interpolate_table(template: &str, table: &str) -> String {
    template.replace(TABLE_PLACEHOLDER, &format!("\"{table}\""))
}

pub(crate) fn create_table(key: StorageClass, value: StorageClass) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE_PLACEHOLDER} (key {} PRIMARY KEY, value {})",
        key.as_sql(),
        value.as_sql()
    )
}

/// Point lookup that reads the value as `class`, letting SQLite convert it.
pub(crate) fn select_value(class: StorageClass) -> String {
    format!(
        "SELECT CAST(value AS {}) FROM {TABLE_PLACEHOLDER} WHERE key = ?1",
        class.as_sql()
    )
}

pub(crate) fn select(columns: Columns, order: Order) -> String {
    let columns = match columns {
        Columns::Entries => "key, value",
        Columns::Keys => "key",
        Columns::Values => "value",
    };
    let order = match order {
        Order::Forward => "ASC",
        Order::Reverse => "DESC",
    };
    format!("SELECT {columns} FROM {TABLE_PLACEHOLDER} ORDER BY ROWID {order}")
}

pub(crate) fn table_names(conn: &Connection) -> Result<Vec<String>, Error> {
    let mut stmt = conn
        .prepare(SELECT_TABLES)
        .map_err(|err| store_error("failed to prepare statement", err))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|err| store_error("failed to query table names", err))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| store_error("error during sqlite iteration", err))
}

/// Lists every table stored in the database file at `path`.
pub fn list_tables(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("database file does not exist")
            .with_path(path));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| store_error("cannot open database", err).with_path(path))?;
    table_names(&conn)
}
