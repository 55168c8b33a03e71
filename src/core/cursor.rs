// Forward-only statement cursor that owns one prepared SQLite statement.
//
// rusqlite's `Rows` borrows its `Statement`, which cannot live next to it in a
// cache object; this cursor owns the raw statement handle instead and is tied
// to the connection by lifetime only.
use std::ffi::{CStr, CString, c_int};
use std::marker::PhantomData;
use std::ptr;

use rusqlite::Connection;
use rusqlite::ffi;
use rusqlite::types::ValueRef;

use crate::core::error::{Error, ErrorKind};
use crate::core::storage::StorageClass;

pub(crate) struct StatementCursor<'c> {
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    _conn: PhantomData<&'c Connection>,
}

/// The row the cursor currently points at; valid until the next step.
pub(crate) struct RowView<'s> {
    stmt: *mut ffi::sqlite3_stmt,
    _cursor: PhantomData<&'s mut ()>,
}

impl<'c> StatementCursor<'c> {
    pub(crate) fn prepare(conn: &'c Connection, sql: &str) -> Result<Self, Error> {
        let c_sql = CString::new(sql).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("query contains a NUL byte")
                .with_source(err)
        })?;
        // SAFETY: the handle stays valid for 'c because the connection is borrowed for 'c.
        let db = unsafe { conn.handle() };
        let mut stmt = ptr::null_mut();
        // SAFETY: db is a live connection and c_sql is NUL-terminated.
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut()) };
        if rc != ffi::SQLITE_OK {
            let message = last_error_message(db);
            // SAFETY: finalizing a null or failed statement is a no-op.
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(Error::new(ErrorKind::Store)
                .with_message(format!("failed to prepare statement - sqlite: {message}")));
        }
        Ok(Self {
            db,
            stmt,
            _conn: PhantomData,
        })
    }

    /// Steps to the next row; `Ok(None)` once the statement is done.
    ///
    /// The statement is finalized as soon as it reports completion or an error.
    pub(crate) fn step(&mut self) -> Result<Option<RowView<'_>>, Error> {
        if self.stmt.is_null() {
            return Ok(None);
        }
        // SAFETY: stmt is a live prepared statement owned by this cursor.
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => Ok(Some(RowView {
                stmt: self.stmt,
                _cursor: PhantomData,
            })),
            ffi::SQLITE_DONE => {
                self.finalize();
                Ok(None)
            }
            _ => {
                let message = last_error_message(self.db);
                self.finalize();
                Err(Error::new(ErrorKind::Store)
                    .with_message(format!("error during sqlite iteration - sqlite: {message}")))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finalized(&self) -> bool {
        self.stmt.is_null()
    }

    fn finalize(&mut self) {
        if self.stmt.is_null() {
            return;
        }
        // SAFETY: stmt is live and is nulled right after, so it is finalized once.
        unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
    }
}

impl Drop for StatementCursor<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl RowView<'_> {
    pub(crate) fn column_count(&self) -> usize {
        // SAFETY: stmt points at a row for the lifetime of this view.
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Reads column `index` as `class`, converted by SQLite's `sqlite3_column_*` rules.
    ///
    /// NULL stays NULL whatever the requested class.
    pub(crate) fn value(&self, index: usize, class: StorageClass) -> ValueRef<'_> {
        let Ok(col) = c_int::try_from(index) else {
            return ValueRef::Null;
        };
        if index >= self.column_count() {
            return ValueRef::Null;
        }
        // SAFETY: col is in range and the row stays current while self is borrowed.
        // The type is read before any conversion, as sqlite requires.
        unsafe {
            if ffi::sqlite3_column_type(self.stmt, col) == ffi::SQLITE_NULL {
                return ValueRef::Null;
            }
            match class {
                StorageClass::Integer => ValueRef::Integer(ffi::sqlite3_column_int64(self.stmt, col)),
                StorageClass::Real => ValueRef::Real(ffi::sqlite3_column_double(self.stmt, col)),
                StorageClass::Text => {
                    let text = ffi::sqlite3_column_text(self.stmt, col);
                    let len = ffi::sqlite3_column_bytes(self.stmt, col);
                    ValueRef::Text(raw_bytes(text.cast(), len))
                }
                StorageClass::Blob => {
                    let blob = ffi::sqlite3_column_blob(self.stmt, col);
                    let len = ffi::sqlite3_column_bytes(self.stmt, col);
                    ValueRef::Blob(raw_bytes(blob.cast(), len))
                }
            }
        }
    }
}

// SAFETY: callers pass a pointer sqlite returned for the current row, with its byte length.
unsafe fn raw_bytes<'a>(data: *const u8, len: c_int) -> &'a [u8] {
    let len = usize::try_from(len).unwrap_or(0);
    if data.is_null() || len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(data, len) }
}

fn last_error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is a live connection; sqlite owns the returned string.
    unsafe {
        let message = ffi::sqlite3_errmsg(db);
        if message.is_null() {
            return "unknown error".to_string();
        }
        CStr::from_ptr(message).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::StatementCursor;
    use crate::core::error::ErrorKind;
    use crate::core::storage::StorageClass;
    use rusqlite::Connection;
    use rusqlite::types::ValueRef;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE t (key TEXT PRIMARY KEY, value BLOB);
             INSERT INTO t VALUES ('a', x'0102');
             INSERT INTO t VALUES ('b', NULL);
             INSERT INTO t VALUES ('c', 3.5);",
        )
        .expect("seed");
        conn
    }

    fn text(value: ValueRef<'_>) -> String {
        match value {
            ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec()).expect("utf8"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn steps_rows_in_order_then_finalizes() {
        let conn = seeded();
        let mut cursor =
            StatementCursor::prepare(&conn, "SELECT key, value FROM t ORDER BY ROWID").expect("prepare");

        let mut seen = Vec::new();
        while let Some(row) = cursor.step().expect("step") {
            assert_eq!(row.column_count(), 2);
            let key = text(row.value(0, StorageClass::Text));
            let kind = match row.value(1, StorageClass::Blob) {
                ValueRef::Blob(bytes) => format!("blob:{bytes:?}"),
                ValueRef::Null => "null".to_string(),
                other => format!("{other:?}"),
            };
            seen.push(format!("{key}={kind}"));
        }
        assert_eq!(seen, vec!["a=blob:[1, 2]", "b=null", "c=blob:[51, 46, 53]"]);
        assert!(cursor.is_finalized());
        assert!(cursor.step().expect("step after done").is_none());
    }

    #[test]
    fn columns_convert_to_the_requested_class() {
        let conn = Connection::open_in_memory().expect("open");
        let mut cursor = StatementCursor::prepare(
            &conn,
            "SELECT 0.1 + 0.2, 1e20, '1e3', '12abc', 2.9, 'abc', 42, '1e3'",
        )
        .expect("prepare");
        let row = cursor.step().expect("step").expect("row");
        assert_eq!(text(row.value(0, StorageClass::Text)), "0.3");
        assert_eq!(text(row.value(1, StorageClass::Text)), "1.0e+20");
        assert_eq!(row.value(2, StorageClass::Integer), ValueRef::Integer(1));
        assert_eq!(row.value(3, StorageClass::Integer), ValueRef::Integer(12));
        assert_eq!(row.value(4, StorageClass::Integer), ValueRef::Integer(2));
        assert_eq!(row.value(5, StorageClass::Integer), ValueRef::Integer(0));
        assert_eq!(text(row.value(6, StorageClass::Text)), "42");
        assert_eq!(row.value(7, StorageClass::Real), ValueRef::Real(1000.0));
    }

    #[test]
    fn out_of_range_columns_read_as_null() {
        let conn = seeded();
        let mut cursor = StatementCursor::prepare(&conn, "SELECT key FROM t").expect("prepare");
        let row = cursor.step().expect("step").expect("row");
        assert_eq!(row.value(5, StorageClass::Text), ValueRef::Null);
    }

    #[test]
    fn prepare_errors_carry_sqlite_message() {
        let conn = seeded();
        let err = StatementCursor::prepare(&conn, "SELECT nope FROM missing")
            .err()
            .expect("prepare error");
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(err.message().expect("message").contains("no such table"));
    }

    #[test]
    fn dropping_early_releases_statement() {
        let conn = seeded();
        {
            let mut cursor = StatementCursor::prepare(&conn, "SELECT key FROM t").expect("prepare");
            assert!(cursor.step().expect("step").is_some());
        }
        // An unfinalized statement would make close fail with SQLITE_BUSY.
        conn.close().map_err(|(_, err)| err).expect("close");
    }
}
