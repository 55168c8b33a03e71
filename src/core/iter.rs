//! Purpose: Forward-only handle over a shared `LazyResult`.
//! Exports: `Iter`.
//! Role: Returned by every map operation that yields rows, including point lookups.
//! Invariants: Equality is identity based; only the end sentinel equals across caches.
//! Invariants: Errors hit while advancing are yielded once per handle, then iteration stops.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::rc::Rc;

use crate::core::error::{Error, ErrorKind};
use crate::core::lazy::LazyResult;

pub struct Iter<'c, T> {
    result: Option<Rc<LazyResult<'c, T>>>,
    index: Option<usize>,
    at_end: bool,
    pending: Option<Error>,
}

impl<'c, T> Iter<'c, T> {
    /// The end sentinel.
    pub fn end() -> Self {
        Self {
            result: None,
            index: None,
            at_end: true,
            pending: None,
        }
    }

    /// Positions a new handle on the first row of `result`.
    pub fn begin(result: Rc<LazyResult<'c, T>>) -> Result<Self, Error> {
        let mut iter = Self {
            result: Some(result),
            index: None,
            at_end: false,
            pending: None,
        };
        iter.advance()?;
        Ok(iter)
    }

    /// A handle over one materialized row; advancing it reaches the end.
    pub fn single(row: T) -> Self {
        Self {
            result: Some(Rc::new(LazyResult::from_row(row))),
            index: Some(0),
            at_end: false,
            pending: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.at_end
    }

    /// Logical row index, `None` at the end.
    pub fn index(&self) -> Option<usize> {
        if self.at_end { None } else { self.index }
    }

    /// The cache this handle reads from.
    pub fn cache(&self) -> Option<&LazyResult<'c, T>> {
        self.result.as_deref()
    }

    /// Moves to the next row, pulling from the cursor only when the cache runs out.
    pub fn advance(&mut self) -> Result<(), Error> {
        if self.at_end {
            return Err(Error::new(ErrorKind::Range)
                .with_message("cannot advance an iterator past the end"));
        }
        let Some(result) = self.result.as_ref() else {
            self.at_end = true;
            return Ok(());
        };
        let next = self.index.map_or(0, |index| index + 1);
        if next < result.evaluated_rows() {
            self.index = Some(next);
            return Ok(());
        }
        // A completed cache answers from its recorded failure, if it has one.
        match result.advance() {
            Ok(true) => {
                self.index = Some(next);
                Ok(())
            }
            Ok(false) => {
                self.at_end = true;
                Ok(())
            }
            Err(err) => {
                self.at_end = true;
                Err(err)
            }
        }
    }

    /// Applies [`Iter::advance`] `n` times.
    pub fn advanced(mut self, n: usize) -> Result<Self, Error> {
        for _ in 0..n {
            self.advance()?;
        }
        Ok(self)
    }

    /// Backward movement is not supported.
    pub fn retreat(&mut self) -> Result<(), Error> {
        Err(Error::new(ErrorKind::Range)
            .with_message("iterators only move forward")
            .with_hint("Start a new iteration to revisit earlier rows."))
    }
}

impl<T: Clone> Iter<'_, T> {
    /// The row under the handle.
    pub fn current(&self) -> Result<T, Error> {
        match (self.at_end, self.index, self.result.as_ref()) {
            (false, Some(index), Some(result)) => result.get(index),
            _ => Err(Error::new(ErrorKind::Range).with_message("cannot read the end iterator")),
        }
    }
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        if self.at_end {
            return None;
        }
        let item = match self.current() {
            Ok(item) => item,
            Err(err) => {
                self.at_end = true;
                return Some(Err(err));
            }
        };
        if let Err(err) = self.advance() {
            self.pending = Some(err);
        }
        Some(Ok(item))
    }
}

impl<T> PartialEq for Iter<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.at_end, other.at_end) {
            (true, true) => true,
            (false, false) => {
                let same_cache = match (&self.result, &other.result) {
                    (Some(left), Some(right)) => Rc::ptr_eq(left, right),
                    _ => false,
                };
                same_cache && self.index == other.index
            }
            _ => false,
        }
    }
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            index: self.index,
            at_end: self.at_end,
            pending: None,
        }
    }
}

impl<T> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("index", &self.index)
            .field("at_end", &self.at_end)
            .field("cache", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Iter;
    use crate::core::cursor::RowView;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::lazy::{LazyResult, RowDecoder};
    use crate::core::storage::StorageClass;
    use rusqlite::Connection;
    use rusqlite::types::ValueRef;
    use std::rc::Rc;

    fn letters() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE t (s TEXT);
             INSERT INTO t VALUES ('a');
             INSERT INTO t VALUES ('b');
             INSERT INTO t VALUES ('c');",
        )
        .expect("seed");
        conn
    }

    fn text_decoder<'c>() -> RowDecoder<'c, String> {
        Box::new(|row: &RowView<'_>| match row.value(0, StorageClass::Text) {
            ValueRef::Text(b"boom") => Err(Error::new(ErrorKind::Decode).with_message("bad letter")),
            ValueRef::Text(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            _ => Err(Error::new(ErrorKind::Decode).with_message("not text")),
        })
    }

    fn cache<'c>(conn: &'c Connection, sql: &str) -> Rc<LazyResult<'c, String>> {
        Rc::new(LazyResult::from_query(conn, sql, text_decoder()).expect("query"))
    }

    #[test]
    fn begin_then_current_reads_one_row_ahead() {
        let conn = letters();
        let iter = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        assert_eq!(iter.cache().expect("cache").evaluated_rows(), 1);
        assert_eq!(iter.current().expect("current"), "a");
        assert_eq!(iter.cache().expect("cache").evaluated_rows(), 2);
    }

    #[test]
    fn walks_every_row_then_reaches_end() {
        let conn = letters();
        let iter = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        let rows = iter.collect::<Result<Vec<_>, _>>().expect("rows");
        assert_eq!(rows, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_result_starts_at_end() {
        let conn = letters();
        let iter = Iter::begin(cache(&conn, "SELECT s FROM t WHERE 0")).expect("begin");
        assert!(iter.is_end());
        assert_eq!(iter, Iter::end());
        assert_eq!(iter.current().expect_err("end").kind(), ErrorKind::Range);
    }

    #[test]
    fn advancing_past_end_is_a_range_error() {
        let conn = letters();
        let mut iter = Iter::begin(cache(&conn, "SELECT s FROM t")).expect("begin").advanced(3).expect("skip");
        assert!(iter.is_end());
        assert_eq!(iter.advance().expect_err("past end").kind(), ErrorKind::Range);
        assert_eq!(iter.retreat().expect_err("backward").kind(), ErrorKind::Range);
    }

    #[test]
    fn equality_requires_the_same_cache() {
        let conn = letters();
        let shared = cache(&conn, "SELECT s FROM t ORDER BY ROWID");
        let first = Iter::begin(Rc::clone(&shared)).expect("begin");
        let copy = first.clone();
        assert_eq!(first, copy);
        assert_ne!(first.clone().advanced(1).expect("skip"), copy);

        let other = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        assert_eq!(first.current().expect("row"), other.current().expect("row"));
        assert_ne!(first, other);

        assert_eq!(
            first.advanced(3).expect("end"),
            other.advanced(3).expect("end")
        );
    }

    #[test]
    fn clones_share_cached_rows() {
        let conn = letters();
        let first = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        let second = first.clone();
        let drained = first.collect::<Result<Vec<_>, _>>().expect("rows");
        assert_eq!(drained.len(), 3);
        assert!(second.cache().expect("cache").is_completed());
        assert_eq!(second.current().expect("row"), "a");
    }

    #[test]
    fn single_row_handle_advances_straight_to_end() {
        let mut iter = Iter::single(("k".to_string(), 1_i64));
        assert_eq!(iter.current().expect("row"), ("k".to_string(), 1));
        iter.advance().expect("advance");
        assert!(iter.is_end());
    }

    fn failing_third_row() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE t (s TEXT);
             INSERT INTO t VALUES ('a');
             INSERT INTO t VALUES ('b');
             INSERT INTO t VALUES ('boom');",
        )
        .expect("seed");
        conn
    }

    fn outcomes(iter: Iter<'_, String>) -> Vec<Result<String, ErrorKind>> {
        iter.map(|item| item.map_err(|err| err.kind())).collect()
    }

    #[test]
    fn mid_iteration_failure_is_yielded_once() {
        let conn = failing_third_row();
        let iter = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        assert_eq!(
            outcomes(iter),
            vec![Ok("a".to_string()), Ok("b".to_string()), Err(ErrorKind::Decode)]
        );
    }

    #[test]
    fn every_clone_sees_the_failure() {
        let conn = failing_third_row();
        let first = Iter::begin(cache(&conn, "SELECT s FROM t ORDER BY ROWID")).expect("begin");
        let second = first.clone();
        let expected = vec![Ok("a".to_string()), Ok("b".to_string()), Err(ErrorKind::Decode)];

        assert_eq!(outcomes(first), expected);
        assert!(second.cache().expect("cache").is_completed());
        assert_eq!(outcomes(second), expected);
    }
}
