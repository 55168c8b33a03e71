//! Purpose: Pull query rows on demand and keep every decoded row for re-reads.
//! Exports: `LazyResult`.
//! Role: Shared backing store of one or more `Iter` handles.
//! Invariants: Rows are decoded once, appended in cursor order and never re-fetched.
//! Invariants: Once completed the cache is final; the cursor is gone by then.
//! Invariants: Before completion at most one row beyond the highest requested index is held.
//! Invariants: A pull failure is kept; every read past the last good row reports it.
#![allow(clippy::result_large_err)]

use std::cell::RefCell;
use std::fmt;

use rusqlite::Connection;

use crate::core::cursor::{RowView, StatementCursor};
use crate::core::error::{Error, ErrorKind};

pub(crate) type RowDecoder<'c, T> = Box<dyn Fn(&RowView<'_>) -> Result<T, Error> + 'c>;

struct CacheState<'c, T> {
    cursor: Option<StatementCursor<'c>>,
    decoder: Option<RowDecoder<'c, T>>,
    rows: Vec<T>,
    completed: bool,
    // Why the cursor stopped early, if it did.
    failure: Option<Error>,
}

/// Cache of decoded rows over one open cursor, or over a single materialized row.
pub struct LazyResult<'c, T> {
    state: RefCell<CacheState<'c, T>>,
}

enum Pull<T> {
    Row(Result<T, Error>),
    Done,
    Failed(Error),
}

impl<'c, T> LazyResult<'c, T> {
    pub(crate) fn from_query(
        conn: &'c Connection,
        sql: &str,
        decoder: RowDecoder<'c, T>,
    ) -> Result<Self, Error> {
        let cursor = StatementCursor::prepare(conn, sql)?;
        Ok(Self {
            state: RefCell::new(CacheState {
                cursor: Some(cursor),
                decoder: Some(decoder),
                rows: Vec::new(),
                completed: false,
                failure: None,
            }),
        })
    }

    /// A completed cache holding exactly `row`.
    pub fn from_row(row: T) -> Self {
        Self {
            state: RefCell::new(CacheState {
                cursor: None,
                decoder: None,
                rows: vec![row],
                completed: true,
                failure: None,
            }),
        }
    }

    /// Number of rows pulled from the cursor so far.
    pub fn evaluated_rows(&self) -> usize {
        self.state.borrow().rows.len()
    }

    pub fn is_completed(&self) -> bool {
        self.state.borrow().completed
    }

    /// Pulls one more row; `Ok(false)` once the cursor is exhausted.
    ///
    /// A store or decode failure finalizes the cursor and completes the cache;
    /// later pulls report the same failure again.
    pub(crate) fn advance(&self) -> Result<bool, Error> {
        let mut state = self.state.borrow_mut();
        if state.completed {
            return match &state.failure {
                Some(err) => Err(err.clone()),
                None => Ok(false),
            };
        }
        let CacheState {
            cursor,
            decoder,
            rows,
            completed,
            failure,
        } = &mut *state;

        let pull = match (cursor.as_mut(), decoder.as_ref()) {
            (Some(active), Some(decode)) => match active.step() {
                Ok(Some(row)) => Pull::Row(decode(&row)),
                Ok(None) => Pull::Done,
                Err(err) => Pull::Failed(err),
            },
            _ => Pull::Done,
        };

        match pull {
            Pull::Row(Ok(value)) => {
                rows.push(value);
                Ok(true)
            }
            Pull::Row(Err(err)) | Pull::Failed(err) => {
                *cursor = None;
                *completed = true;
                *failure = Some(err.clone());
                Err(err)
            }
            Pull::Done => {
                *cursor = None;
                *completed = true;
                Ok(false)
            }
        }
    }

    /// Makes row `index` available, then reads one row ahead to detect the end.
    pub fn load_data(&self, index: usize) -> Result<(), Error> {
        while self.evaluated_rows() <= index {
            if !self.advance()? {
                return Err(out_of_range(index, self.evaluated_rows()));
            }
        }
        if !self.is_completed() && self.evaluated_rows() == index + 1 {
            // A failed lookahead stays recorded; row `index` itself is fine.
            let _ = self.advance();
        }
        Ok(())
    }

    /// The failure that stopped the cursor, if any.
    pub fn failure(&self) -> Option<Error> {
        self.state.borrow().failure.clone()
    }
}

impl<T: Clone> LazyResult<'_, T> {
    /// The decoded row at `index`, pulling rows up to it first.
    pub fn get(&self, index: usize) -> Result<T, Error> {
        self.load_data(index)?;
        let state = self.state.borrow();
        state
            .rows
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_range(index, state.rows.len()))
    }
}

impl<T> fmt::Debug for LazyResult<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LazyResult")
            .field("evaluated_rows", &state.rows.len())
            .field("completed", &state.completed)
            .field("failed", &state.failure.is_some())
            .finish_non_exhaustive()
    }
}

fn out_of_range(index: usize, available: usize) -> Error {
    Error::new(ErrorKind::Range).with_message(format!(
        "row index {index} is out of range ({available} rows available)"
    ))
}
