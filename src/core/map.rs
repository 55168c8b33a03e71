//! Purpose: Typed key/value map over one SQLite table.
//! Exports: `SqliteMap`.
//! Role: Translates container operations into parameterized statements.
//! Invariants: Every mutating operation fails with `State` on a read-only map before touching the store.
//! Invariants: Without auto-commit, writes stay in an implicit transaction until `commit`/`rollback`.
//! Invariants: Iteration follows ROWID order, forward or reverse; hints are ignored.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::rc::Rc;

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::core::config::Config;
use crate::core::connection::{LifecycleState, Store};
use crate::core::cursor::RowView;
use crate::core::error::{Error, ErrorKind, store_error};
use crate::core::iter::Iter;
use crate::core::lazy::{LazyResult, RowDecoder};
use crate::core::log::Logger;
use crate::core::node::{InsertReturn, MappedRef, Node};
use crate::core::sql::{self, Columns, Order, interpolate_table};
use crate::core::storage::{StorageClass, describe_value};

// Templates with the table name already substituted.
struct Statements {
    upsert: String,
    select_value: String,
    delete_key: String,
    count: String,
    exists: String,
    delete_all: String,
}

impl Statements {
    fn new(table: &str, value_class: StorageClass) -> Self {
        Self {
            upsert: interpolate_table(sql::UPSERT, table),
            select_value: interpolate_table(&sql::select_value(value_class), table),
            delete_key: interpolate_table(sql::DELETE_KEY, table),
            count: interpolate_table(sql::COUNT, table),
            exists: interpolate_table(sql::EXISTS, table),
            delete_all: interpolate_table(sql::DELETE_ALL, table),
        }
    }
}

pub struct SqliteMap<K = String, V = String> {
    config: Config<K, V>,
    store: Store,
    logger: Logger,
    statements: Statements,
}

impl<K, V> SqliteMap<K, V>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    /// Opens the backing store and makes sure the table exists.
    pub fn open(mut config: Config<K, V>) -> Result<Self, Error> {
        let logger = Logger::new(config.log_level(), config.log_sink().cloned());
        let store = Store::open(&mut config, logger.clone())?;
        let statements = Statements::new(config.table(), config.codecs().value().class());
        Ok(Self {
            config,
            store,
            logger,
            statements,
        })
    }

    pub fn begin_transaction(&self) -> Result<(), Error> {
        self.store.begin()
    }

    /// Commits the active transaction, if any.
    pub fn commit(&self) -> Result<(), Error> {
        self.store.commit()
    }

    /// Discards writes since the last commit; no effect with auto-commit.
    pub fn rollback(&self) -> Result<(), Error> {
        self.store.rollback()
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.store.close()
    }

    /// Closes the map and deletes its backing file.
    pub fn terminate(&mut self) -> Result<(), Error> {
        self.store.terminate()
    }

    pub fn set(&self, key: &K, value: &V) -> Result<(), Error> {
        self.require_writable("write to")?;
        let key = self.encode_key(key)?;
        let value = self.config.codecs().value().encode(value)?;
        self.store.begin_implicit()?;
        self.execute(&self.statements.upsert, &[&key, &value])?;
        self.logger.trace(&format!("set {}", describe_value(&key)));
        Ok(())
    }

    /// The value stored under `key`; `NotFound` when absent.
    pub fn get(&self, key: &K) -> Result<V, Error> {
        match self.try_get(key)? {
            Some(value) => Ok(value),
            None => Err(self.not_found(key)),
        }
    }

    pub fn try_get(&self, key: &K) -> Result<Option<V>, Error> {
        let conn = self.store.conn()?;
        let key = self.encode_key(key)?;
        let mut stmt = conn
            .prepare_cached(&self.statements.select_value)
            .map_err(|err| store_error("failed to prepare statement", err))?;
        let mut rows = stmt
            .query([&key])
            .map_err(|err| store_error("failed to query value", err))?;
        match rows
            .next()
            .map_err(|err| store_error("failed to read value", err))?
        {
            Some(row) => {
                let stored = row
                    .get_ref(0)
                    .map_err(|err| store_error("failed to read value", err))?;
                self.config.codecs().value().decode(stored).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Like [`SqliteMap::get`], returning a handle that can write back.
    pub fn at(&self, key: &K) -> Result<MappedRef<'_, K, V>, Error> {
        let value = self.get(key)?;
        Ok(MappedRef::new(self, key.clone(), value))
    }

    /// Stores and returns `V::default()` when `key` is absent.
    ///
    /// On a read-only map this behaves like [`SqliteMap::at`].
    pub fn get_or_insert_default(&self, key: &K) -> Result<MappedRef<'_, K, V>, Error>
    where
        V: Default,
    {
        if self.store.read_only() {
            return self.at(key);
        }
        let value = match self.try_get(key)? {
            Some(value) => value,
            None => {
                let value = V::default();
                self.set(key, &value)?;
                value
            }
        };
        Ok(MappedRef::new(self, key.clone(), value))
    }

    /// Counts all rows; this is a full table scan.
    pub fn size(&self) -> Result<usize, Error> {
        let conn = self.store.conn()?;
        let count = conn
            .query_row(&self.statements.count, [], |row| row.get::<_, i64>(0))
            .map_err(|err| store_error("failed to count rows", err))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.size()? == 0)
    }

    /// 1 if `key` is present, 0 otherwise.
    pub fn count(&self, key: &K) -> Result<usize, Error> {
        Ok(usize::from(self.contains(key)?))
    }

    pub fn contains(&self, key: &K) -> Result<bool, Error> {
        let conn = self.store.conn()?;
        let key = self.encode_key(key)?;
        let exists = conn
            .query_row(&self.statements.exists, [&key], |row| row.get::<_, i64>(0))
            .map_err(|err| store_error("failed to check key", err))?;
        Ok(exists != 0)
    }

    /// A single-row iterator at `key`, or the end sentinel.
    pub fn find(&self, key: &K) -> Result<Iter<'_, (K, V)>, Error> {
        Ok(match self.try_get(key)? {
            Some(value) => Iter::single((key.clone(), value)),
            None => Iter::end(),
        })
    }

    /// Keys are unique, so both ends are the result of [`SqliteMap::find`].
    pub fn equal_range(&self, key: &K) -> Result<(Iter<'_, (K, V)>, Iter<'_, (K, V)>), Error> {
        let found = self.find(key)?;
        Ok((found.clone(), found))
    }

    /// Stores `value` unless `key` exists; the existing entry wins.
    pub fn insert(&self, key: K, value: V) -> Result<(Iter<'_, (K, V)>, bool), Error> {
        self.require_writable("insert into")?;
        if let Some(existing) = self.try_get(&key)? {
            return Ok((Iter::single((key, existing)), false));
        }
        self.set(&key, &value)?;
        Ok((Iter::single((key, value)), true))
    }

    /// Inserts every entry whose key is absent; returns how many were stored.
    pub fn insert_many<I>(&self, entries: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.require_writable("insert into")?;
        let mut inserted = 0;
        for (key, value) in entries {
            if self.insert(key, value)?.1 {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Re-inserts an extracted node; an existing key hands the node back.
    pub fn insert_node(&self, node: Node<K, V>) -> Result<InsertReturn<'_, K, V>, Error> {
        self.require_writable("insert into")?;
        let Some((key, value)) = node.into_entry() else {
            return Ok(InsertReturn {
                position: Iter::end(),
                inserted: false,
                node: Node::empty(),
            });
        };
        if let Some(existing) = self.try_get(&key)? {
            return Ok(InsertReturn {
                position: Iter::single((key.clone(), existing)),
                inserted: false,
                node: Node::new(key, value),
            });
        }
        self.set(&key, &value)?;
        Ok(InsertReturn {
            position: Iter::single((key, value)),
            inserted: true,
            node: Node::empty(),
        })
    }

    /// Stores `value` either way; the flag tells whether the key was new.
    pub fn insert_or_assign(&self, key: K, value: V) -> Result<(Iter<'_, (K, V)>, bool), Error> {
        self.require_writable("insert into")?;
        let existed = self.contains(&key)?;
        self.set(&key, &value)?;
        Ok((Iter::single((key, value)), !existed))
    }

    pub fn emplace(&self, key: K, value: V) -> Result<(Iter<'_, (K, V)>, bool), Error> {
        self.insert(key, value)
    }

    pub fn emplace_hint(
        &self,
        _hint: &Iter<'_, (K, V)>,
        key: K,
        value: V,
    ) -> Result<Iter<'_, (K, V)>, Error> {
        Ok(self.insert(key, value)?.0)
    }

    /// Builds the value only when `key` is absent.
    pub fn try_emplace<F>(&self, key: K, make: F) -> Result<(Iter<'_, (K, V)>, bool), Error>
    where
        F: FnOnce() -> V,
    {
        self.require_writable("insert into")?;
        if let Some(existing) = self.try_get(&key)? {
            return Ok((Iter::single((key, existing)), false));
        }
        let value = make();
        self.set(&key, &value)?;
        Ok((Iter::single((key, value)), true))
    }

    pub fn try_emplace_hint<F>(
        &self,
        _hint: &Iter<'_, (K, V)>,
        key: K,
        make: F,
    ) -> Result<Iter<'_, (K, V)>, Error>
    where
        F: FnOnce() -> V,
    {
        Ok(self.try_emplace(key, make)?.0)
    }

    /// Deletes `key`; absent keys are not an error.
    pub fn del(&self, key: &K) -> Result<(), Error> {
        self.erase(key).map(|_| ())
    }

    /// Deletes `key` and returns the number of rows removed (0 or 1).
    pub fn erase(&self, key: &K) -> Result<usize, Error> {
        self.require_writable("erase from")?;
        let key = self.encode_key(key)?;
        self.store.begin_implicit()?;
        let removed = self.execute(&self.statements.delete_key, &[&key])?;
        self.logger.trace(&format!("deleted {}", describe_value(&key)));
        Ok(removed)
    }

    /// Erases every entry matching `predicate`; returns the count erased.
    pub fn erase_if<P>(&self, mut predicate: P) -> Result<usize, Error>
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.require_writable("erase from")?;
        let mut doomed = Vec::new();
        for entry in self.iter()? {
            let (key, value) = entry?;
            if predicate(&key, &value) {
                doomed.push(key);
            }
        }
        let mut erased = 0;
        for key in &doomed {
            erased += self.erase(key)?;
        }
        Ok(erased)
    }

    /// Removes `key` and hands its entry to the caller.
    pub fn extract(&self, key: &K) -> Result<Node<K, V>, Error> {
        self.require_writable("extract from")?;
        match self.try_get(key)? {
            Some(value) => {
                self.del(key)?;
                Ok(Node::new(key.clone(), value))
            }
            None => Ok(Node::empty()),
        }
    }

    /// Extracts the entry under `position`; the end sentinel gives an empty node.
    pub fn extract_at(&self, position: &Iter<'_, (K, V)>) -> Result<Node<K, V>, Error> {
        self.require_writable("extract from")?;
        if position.is_end() {
            return Ok(Node::empty());
        }
        let (key, _) = position.current()?;
        self.extract(&key)
    }

    /// Deletes every row, committing before and after.
    pub fn clear(&self) -> Result<(), Error> {
        self.require_writable("clear")?;
        self.store.commit()?;
        self.execute(&self.statements.delete_all, &[])?;
        self.store.commit()?;
        self.logger.debug(&format!("cleared table '{}'", self.config.table()));
        Ok(())
    }

    /// Entries in insertion (ROWID) order.
    pub fn iter(&self) -> Result<Iter<'_, (K, V)>, Error> {
        self.query(Columns::Entries, Order::Forward, self.entry_decoder())
    }

    pub fn iter_rev(&self) -> Result<Iter<'_, (K, V)>, Error> {
        self.query(Columns::Entries, Order::Reverse, self.entry_decoder())
    }

    pub fn keys(&self) -> Result<Iter<'_, K>, Error> {
        self.query(Columns::Keys, Order::Forward, self.key_decoder())
    }

    pub fn keys_rev(&self) -> Result<Iter<'_, K>, Error> {
        self.query(Columns::Keys, Order::Reverse, self.key_decoder())
    }

    pub fn values(&self) -> Result<Iter<'_, V>, Error> {
        self.query(Columns::Values, Order::Forward, self.value_decoder())
    }

    pub fn values_rev(&self) -> Result<Iter<'_, V>, Error> {
        self.query(Columns::Values, Order::Reverse, self.value_decoder())
    }

    /// The live connection, for ad hoc SQL.
    pub fn connection(&self) -> Result<&Connection, Error> {
        self.store.conn()
    }

    /// The configuration in effect, with the resolved filename.
    pub fn config(&self) -> &Config<K, V> {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.store.state()
    }

    pub fn in_memory(&self) -> bool {
        self.store.in_memory()
    }

    pub fn in_temp(&self) -> bool {
        self.store.in_temp()
    }

    pub fn is_read_only(&self) -> bool {
        self.store.read_only()
    }

    fn query<T>(
        &self,
        columns: Columns,
        order: Order,
        decoder: RowDecoder<'static, T>,
    ) -> Result<Iter<'_, T>, Error> {
        let conn = self.store.conn()?;
        let sql = interpolate_table(&sql::select(columns, order), self.config.table());
        let result = LazyResult::from_query(conn, &sql, decoder)?;
        Iter::begin(Rc::new(result))
    }

    fn entry_decoder(&self) -> RowDecoder<'static, (K, V)> {
        let codecs = self.config.codecs().clone();
        Box::new(move |row: &RowView<'_>| {
            let key = codecs.key().decode(row.value(0, codecs.key().class()))?;
            let value = codecs.value().decode(row.value(1, codecs.value().class()))?;
            Ok((key, value))
        })
    }

    fn key_decoder(&self) -> RowDecoder<'static, K> {
        let codec = self.config.codecs().key().clone();
        Box::new(move |row: &RowView<'_>| codec.decode(row.value(0, codec.class())))
    }

    fn value_decoder(&self) -> RowDecoder<'static, V> {
        let codec = self.config.codecs().value().clone();
        Box::new(move |row: &RowView<'_>| codec.decode(row.value(0, codec.class())))
    }

    fn encode_key(&self, key: &K) -> Result<Value, Error> {
        self.config.codecs().key().encode(key)
    }

    fn execute(&self, statement: &str, params: &[&Value]) -> Result<usize, Error> {
        let conn = self.store.conn()?;
        let mut stmt = conn
            .prepare_cached(statement)
            .map_err(|err| store_error("failed to prepare statement", err))?;
        stmt.execute(rusqlite::params_from_iter(params.iter()))
            .map_err(|err| store_error("failed to execute statement", err))
    }

    fn require_writable(&self, action: &str) -> Result<(), Error> {
        if self.store.read_only() {
            return Err(Error::new(ErrorKind::State)
                .with_message(format!("refusing to {action} a read-only map"))
                .with_path(self.store.filename()));
        }
        Ok(())
    }

    fn not_found(&self, key: &K) -> Error {
        let described = self
            .encode_key(key)
            .map(|stored| describe_value(&stored))
            .unwrap_or_else(|_| "<unencodable>".to_string());
        Error::new(ErrorKind::NotFound)
            .with_message("key not found")
            .with_key(described)
    }
}

impl<K, V> fmt::Display for SqliteMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlitemap({})", self.config.filename())
    }
}

impl<K, V> fmt::Debug for SqliteMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteMap")
            .field("filename", &self.config.filename())
            .field("table", &self.config.table())
            .field("state", &self.store.state())
            .finish_non_exhaustive()
    }
}
