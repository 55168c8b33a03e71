// Backing-store lifecycle: resolve the file, enforce the open mode, ensure the table.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags};

use crate::core::config::{Config, DEFAULT_FILENAME, IN_MEMORY, OpenMode};
use crate::core::error::{Error, ErrorKind, io_error, store_error};
use crate::core::log::Logger;
use crate::core::sql::{self, interpolate_table};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleState {
    Unopened,
    Open,
    Closed,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unopened => "unopened",
            LifecycleState::Open => "open",
            LifecycleState::Closed => "closed",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// One connection plus the facts about its file that close and terminate need.
pub(crate) struct Store {
    conn: Option<Connection>,
    state: LifecycleState,
    filename: String,
    in_memory: bool,
    in_temp: bool,
    read_only: bool,
    auto_commit: bool,
    logger: Logger,
}

impl Store {
    /// Opens the store described by `config`, writing a generated temp path back into it.
    pub(crate) fn open<K: 'static, V: 'static>(config: &mut Config<K, V>, logger: Logger) -> Result<Self, Error> {
        let mut store = Self {
            conn: None,
            state: LifecycleState::Unopened,
            filename: config.filename().to_string(),
            in_memory: config.filename() == IN_MEMORY,
            in_temp: false,
            read_only: config.mode() == OpenMode::ReadOnly,
            auto_commit: config.auto_commit(),
            logger,
        };

        if store.filename == DEFAULT_FILENAME {
            store.filename = temp_filename()?;
            store.in_temp = true;
            config.set_resolved_filename(store.filename.clone());
        }

        match store.connect(config) {
            Ok(conn) => {
                store.conn = Some(conn);
                store.state = LifecycleState::Open;
                Ok(store)
            }
            Err(err) => {
                if store.in_temp {
                    store.remove_temp_file();
                }
                Err(err)
            }
        }
    }

    // Every step that can fail once the filename is settled.
    fn connect<K: 'static, V: 'static>(&self, config: &Config<K, V>) -> Result<Connection, Error> {
        if config.mode() == OpenMode::Fresh && !self.in_memory {
            remove_existing(Path::new(&self.filename))?;
        }
        if !self.in_memory {
            ensure_parent_dir(Path::new(&self.filename))?;
        }

        let conn = if self.read_only {
            open_read_only(&self.filename, self.in_memory)?
        } else {
            Connection::open(&self.filename)
                .map_err(|err| store_error("cannot open database", err).with_path(&self.filename))?
        };
        self.logger.debug(&format!(
            "opened '{}' (sqlite {}, mode {})",
            self.filename,
            rusqlite::version(),
            config.mode()
        ));

        let table = config.table();
        if self.read_only {
            let tables = sql::table_names(&conn)?;
            if !tables.iter().any(|name| name == table) {
                return Err(Error::new(ErrorKind::State)
                    .with_message(format!(
                        "refusing to create a new table '{table}' in read-only mode"
                    ))
                    .with_path(&self.filename));
            }
        }

        for pragma in config.pragmas() {
            conn.execute_batch(pragma)
                .map_err(|err| store_error(&format!("failed to run '{pragma}'"), err))?;
            self.logger.trace(&format!("ran '{pragma}'"));
        }

        if !self.read_only {
            let create = sql::create_table(config.codecs().key().class(), config.codecs().value().class());
            conn.execute_batch(&interpolate_table(&create, table))
                .map_err(|err| store_error("failed to create table", err))?;
            commit_active(&conn)?;
            self.logger.debug(&format!("ensured table '{table}'"));

            if config.mode() == OpenMode::Wipe {
                conn.execute_batch(&interpolate_table(sql::DELETE_ALL, table))
                    .map_err(|err| store_error("failed to wipe table", err))?;
                commit_active(&conn)?;
                self.logger.debug(&format!("wiped table '{table}'"));
            }
        }
        Ok(conn)
    }

    pub(crate) fn conn(&self) -> Result<&Connection, Error> {
        match (&self.conn, self.state) {
            (Some(conn), LifecycleState::Open) => Ok(conn),
            _ => Err(Error::new(ErrorKind::State)
                .with_message(format!("the map is {}", self.state))
                .with_path(&self.filename)),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn in_memory(&self) -> bool {
        self.in_memory
    }

    pub(crate) fn in_temp(&self) -> bool {
        self.in_temp
    }

    pub(crate) fn read_only(&self) -> bool {
        self.read_only
    }

    /// Starts a transaction unless one is active or every statement commits itself.
    pub(crate) fn begin_implicit(&self) -> Result<(), Error> {
        if self.auto_commit {
            return Ok(());
        }
        self.begin()
    }

    pub(crate) fn begin(&self) -> Result<(), Error> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")
                .map_err(|err| store_error("failed to begin transaction", err))?;
        }
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<(), Error> {
        commit_active(self.conn()?)
    }

    pub(crate) fn rollback(&self) -> Result<(), Error> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")
                .map_err(|err| store_error("failed to roll back", err))?;
        }
        Ok(())
    }

    /// Closes the connection; a generated temp file is removed afterwards.
    ///
    /// Closing anything but an open store is a no-op.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        if self.state != LifecycleState::Open {
            return Ok(());
        }
        let Some(conn) = self.conn.take() else {
            self.state = LifecycleState::Closed;
            return Ok(());
        };
        self.state = LifecycleState::Closed;

        let committed = if self.auto_commit {
            commit_active(&conn)
        } else {
            Ok(())
        };
        let closed = conn
            .close()
            .map_err(|(_, err)| store_error("failed to close database", err));
        self.logger.debug(&format!("closed '{}'", self.filename));

        if self.in_temp {
            self.remove_temp_file();
        }
        committed.and(closed)
    }

    fn remove_temp_file(&self) {
        match std::fs::remove_file(&self.filename) {
            Ok(()) => self.logger.debug(&format!("removed temp file '{}'", self.filename)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => self.logger.debug(&format!(
                "could not remove temp file '{}': {err}",
                self.filename
            )),
        }
    }

    /// Closes, then deletes the backing file unless it is in memory.
    pub(crate) fn terminate(&mut self) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::new(ErrorKind::State)
                .with_message("cannot terminate a read-only map")
                .with_path(&self.filename));
        }
        if self.state == LifecycleState::Terminated {
            return Ok(());
        }
        let closed = self.close();
        if !self.in_memory {
            match std::fs::remove_file(&self.filename) {
                Ok(()) => self.logger.debug(&format!("deleted '{}'", self.filename)),
                Err(err) if err.kind() == io::ErrorKind::NotFound && self.in_temp => {}
                Err(err) => self.logger.error(&format!(
                    "failed to delete '{}': {err}",
                    self.filename
                )),
            }
        }
        self.state = LifecycleState::Terminated;
        closed
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            self.logger.error(&format!("failed to close '{}': {err}", self.filename));
        }
    }
}

fn commit_active(conn: &Connection) -> Result<(), Error> {
    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT")
            .map_err(|err| store_error("failed to commit", err))?;
    }
    Ok(())
}

fn open_read_only(filename: &str, in_memory: bool) -> Result<Connection, Error> {
    if in_memory {
        return Err(Error::new(ErrorKind::State)
            .with_message("an in-memory database cannot be opened read-only")
            .with_hint("Use mode 'c' for in-memory maps."));
    }
    let path = Path::new(filename);
    if !path.exists() {
        return Err(Error::new(ErrorKind::State)
            .with_message("refusing to create a new database file in read-only mode")
            .with_path(path));
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| store_error("cannot open database", err).with_path(path))
}

fn remove_existing(path: &Path) -> Result<(), Error> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error("failed to delete database file", path, err)),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => return Ok(()),
    };
    let parent = if parent.is_absolute() {
        parent
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&parent))
            .unwrap_or(parent)
    };
    if parent.is_dir() {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::State)
            .with_message("the directory does not exist")
            .with_path(parent))
    }
}

fn temp_filename() -> Result<String, Error> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let mut bytes = [0u8; 4];
    getrandom::fill(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal).with_message(format!("failed to generate temp name: {err}"))
    })?;
    let suffix = 10_000 + u32::from_le_bytes(bytes) % 90_000;
    let path: PathBuf = std::env::temp_dir().join(format!("sqlitemap_{millis}_{suffix}"));
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::{LifecycleState, Store};
    use crate::core::config::{Config, IN_MEMORY, OpenMode};
    use crate::core::error::ErrorKind;
    use crate::core::log::Logger;
    use std::path::Path;

    fn open(config: &mut Config<String, String>) -> Result<Store, crate::core::error::Error> {
        Store::open(config, Logger::default())
    }

    #[test]
    fn empty_filename_becomes_a_removed_temp_file() {
        let mut config = Config::default();
        let mut store = open(&mut config).expect("open");
        assert!(store.in_temp());
        assert_eq!(config.filename(), store.filename());
        let path = store.filename().to_string();
        assert!(Path::new(&path).exists());

        store.close().expect("close");
        assert_eq!(store.state(), LifecycleState::Closed);
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn missing_directory_is_a_state_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default()
            .with_filename(dir.path().join("nope").join("db.sqlite").to_string_lossy());
        let err = open(&mut config).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn read_only_never_creates_files_or_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.sqlite");
        let mut config = Config::default()
            .with_filename(path.to_string_lossy())
            .with_mode(OpenMode::ReadOnly);
        assert_eq!(open(&mut config).err().expect("error").kind(), ErrorKind::State);
        assert!(!path.exists());

        let mut create = Config::default().with_filename(path.to_string_lossy());
        drop(open(&mut create).expect("create"));
        let mut other_table = config.clone().with_table("other");
        let err = open(&mut other_table).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(err.message().expect("message").contains("'other'"));

        let store = open(&mut config).expect("read-only open");
        assert!(store.read_only());
    }

    #[test]
    fn failed_open_removes_the_generated_temp_file() {
        let mut config = Config::default().with_pragma("this is not sql");
        let err = open(&mut config).err().expect("bad pragma");
        assert_eq!(err.kind(), ErrorKind::Store);
        let generated = config.filename().to_string();
        assert!(!generated.is_empty());
        assert!(!Path::new(&generated).exists());
    }

    #[test]
    fn read_only_checks_the_table_before_running_pragmas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.sqlite");
        let mut create = Config::default().with_filename(path.to_string_lossy());
        drop(open(&mut create).expect("create"));

        let mut config = Config::default()
            .with_filename(path.to_string_lossy())
            .with_table("missing")
            .with_mode(OpenMode::ReadOnly)
            .with_pragma("this is not sql");
        let err = open(&mut config).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn read_only_in_memory_is_refused() {
        let mut config = Config::default()
            .with_filename(IN_MEMORY)
            .with_mode(OpenMode::ReadOnly);
        assert_eq!(open(&mut config).err().expect("error").kind(), ErrorKind::State);
    }

    #[test]
    fn closed_store_refuses_access() {
        let mut config = Config::default().with_filename(IN_MEMORY);
        let mut store = open(&mut config).expect("open");
        assert!(store.in_memory());
        store.close().expect("close");
        assert_eq!(store.conn().err().expect("closed").kind(), ErrorKind::State);
        store.close().expect("second close is a no-op");
    }

    #[test]
    fn terminate_deletes_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.sqlite");
        let mut config = Config::default().with_filename(path.to_string_lossy());
        let mut store = open(&mut config).expect("open");
        store.terminate().expect("terminate");
        assert_eq!(store.state(), LifecycleState::Terminated);
        assert!(!path.exists());
    }

    #[test]
    fn implicit_transactions_are_skipped_with_auto_commit() {
        let mut config = Config::default().with_filename(IN_MEMORY).with_auto_commit(true);
        let store = open(&mut config).expect("open");
        store.begin_implicit().expect("begin");
        assert!(store.conn().expect("conn").is_autocommit());

        let mut manual = Config::default().with_filename(IN_MEMORY);
        let store = open(&mut manual).expect("open");
        store.begin_implicit().expect("begin");
        assert!(!store.conn().expect("conn").is_autocommit());
        store.rollback().expect("rollback");
        assert!(store.conn().expect("conn").is_autocommit());
    }
}
