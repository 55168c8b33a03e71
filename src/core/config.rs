//! Purpose: Builder for everything a map needs before it opens its backing store.
//! Exports: `Config`, `OpenMode`, `config`, and the default constants.
//! Role: Immutable input to `SqliteMap::open`; the map keeps its own copy.
//! Invariants: Pragmas keep insertion order and always start with `PRAGMA `.
//! Invariants: An empty filename means a private temporary file.
use std::fmt;
use std::str::FromStr;

use crate::core::codec::{CodecPair, KeyCodec, ValueCodec};
use crate::core::error::{Error, ErrorKind};
use crate::core::log::{LogLevel, LogSink};
use crate::core::storage::StorageType;

pub const DEFAULT_FILENAME: &str = "";
pub const IN_MEMORY: &str = ":memory:";
pub const DEFAULT_TABLE: &str = "unnamed";
pub const DEFAULT_MODE: OpenMode = OpenMode::Create;
pub const DEFAULT_AUTO_COMMIT: bool = false;
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Off;

const PRAGMA_PREFIX: &str = "PRAGMA ";

/// How the backing file and table are treated on open.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum OpenMode {
    /// Open or create the file, create the table if missing.
    #[default]
    Create,
    /// Never create the file or the table; refuse all mutations.
    ReadOnly,
    /// Like `Create`, then delete all rows of the table.
    Wipe,
    /// Delete and recreate the whole file, dropping every table in it.
    Fresh,
}

impl OpenMode {
    pub fn flag(self) -> &'static str {
        match self {
            OpenMode::Create => "c",
            OpenMode::ReadOnly => "r",
            OpenMode::Wipe => "w",
            OpenMode::Fresh => "n",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "c" | "create" => Ok(OpenMode::Create),
            "r" | "read-only" | "read_only" => Ok(OpenMode::ReadOnly),
            "w" | "wipe" => Ok(OpenMode::Wipe),
            "n" | "fresh" => Ok(OpenMode::Fresh),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown mode '{value}'"))
                .with_hint("Use one of: c (create), r (read-only), w (wipe), n (fresh).")),
        }
    }
}

pub struct Config<K, V> {
    codecs: CodecPair<K, V>,
    filename: String,
    table: String,
    mode: OpenMode,
    auto_commit: bool,
    log_level: LogLevel,
    log_sink: Option<LogSink>,
    pragmas: Vec<String>,
}

impl<K, V> Config<K, V> {
    pub fn new(codecs: CodecPair<K, V>) -> Self {
        Self {
            codecs,
            filename: DEFAULT_FILENAME.to_string(),
            table: DEFAULT_TABLE.to_string(),
            mode: DEFAULT_MODE,
            auto_commit: DEFAULT_AUTO_COMMIT,
            log_level: DEFAULT_LOG_LEVEL,
            log_sink: None,
            pragmas: Vec::new(),
        }
    }

    pub fn codecs(&self) -> &CodecPair<K, V> {
        &self.codecs
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn log_sink(&self) -> Option<&LogSink> {
        self.log_sink.as_ref()
    }

    pub fn pragmas(&self) -> &[String] {
        &self.pragmas
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Adds a statement run on every open; `PRAGMA ` is prepended when missing.
    pub fn with_pragma(mut self, statement: impl Into<String>) -> Self {
        let statement = statement.into();
        let has_prefix = statement
            .get(..PRAGMA_PREFIX.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(PRAGMA_PREFIX));
        if has_prefix {
            self.pragmas.push(statement);
        } else {
            self.pragmas.push(format!("{PRAGMA_PREFIX}{statement}"));
        }
        self
    }

    pub fn with_pragma_value(self, flag: &str, value: impl fmt::Display) -> Self {
        self.with_pragma(format!("{PRAGMA_PREFIX}{flag} = {value}"))
    }

    pub(crate) fn set_resolved_filename(&mut self, filename: String) {
        self.filename = filename;
    }
}

impl<K> Config<K, String> {
    /// Keys use `codec`, values are stored as plain text.
    pub fn from_key_codec(codec: KeyCodec<K>) -> Self {
        Self::new(CodecPair::new(codec, ValueCodec::identity()))
    }
}

impl<V> Config<String, V> {
    /// Values use `codec`, keys are stored as plain text.
    pub fn from_value_codec(codec: ValueCodec<V>) -> Self {
        Self::new(CodecPair::new(KeyCodec::identity(), codec))
    }
}

impl Default for Config<String, String> {
    fn default() -> Self {
        Self::new(CodecPair::identity())
    }
}

impl<K, V> Clone for Config<K, V> {
    fn clone(&self) -> Self {
        Self {
            codecs: self.codecs.clone(),
            filename: self.filename.clone(),
            table: self.table.clone(),
            mode: self.mode,
            auto_commit: self.auto_commit,
            log_level: self.log_level,
            log_sink: self.log_sink.clone(),
            pragmas: self.pragmas.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Config<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("codecs", &self.codecs)
            .field("filename", &self.filename)
            .field("table", &self.table)
            .field("mode", &self.mode)
            .field("auto_commit", &self.auto_commit)
            .field("log_level", &self.log_level)
            .field("log_sink", &self.log_sink.is_some())
            .field("pragmas", &self.pragmas)
            .finish()
    }
}

/// Configuration with identity codecs for natively supported key/value types.
pub fn config<K, V>() -> Config<K, V>
where
    K: StorageType + Clone,
    V: StorageType + Clone,
{
    Config::new(CodecPair::identity())
}
