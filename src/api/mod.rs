//! Purpose: Define the stable public Rust API boundary for sqlitemap.
//! Exports: The map, its configuration, codecs, iterators and errors.
//! Role: Public, additive-only surface over the core modules.
//! Invariants: Everything a caller needs to open and use a map is reachable from here.

pub use crate::core::codec::{
    Codec, CodecPair, KeyCodec, KeyRole, ValueCodec, ValueRole, identity_key_codec,
    identity_value_codec, json_codec, key_codec, value_codec,
};
pub use crate::core::config::{
    Config, DEFAULT_AUTO_COMMIT, DEFAULT_FILENAME, DEFAULT_LOG_LEVEL, DEFAULT_MODE, DEFAULT_TABLE,
    IN_MEMORY, OpenMode, config,
};
pub use crate::core::connection::LifecycleState;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::iter::Iter;
pub use crate::core::lazy::LazyResult;
pub use crate::core::log::{LogLevel, LogSink, Logger, default_sink, tracing_sink};
pub use crate::core::map::SqliteMap;
pub use crate::core::node::{InsertReturn, MappedRef, Node};
pub use crate::core::sql::{interpolate_table, list_tables};
pub use crate::core::storage::{StorageClass, StorageType};
pub use rusqlite::Connection;
