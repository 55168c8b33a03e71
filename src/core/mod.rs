// Core modules: storage codecs, the lazy row cache, lifecycle and the map itself.
pub mod codec;
pub mod config;
pub mod connection;
pub(crate) mod cursor;
pub mod error;
pub mod iter;
pub mod lazy;
pub mod log;
pub mod map;
pub mod node;
pub mod sql;
pub mod storage;
