// Error kinds and the context-carrying error type shared by every sqlitemap module.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    State,
    NotFound,
    Store,
    Range,
    Encode,
    Decode,
    Io,
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    key: Option<String>,
    hint: Option<String>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            key: None,
            hint: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {key})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Wraps a rusqlite failure, keeping SQLite's diagnostic text in the message.
pub(crate) fn store_error(context: &str, err: rusqlite::Error) -> Error {
    Error::new(ErrorKind::Store)
        .with_message(format!("{context} - sqlite: {err}"))
        .with_source(err)
}

pub(crate) fn io_error(context: &str, path: &Path, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(context.to_string())
        .with_path(path)
        .with_source(err)
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::State => 4,
        ErrorKind::Store => 5,
        ErrorKind::Range => 6,
        ErrorKind::Encode => 7,
        ErrorKind::Decode => 8,
        ErrorKind::Io => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, store_error, to_exit_code};
    use std::error::Error as StdError;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::State, 4),
            (ErrorKind::Store, 5),
            (ErrorKind::Range, 6),
            (ErrorKind::Encode, 7),
            (ErrorKind::Decode, 8),
            (ErrorKind::Io, 9),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("key not found in table 'unnamed'")
            .with_key("'a'")
            .with_path("/tmp/db.sqlite");
        let text = err.to_string();
        assert!(text.starts_with("NotFound: key not found"));
        assert!(text.contains("(key: 'a')"));
        assert!(text.contains("/tmp/db.sqlite"));
    }

    #[test]
    fn store_error_keeps_sqlite_diagnostic_and_source() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        let err = conn
            .execute_batch("SELEKT 1")
            .map_err(|err| store_error("failed to execute statement", err))
            .expect_err("syntax error");
        assert_eq!(err.kind(), ErrorKind::Store);
        let message = err.message().expect("message");
        assert!(message.starts_with("failed to execute statement - sqlite:"));
        assert!(message.contains("syntax error"));
        assert!(err.source().is_some());

        let copy = err.clone();
        assert_eq!(copy.kind(), ErrorKind::Store);
        assert_eq!(copy.message(), err.message());
        assert!(copy.source().is_some());
    }
}
