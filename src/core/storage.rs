// Native storage classes and the conversion of stored values into Rust types.
use std::fmt;

use rusqlite::types::{Value, ValueRef};

use crate::core::error::{Error, ErrorKind};

/// Declared column type of the key or value column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageClass {
    pub fn as_sql(self) -> &'static str {
        match self {
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A type SQLite can store without a custom codec.
///
/// Columns are read already converted to `CLASS` by SQLite itself, so a TEXT
/// value read back as an integer has gone through SQLite's own coercion.
/// `from_value_ref` only accepts its own class; NULL reads as the zero value.
pub trait StorageType: Sized + 'static {
    const CLASS: StorageClass;

    fn to_value(&self) -> Value;

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error>;
}

impl StorageType for String {
    const CLASS: StorageClass = StorageClass::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        text(value)
    }
}

impl StorageType for i64 {
    const CLASS: StorageClass = StorageClass::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        integer(value)
    }
}

// Narrow integer types truncate like `sqlite3_column_int` does.
macro_rules! narrow_integer_storage {
    ($($ty:ty),*) => {
        $(
            impl StorageType for $ty {
                const CLASS: StorageClass = StorageClass::Integer;

                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }

                fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
                    integer(value).map(|n| n as $ty)
                }
            }
        )*
    };
}

narrow_integer_storage!(i32, i16, i8, u32, u16, u8);

impl StorageType for bool {
    const CLASS: StorageClass = StorageClass::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        integer(value).map(|n| n != 0)
    }
}

impl StorageType for f64 {
    const CLASS: StorageClass = StorageClass::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        real(value)
    }
}

impl StorageType for f32 {
    const CLASS: StorageClass = StorageClass::Real;

    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        real(value).map(|r| r as f32)
    }
}

impl StorageType for Vec<u8> {
    const CLASS: StorageClass = StorageClass::Blob;

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Error> {
        match value {
            ValueRef::Null => Ok(Vec::new()),
            ValueRef::Blob(bytes) => Ok(bytes.to_vec()),
            other => Err(mismatch(StorageClass::Blob, other)),
        }
    }
}

/// Renders a store value for messages (keys in not-found errors, CLI output).
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(text) => format!("'{text}'"),
        Value::Blob(bytes) => format!("blob({} bytes)", bytes.len()),
    }
}

fn text(value: ValueRef<'_>) -> Result<String, Error> {
    match value {
        ValueRef::Null => Ok(String::new()),
        ValueRef::Text(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(mismatch(StorageClass::Text, other)),
    }
}

fn integer(value: ValueRef<'_>) -> Result<i64, Error> {
    match value {
        ValueRef::Null => Ok(0),
        ValueRef::Integer(n) => Ok(n),
        other => Err(mismatch(StorageClass::Integer, other)),
    }
}

fn real(value: ValueRef<'_>) -> Result<f64, Error> {
    match value {
        ValueRef::Null => Ok(0.0),
        ValueRef::Real(r) => Ok(r),
        other => Err(mismatch(StorageClass::Real, other)),
    }
}

fn mismatch(expected: StorageClass, found: ValueRef<'_>) -> Error {
    let found = match found {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    };
    Error::new(ErrorKind::Decode).with_message(format!("expected a {expected} value, found {found}"))
}
