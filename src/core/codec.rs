//! Purpose: Encode/decode function pairs between application types and storage values.
//! Exports: `Codec`, `KeyCodec`, `ValueCodec`, `CodecPair`, role markers, codec helpers.
//! Role: The only place where application types meet SQLite storage classes.
//! Invariants: A codec's storage class is fixed by its encoded type at construction.
//! Invariants: Key and value roles are distinct types; a pair cannot be built swapped.
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::types::{Value, ValueRef};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::{Error, ErrorKind};
use crate::core::storage::{StorageClass, StorageType};

/// Role marker for key codecs.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyRole;

/// Role marker for value codecs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueRole;

type EncodeFn<T> = Arc<dyn Fn(&T) -> Result<Value, Error> + Send + Sync>;
type DecodeFn<T> = Arc<dyn for<'a> Fn(ValueRef<'a>) -> Result<T, Error> + Send + Sync>;

fn encode_fn<T, F>(f: F) -> EncodeFn<T>
where
    F: Fn(&T) -> Result<Value, Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn decode_fn<T, F>(f: F) -> DecodeFn<T>
where
    F: for<'a> Fn(ValueRef<'a>) -> Result<T, Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An encode/decode pair tagged with the role it plays in a map.
///
/// The encoded type `S` is erased after construction; only its storage class
/// is remembered, which is what determines the declared column type.
pub struct Codec<R, T> {
    class: StorageClass,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
    role: PhantomData<fn() -> R>,
}

pub type KeyCodec<T> = Codec<KeyRole, T>;
pub type ValueCodec<T> = Codec<ValueRole, T>;

impl<R, T: 'static> Codec<R, T> {
    pub fn new<S, E, D>(encode: E, decode: D) -> Self
    where
        S: StorageType,
        E: Fn(&T) -> S + Send + Sync + 'static,
        D: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            class: S::CLASS,
            encode: encode_fn(move |input: &T| Ok(encode(input).to_value())),
            decode: decode_fn(move |value: ValueRef<'_>| S::from_value_ref(value).map(&decode)),
            role: PhantomData,
        }
    }

    /// Like [`Codec::new`], for encode/decode functions that can fail.
    pub fn fallible<S, E, D>(encode: E, decode: D) -> Self
    where
        S: StorageType,
        E: Fn(&T) -> Result<S, Error> + Send + Sync + 'static,
        D: Fn(S) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            class: S::CLASS,
            encode: encode_fn(move |input: &T| encode(input).map(|stored| stored.to_value())),
            decode: decode_fn(move |value: ValueRef<'_>| S::from_value_ref(value).and_then(&decode)),
            role: PhantomData,
        }
    }

    pub fn class(&self) -> StorageClass {
        self.class
    }

    pub fn encode(&self, input: &T) -> Result<Value, Error> {
        (self.encode)(input)
    }

    pub fn decode(&self, value: ValueRef<'_>) -> Result<T, Error> {
        (self.decode)(value)
    }
}

impl<R, T: StorageType + Clone> Codec<R, T> {
    /// Stores `T` as-is; available only for natively supported types.
    pub fn identity() -> Self {
        Self::new(|input: &T| input.clone(), |stored: T| stored)
    }
}

impl<R, T> Clone for Codec<R, T> {
    fn clone(&self) -> Self {
        Self {
            class: self.class,
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
            role: PhantomData,
        }
    }
}

impl<R, T> fmt::Debug for Codec<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("role", &std::any::type_name::<R>())
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

pub fn key_codec<T, S, E, D>(encode: E, decode: D) -> KeyCodec<T>
where
    T: 'static,
    S: StorageType,
    E: Fn(&T) -> S + Send + Sync + 'static,
    D: Fn(S) -> T + Send + Sync + 'static,
{
    Codec::new(encode, decode)
}

pub fn value_codec<T, S, E, D>(encode: E, decode: D) -> ValueCodec<T>
where
    T: 'static,
    S: StorageType,
    E: Fn(&T) -> S + Send + Sync + 'static,
    D: Fn(S) -> T + Send + Sync + 'static,
{
    Codec::new(encode, decode)
}

pub fn identity_key_codec<T: StorageType + Clone>() -> KeyCodec<T> {
    Codec::identity()
}

pub fn identity_value_codec<T: StorageType + Clone>() -> ValueCodec<T> {
    Codec::identity()
}

/// Stores any serde type as JSON text.
pub fn json_codec<R, T>() -> Codec<R, T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    Codec::fallible(
        |input: &T| {
            serde_json::to_string(input).map_err(|err| {
                Error::new(ErrorKind::Encode)
                    .with_message("failed to encode value as json")
                    .with_source(err)
            })
        },
        |text: String| {
            serde_json::from_str(&text).map_err(|err| {
                Error::new(ErrorKind::Decode)
                    .with_message("failed to decode json value")
                    .with_source(err)
            })
        },
    )
}

/// One key codec and one value codec.
///
/// Roles are checked by the type system:
///
/// ```compile_fail
/// use sqlitemap::api::{CodecPair, identity_key_codec, identity_value_codec};
///
/// let swapped = CodecPair::new(identity_value_codec::<String>(), identity_key_codec::<String>());
/// ```
pub struct CodecPair<K, V> {
    key: KeyCodec<K>,
    value: ValueCodec<V>,
}

impl<K, V> CodecPair<K, V> {
    pub fn new(key: KeyCodec<K>, value: ValueCodec<V>) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &KeyCodec<K> {
        &self.key
    }

    pub fn value(&self) -> &ValueCodec<V> {
        &self.value
    }
}

impl<K: StorageType + Clone, V: StorageType + Clone> CodecPair<K, V> {
    pub fn identity() -> Self {
        Self::new(Codec::identity(), Codec::identity())
    }
}

impl<K, V> Clone for CodecPair<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K, V> fmt::Debug for CodecPair<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPair")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
