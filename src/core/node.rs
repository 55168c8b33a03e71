// Detached entries, insert results, and write-through value handles.
use std::fmt;
use std::ops::Deref;

use crate::core::error::Error;
use crate::core::iter::Iter;
use crate::core::map::SqliteMap;

/// An entry removed from a map, owned by the caller until re-inserted or dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Node<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            entry: Some((key, value)),
        }
    }

    pub fn empty() -> Self {
        Self { entry: None }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(key, _)| key)
    }

    /// Changing the key lets the entry be re-inserted under a new name.
    pub fn key_mut(&mut self) -> Option<&mut K> {
        self.entry.as_mut().map(|(key, _)| key)
    }

    pub fn value(&self) -> Option<&V> {
        self.entry.as_ref().map(|(_, value)| value)
    }

    pub fn value_mut(&mut self) -> Option<&mut V> {
        self.entry.as_mut().map(|(_, value)| value)
    }

    pub fn into_entry(self) -> Option<(K, V)> {
        self.entry
    }
}

impl<K, V> Default for Node<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of inserting a [`Node`].
///
/// When the key was already present `inserted` is false, `position` points at
/// the stored entry and the node is handed back untouched.
#[derive(Debug)]
pub struct InsertReturn<'m, K, V> {
    pub position: Iter<'m, (K, V)>,
    pub inserted: bool,
    pub node: Node<K, V>,
}

/// A value read from the map that writes back through `assign`.
pub struct MappedRef<'m, K, V> {
    map: &'m SqliteMap<K, V>,
    key: K,
    value: V,
}

impl<'m, K, V> MappedRef<'m, K, V> {
    pub(crate) fn new(map: &'m SqliteMap<K, V>, key: K, value: V) -> Self {
        Self { map, key, value }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

impl<K: Clone + 'static, V: Clone + 'static> MappedRef<'_, K, V> {
    /// Stores `value` under this key and keeps it as the current value.
    pub fn assign(&mut self, value: V) -> Result<(), Error> {
        self.map.set(&self.key, &value)?;
        self.value = value;
        Ok(())
    }
}

impl<K, V> Deref for MappedRef<'_, K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K, V: PartialEq> PartialEq<V> for MappedRef<'_, K, V> {
    fn eq(&self, other: &V) -> bool {
        self.value == *other
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for MappedRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRef")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::Node;

    #[test]
    fn node_accessors_reflect_contents() {
        let mut node = Node::new("a".to_string(), 1_i64);
        assert!(!node.is_empty());
        if let Some(key) = node.key_mut() {
            *key = "b".to_string();
        }
        assert_eq!(node.key().map(String::as_str), Some("b"));
        assert_eq!(node.value(), Some(&1));
        assert_eq!(node.into_entry(), Some(("b".to_string(), 1)));

        let empty = Node::<String, i64>::default();
        assert!(empty.is_empty());
        assert!(empty.key().is_none());
    }
}
