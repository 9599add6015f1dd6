//! Hierarchical addresses
//!
//! An address is a non-empty path of keys naming a random choice or a sub-call.
//! Keys are either names (`"mu"`) or positions (`3`), and render joined by `/`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One step of an address path
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Positional key, used by combinators for per-index sub-calls
    Index(usize),
    /// Named key
    Name(Arc<str>),
}

impl Key {
    /// Index carried by a positional key
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(_) => None,
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(Arc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(Arc::from(name))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Non-empty path of keys
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Vec<Key>);

impl Address {
    /// Single-key address
    pub fn new(key: impl Into<Key>) -> Self {
        Self(vec![key.into()])
    }

    /// Address from a first key followed by the remaining path
    pub fn path(first: Key, rest: Vec<Key>) -> Self {
        let mut keys = Vec::with_capacity(rest.len() + 1);
        keys.push(first);
        keys.extend(rest);
        Self(keys)
    }

    /// Address from a list of keys, `None` if the list is empty
    pub fn from_keys(keys: Vec<Key>) -> Option<Self> {
        if keys.is_empty() {
            None
        } else {
            Some(Self(keys))
        }
    }

    /// All keys, outermost first
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    /// Outermost key
    pub fn first(&self) -> &Key {
        &self.0[0]
    }

    /// Address below the outermost key, `None` for single-key addresses
    pub fn rest(&self) -> Option<Address> {
        Self::from_keys(self.0[1..].to_vec())
    }

    /// Split into the outermost key and the remaining path
    pub fn split_first(&self) -> (&Key, Option<Address>) {
        (self.first(), self.rest())
    }

    /// Number of keys in the path
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Addresses are never empty; provided for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// This address with `key` appended
    pub fn child(&self, key: impl Into<Key>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    /// This address nested under `key`
    pub fn prefixed(&self, key: Key) -> Self {
        Self::path(key, self.0.clone())
    }

    /// True if `self` equals `other` or is a strict prefix of it
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl From<Key> for Address {
    fn from(key: Key) -> Self {
        Self(vec![key])
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<usize> for Address {
    fn from(index: usize) -> Self {
        Self::new(index)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// Build an [`Address`] from one or more keys.
///
/// ```
/// use fugue_gen::addr;
///
/// let a = addr!("step", 3, "delta");
/// assert_eq!(a.to_string(), "step/3/delta");
/// ```
#[macro_export]
macro_rules! addr {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::address::Address::path(
            $crate::address::Key::from($first),
            vec![$($crate::address::Key::from($rest)),*],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(addr!("a").to_string(), "a");
        assert_eq!(addr!("a", 0, "b").to_string(), "a/0/b");
    }

    #[test]
    fn test_split_first() {
        let a = addr!("outer", "inner");
        let (first, rest) = a.split_first();
        assert_eq!(first, &Key::from("outer"));
        assert_eq!(rest, Some(addr!("inner")));

        let single = addr!(4);
        assert_eq!(single.split_first(), (&Key::Index(4), None));
    }

    #[test]
    fn test_prefix_relations() {
        let a = addr!("a");
        let ab = addr!("a", "b");
        assert!(a.is_prefix_of(&ab));
        assert!(ab.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert_eq!(addr!("b").prefixed(Key::from("a")), ab);
        assert_eq!(a.child("b"), ab);
    }

    #[test]
    fn test_from_keys_rejects_empty() {
        assert!(Address::from_keys(Vec::new()).is_none());
        assert_eq!(Address::from_keys(vec![Key::Index(1)]), Some(addr!(1)));
    }
}
