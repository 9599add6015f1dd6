//! Presence-only address trees (selections and visited sets)

use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};

use crate::address::{Address, Key};

/// Tree of addresses without values.
///
/// A leaf key covers every address beneath it, so selecting the address of a
/// sub-call selects everything that sub-call traced. `All` covers every
/// address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum AddressSet {
    #[default]
    Empty,
    All,
    Node {
        leaves: OrdSet<Key>,
        #[serde(with = "super::entries")]
        internal: OrdMap<Key, AddressSet>,
    },
}

impl AddressSet {
    /// The empty set
    pub fn new() -> Self {
        Self::Empty
    }

    /// The set covering every address
    pub fn all() -> Self {
        Self::All
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Add `addr` as a leaf; everything beneath it becomes covered
    pub fn insert(&mut self, addr: &Address) {
        let (key, rest) = addr.split_first();
        if self.is_empty() {
            *self = Self::Node {
                leaves: OrdSet::new(),
                internal: OrdMap::new(),
            };
        }
        match self {
            Self::All | Self::Empty => {}
            Self::Node { leaves, internal } => {
                if leaves.contains(key) {
                    return;
                }
                match rest {
                    None => {
                        internal.remove(key);
                        leaves.insert(key.clone());
                    }
                    Some(rest) => {
                        let mut child = internal.get(key).cloned().unwrap_or_default();
                        child.insert(&rest);
                        internal.insert(key.clone(), child);
                    }
                }
            }
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, addr: impl Into<Address>) -> Self {
        self.insert(&addr.into());
        self
    }

    /// True if `addr` is a leaf of this set or lies beneath one
    pub fn has_leaf(&self, addr: &Address) -> bool {
        match self {
            Self::All => true,
            Self::Empty => false,
            Self::Node { leaves, internal } => {
                let (key, rest) = addr.split_first();
                if leaves.contains(key) {
                    return true;
                }
                match (internal.get(key), rest) {
                    (Some(child), Some(rest)) => child.has_leaf(&rest),
                    _ => false,
                }
            }
        }
    }

    /// True if `addr` is an internal node of this set
    pub fn has_internal(&self, addr: &Address) -> bool {
        match self {
            Self::All | Self::Empty => false,
            Self::Node { internal, .. } => {
                let (key, rest) = addr.split_first();
                match (internal.get(key), rest) {
                    (Some(_), None) => true,
                    (Some(child), Some(rest)) => child.has_internal(&rest),
                    (None, _) => false,
                }
            }
        }
    }

    /// Sub-set rooted at `addr`: `All` under a leaf, `Empty` when absent
    pub fn get_internal(&self, addr: &Address) -> AddressSet {
        let (key, rest) = addr.split_first();
        let child = self.get_key(key);
        match rest {
            None => child,
            Some(rest) => child.get_internal(&rest),
        }
    }

    /// Shallow [`get_internal`](Self::get_internal) for a single key
    pub fn get_key(&self, key: &Key) -> AddressSet {
        match self {
            Self::All => Self::All,
            Self::Empty => Self::Empty,
            Self::Node { leaves, internal } => {
                if leaves.contains(key) {
                    Self::All
                } else {
                    internal.get(key).cloned().unwrap_or_default()
                }
            }
        }
    }

    /// True if `key` is a leaf at the top level
    pub fn has_key_leaf(&self, key: &Key) -> bool {
        match self {
            Self::All => true,
            Self::Empty => false,
            Self::Node { leaves, .. } => leaves.contains(key),
        }
    }

    /// Shallow iteration over top-level leaf keys
    pub fn leaves(&self) -> impl Iterator<Item = &Key> {
        let leaves = match self {
            Self::Node { leaves, .. } => Some(leaves.iter()),
            _ => None,
        };
        leaves.into_iter().flatten()
    }

    /// Shallow iteration over top-level internal keys and their sub-sets
    pub fn internals(&self) -> impl Iterator<Item = (&Key, &AddressSet)> {
        let internal = match self {
            Self::Node { internal, .. } => Some(internal.iter()),
            _ => None,
        };
        internal.into_iter().flatten()
    }

    /// Every leaf address at any depth. `All` has no enumerable leaves.
    pub fn leaf_addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        self.collect_leaves(None, &mut out);
        out
    }

    fn collect_leaves(&self, prefix: Option<&Address>, out: &mut Vec<Address>) {
        let join = |key: &Key| match prefix {
            Some(p) => p.child(key.clone()),
            None => Address::new(key.clone()),
        };
        for key in self.leaves() {
            out.push(join(key));
        }
        for (key, child) in self.internals() {
            child.collect_leaves(Some(&join(key)), out);
        }
    }
}

impl FromIterator<Address> for AddressSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        let mut set = Self::new();
        for addr in iter {
            set.insert(&addr);
        }
        set
    }
}
