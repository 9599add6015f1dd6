//! Top-level address shapes used as specialization keys

use std::collections::BTreeSet;
use std::fmt;

use crate::address::Key;
use crate::choices::{AddressSet, ChoiceMap};

/// Closed, enumerable set of top-level keys split by role
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StaticSchema {
    leaves: BTreeSet<Key>,
    internal: BTreeSet<Key>,
}

impl StaticSchema {
    pub fn is_leaf(&self, key: &Key) -> bool {
        self.leaves.contains(key)
    }

    pub fn is_internal(&self, key: &Key) -> bool {
        self.internal.contains(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.is_leaf(key) || self.is_internal(key)
    }

    /// All keys, leaves first
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.leaves.iter().chain(self.internal.iter())
    }
}

/// Shape of the top level of a constraint or selection object
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Schema {
    #[default]
    Empty,
    Static(StaticSchema),
}

impl Schema {
    /// Schema of a constraint map
    pub fn of_choices(choices: &ChoiceMap) -> Self {
        if choices.is_empty() {
            return Self::Empty;
        }
        Self::Static(StaticSchema {
            leaves: choices.values().map(|(k, _)| k.clone()).collect(),
            internal: choices.submaps().map(|(k, _)| k.clone()).collect(),
        })
    }

    /// Schema of a selection.
    ///
    /// `AddressSet::All` has no enumerable keys of its own; it is normalized to a
    /// schema selecting every key in `universe` as a leaf.
    pub fn of_selection<'a>(
        selection: &AddressSet,
        universe: impl IntoIterator<Item = &'a Key>,
    ) -> Self {
        match selection {
            AddressSet::Empty => Self::Empty,
            AddressSet::All => {
                let leaves: BTreeSet<Key> = universe.into_iter().cloned().collect();
                if leaves.is_empty() {
                    Self::Empty
                } else {
                    Self::Static(StaticSchema {
                        leaves,
                        internal: BTreeSet::new(),
                    })
                }
            }
            AddressSet::Node { .. } => Self::Static(StaticSchema {
                leaves: selection.leaves().cloned().collect(),
                internal: selection.internals().map(|(k, _)| k.clone()).collect(),
            }),
        }
    }

    pub fn is_leaf(&self, key: &Key) -> bool {
        match self {
            Self::Empty => false,
            Self::Static(s) => s.is_leaf(key),
        }
    }

    pub fn is_internal(&self, key: &Key) -> bool {
        match self {
            Self::Empty => false,
            Self::Static(s) => s.is_internal(key),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.is_leaf(key) || self.is_internal(key)
    }

    /// Every top-level key
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Self::Empty => Vec::new(),
            Self::Static(s) => s.keys().cloned().collect(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "{{}}"),
            Self::Static(s) => {
                write!(f, "{{")?;
                for (i, key) in s.leaves.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                for (i, key) in s.internal.iter().enumerate() {
                    if i > 0 || !s.leaves.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}/*", key)?;
                }
                write!(f, "}}")
            }
        }
    }
}
