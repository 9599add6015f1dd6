//! Value-carrying address trees

use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::address::{Address, Key};
use crate::error::{AddressKind, GenError, GenResult};
use crate::value::Value;

/// Tree of values keyed by hierarchical addresses.
///
/// A key is either a leaf holding a value or an internal node holding a
/// non-empty sub-map, never both. Clones share structure, so handing a
/// sub-map to a callee is cheap.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMap {
    #[serde(with = "super::entries")]
    values: OrdMap<Key, Value>,
    #[serde(with = "super::entries")]
    submaps: OrdMap<Key, ChoiceMap>,
}

impl ChoiceMap {
    /// Create an empty choice map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a choice map from `(address, value)` pairs
    pub fn from_values<A, I>(entries: I) -> GenResult<Self>
    where
        A: Into<Address>,
        I: IntoIterator<Item = (A, Value)>,
    {
        let mut map = Self::new();
        for (addr, value) in entries {
            map.set_value(&addr.into(), value)?;
        }
        Ok(map)
    }

    /// True if the map holds no values at any depth
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.submaps.is_empty()
    }

    /// True if `addr` holds a value
    pub fn has_value(&self, addr: &Address) -> bool {
        match addr.split_first() {
            (key, None) => self.values.contains_key(key),
            (key, Some(rest)) => self
                .submaps
                .get(key)
                .is_some_and(|sub| sub.has_value(&rest)),
        }
    }

    /// True if `addr` holds a non-empty sub-map
    pub fn has_submap(&self, addr: &Address) -> bool {
        match addr.split_first() {
            (key, None) => self.submaps.contains_key(key),
            (key, Some(rest)) => self
                .submaps
                .get(key)
                .is_some_and(|sub| sub.has_submap(&rest)),
        }
    }

    /// Value at `addr`, if any
    pub fn get(&self, addr: &Address) -> Option<&Value> {
        match addr.split_first() {
            (key, None) => self.values.get(key),
            (key, Some(rest)) => self.submaps.get(key).and_then(|sub| sub.get(&rest)),
        }
    }

    /// Value at `addr`.
    ///
    /// Fails with `AddressKindMismatch` when a sub-map sits on the path or at
    /// `addr` itself, and with `AddressNotFound` when nothing is there.
    pub fn get_value(&self, addr: &Address) -> GenResult<&Value> {
        let (key, rest) = addr.split_first();
        match rest {
            None => {
                if let Some(value) = self.values.get(key) {
                    Ok(value)
                } else if self.submaps.contains_key(key) {
                    Err(GenError::kind_mismatch(addr.clone(), AddressKind::Value))
                } else {
                    Err(GenError::AddressNotFound(addr.clone()))
                }
            }
            Some(rest) => {
                if let Some(sub) = self.submaps.get(key) {
                    sub.get_value(&rest).map_err(|e| e.under(key))
                } else if self.values.contains_key(key) {
                    Err(GenError::kind_mismatch(
                        Address::new(key.clone()),
                        AddressKind::Submap,
                    ))
                } else {
                    Err(GenError::AddressNotFound(addr.clone()))
                }
            }
        }
    }

    /// Sub-map rooted at `addr`; empty when nothing is there.
    ///
    /// Fails with `AddressKindMismatch` when `addr` (or a prefix of it) holds a
    /// value.
    pub fn get_submap(&self, addr: &Address) -> GenResult<ChoiceMap> {
        let (key, rest) = addr.split_first();
        let sub = self.submap(key)?;
        match rest {
            None => Ok(sub),
            Some(rest) => sub.get_submap(&rest).map_err(|e| e.under(key)),
        }
    }

    /// Shallow sub-map lookup for a single key
    pub fn submap(&self, key: &Key) -> GenResult<ChoiceMap> {
        if let Some(sub) = self.submaps.get(key) {
            Ok(sub.clone())
        } else if self.values.contains_key(key) {
            Err(GenError::kind_mismatch(
                Address::new(key.clone()),
                AddressKind::Submap,
            ))
        } else {
            Ok(ChoiceMap::new())
        }
    }

    /// Set the value at `addr`, creating intermediate sub-maps.
    ///
    /// Replaces an existing value; fails if `addr` or one of its prefixes is
    /// already the other kind.
    pub fn set_value(&mut self, addr: &Address, value: Value) -> GenResult<()> {
        let (key, rest) = addr.split_first();
        match rest {
            None => {
                if self.submaps.contains_key(key) {
                    return Err(GenError::kind_mismatch(addr.clone(), AddressKind::Value));
                }
                self.values.insert(key.clone(), value);
                Ok(())
            }
            Some(rest) => {
                if self.values.contains_key(key) {
                    return Err(GenError::kind_mismatch(
                        Address::new(key.clone()),
                        AddressKind::Submap,
                    ));
                }
                let mut sub = self.submaps.get(key).cloned().unwrap_or_default();
                sub.set_value(&rest, value).map_err(|e| e.under(key))?;
                self.submaps.insert(key.clone(), sub);
                Ok(())
            }
        }
    }

    /// Set the sub-map at `addr`. An empty `map` removes whatever sub-map was there.
    pub fn set_submap(&mut self, addr: &Address, map: ChoiceMap) -> GenResult<()> {
        let (key, rest) = addr.split_first();
        if self.values.contains_key(key) {
            return Err(GenError::kind_mismatch(
                Address::new(key.clone()),
                AddressKind::Submap,
            ));
        }
        match rest {
            None => {
                if map.is_empty() {
                    self.submaps.remove(key);
                } else {
                    self.submaps.insert(key.clone(), map);
                }
            }
            Some(rest) => {
                let mut sub = self.submaps.get(key).cloned().unwrap_or_default();
                sub.set_submap(&rest, map).map_err(|e| e.under(key))?;
                if sub.is_empty() {
                    self.submaps.remove(key);
                } else {
                    self.submaps.insert(key.clone(), sub);
                }
            }
        }
        Ok(())
    }

    /// Insert a top-level value, dropping any sub-map under the same key
    pub(crate) fn insert_value(&mut self, key: Key, value: Value) {
        self.submaps.remove(&key);
        self.values.insert(key, value);
    }

    /// Insert a top-level sub-map, dropping any value under the same key.
    /// Empty maps are not stored.
    pub(crate) fn insert_submap(&mut self, key: Key, map: ChoiceMap) {
        self.values.remove(&key);
        if map.is_empty() {
            self.submaps.remove(&key);
        } else {
            self.submaps.insert(key, map);
        }
    }

    /// Builder-style [`set_value`](Self::set_value)
    pub fn with_value(mut self, addr: impl Into<Address>, value: impl Into<Value>) -> GenResult<Self> {
        self.set_value(&addr.into(), value.into())?;
        Ok(self)
    }

    /// Builder-style [`set_submap`](Self::set_submap)
    pub fn with_submap(mut self, addr: impl Into<Address>, map: ChoiceMap) -> GenResult<Self> {
        self.set_submap(&addr.into(), map)?;
        Ok(self)
    }

    /// Shallow iteration over leaf keys and their values
    pub fn values(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.values.iter()
    }

    /// Shallow iteration over internal keys and their sub-maps
    pub fn submaps(&self) -> impl Iterator<Item = (&Key, &ChoiceMap)> {
        self.submaps.iter()
    }

    /// Top-level keys, leaves first then internal nodes
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.values.keys().chain(self.submaps.keys())
    }

    /// Every `(address, value)` pair at any depth, in address order per level
    pub fn leaves(&self) -> Vec<(Address, Value)> {
        let mut out = Vec::new();
        self.collect_leaves(None, &mut out);
        out
    }

    fn collect_leaves(&self, prefix: Option<&Address>, out: &mut Vec<(Address, Value)>) {
        let join = |key: &Key| match prefix {
            Some(p) => p.child(key.clone()),
            None => Address::new(key.clone()),
        };
        for (key, value) in self.values.iter() {
            out.push((join(key), value.clone()));
        }
        for (key, sub) in self.submaps.iter() {
            sub.collect_leaves(Some(&join(key)), out);
        }
    }

    /// Every leaf address at any depth
    pub fn leaf_addresses(&self) -> Vec<Address> {
        self.leaves().into_iter().map(|(addr, _)| addr).collect()
    }

    /// Number of values at any depth
    pub fn len(&self) -> usize {
        self.values.len() + self.submaps.values().map(ChoiceMap::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;

    fn sample_map() -> ChoiceMap {
        ChoiceMap::new()
            .with_value("x", 1.0)
            .unwrap()
            .with_value(addr!("sub", "y"), 2.0)
            .unwrap()
            .with_value(addr!("sub", "deep", 0), true)
            .unwrap()
    }

    #[test]
    fn test_get_value_and_submap() {
        let map = sample_map();
        assert_eq!(map.get_value(&addr!("x")).unwrap(), &Value::F64(1.0));
        assert_eq!(map.get_value(&addr!("sub", "y")).unwrap(), &Value::F64(2.0));

        let sub = map.get_submap(&addr!("sub")).unwrap();
        assert!(sub.has_value(&addr!("y")));
        assert!(sub.has_submap(&addr!("deep")));
        assert!(map.get_submap(&addr!("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_kind_mismatch_errors() {
        let map = sample_map();
        let err = map.get_value(&addr!("sub")).unwrap_err();
        assert_eq!(
            err,
            GenError::AddressKindMismatch {
                address: addr!("sub"),
                expected: AddressKind::Value,
                found: AddressKind::Submap,
            }
        );

        let err = map.get_submap(&addr!("x")).unwrap_err();
        assert_eq!(
            err,
            GenError::AddressKindMismatch {
                address: addr!("x"),
                expected: AddressKind::Submap,
                found: AddressKind::Value,
            }
        );

        let err = map.get_value(&addr!("x", "below")).unwrap_err();
        assert!(matches!(err, GenError::AddressKindMismatch { .. }));

        let mut map = map;
        assert!(map.set_value(&addr!("sub"), Value::Unit).is_err());
        assert!(map.set_value(&addr!("x", "y"), Value::Unit).is_err());
    }

    #[test]
    fn test_missing_value_is_not_found() {
        let map = sample_map();
        assert_eq!(
            map.get_value(&addr!("sub", "z")),
            Err(GenError::AddressNotFound(addr!("sub", "z")))
        );
    }

    #[test]
    fn test_set_submap_empty_removes() {
        let mut map = sample_map();
        map.set_submap(&addr!("sub", "deep"), ChoiceMap::new()).unwrap();
        assert!(!map.has_submap(&addr!("sub", "deep")));
        map.set_submap(&addr!("sub"), ChoiceMap::new()).unwrap();
        assert_eq!(map.keys().count(), 1);
    }

    #[test]
    fn test_leaves_enumerates_all_depths() {
        let map = sample_map();
        let addrs = map.leaf_addresses();
        assert_eq!(addrs.len(), 3);
        assert_eq!(map.len(), 3);
        assert!(addrs.contains(&addr!("sub", "deep", 0)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let map = sample_map();
        let json = serde_json::to_string(&map).unwrap();
        let back: ChoiceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }
}
