//! Serialize key-indexed maps as sequences of pairs, so formats whose maps only
//! accept string keys (JSON) can carry structured [`Key`]s.

use im::OrdMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Key;

pub fn serialize<S, V>(map: &OrdMap<Key, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize + Clone,
{
    serializer.collect_seq(map.iter())
}

pub fn deserialize<'de, D, V>(deserializer: D) -> Result<OrdMap<Key, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de> + Clone,
{
    let pairs: Vec<(Key, V)> = Vec::deserialize(deserializer)?;
    Ok(pairs.into_iter().collect())
}
