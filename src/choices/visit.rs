//! Visited-set algorithms over choice maps

use crate::choices::{AddressSet, ChoiceMap};

/// True iff every leaf of `choices` is covered by `visited`.
///
/// A missing branch of `visited` counts as empty; a leaf of `visited` covers
/// the whole sub-map beneath it.
pub fn all_visited(visited: &AddressSet, choices: &ChoiceMap) -> bool {
    match visited {
        AddressSet::All => true,
        AddressSet::Empty => choices.is_empty(),
        AddressSet::Node { .. } => {
            choices.values().all(|(key, _)| visited.has_key_leaf(key))
                && choices
                    .submaps()
                    .all(|(key, sub)| all_visited(&visited.get_key(key), sub))
        }
    }
}

/// The part of `choices` not covered by `visited`, preserving tree shape
pub fn get_unvisited(visited: &AddressSet, choices: &ChoiceMap) -> ChoiceMap {
    match visited {
        AddressSet::All => ChoiceMap::new(),
        AddressSet::Empty => choices.clone(),
        AddressSet::Node { .. } => {
            let mut unvisited = ChoiceMap::new();
            for (key, value) in choices.values() {
                if !visited.has_key_leaf(key) {
                    unvisited.insert_value(key.clone(), value.clone());
                }
            }
            for (key, sub) in choices.submaps() {
                let rest = get_unvisited(&visited.get_key(key), sub);
                unvisited.insert_submap(key.clone(), rest);
            }
            unvisited
        }
    }
}
