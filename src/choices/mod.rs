//! Hierarchical address trees
//!
//! [`ChoiceMap`] carries values at its leaves and is used for constraints,
//! discards and the choice view of a trace. [`AddressSet`] carries only
//! presence and is used for selections and for recording which addresses an
//! execution visited.

pub mod address_set;
pub mod choice_map;
mod entries;
pub mod schema;
pub mod visit;

pub use address_set::AddressSet;
pub use choice_map::ChoiceMap;
pub use schema::{Schema, StaticSchema};
pub use visit::{all_visited, get_unvisited};

pub mod prelude {
    pub use super::address_set::*;
    pub use super::choice_map::*;
    pub use super::schema::*;
    pub use super::visit::*;
}
