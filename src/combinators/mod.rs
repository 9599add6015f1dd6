//! Combinators that build generative functions from other generative functions

pub mod hidden;
pub mod unfold;

pub use self::hidden::{Hidden, HiddenTrace};
pub use self::unfold::{Unfold, VectorTrace};

pub mod prelude {
    pub use super::hidden::{Hidden, HiddenTrace};
    pub use super::unfold::{Unfold, VectorTrace};
}
