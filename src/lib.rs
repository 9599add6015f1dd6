//! # fugue-gen
//!
//! Trace execution and incremental recomputation for generative functions.
//!
//! A generative function makes random choices at hierarchical addresses and
//! records them in an execution trace together with their log-density and the
//! function's return value. The engine produces traces under partial
//! constraints, and repairs existing traces when arguments change, when new
//! constraints arrive, or when selected choices are resampled. Only the parts
//! of a trace that can be affected are re-executed; everything else is shared
//! with the previous trace.
//!
//! ## Core Concepts
//!
//! - **Choice maps and selections**: hierarchical constraints ([`ChoiceMap`]) and
//!   address sets ([`AddressSet`]) keyed by [`Address`]
//! - **Protocol**: `generate`, `update`, `regenerate`, `extend` and `assess` on
//!   every [`GenerativeFunction`], with importance weights that keep
//!   `score` and `noise` consistent across revisions
//! - **Two modeling styles**: closures traced at run time ([`DynamicFn`]) and
//!   fixed node graphs ([`StaticFn`]) that either interpret or run closures
//!   compiled per constraint schema
//! - **Combinators**: [`Unfold`] for state-space sequences and [`Hidden`] for
//!   untraced randomness
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fugue_gen::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//!
//! let model = DynamicFn::new("model", |t: &mut dyn Tracer, _args: &[Value]| {
//!     let mu = t.choice(&Normal, &[0.0.into(), 1.0.into()], "mu")?;
//!     t.choice(&Normal, &[mu, 0.5.into()], "x")
//! });
//!
//! let observed = ChoiceMap::new().with_value(addr!("x"), 1.2)?;
//! let (trace, weight) = model.generate(&[], &observed, &mut rng)?;
//!
//! let moved = model.regenerate(
//!     &trace,
//!     &[],
//!     &[],
//!     &AddressSet::new().with(addr!("mu")),
//!     &mut rng,
//! )?;
//! ```
//!
//! [`ChoiceMap`]: choices::ChoiceMap
//! [`AddressSet`]: choices::AddressSet
//! [`Address`]: address::Address
//! [`GenerativeFunction`]: gen_fn::GenerativeFunction
//! [`DynamicFn`]: dynamic::DynamicFn
//! [`StaticFn`]: static_ir::StaticFn
//! [`Unfold`]: combinators::Unfold
//! [`Hidden`]: combinators::Hidden

pub mod address;
pub mod batch;
pub mod choices;
pub mod combinators;
pub mod config;
pub mod diff;
pub mod distributions;
pub mod dynamic;
pub mod error;
pub mod gen_fn;
pub mod params;
pub mod static_ir;
pub mod trace;
pub mod value;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::addr;
    pub use crate::address::{Address, Key};
    pub use crate::batch::{simulate_batch, update_batch};
    pub use crate::choices::prelude::*;
    pub use crate::combinators::prelude::*;
    pub use crate::config::*;
    pub use crate::diff::{Diff, Diffed, SequenceDiff};
    pub use crate::distributions::{
        bernoulli, exponential, normal, uniform, Bernoulli, DistRef, Distribution, Exponential,
        Normal, Uniform,
    };
    pub use crate::dynamic::prelude::*;
    pub use crate::error::*;
    pub use crate::gen_fn::{same_fn, FnId, GenFnRef, GenerativeFunction};
    pub use crate::params::{InMemoryParamStore, ParamStore};
    pub use crate::static_ir::prelude::*;
    pub use crate::trace::{
        same_trace, ExtendOutcome, Proposal, RegenerateOutcome, Trace, TraceRef, UpdateOutcome,
    };
    pub use crate::value::Value;
}
