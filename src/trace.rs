//! Execution traces
//!
//! A trace is an immutable record of one execution of a generative function.
//! Protocol operations never modify a trace; they return a new one, sharing
//! whatever did not change, so older traces stay valid for other holders.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::choices::{AddressSet, ChoiceMap};
use crate::diff::Diff;
use crate::error::{GenError, GenResult};
use crate::value::Value;

/// Immutable record of an execution
pub trait Trace: Send + Sync + fmt::Debug {
    /// Arguments the function was executed with
    fn args(&self) -> &[Value];

    /// Return value of the execution
    fn retval(&self) -> &Value;

    /// Log joint density of every traced choice, sub-calls included
    fn score(&self) -> f64;

    /// Log-density contribution of randomness not exposed as addressable choices
    fn noise(&self) -> f64;

    /// Choice-map view of the traced values
    fn choices(&self) -> ChoiceMap;

    /// Sum of the scores of the selected choices plus the projection of every
    /// sub-call onto its part of the selection. Projecting onto the empty
    /// selection yields the trace's noise.
    fn project(&self, selection: &AddressSet) -> f64;

    /// True if the trace has no addressable choices; O(1)
    fn is_empty(&self) -> bool;

    /// Name of the concrete trace type, for error messages
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a trace
pub type TraceRef = Arc<dyn Trace>;

/// True if both handles point at the same trace object
pub fn same_trace(a: &TraceRef, b: &TraceRef) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Downcast a trace handle to the concrete type a generative function produces
pub(crate) fn downcast<'t, T: Trace + 'static>(
    trace: &'t TraceRef,
    expected: &'static str,
) -> GenResult<&'t T> {
    trace
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| GenError::TraceMismatch {
            expected: expected.to_string(),
            found: trace.kind().to_string(),
        })
}

/// Result of `update`
#[derive(Clone, Debug)]
pub struct UpdateOutcome {
    pub trace: TraceRef,
    /// Log-weight delta of the new trace relative to the old one
    pub weight: f64,
    pub retdiff: Diff,
    /// Every value the update overwrote or removed
    pub discarded: ChoiceMap,
}

impl UpdateOutcome {
    /// Outcome that hands back `trace` itself
    pub(crate) fn unchanged(trace: &TraceRef) -> Self {
        Self {
            trace: trace.clone(),
            weight: 0.0,
            retdiff: Diff::NoChange,
            discarded: ChoiceMap::new(),
        }
    }
}

/// Result of `regenerate` and `extend`
#[derive(Clone, Debug)]
pub struct RegenerateOutcome {
    pub trace: TraceRef,
    /// Metropolis-Hastings log-weight of the move (regenerate) or the
    /// importance weight of the extension (extend)
    pub weight: f64,
    pub retdiff: Diff,
}

impl RegenerateOutcome {
    pub(crate) fn unchanged(trace: &TraceRef) -> Self {
        Self {
            trace: trace.clone(),
            weight: 0.0,
            retdiff: Diff::NoChange,
        }
    }
}

/// Result of `extend`
pub type ExtendOutcome = RegenerateOutcome;

/// Result of `propose`
#[derive(Clone, Debug)]
pub struct Proposal {
    pub choices: ChoiceMap,
    /// Log-density of proposing `choices`
    pub weight: f64,
    pub retval: Value,
}
