//! The generative function protocol
//!
//! Every execution strategy and combinator implements [`GenerativeFunction`].
//! Callers only ever hold `Arc<dyn GenerativeFunction>` and `Arc<dyn Trace>`,
//! so interpreted functions, compiled functions and combinators nest freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::RngCore;

use crate::choices::{AddressSet, ChoiceMap};
use crate::diff::Diff;
use crate::error::{GenError, GenResult};
use crate::trace::{ExtendOutcome, Proposal, RegenerateOutcome, TraceRef, UpdateOutcome};
use crate::value::Value;

/// Identity of a generative function, stamped into the traces it produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FnId(u64);

impl FnId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Fail with `TraceMismatch` unless `other` is this identity
    pub(crate) fn check(self, other: FnId, name: &str) -> GenResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(GenError::TraceMismatch {
                expected: format!("trace of {}", name),
                found: "trace of another generative function".to_string(),
            })
        }
    }
}

/// A function that makes random choices at addresses and records them in traces
pub trait GenerativeFunction: Send + Sync + fmt::Debug {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Execute once under partial `constraints`.
    ///
    /// Returns the trace and the importance weight: the log-density of the
    /// constrained choices. With every choice constrained, `weight == score`.
    fn generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, f64)>;

    /// Move `trace` to new arguments and new values at the constrained addresses
    fn update(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<UpdateOutcome>;

    /// Resample the selected addresses of `trace` from their prior
    fn regenerate(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        selection: &AddressSet,
        rng: &mut dyn RngCore,
    ) -> GenResult<RegenerateOutcome>;

    /// Grow `trace` with new choices; existing choices keep their values
    fn extend(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<ExtendOutcome>;

    /// Log-density of `choices`, which must cover every choice the execution makes
    fn assess(
        &self,
        args: &[Value],
        choices: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(f64, Value)>;

    /// Execute once without constraints
    fn simulate(&self, args: &[Value], rng: &mut dyn RngCore) -> GenResult<TraceRef> {
        self.generate(args, &ChoiceMap::new(), rng)
            .map(|(trace, _)| trace)
    }

    /// Sample choices together with the log-density of proposing them
    fn propose(&self, args: &[Value], rng: &mut dyn RngCore) -> GenResult<Proposal> {
        let trace = self.simulate(args, rng)?;
        Ok(Proposal {
            choices: trace.choices(),
            weight: trace.project(&AddressSet::all()),
            retval: trace.retval().clone(),
        })
    }
}

/// Shared handle to a generative function
pub type GenFnRef = Arc<dyn GenerativeFunction>;

/// True if both handles point at the same generative function
pub fn same_fn(a: &GenFnRef, b: &GenFnRef) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Noise contribution of `selection` in `trace`
pub fn project(trace: &TraceRef, selection: &AddressSet) -> f64 {
    trace.project(selection)
}
