//! Untraced randomness
//!
//! `Hidden(inner)` runs `inner` but exposes none of its choices. The inner
//! trace's score and noise are folded into the wrapper's noise, so the wrapper
//! itself always scores zero. When arguments change, the hidden randomness is
//! drawn again from its prior; nothing can be constrained or selected.

use std::any::Any;
use std::sync::Arc;

use rand::RngCore;

use crate::choices::{AddressSet, ChoiceMap};
use crate::diff::{args_noop, Diff};
use crate::error::{GenError, GenResult};
use crate::gen_fn::{FnId, GenFnRef, GenerativeFunction};
use crate::trace::{downcast, ExtendOutcome, RegenerateOutcome, Trace, TraceRef, UpdateOutcome};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct HiddenTrace {
    fn_id: FnId,
    args: Vec<Value>,
    inner: TraceRef,
    noise: f64,
}

impl HiddenTrace {
    pub fn inner(&self) -> &TraceRef {
        &self.inner
    }
}

impl Trace for HiddenTrace {
    fn args(&self) -> &[Value] {
        &self.args
    }

    fn retval(&self) -> &Value {
        self.inner.retval()
    }

    fn score(&self) -> f64 {
        0.0
    }

    fn noise(&self) -> f64 {
        self.noise
    }

    fn choices(&self) -> ChoiceMap {
        ChoiceMap::new()
    }

    fn project(&self, _selection: &AddressSet) -> f64 {
        self.noise
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "HiddenTrace"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wraps a generative function so its choices become untraced noise
#[derive(Clone, Debug)]
pub struct Hidden {
    id: FnId,
    name: String,
    inner: GenFnRef,
}

impl Hidden {
    pub fn new(inner: GenFnRef) -> Self {
        Self {
            id: FnId::fresh(),
            name: format!("hidden({})", inner.name()),
            inner,
        }
    }

    fn previous<'t>(&self, trace: &'t TraceRef) -> GenResult<&'t HiddenTrace> {
        let prev = downcast::<HiddenTrace>(trace, "HiddenTrace")?;
        self.id.check(prev.fn_id, &self.name)?;
        Ok(prev)
    }

    fn wrap(&self, args: &[Value], inner: TraceRef) -> HiddenTrace {
        HiddenTrace {
            fn_id: self.id,
            args: args.to_vec(),
            noise: inner.score() + inner.noise(),
            inner,
        }
    }

    /// Draw the hidden randomness again for new arguments
    fn redraw(
        &self,
        prev: &HiddenTrace,
        args: &[Value],
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, Diff)> {
        let inner = self.inner.simulate(args, rng)?;
        let retdiff = Diff::between(prev.retval(), inner.retval());
        Ok((Arc::new(self.wrap(args, inner)), retdiff))
    }
}

fn reject_constraints(constraints: &ChoiceMap) -> GenResult<()> {
    if constraints.is_empty() {
        Ok(())
    } else {
        Err(GenError::UnvisitedConstraints(constraints.leaf_addresses()))
    }
}

impl GenerativeFunction for Hidden {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, f64)> {
        reject_constraints(constraints)?;
        let inner = self.inner.simulate(args, rng)?;
        Ok((Arc::new(self.wrap(args, inner)), 0.0))
    }

    fn update(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<UpdateOutcome> {
        let prev = self.previous(trace)?;
        reject_constraints(constraints)?;
        if args_noop(&prev.args, args, argdiffs) {
            return Ok(UpdateOutcome::unchanged(trace));
        }
        let (trace, retdiff) = self.redraw(prev, args, rng)?;
        Ok(UpdateOutcome {
            trace,
            weight: 0.0,
            retdiff,
            discarded: ChoiceMap::new(),
        })
    }

    fn regenerate(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        selection: &AddressSet,
        rng: &mut dyn RngCore,
    ) -> GenResult<RegenerateOutcome> {
        let prev = self.previous(trace)?;
        if let Some(addr) = selection.leaf_addresses().into_iter().next() {
            return Err(GenError::SelectNewAddress(addr));
        }
        if args_noop(&prev.args, args, argdiffs) {
            return Ok(RegenerateOutcome::unchanged(trace));
        }
        let (trace, retdiff) = self.redraw(prev, args, rng)?;
        Ok(RegenerateOutcome {
            trace,
            weight: 0.0,
            retdiff,
        })
    }

    fn extend(
        &self,
        trace: &TraceRef,
        args: &[Value],
        argdiffs: &[Diff],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<ExtendOutcome> {
        let prev = self.previous(trace)?;
        reject_constraints(constraints)?;
        if args_noop(&prev.args, args, argdiffs) {
            return Ok(ExtendOutcome::unchanged(trace));
        }
        let (trace, retdiff) = self.redraw(prev, args, rng)?;
        Ok(ExtendOutcome {
            trace,
            weight: 0.0,
            retdiff,
        })
    }

    fn assess(
        &self,
        args: &[Value],
        choices: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(f64, Value)> {
        reject_constraints(choices)?;
        let inner = self.inner.simulate(args, rng)?;
        Ok((0.0, inner.retval().clone()))
    }
}
