//! The interface a model body sees

use crate::address::Address;
use crate::diff::{Diff, Diffed};
use crate::distributions::Distribution;
use crate::error::GenResult;
use crate::gen_fn::GenFnRef;
use crate::value::Value;

/// Hooks a dynamic function body calls to make random choices and sub-calls.
///
/// One implementation serves every protocol operation; the body never knows
/// whether it is generating, updating or regenerating.
pub trait Tracer {
    /// Make (or revisit) a random choice at `addr`
    fn trace_choice(
        &mut self,
        dist: &dyn Distribution,
        params: &[Value],
        addr: Address,
    ) -> GenResult<Diffed>;

    /// Call another generative function, tracing its choices under `addr`
    fn trace_call(
        &mut self,
        callee: &GenFnRef,
        args: Vec<Value>,
        argdiffs: Vec<Diff>,
        addr: Address,
    ) -> GenResult<Diffed>;

    /// Read a trainable parameter
    fn read_param(&self, name: &str) -> GenResult<Value>;

    /// Change marker of argument `index`; `UnknownChange` outside update-like operations
    fn argdiff(&self, index: usize) -> Diff;

    /// Report the return-value diff; at most once per execution
    fn set_retdiff(&mut self, diff: Diff) -> GenResult<()>;
}

impl dyn Tracer + '_ {
    /// Random choice returning only the value
    pub fn choice(
        &mut self,
        dist: &dyn Distribution,
        params: &[Value],
        addr: impl Into<Address>,
    ) -> GenResult<Value> {
        self.trace_choice(dist, params, addr.into())
            .map(|diffed| diffed.value)
    }

    /// Sub-call with every argument marked `UnknownChange`
    pub fn call(
        &mut self,
        callee: &GenFnRef,
        args: Vec<Value>,
        addr: impl Into<Address>,
    ) -> GenResult<Value> {
        let argdiffs = vec![Diff::UnknownChange; args.len()];
        self.trace_call(callee, args, argdiffs, addr.into())
            .map(|diffed| diffed.value)
    }
}
