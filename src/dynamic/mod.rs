//! Interpreted generative functions
//!
//! A [`DynamicFn`] wraps an ordinary Rust closure. The closure receives a
//! [`Tracer`] and makes its random choices and sub-calls through it; the same
//! closure then serves `generate`, `update`, `regenerate`, `extend` and
//! `assess`, with the tracer deciding per address whether to sample, reuse,
//! constrain or rescore.
//!
//! ```rust,ignore
//! use fugue_gen::prelude::*;
//!
//! let model = DynamicFn::new("model", |t: &mut dyn Tracer, _args: &[Value]| {
//!     let mu = t.choice(&Normal, &[0.0.into(), 1.0.into()], "mu")?;
//!     t.choice(&Normal, &[mu, 0.5.into()], "x")
//! });
//! ```

pub mod state;
pub mod trace;
pub mod tracer;

use std::fmt;
use std::sync::Arc;

use rand::RngCore;

use crate::choices::{AddressSet, ChoiceMap};
use crate::config::EngineConfig;
use crate::diff::{args_noop, Diff};
use crate::error::GenResult;
use crate::gen_fn::{FnId, GenerativeFunction};
use crate::params::ParamStore;
use crate::trace::{
    downcast, ExtendOutcome, RegenerateOutcome, TraceRef, UpdateOutcome,
};
use crate::value::{expect_arity, Value};

use self::state::{Execution, Finished, Op};
pub use self::trace::{DynamicTrace, Record};
pub use self::tracer::Tracer;

/// Body of a dynamic generative function
pub type Body = Arc<dyn Fn(&mut dyn Tracer, &[Value]) -> GenResult<Value> + Send + Sync>;

/// Generative function backed by a closure
#[derive(Clone)]
pub struct DynamicFn {
    id: FnId,
    name: String,
    body: Body,
    arity: Option<usize>,
    params: Option<Arc<dyn ParamStore>>,
    config: EngineConfig,
}

impl fmt::Debug for DynamicFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DynamicFn {
    /// Create a new dynamic function
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut dyn Tracer, &[Value]) -> GenResult<Value> + Send + Sync + 'static,
    {
        Self::from_body(name, Arc::new(body))
    }

    pub(crate) fn from_body(name: impl Into<String>, body: Body) -> Self {
        Self {
            id: FnId::fresh(),
            name: name.into(),
            body,
            arity: None,
            params: None,
            config: EngineConfig::default(),
        }
    }

    /// Reject calls with a different number of arguments
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Parameter store the body reads through [`Tracer::read_param`]
    pub fn with_params(mut self, params: Arc<dyn ParamStore>) -> Self {
        self.params = Some(params);
        self
    }

    /// Set the engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the body once under `op`
    fn execute(
        &self,
        op: Op<'_>,
        args: &[Value],
        argdiffs: &[Diff],
        rng: &mut dyn RngCore,
    ) -> GenResult<(Value, Finished)> {
        if let Some(arity) = self.arity {
            expect_arity(args, arity)?;
        }
        let mut exec = Execution::new(op, argdiffs, self.params.as_deref(), rng);
        let retval = (self.body)(&mut exec, args)?;
        let finished = exec.finish(&self.config, &self.name)?;
        Ok((retval, finished))
    }

    fn build(&self, args: &[Value], retval: Value, finished: Finished) -> DynamicTrace {
        DynamicTrace {
            fn_id: self.id,
            args: args.to_vec(),
            retval,
            score: finished.score,
            noise: finished.noise,
            records: finished.records,
            order: finished.order,
            num_nonempty: finished.num_nonempty,
        }
    }

    fn previous<'t>(&self, trace: &'t TraceRef) -> GenResult<&'t DynamicTrace> {
        let prev = downcast::<DynamicTrace>(trace, "DynamicTrace")?;
        self.id.check(prev.fn_id, &self.name)?;
        Ok(prev)
    }

    fn retdiff(prev: &DynamicTrace, retval: &Value, finished: &mut Finished) -> Diff {
        finished
            .retdiff
            .take()
            .unwrap_or_else(|| Diff::between(&prev.retval, retval))
    }
}

impl GenerativeFunction for DynamicFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, f64)> {
        let op = Op::Generate {
            constraints,
            assess: false,
        };
        let (retval, finished) = self.execute(op, args, &[], rng)?;
        let weight = finished.weight;
        let trace = self.build(args, retval, finished);
        log::debug!(target: "generate", "{}: score {:.4} weight {:.4}", self.name, trace.score, weight);
        Ok((Arc::new(trace), weight))
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
        if constraints.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(UpdateOutcome::unchanged(trace));
        }
        Execution::check_constraints(prev, constraints)?;
        let op = Op::Update { prev, constraints };
        let (retval, mut finished) = self.execute(op, args, argdiffs, rng)?;
        let retdiff = Self::retdiff(prev, &retval, &mut finished);
        let weight = finished.weight;
        let discarded = std::mem::take(&mut finished.discarded);
        let trace = self.build(args, retval, finished);
        log::debug!(target: "update", "{}: weight {:.4}", self.name, weight);
        Ok(UpdateOutcome {
            trace: Arc::new(trace),
            weight,
            retdiff,
            discarded,
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
        if selection.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(RegenerateOutcome::unchanged(trace));
        }
        Execution::check_selection(prev, selection)?;
        let op = Op::Regenerate { prev, selection };
        let (retval, mut finished) = self.execute(op, args, argdiffs, rng)?;
        let retdiff = Self::retdiff(prev, &retval, &mut finished);
        let weight = finished.weight;
        let trace = self.build(args, retval, finished);
        log::debug!(target: "regenerate", "{}: weight {:.4}", self.name, weight);
        Ok(RegenerateOutcome {
            trace: Arc::new(trace),
            weight,
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
        if constraints.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(ExtendOutcome::unchanged(trace));
        }
        let op = Op::Extend { prev, constraints };
        let (retval, mut finished) = self.execute(op, args, argdiffs, rng)?;
        let retdiff = Self::retdiff(prev, &retval, &mut finished);
        let weight = finished.weight;
        let trace = self.build(args, retval, finished);
        log::debug!(target: "update", "{}: extend weight {:.4}", self.name, weight);
        Ok(ExtendOutcome {
            trace: Arc::new(trace),
            weight,
            retdiff,
        })
    }

    fn assess(
        &self,
        args: &[Value],
        choices: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(f64, Value)> {
        let op = Op::Generate {
            constraints: choices,
            assess: true,
        };
        let (retval, finished) = self.execute(op, args, &[], rng)?;
        Ok((finished.weight, retval))
    }
}

pub mod prelude {
    pub use super::trace::{DynamicTrace, Record};
    pub use super::tracer::Tracer;
    pub use super::{Body, DynamicFn};
}
