//! Static generative functions
//!
//! A [`StaticFn`] is a node graph with a fixed, closed set of top-level
//! addresses. It can run two ways, chosen by [`ExecutionStrategy`]:
//!
//! - **Interpreted**: the graph is lowered to a [`DynamicFn`] body and walked
//!   through the dynamic tracer on every call.
//! - **Compiled**: the first call with a given operation and constraint (or
//!   selection) schema builds a [`Plan`](compile::Plan) of per-node closures,
//!   cached for every later call with the same shape.
//!
//! Both strategies produce the same choices, scores, weights, return values,
//! diffs and errors for the same inputs and random stream.

pub mod compile;
pub mod interpret;
pub mod ir;
pub mod trace;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use rand::RngCore;

use crate::choices::{AddressSet, ChoiceMap, Schema};
use crate::config::{EngineConfig, ExecutionStrategy};
use crate::diff::{args_noop, Diff};
use crate::dynamic::state::check_unvisited;
use crate::dynamic::DynamicFn;
use crate::error::{GenError, GenResult};
use crate::gen_fn::{FnId, GenerativeFunction};
use crate::trace::{downcast, ExtendOutcome, RegenerateOutcome, TraceRef, UpdateOutcome};
use crate::value::{expect_arity, Value};

use self::compile::{Frame, Input, Operation, Plan};
pub use self::ir::{IrBuilder, Node, NodeId, StaticIr, TransformFn};
pub use self::trace::StaticTrace;

type PlanCache = HashMap<(Operation, Schema), Arc<Plan>>;

/// Generative function defined by a static node graph
pub struct StaticFn {
    id: FnId,
    name: String,
    ir: Arc<StaticIr>,
    config: EngineConfig,
    /// Every choice and call key, as visited by any complete run
    visited: AddressSet,
    interpreter: DynamicFn,
    plans: RwLock<PlanCache>,
}

impl fmt::Debug for StaticFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFn")
            .field("name", &self.name)
            .field("ir", &self.ir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StaticFn {
    pub fn new(name: impl Into<String>, ir: StaticIr) -> Self {
        let name = name.into();
        let ir = Arc::new(ir);
        let config = EngineConfig::default();
        let visited = ir
            .keys()
            .cloned()
            .map(crate::address::Address::new)
            .collect();
        let interpreter = interpret::lower(&name, ir.clone(), config.clone());
        Self {
            id: FnId::fresh(),
            name,
            ir,
            config,
            visited,
            interpreter,
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// Set the engine configuration; drops any compiled plans
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.interpreter = self.interpreter.with_config(config.clone());
        self.config = config;
        self.plans = RwLock::new(HashMap::new());
        self
    }

    pub fn ir(&self) -> &StaticIr {
        &self.ir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of compiled plans in the cache
    pub fn num_plans(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn interpreted(&self) -> bool {
        self.config.strategy == ExecutionStrategy::Interpreted
    }

    /// Cached plan for `(op, schema)`, compiled on first use
    fn plan(&self, op: Operation, schema: Schema) -> Arc<Plan> {
        let key = (op, schema);
        {
            let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());
            if let Some(plan) = plans.get(&key) {
                return plan.clone();
            }
        }
        let plan = Arc::new(Plan::compile(&self.ir, key.0, &key.1));
        log::debug!(target: "compile", "{}: compiled {:?} plan for {}", self.name, key.0, key.1);
        let mut plans = self.plans.write().unwrap_or_else(|e| e.into_inner());
        plans.entry(key).or_insert(plan).clone()
    }

    fn previous<'t>(&self, trace: &'t TraceRef) -> GenResult<&'t StaticTrace> {
        let prev = downcast::<StaticTrace>(trace, "StaticTrace")?;
        self.id.check(prev.fn_id, &self.name)?;
        Ok(prev)
    }

    /// Run the plan for `(op, schema)` from a fresh frame
    fn run<'a, 'r>(
        &self,
        op: Operation,
        schema: Schema,
        args: &'a [Value],
        argdiffs: &'a [Diff],
        input: Input<'a>,
        prev: Option<&'a StaticTrace>,
        rng: &'r mut dyn RngCore,
    ) -> GenResult<Frame<'a, 'r>> {
        expect_arity(args, self.ir.num_args())?;
        let plan = self.plan(op, schema);
        let mut frame = Frame::new(args, argdiffs, input, prev, rng, self.ir.len());
        plan.run(&mut frame)?;
        if let Input::Constraints(constraints) = input {
            check_unvisited(&self.visited, constraints, &self.config, &self.name)?;
        }
        Ok(frame)
    }

    fn output(&self, frame: &Frame<'_, '_>) -> GenResult<(Value, Diff)> {
        let i = self.ir.output().index();
        match (frame.values.get(i), frame.diffs.get(i)) {
            (Some(value), Some(diff)) => Ok((value.clone(), diff.clone())),
            _ => Err(GenError::InvalidGraph("output node was not computed".to_string())),
        }
    }

    fn build(&self, args: &[Value], frame: Frame<'_, '_>) -> GenResult<(StaticTrace, f64, Diff, ChoiceMap)> {
        let (retval, retdiff) = self.output(&frame)?;
        let trace = StaticTrace {
            fn_id: self.id,
            ir: self.ir.clone(),
            args: args.to_vec(),
            values: frame.values,
            slots: frame.slots,
            retval,
            score: frame.score,
            noise: frame.noise,
            num_nonempty: frame.num_nonempty,
        };
        Ok((trace, frame.weight, retdiff, frame.discarded))
    }

    /// Update may only constrain keys the graph has
    fn check_constraints(&self, constraints: &ChoiceMap) -> GenResult<()> {
        match constraints
            .leaf_addresses()
            .into_iter()
            .find(|addr| !self.ir.has_key(addr.first()))
        {
            Some(addr) => Err(GenError::NewAddressInUpdate(addr)),
            None => Ok(()),
        }
    }

    /// Regenerate may only select addresses the graph has
    fn check_selection(&self, selection: &AddressSet) -> GenResult<()> {
        match selection
            .leaf_addresses()
            .into_iter()
            .find(|addr| !self.ir.has_key(addr.first()))
        {
            Some(addr) => Err(GenError::SelectNewAddress(addr)),
            None => Ok(()),
        }
    }
}

impl GenerativeFunction for StaticFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, f64)> {
        if self.interpreted() {
            return self.interpreter.generate(args, constraints, rng);
        }
        let schema = Schema::of_choices(constraints);
        let input = Input::Constraints(constraints);
        let frame = self.run(Operation::Generate, schema, args, &[], input, None, rng)?;
        let (trace, weight, _, _) = self.build(args, frame)?;
        log::trace!(target: "generate", "{}: score {:.4} weight {:.4}", self.name, trace.score, weight);
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
        if self.interpreted() {
            return self.interpreter.update(trace, args, argdiffs, constraints, rng);
        }
        let prev = self.previous(trace)?;
        if constraints.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(UpdateOutcome::unchanged(trace));
        }
        self.check_constraints(constraints)?;
        let schema = Schema::of_choices(constraints);
        let input = Input::Constraints(constraints);
        let frame = self.run(Operation::Update, schema, args, argdiffs, input, Some(prev), rng)?;
        let (trace, weight, retdiff, discarded) = self.build(args, frame)?;
        log::trace!(target: "update", "{}: weight {:.4}", self.name, weight);
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
        if self.interpreted() {
            return self.interpreter.regenerate(trace, args, argdiffs, selection, rng);
        }
        let prev = self.previous(trace)?;
        if selection.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(RegenerateOutcome::unchanged(trace));
        }
        self.check_selection(selection)?;
        let schema = Schema::of_selection(selection, self.ir.keys());
        let input = Input::Selection(selection);
        let frame =
            self.run(Operation::Regenerate, schema, args, argdiffs, input, Some(prev), rng)?;
        let (trace, weight, retdiff, _) = self.build(args, frame)?;
        log::trace!(target: "regenerate", "{}: weight {:.4}", self.name, weight);
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
        if self.interpreted() {
            return self.interpreter.extend(trace, args, argdiffs, constraints, rng);
        }
        let prev = self.previous(trace)?;
        if constraints.is_empty() && args_noop(&prev.args, args, argdiffs) {
            return Ok(ExtendOutcome::unchanged(trace));
        }
        let schema = Schema::of_choices(constraints);
        let input = Input::Constraints(constraints);
        let frame = self.run(Operation::Extend, schema, args, argdiffs, input, Some(prev), rng)?;
        let (trace, weight, retdiff, _) = self.build(args, frame)?;
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
        if self.interpreted() {
            return self.interpreter.assess(args, choices, rng);
        }
        let schema = Schema::of_choices(choices);
        let input = Input::Constraints(choices);
        let frame = self.run(Operation::Assess, schema, args, &[], input, None, rng)?;
        let (retval, _) = self.output(&frame)?;
        Ok((frame.weight, retval))
    }
}

pub mod prelude {
    pub use super::compile::Operation;
    pub use super::ir::{IrBuilder, Node, NodeId, StaticIr};
    pub use super::trace::StaticTrace;
    pub use super::StaticFn;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;
    use crate::address::Key;
    use crate::distributions::normal;
    use crate::trace::Trace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// mu ~ N(0, 1); x ~ N(mu, scale); returns x
    fn model(config: EngineConfig) -> StaticFn {
        let mut b = IrBuilder::new();
        let scale = b.add_argument();
        let zero = b.add_transform(&[], |_| Ok(Value::F64(0.0)));
        let one = b.add_transform(&[], |_| Ok(Value::F64(1.0)));
        let mu = b.add_choice("mu", normal(), &[zero, one]);
        let x = b.add_choice("x", normal(), &[mu, scale]);
        b.set_output(x);
        StaticFn::new("model", b.build().unwrap()).with_config(config)
    }

    #[test]
    fn test_plans_are_cached_per_schema() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(0);
        let args = [Value::F64(1.0)];
        let trace = f.simulate(&args, &mut rng).unwrap();
        assert_eq!(f.num_plans(), 1);

        for v in [0.1, 0.2, 0.3] {
            let constraints = ChoiceMap::new().with_value("mu", v).unwrap();
            f.update(&trace, &args, &[Diff::NoChange], &constraints, &mut rng)
                .unwrap();
        }
        assert_eq!(f.num_plans(), 2);

        let constraints = ChoiceMap::new().with_value("x", 0.0).unwrap();
        f.update(&trace, &args, &[Diff::NoChange], &constraints, &mut rng)
            .unwrap();
        assert_eq!(f.num_plans(), 3);
    }

    #[test]
    fn test_compiled_update_reuses_unchanged_choices() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(1);
        let args = [Value::F64(1.0)];
        let trace = f.simulate(&args, &mut rng).unwrap();

        let constraints = ChoiceMap::new().with_value("x", 0.25).unwrap();
        let out = f
            .update(&trace, &args, &[Diff::NoChange], &constraints, &mut rng)
            .unwrap();
        let prev = trace.as_any().downcast_ref::<StaticTrace>().unwrap();
        let next = out.trace.as_any().downcast_ref::<StaticTrace>().unwrap();
        assert_eq!(prev.choice(&Key::from("mu")), next.choice(&Key::from("mu")));
        assert_eq!(next.choice(&Key::from("x")), Some(&Value::F64(0.25)));
        assert_eq!(out.discarded.len(), 1);
        assert!(out.discarded.get(&addr!("x")).is_some());
        assert!((out.trace.score() - trace.score() - out.weight).abs() < 1e-12);
    }

    #[test]
    fn test_changed_argument_rescores() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(2);
        let constraints = ChoiceMap::new()
            .with_value("mu", 0.0)
            .unwrap()
            .with_value("x", 1.0)
            .unwrap();
        let (trace, _) = f.generate(&[Value::F64(1.0)], &constraints, &mut rng).unwrap();
        let out = f
            .update(
                &trace,
                &[Value::F64(2.0)],
                &[Diff::UnknownChange],
                &ChoiceMap::new(),
                &mut rng,
            )
            .unwrap();
        // x ~ N(0, 2) instead of N(0, 1) at x = 1
        let expected = -(2.0_f64).ln() - 0.5 * 0.25 + 0.5;
        assert!((out.weight - expected).abs() < 1e-12);
        assert_eq!(out.retdiff, Diff::NoChange);
    }

    #[test]
    fn test_kind_mismatch_on_choice() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(3);
        let constraints = ChoiceMap::new().with_value(addr!("mu", "inner"), 0.0).unwrap();
        let err = f
            .generate(&[Value::F64(1.0)], &constraints, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GenError::AddressKindMismatch { .. }));
    }

    #[test]
    fn test_unvisited_constraint_reported() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(4);
        let constraints = ChoiceMap::new().with_value("nope", 0.0).unwrap();
        let err = f
            .generate(&[Value::F64(1.0)], &constraints, &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::UnvisitedConstraints(vec![addr!("nope")]));
    }

    #[test]
    fn test_wrong_arity() {
        let f = model(EngineConfig::compiled());
        let err = f
            .simulate(&[], &mut StdRng::seed_from_u64(5))
            .unwrap_err();
        assert_eq!(err, GenError::ArgumentCount { expected: 1, found: 0 });
    }

    #[test]
    fn test_regenerate_select_unknown_key() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(6);
        let args = [Value::F64(1.0)];
        let trace = f.simulate(&args, &mut rng).unwrap();
        let err = f
            .regenerate(&trace, &args, &[Diff::NoChange], &AddressSet::new().with("y"), &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::SelectNewAddress(addr!("y")));
    }

    #[test]
    fn test_choice_only_trace_is_not_empty() {
        let f = model(EngineConfig::compiled());
        let trace = f
            .simulate(&[Value::F64(1.0)], &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert!(!trace.is_empty());

        let trace = trace.as_any().downcast_ref::<StaticTrace>().unwrap();
        assert!(trace.choice(&Key::from("x")).is_some());
        assert!(trace.call(&Key::from("x")).is_none());
        assert!(trace.choice(&Key::from("nope")).is_none());
    }

    #[test]
    fn test_update_rejects_unknown_key() {
        let f = model(EngineConfig::compiled());
        let mut rng = StdRng::seed_from_u64(8);
        let args = [Value::F64(1.0)];
        let trace = f.simulate(&args, &mut rng).unwrap();
        let constraints = ChoiceMap::new().with_value("y", 0.0).unwrap();
        let err = f
            .update(&trace, &args, &[Diff::NoChange], &constraints, &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::NewAddressInUpdate(addr!("y")));
        assert_eq!(f.num_plans(), 1);
    }
}
