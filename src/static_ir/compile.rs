//! Compiled execution of static graphs
//!
//! A [`Plan`] is one closure per node, specialized on the operation and on
//! the top-level schema of the constraints or selection. Whether a node is
//! constrained, selected or free is settled when the plan is built; at run
//! time the closures only fetch values and do the weight arithmetic.
//!
//! Plans accumulate score, noise and weight in node order with the same reuse
//! rules as the interpreted path, so both strategies agree exactly.

use rand::RngCore;

use crate::address::{Address, Key};
use crate::choices::{AddressSet, ChoiceMap, Schema};
use crate::diff::{argdiff_at, Diff};
use crate::distributions::DistRef;
use crate::error::{AddressKind, GenError, GenResult};
use crate::gen_fn::GenFnRef;
use crate::static_ir::ir::{Node, NodeId, StaticIr, TransformFn};
use crate::static_ir::trace::{Slot, StaticTrace};
use crate::trace::TraceRef;
use crate::value::Value;

/// Protocol operation a plan is specialized for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Generate,
    Assess,
    Update,
    Regenerate,
    Extend,
}

impl Operation {
    /// True for operations that revise a previous trace
    fn revises(self) -> bool {
        matches!(self, Self::Update | Self::Regenerate | Self::Extend)
    }
}

/// Constraints or selection driving a run
#[derive(Clone, Copy)]
pub(crate) enum Input<'a> {
    Constraints(&'a ChoiceMap),
    Selection(&'a AddressSet),
}

/// Mutable state of one plan run
pub(crate) struct Frame<'a, 'r> {
    pub args: &'a [Value],
    pub argdiffs: &'a [Diff],
    pub input: Input<'a>,
    pub prev: Option<&'a StaticTrace>,
    pub rng: &'r mut dyn RngCore,
    pub values: Vec<Value>,
    pub diffs: Vec<Diff>,
    pub slots: Vec<Slot>,
    pub score: f64,
    pub noise: f64,
    pub weight: f64,
    pub num_nonempty: usize,
    pub discarded: ChoiceMap,
}

fn plan_mismatch(what: &str) -> GenError {
    GenError::InvalidGraph(format!("compiled plan expected {}", what))
}

impl<'a, 'r> Frame<'a, 'r> {
    pub fn new(
        args: &'a [Value],
        argdiffs: &'a [Diff],
        input: Input<'a>,
        prev: Option<&'a StaticTrace>,
        rng: &'r mut dyn RngCore,
        capacity: usize,
    ) -> Self {
        Self {
            args,
            argdiffs,
            input,
            prev,
            rng,
            values: Vec::with_capacity(capacity),
            diffs: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            score: 0.0,
            noise: 0.0,
            weight: 0.0,
            num_nonempty: 0,
            discarded: ChoiceMap::new(),
        }
    }

    fn gather(&self, inputs: &[NodeId]) -> Vec<Value> {
        inputs.iter().map(|id| self.values[id.0].clone()).collect()
    }

    fn diffs_of(&self, inputs: &[NodeId]) -> Vec<Diff> {
        inputs.iter().map(|id| self.diffs[id.0].clone()).collect()
    }

    fn unchanged(&self, inputs: &[NodeId]) -> bool {
        inputs.iter().all(|id| self.diffs[id.0].is_no_change())
    }

    fn constraints(&self) -> GenResult<&'a ChoiceMap> {
        match self.input {
            Input::Constraints(constraints) => Ok(constraints),
            Input::Selection(_) => Err(plan_mismatch("constraints")),
        }
    }

    fn selection(&self) -> GenResult<&'a AddressSet> {
        match self.input {
            Input::Selection(selection) => Ok(selection),
            Input::Constraints(_) => Err(plan_mismatch("a selection")),
        }
    }

    fn previous(&self) -> GenResult<&'a StaticTrace> {
        self.prev.ok_or_else(|| plan_mismatch("a previous trace"))
    }

    fn push(&mut self, value: Value, diff: Diff, slot: Slot) {
        self.values.push(value);
        self.diffs.push(diff);
        self.slots.push(slot);
    }

    fn push_choice(&mut self, value: Value, diff: Diff, score: f64) {
        self.score += score;
        self.num_nonempty += 1;
        self.push(value, diff, Slot::Choice { score });
    }

    fn push_call(&mut self, trace: TraceRef, diff: Diff) {
        self.score += trace.score();
        self.noise += trace.noise();
        if !trace.is_empty() {
            self.num_nonempty += 1;
        }
        self.push(trace.retval().clone(), diff, Slot::Call(trace));
    }
}

type Step = Box<dyn Fn(&mut Frame<'_, '_>) -> GenResult<()> + Send + Sync>;

fn step<F>(f: F) -> Step
where
    F: Fn(&mut Frame<'_, '_>) -> GenResult<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Node closures specialized for one `(operation, schema)` pair
pub(crate) struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn compile(ir: &StaticIr, op: Operation, schema: &Schema) -> Self {
        let steps = ir
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| compile_node(op, schema, NodeId(i), node))
            .collect();
        Self { steps }
    }

    pub fn run(&self, frame: &mut Frame<'_, '_>) -> GenResult<()> {
        for run_node in &self.steps {
            run_node(&mut *frame)?;
        }
        Ok(())
    }
}

fn compile_node(op: Operation, schema: &Schema, id: NodeId, node: &Node) -> Step {
    match node {
        Node::Argument { index } => compile_argument(op, *index),
        Node::Transform { inputs, func } => compile_transform(op, id, inputs, func),
        Node::Choice { key, dist, inputs } => compile_choice(op, schema, id, key, dist, inputs),
        Node::Call {
            key,
            callee,
            inputs,
        } => compile_call(op, schema, id, key, callee, inputs),
    }
}

fn compile_argument(op: Operation, index: usize) -> Step {
    if op.revises() {
        step(move |f| {
            let value = f.args[index].clone();
            let diff = argdiff_at(f.argdiffs, index);
            f.push(value, diff, Slot::Value);
            Ok(())
        })
    } else {
        step(move |f| {
            let value = f.args[index].clone();
            f.push(value, Diff::UnknownChange, Slot::Value);
            Ok(())
        })
    }
}

fn compile_transform(op: Operation, id: NodeId, inputs: &[NodeId], func: &TransformFn) -> Step {
    let inputs = inputs.to_vec();
    let func = func.clone();
    if op.revises() {
        step(move |f| {
            if f.unchanged(&inputs) {
                let value = f
                    .previous()?
                    .value(id)
                    .cloned()
                    .ok_or_else(|| plan_mismatch("a transform value"))?;
                f.push(value, Diff::NoChange, Slot::Value);
            } else {
                let value = (*func)(&f.gather(&inputs))?;
                f.push(value, Diff::UnknownChange, Slot::Value);
            }
            Ok(())
        })
    } else {
        step(move |f| {
            let value = (*func)(&f.gather(&inputs))?;
            let diff = if f.unchanged(&inputs) {
                Diff::NoChange
            } else {
                Diff::UnknownChange
            };
            f.push(value, diff, Slot::Value);
            Ok(())
        })
    }
}

fn compile_choice(
    op: Operation,
    schema: &Schema,
    id: NodeId,
    key: &Key,
    dist: &DistRef,
    inputs: &[NodeId],
) -> Step {
    let addr = Address::new(key.clone());
    let key = key.clone();
    let dist = dist.clone();
    let inputs = inputs.to_vec();

    if schema.is_internal(&key) {
        return step(move |_| Err(GenError::kind_mismatch(addr.clone(), AddressKind::Value)));
    }

    match (op, schema.is_leaf(&key)) {
        (Operation::Generate | Operation::Assess, true) => step(move |f| {
            let params = f.gather(&inputs);
            let value = f.constraints()?.get_value(&addr)?.clone();
            let score = dist.log_density(&value, &params)?;
            f.weight += score;
            f.push_choice(value, Diff::UnknownChange, score);
            Ok(())
        }),
        (Operation::Assess, false) => step(move |_| Err(GenError::AddressNotFound(addr.clone()))),
        (Operation::Generate, false) | (Operation::Regenerate, true) => step(move |f| {
            let params = f.gather(&inputs);
            let value = dist.sample(&params, &mut *f.rng)?;
            let score = dist.log_density(&value, &params)?;
            f.push_choice(value, Diff::UnknownChange, score);
            Ok(())
        }),
        (Operation::Update, true) => step(move |f| {
            let (old, old_score) = f
                .previous()?
                .choice_at(id)
                .ok_or_else(|| plan_mismatch("a choice"))?;
            let params = f.gather(&inputs);
            let value = f.constraints()?.get_value(&addr)?.clone();
            let score = dist.log_density(&value, &params)?;
            f.weight += score - old_score;
            f.discarded.insert_value(key.clone(), old.clone());
            let diff = Diff::between(old, &value);
            f.push_choice(value, diff, score);
            Ok(())
        }),
        (Operation::Extend, true) => {
            step(move |_| Err(GenError::ExistingAddressInExtend(addr.clone())))
        }
        (Operation::Update | Operation::Regenerate | Operation::Extend, false) => step(move |f| {
            let (old, old_score) = f
                .previous()?
                .choice_at(id)
                .ok_or_else(|| plan_mismatch("a choice"))?;
            // unchanged parameters give back the same density
            let score = if f.unchanged(&inputs) {
                old_score
            } else {
                dist.log_density(old, &f.gather(&inputs))?
            };
            f.weight += score - old_score;
            f.push_choice(old.clone(), Diff::NoChange, score);
            Ok(())
        }),
    }
}

fn compile_call(
    op: Operation,
    schema: &Schema,
    id: NodeId,
    key: &Key,
    callee: &GenFnRef,
    inputs: &[NodeId],
) -> Step {
    let addr = Address::new(key.clone());
    let key = key.clone();
    let callee = callee.clone();
    let inputs = inputs.to_vec();
    let leaf = schema.is_leaf(&key);
    let internal = schema.is_internal(&key);

    if leaf && op != Operation::Regenerate {
        return step(move |_| Err(GenError::kind_mismatch(addr.clone(), AddressKind::Submap)));
    }

    match op {
        Operation::Generate => step(move |f| {
            let args = f.gather(&inputs);
            let sub = sub_constraints(f, internal, &key)?;
            let (trace, weight) = callee
                .generate(&args, &sub, &mut *f.rng)
                .map_err(|e| e.under(&key))?;
            f.weight += weight;
            f.push_call(trace, Diff::UnknownChange);
            Ok(())
        }),
        Operation::Assess => step(move |f| {
            let args = f.gather(&inputs);
            let sub = sub_constraints(f, internal, &key)?;
            let (weight, retval) = callee
                .assess(&args, &sub, &mut *f.rng)
                .map_err(|e| e.under(&key))?;
            f.weight += weight;
            f.score += weight;
            f.push(retval, Diff::UnknownChange, Slot::Value);
            Ok(())
        }),
        Operation::Update => step(move |f| {
            let prev = previous_call(f, id)?;
            let sub = sub_constraints(f, internal, &key)?;
            if sub.is_empty() && f.unchanged(&inputs) {
                f.push_call(prev.clone(), Diff::NoChange);
                return Ok(());
            }
            let (args, argdiffs) = (f.gather(&inputs), f.diffs_of(&inputs));
            let outcome = callee
                .update(prev, &args, &argdiffs, &sub, &mut *f.rng)
                .map_err(|e| e.under(&key))?;
            f.weight += outcome.weight;
            f.discarded.insert_submap(key.clone(), outcome.discarded);
            f.push_call(outcome.trace, outcome.retdiff);
            Ok(())
        }),
        Operation::Regenerate => step(move |f| {
            let prev = previous_call(f, id)?;
            let sub = if leaf {
                AddressSet::All
            } else if internal {
                f.selection()?.get_key(&key)
            } else {
                AddressSet::Empty
            };
            if sub.is_empty() && f.unchanged(&inputs) {
                f.push_call(prev.clone(), Diff::NoChange);
                return Ok(());
            }
            let (args, argdiffs) = (f.gather(&inputs), f.diffs_of(&inputs));
            let outcome = callee
                .regenerate(prev, &args, &argdiffs, &sub, &mut *f.rng)
                .map_err(|e| e.under(&key))?;
            f.weight += outcome.weight;
            f.push_call(outcome.trace, outcome.retdiff);
            Ok(())
        }),
        Operation::Extend => step(move |f| {
            let prev = previous_call(f, id)?;
            let sub = sub_constraints(f, internal, &key)?;
            if sub.is_empty() && f.unchanged(&inputs) {
                f.push_call(prev.clone(), Diff::NoChange);
                return Ok(());
            }
            let (args, argdiffs) = (f.gather(&inputs), f.diffs_of(&inputs));
            let outcome = callee
                .extend(prev, &args, &argdiffs, &sub, &mut *f.rng)
                .map_err(|e| e.under(&key))?;
            f.weight += outcome.weight;
            f.push_call(outcome.trace, outcome.retdiff);
            Ok(())
        }),
    }
}

fn sub_constraints(f: &Frame<'_, '_>, internal: bool, key: &Key) -> GenResult<ChoiceMap> {
    if internal {
        f.constraints()?.submap(key)
    } else {
        Ok(ChoiceMap::new())
    }
}

fn previous_call<'a>(f: &Frame<'a, '_>, id: NodeId) -> GenResult<&'a TraceRef> {
    f.previous()?
        .call_at(id)
        .ok_or_else(|| plan_mismatch("a sub-call"))
}
