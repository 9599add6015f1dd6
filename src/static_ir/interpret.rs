//! Interpreted execution of static graphs
//!
//! The graph is walked node by node through the dynamic [`Tracer`], so every
//! protocol operation reuses the dynamic engine unchanged.

use std::sync::Arc;

use crate::address::Address;
use crate::config::EngineConfig;
use crate::diff::Diff;
use crate::dynamic::{Body, DynamicFn, Tracer};
use crate::error::GenResult;
use crate::static_ir::ir::{Node, NodeId, StaticIr};
use crate::value::Value;

fn gather(inputs: &[NodeId], values: &[Value]) -> Vec<Value> {
    inputs.iter().map(|id| values[id.0].clone()).collect()
}

fn unchanged(inputs: &[NodeId], diffs: &[Diff]) -> bool {
    inputs.iter().all(|id| diffs[id.0].is_no_change())
}

/// Walk `ir` once, reporting the output node's diff as the return diff
pub(crate) fn run_graph(ir: &StaticIr, tracer: &mut dyn Tracer, args: &[Value]) -> GenResult<Value> {
    let mut values: Vec<Value> = Vec::with_capacity(ir.len());
    let mut diffs: Vec<Diff> = Vec::with_capacity(ir.len());

    for node in ir.nodes() {
        let (value, diff) = match node {
            Node::Argument { index } => (args[*index].clone(), tracer.argdiff(*index)),
            Node::Transform { inputs, func } => {
                let value = (**func)(&gather(inputs, &values))?;
                let diff = if unchanged(inputs, &diffs) {
                    Diff::NoChange
                } else {
                    Diff::UnknownChange
                };
                (value, diff)
            }
            Node::Choice { key, dist, inputs } => {
                let params = gather(inputs, &values);
                let diffed =
                    tracer.trace_choice(dist.as_ref(), &params, Address::new(key.clone()))?;
                (diffed.value, diffed.diff)
            }
            Node::Call {
                key,
                callee,
                inputs,
            } => {
                let call_args = gather(inputs, &values);
                let argdiffs = inputs.iter().map(|id| diffs[id.0].clone()).collect();
                let diffed =
                    tracer.trace_call(callee, call_args, argdiffs, Address::new(key.clone()))?;
                (diffed.value, diffed.diff)
            }
        };
        values.push(value);
        diffs.push(diff);
    }

    let output = ir.output().0;
    tracer.set_retdiff(diffs[output].clone())?;
    Ok(values[output].clone())
}

/// Dynamic function that interprets `ir` on every call
pub(crate) fn lower(name: &str, ir: Arc<StaticIr>, config: EngineConfig) -> DynamicFn {
    let arity = ir.num_args();
    let body: Body = Arc::new(move |tracer: &mut dyn Tracer, args: &[Value]| {
        run_graph(&ir, tracer, args)
    });
    DynamicFn::from_body(name, body)
        .with_arity(arity)
        .with_config(config)
}
