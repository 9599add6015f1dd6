//! Traces of compiled static functions

use std::any::Any;
use std::sync::Arc;

use crate::address::Key;
use crate::choices::{AddressSet, ChoiceMap};
use crate::gen_fn::FnId;
use crate::static_ir::ir::{Node, NodeId, StaticIr};
use crate::trace::{Trace, TraceRef};
use crate::value::Value;

/// Per-node payload beyond the node's value
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    Value,
    Choice { score: f64 },
    Call(TraceRef),
}

/// Trace of a static function, one slot per graph node
#[derive(Clone, Debug)]
pub struct StaticTrace {
    pub(crate) fn_id: FnId,
    pub(crate) ir: Arc<StaticIr>,
    pub(crate) args: Vec<Value>,
    pub(crate) values: Vec<Value>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) retval: Value,
    pub(crate) score: f64,
    pub(crate) noise: f64,
    pub(crate) num_nonempty: usize,
}

impl StaticTrace {
    /// Value computed at `node`
    pub fn value(&self, node: NodeId) -> Option<&Value> {
        self.values.get(node.0)
    }

    fn position(&self, key: &Key) -> Option<usize> {
        self.ir.node_at(key).map(NodeId::index)
    }

    /// Value of the choice at `key`
    pub fn choice(&self, key: &Key) -> Option<&Value> {
        let i = self.position(key)?;
        match self.slots.get(i)? {
            Slot::Choice { .. } => self.values.get(i),
            _ => None,
        }
    }

    /// Sub-trace of the call at `key`
    pub fn call(&self, key: &Key) -> Option<&TraceRef> {
        match self.slots.get(self.position(key)?)? {
            Slot::Call(trace) => Some(trace),
            _ => None,
        }
    }

    /// `(value, score)` of the choice node `node`
    pub(crate) fn choice_at(&self, node: NodeId) -> Option<(&Value, f64)> {
        match self.slots.get(node.0)? {
            Slot::Choice { score } => Some((self.values.get(node.0)?, *score)),
            _ => None,
        }
    }

    pub(crate) fn call_at(&self, node: NodeId) -> Option<&TraceRef> {
        match self.slots.get(node.0)? {
            Slot::Call(trace) => Some(trace),
            _ => None,
        }
    }

    fn addressed(&self) -> impl Iterator<Item = (&Key, &Value, &Slot)> {
        self.ir
            .nodes()
            .iter()
            .zip(self.values.iter().zip(self.slots.iter()))
            .filter_map(|(node, (value, slot))| match node {
                Node::Choice { key, .. } | Node::Call { key, .. } => Some((key, value, slot)),
                _ => None,
            })
    }
}

impl Trace for StaticTrace {
    fn args(&self) -> &[Value] {
        &self.args
    }

    fn retval(&self) -> &Value {
        &self.retval
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn noise(&self) -> f64 {
        self.noise
    }

    fn choices(&self) -> ChoiceMap {
        let mut map = ChoiceMap::new();
        for (key, value, slot) in self.addressed() {
            match slot {
                Slot::Choice { .. } => map.insert_value(key.clone(), value.clone()),
                Slot::Call(trace) => map.insert_submap(key.clone(), trace.choices()),
                Slot::Value => {}
            }
        }
        map
    }

    fn project(&self, selection: &AddressSet) -> f64 {
        let mut total = 0.0;
        for (key, _, slot) in self.addressed() {
            match slot {
                Slot::Choice { score } => {
                    if selection.has_key_leaf(key) {
                        total += score;
                    }
                }
                Slot::Call(trace) => total += trace.project(&selection.get_key(key)),
                Slot::Value => {}
            }
        }
        total
    }

    fn is_empty(&self) -> bool {
        self.num_nonempty == 0
    }

    fn kind(&self) -> &'static str {
        "StaticTrace"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
