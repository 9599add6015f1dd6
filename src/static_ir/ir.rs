//! Node graphs for static generative functions

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::address::Key;
use crate::distributions::DistRef;
use crate::error::{GenError, GenResult};
use crate::gen_fn::GenFnRef;
use crate::value::Value;

/// Position of a node in its graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Deterministic computation over the values of earlier nodes
pub type TransformFn = Arc<dyn Fn(&[Value]) -> GenResult<Value> + Send + Sync>;

/// One step of a static graph
#[derive(Clone)]
pub enum Node {
    /// The function argument at `index`
    Argument { index: usize },
    /// Deterministic function of other nodes
    Transform { inputs: Vec<NodeId>, func: TransformFn },
    /// Random choice at the top-level address `key`
    Choice {
        key: Key,
        dist: DistRef,
        inputs: Vec<NodeId>,
    },
    /// Sub-call traced under the top-level address `key`
    Call {
        key: Key,
        callee: GenFnRef,
        inputs: Vec<NodeId>,
    },
}

impl Node {
    pub fn inputs(&self) -> &[NodeId] {
        match self {
            Self::Argument { .. } => &[],
            Self::Transform { inputs, .. }
            | Self::Choice { inputs, .. }
            | Self::Call { inputs, .. } => inputs,
        }
    }

    /// Address key of choice and call nodes
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::Choice { key, .. } | Self::Call { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument { index } => write!(f, "Argument({})", index),
            Self::Transform { inputs, .. } => write!(f, "Transform({:?})", inputs),
            Self::Choice { key, dist, inputs } => {
                write!(f, "Choice({} ~ {}{:?})", key, dist.name(), inputs)
            }
            Self::Call {
                key,
                callee,
                inputs,
            } => write!(f, "Call({} -> {}{:?})", key, callee.name(), inputs),
        }
    }
}

/// Validated node graph in topological order
#[derive(Debug)]
pub struct StaticIr {
    nodes: Vec<Node>,
    num_args: usize,
    output: NodeId,
    addressed: BTreeMap<Key, NodeId>,
}

impl StaticIr {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_args(&self) -> usize {
        self.num_args
    }

    /// Node whose value is the return value
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Keys of every choice and call node, in key order
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.addressed.keys()
    }

    pub fn has_key(&self, key: &Key) -> bool {
        self.addressed.contains_key(key)
    }

    /// Choice or call node at `key`
    pub fn node_at(&self, key: &Key) -> Option<NodeId> {
        self.addressed.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builder for [`StaticIr`]
#[derive(Default)]
pub struct IrBuilder {
    nodes: Vec<Node>,
    num_args: usize,
    output: Option<NodeId>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Next positional argument
    pub fn add_argument(&mut self) -> NodeId {
        let index = self.num_args;
        self.num_args += 1;
        self.push(Node::Argument { index })
    }

    pub fn add_transform<F>(&mut self, inputs: &[NodeId], func: F) -> NodeId
    where
        F: Fn(&[Value]) -> GenResult<Value> + Send + Sync + 'static,
    {
        self.push(Node::Transform {
            inputs: inputs.to_vec(),
            func: Arc::new(func),
        })
    }

    /// Random choice at `key`, parameterized by `inputs` in order
    pub fn add_choice(&mut self, key: impl Into<Key>, dist: DistRef, inputs: &[NodeId]) -> NodeId {
        self.push(Node::Choice {
            key: key.into(),
            dist,
            inputs: inputs.to_vec(),
        })
    }

    /// Sub-call at `key` with `inputs` as arguments
    pub fn add_call(&mut self, key: impl Into<Key>, callee: GenFnRef, inputs: &[NodeId]) -> NodeId {
        self.push(Node::Call {
            key: key.into(),
            callee,
            inputs: inputs.to_vec(),
        })
    }

    pub fn set_output(&mut self, node: NodeId) {
        self.output = Some(node);
    }

    /// Validate and freeze the graph.
    ///
    /// Inputs must refer to earlier nodes, address keys must be unique and an
    /// output must be set.
    pub fn build(self) -> GenResult<StaticIr> {
        let mut addressed = BTreeMap::new();
        for (position, node) in self.nodes.iter().enumerate() {
            if let Some(input) = node.inputs().iter().find(|input| input.0 >= position) {
                return Err(GenError::InvalidGraph(format!(
                    "node {} reads node {} which is not defined before it",
                    position, input.0
                )));
            }
            if let Some(key) = node.key() {
                if addressed.insert(key.clone(), NodeId(position)).is_some() {
                    return Err(GenError::InvalidGraph(format!("duplicate address {}", key)));
                }
            }
        }
        let output = self
            .output
            .ok_or_else(|| GenError::InvalidGraph("no output node".to_string()))?;
        if output.0 >= self.nodes.len() {
            return Err(GenError::InvalidGraph(format!(
                "output node {} does not exist",
                output.0
            )));
        }
        Ok(StaticIr {
            nodes: self.nodes,
            num_args: self.num_args,
            output,
            addressed,
        })
    }
}
