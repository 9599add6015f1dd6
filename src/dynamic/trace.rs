//! Traces of dynamic functions

use std::any::Any;

use im::OrdMap;

use crate::address::Address;
use crate::choices::{AddressSet, ChoiceMap};
use crate::error::AddressKind;
use crate::gen_fn::{FnId, GenFnRef};
use crate::trace::{Trace, TraceRef};
use crate::value::Value;

/// What an execution recorded at one address
#[derive(Clone, Debug)]
pub enum Record {
    Choice { value: Value, score: f64 },
    Call { callee: GenFnRef, trace: TraceRef },
}

impl Record {
    /// Log-density the record contributes to the trace score
    pub fn score(&self) -> f64 {
        match self {
            Self::Choice { score, .. } => *score,
            Self::Call { trace, .. } => trace.score(),
        }
    }

    pub fn noise(&self) -> f64 {
        match self {
            Self::Choice { .. } => 0.0,
            Self::Call { trace, .. } => trace.noise(),
        }
    }

    pub fn kind(&self) -> AddressKind {
        match self {
            Self::Choice { .. } => AddressKind::Value,
            Self::Call { .. } => AddressKind::Submap,
        }
    }

    /// True if the record holds at least one addressable choice
    pub fn is_nonempty(&self) -> bool {
        match self {
            Self::Choice { .. } => true,
            Self::Call { trace, .. } => !trace.is_empty(),
        }
    }
}

/// Trace of a [`DynamicFn`](super::DynamicFn) execution.
///
/// Records are keyed by address for lookup and also kept in execution order,
/// so sums over the trace accumulate in the same order as the execution did.
#[derive(Clone, Debug)]
pub struct DynamicTrace {
    pub(crate) fn_id: FnId,
    pub(crate) args: Vec<Value>,
    pub(crate) retval: Value,
    pub(crate) score: f64,
    pub(crate) noise: f64,
    pub(crate) records: OrdMap<Address, Record>,
    pub(crate) order: Vec<Address>,
    pub(crate) num_nonempty: usize,
}

impl DynamicTrace {
    /// Record at exactly `addr`
    pub fn record(&self, addr: &Address) -> Option<&Record> {
        self.records.get(addr)
    }

    /// Records in execution order
    pub fn records(&self) -> impl Iterator<Item = (&Address, &Record)> {
        self.order
            .iter()
            .filter_map(move |addr| self.records.get(addr).map(|record| (addr, record)))
    }

    /// Value of the choice at `addr`
    pub fn choice(&self, addr: &Address) -> Option<&Value> {
        match self.records.get(addr) {
            Some(Record::Choice { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Sub-trace of the call at `addr`
    pub fn call(&self, addr: &Address) -> Option<&TraceRef> {
        match self.records.get(addr) {
            Some(Record::Call { trace, .. }) => Some(trace),
            _ => None,
        }
    }

    /// True if a record sits at `addr` or at one of its prefixes
    pub fn covers(&self, addr: &Address) -> bool {
        let keys = addr.keys();
        (1..=keys.len()).any(|n| {
            Address::from_keys(keys[..n].to_vec())
                .is_some_and(|prefix| self.records.contains_key(&prefix))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl Trace for DynamicTrace {
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
        for (addr, record) in self.records() {
            // records never overlap, so neither insert can hit the other kind
            let placed = match record {
                Record::Choice { value, .. } => map.set_value(addr, value.clone()),
                Record::Call { trace, .. } => map.set_submap(addr, trace.choices()),
            };
            debug_assert!(placed.is_ok(), "overlapping records at {}", addr);
        }
        map
    }

    fn project(&self, selection: &AddressSet) -> f64 {
        let mut total = 0.0;
        for (addr, record) in self.records() {
            match record {
                Record::Choice { score, .. } => {
                    if selection.has_leaf(addr) {
                        total += score;
                    }
                }
                Record::Call { trace, .. } => total += trace.project(&selection.get_internal(addr)),
            }
        }
        total
    }

    fn is_empty(&self) -> bool {
        self.num_nonempty == 0
    }

    fn kind(&self) -> &'static str {
        "DynamicTrace"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
