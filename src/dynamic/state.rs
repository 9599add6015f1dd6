//! Execution state shared by every protocol operation on dynamic functions

use im::OrdMap;
use rand::RngCore;

use crate::address::Address;
use crate::choices::{get_unvisited, AddressSet, ChoiceMap};
use crate::config::{ConstraintPolicy, EngineConfig};
use crate::diff::{args_unchanged, argdiff_at, Diff, Diffed};
use crate::distributions::Distribution;
use crate::dynamic::trace::{DynamicTrace, Record};
use crate::dynamic::Tracer;
use crate::error::{AddressKind, GenError, GenResult};
use crate::gen_fn::{same_fn, GenFnRef};
use crate::params::ParamStore;
use crate::trace::TraceRef;
use crate::value::Value;

/// The operation an execution performs
#[derive(Clone, Copy)]
pub(crate) enum Op<'a> {
    Generate {
        constraints: &'a ChoiceMap,
        /// Every choice must be constrained and no trace is kept
        assess: bool,
    },
    Update {
        prev: &'a DynamicTrace,
        constraints: &'a ChoiceMap,
    },
    Regenerate {
        prev: &'a DynamicTrace,
        selection: &'a AddressSet,
    },
    Extend {
        prev: &'a DynamicTrace,
        constraints: &'a ChoiceMap,
    },
}

impl<'a> Op<'a> {
    fn prev(&self) -> Option<&'a DynamicTrace> {
        match *self {
            Op::Generate { .. } => None,
            Op::Update { prev, .. } | Op::Regenerate { prev, .. } | Op::Extend { prev, .. } => {
                Some(prev)
            }
        }
    }

    fn constraints(&self) -> Option<&'a ChoiceMap> {
        match *self {
            Op::Generate { constraints, .. }
            | Op::Update { constraints, .. }
            | Op::Extend { constraints, .. } => Some(constraints),
            Op::Regenerate { .. } => None,
        }
    }
}

/// Everything an execution accumulated, ready to become a trace
pub(crate) struct Finished {
    pub records: OrdMap<Address, Record>,
    pub order: Vec<Address>,
    pub score: f64,
    pub noise: f64,
    pub weight: f64,
    pub num_nonempty: usize,
    pub discarded: ChoiceMap,
    pub retdiff: Option<Diff>,
}

/// Tracer implementation driving one execution of a dynamic body
pub(crate) struct Execution<'a, 'r> {
    op: Op<'a>,
    argdiffs: &'a [Diff],
    params: Option<&'a dyn ParamStore>,
    rng: &'r mut dyn RngCore,
    visited: AddressSet,
    records: OrdMap<Address, Record>,
    order: Vec<Address>,
    score: f64,
    noise: f64,
    weight: f64,
    num_nonempty: usize,
    discarded: ChoiceMap,
    retdiff: Option<Diff>,
}

impl<'a, 'r> Execution<'a, 'r> {
    pub fn new(
        op: Op<'a>,
        argdiffs: &'a [Diff],
        params: Option<&'a dyn ParamStore>,
        rng: &'r mut dyn RngCore,
    ) -> Self {
        Self {
            op,
            argdiffs,
            params,
            rng,
            visited: AddressSet::new(),
            records: OrdMap::new(),
            order: Vec::new(),
            score: 0.0,
            noise: 0.0,
            weight: 0.0,
            num_nonempty: 0,
            discarded: ChoiceMap::new(),
            retdiff: None,
        }
    }

    /// Mark `addr` visited; fails if it, a prefix or an extension was already visited
    fn visit(&mut self, addr: &Address) -> GenResult<()> {
        if self.visited.has_leaf(addr) || self.visited.has_internal(addr) {
            return Err(GenError::DuplicateAddress(addr.clone()));
        }
        self.visited.insert(addr);
        Ok(())
    }

    /// Previous choice at `addr` as `(value, score)`
    fn prev_choice(&self, addr: &Address) -> GenResult<Option<(&'a Value, f64)>> {
        match self.op.prev().and_then(|prev| prev.record(addr)) {
            None => Ok(None),
            Some(Record::Choice { value, score }) => Ok(Some((value, *score))),
            Some(Record::Call { .. }) => Err(GenError::kind_mismatch(addr.clone(), AddressKind::Value)),
        }
    }

    /// Previous sub-call at `addr` as `(callee, trace)`
    fn prev_call(&self, addr: &Address) -> GenResult<Option<(&'a GenFnRef, &'a TraceRef)>> {
        match self.op.prev().and_then(|prev| prev.record(addr)) {
            None => Ok(None),
            Some(Record::Call { callee, trace }) => Ok(Some((callee, trace))),
            Some(Record::Choice { .. }) => {
                Err(GenError::kind_mismatch(addr.clone(), AddressKind::Submap))
            }
        }
    }

    fn push(&mut self, addr: Address, record: Record) {
        if record.is_nonempty() {
            self.num_nonempty += 1;
        }
        self.order.push(addr.clone());
        self.records.insert(addr, record);
    }

    /// Update may only constrain addresses the previous trace has
    pub fn check_constraints(prev: &DynamicTrace, constraints: &ChoiceMap) -> GenResult<()> {
        match constraints
            .leaf_addresses()
            .into_iter()
            .find(|addr| !prev.covers(addr))
        {
            Some(addr) => Err(GenError::NewAddressInUpdate(addr)),
            None => Ok(()),
        }
    }

    /// Regenerate may only select addresses the previous trace has
    pub fn check_selection(prev: &DynamicTrace, selection: &AddressSet) -> GenResult<()> {
        match selection
            .leaf_addresses()
            .into_iter()
            .find(|addr| !prev.covers(addr))
        {
            Some(addr) => Err(GenError::SelectNewAddress(addr)),
            None => Ok(()),
        }
    }

    /// Close out the execution: unvisited constraints, removed records, retdiff
    pub fn finish(mut self, config: &EngineConfig, name: &str) -> GenResult<Finished> {
        if let Some(constraints) = self.op.constraints() {
            check_unvisited(&self.visited, constraints, config, name)?;
        }

        if let Some(prev) = self.op.prev() {
            for (addr, record) in prev.records() {
                if self.visited.has_leaf(addr) {
                    continue;
                }
                match self.op {
                    Op::Extend { .. } => {
                        return Err(GenError::RemovedAddressInExtend(addr.clone()));
                    }
                    Op::Update { .. } => {
                        self.weight -= record.score();
                        match record {
                            Record::Choice { value, .. } => {
                                self.discarded.set_value(addr, value.clone())?
                            }
                            Record::Call { trace, .. } => {
                                self.discarded.set_submap(addr, trace.choices())?
                            }
                        }
                    }
                    Op::Regenerate { .. } => self.weight -= record.score(),
                    Op::Generate { .. } => {}
                }
                log::trace!(target: "update", "{}: removed {}", name, addr);
            }
        }

        Ok(Finished {
            records: self.records,
            order: self.order,
            score: self.score,
            noise: self.noise,
            weight: self.weight,
            num_nonempty: self.num_nonempty,
            discarded: self.discarded,
            retdiff: self.retdiff,
        })
    }
}

/// Apply the configured policy to constraints nobody visited
pub(crate) fn check_unvisited(
    visited: &AddressSet,
    constraints: &ChoiceMap,
    config: &EngineConfig,
    name: &str,
) -> GenResult<()> {
    let unvisited = get_unvisited(visited, constraints);
    if unvisited.is_empty() {
        return Ok(());
    }
    let addrs = unvisited.leaf_addresses();
    match config.constraint_policy {
        ConstraintPolicy::Error => Err(GenError::UnvisitedConstraints(addrs)),
        ConstraintPolicy::Warn => {
            for addr in &addrs {
                log::warn!(target: "generate", "{}: constraint at {} was never visited", name, addr);
            }
            Ok(())
        }
    }
}

impl<'a, 'r> Tracer for Execution<'a, 'r> {
    fn trace_choice(
        &mut self,
        dist: &dyn Distribution,
        params: &[Value],
        addr: Address,
    ) -> GenResult<Diffed> {
        self.visit(&addr)?;
        let prev = self.prev_choice(&addr)?;

        let (value, score, diff) = match self.op {
            Op::Generate {
                constraints,
                assess,
            } => {
                if constraints.has_submap(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Value));
                }
                match constraints.get(&addr) {
                    Some(value) => {
                        let score = dist.log_density(value, params)?;
                        self.weight += score;
                        (value.clone(), score, Diff::UnknownChange)
                    }
                    None if assess => return Err(GenError::AddressNotFound(addr)),
                    None => {
                        let value = dist.sample(params, &mut *self.rng)?;
                        let score = dist.log_density(&value, params)?;
                        (value, score, Diff::UnknownChange)
                    }
                }
            }
            Op::Update { constraints, .. } => {
                if constraints.has_submap(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Value));
                }
                match (prev, constraints.get(&addr)) {
                    (Some((old, old_score)), Some(value)) => {
                        let score = dist.log_density(value, params)?;
                        self.weight += score - old_score;
                        self.discarded.set_value(&addr, old.clone())?;
                        (value.clone(), score, Diff::between(old, value))
                    }
                    (Some((old, old_score)), None) => {
                        let score = dist.log_density(old, params)?;
                        self.weight += score - old_score;
                        (old.clone(), score, Diff::NoChange)
                    }
                    (None, Some(_)) => return Err(GenError::NewAddressInUpdate(addr)),
                    (None, None) => {
                        let value = dist.sample(params, &mut *self.rng)?;
                        let score = dist.log_density(&value, params)?;
                        (value, score, Diff::UnknownChange)
                    }
                }
            }
            Op::Regenerate { selection, .. } => {
                if selection.has_internal(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Value));
                }
                match (prev, selection.has_leaf(&addr)) {
                    (Some(_), true) => {
                        let value = dist.sample(params, &mut *self.rng)?;
                        let score = dist.log_density(&value, params)?;
                        (value, score, Diff::UnknownChange)
                    }
                    (Some((old, old_score)), false) => {
                        let score = dist.log_density(old, params)?;
                        self.weight += score - old_score;
                        (old.clone(), score, Diff::NoChange)
                    }
                    (None, true) => return Err(GenError::SelectNewAddress(addr)),
                    (None, false) => {
                        let value = dist.sample(params, &mut *self.rng)?;
                        let score = dist.log_density(&value, params)?;
                        (value, score, Diff::UnknownChange)
                    }
                }
            }
            Op::Extend { constraints, .. } => {
                if constraints.has_submap(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Value));
                }
                match (prev, constraints.get(&addr)) {
                    (Some(_), Some(_)) => return Err(GenError::ExistingAddressInExtend(addr)),
                    (Some((old, old_score)), None) => {
                        let score = dist.log_density(old, params)?;
                        self.weight += score - old_score;
                        (old.clone(), score, Diff::NoChange)
                    }
                    (None, Some(value)) => {
                        let score = dist.log_density(value, params)?;
                        self.weight += score;
                        (value.clone(), score, Diff::UnknownChange)
                    }
                    (None, None) => {
                        let value = dist.sample(params, &mut *self.rng)?;
                        let score = dist.log_density(&value, params)?;
                        (value, score, Diff::UnknownChange)
                    }
                }
            }
        };

        log::trace!(target: "generate", "{} ~ {} = {} ({:.4})", addr, dist.name(), value, score);
        self.score += score;
        self.push(
            addr,
            Record::Choice {
                value: value.clone(),
                score,
            },
        );
        Ok(Diffed::new(value, diff))
    }

    fn trace_call(
        &mut self,
        callee: &GenFnRef,
        args: Vec<Value>,
        argdiffs: Vec<Diff>,
        addr: Address,
    ) -> GenResult<Diffed> {
        self.visit(&addr)?;
        let prev = self.prev_call(&addr)?;
        if let Some((prev_callee, _)) = prev {
            if !same_fn(prev_callee, callee) {
                return Err(GenError::CalleeChanged(addr));
            }
        }
        let unchanged = args_unchanged(&argdiffs, args.len());
        let rng = &mut *self.rng;

        let (trace, diff) = match self.op {
            Op::Generate {
                constraints,
                assess: true,
            } => {
                if constraints.has_value(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Submap));
                }
                let sub = constraints.get_submap(&addr)?;
                let (weight, retval) = callee
                    .assess(&args, &sub, rng)
                    .map_err(|e| e.under_address(&addr))?;
                self.weight += weight;
                self.score += weight;
                return Ok(Diffed::unknown(retval));
            }
            Op::Generate { constraints, .. } => {
                if constraints.has_value(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Submap));
                }
                let sub = constraints.get_submap(&addr)?;
                let (trace, weight) = callee
                    .generate(&args, &sub, rng)
                    .map_err(|e| e.under_address(&addr))?;
                self.weight += weight;
                (trace, Diff::UnknownChange)
            }
            Op::Update { constraints, .. } => {
                if constraints.has_value(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Submap));
                }
                let sub = constraints.get_submap(&addr)?;
                match prev {
                    Some((_, prev_trace)) if sub.is_empty() && unchanged => {
                        (prev_trace.clone(), Diff::NoChange)
                    }
                    Some((_, prev_trace)) => {
                        let outcome = callee
                            .update(prev_trace, &args, &argdiffs, &sub, rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += outcome.weight;
                        self.discarded.set_submap(&addr, outcome.discarded)?;
                        (outcome.trace, outcome.retdiff)
                    }
                    None if !sub.is_empty() => return Err(GenError::NewAddressInUpdate(addr)),
                    None => {
                        let (trace, weight) = callee
                            .generate(&args, &sub, rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += weight;
                        (trace, Diff::UnknownChange)
                    }
                }
            }
            Op::Regenerate { selection, .. } => {
                let sub = selection.get_internal(&addr);
                match prev {
                    Some((_, prev_trace)) if sub.is_empty() && unchanged => {
                        (prev_trace.clone(), Diff::NoChange)
                    }
                    Some((_, prev_trace)) => {
                        let outcome = callee
                            .regenerate(prev_trace, &args, &argdiffs, &sub, rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += outcome.weight;
                        (outcome.trace, outcome.retdiff)
                    }
                    None if !sub.is_empty() => return Err(GenError::SelectNewAddress(addr)),
                    None => {
                        let (trace, weight) = callee
                            .generate(&args, &ChoiceMap::new(), rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += weight;
                        (trace, Diff::UnknownChange)
                    }
                }
            }
            Op::Extend { constraints, .. } => {
                if constraints.has_value(&addr) {
                    return Err(GenError::kind_mismatch(addr, AddressKind::Submap));
                }
                let sub = constraints.get_submap(&addr)?;
                match prev {
                    Some((_, prev_trace)) if sub.is_empty() && unchanged => {
                        (prev_trace.clone(), Diff::NoChange)
                    }
                    Some((_, prev_trace)) => {
                        let outcome = callee
                            .extend(prev_trace, &args, &argdiffs, &sub, rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += outcome.weight;
                        (outcome.trace, outcome.retdiff)
                    }
                    None => {
                        let (trace, weight) = callee
                            .generate(&args, &sub, rng)
                            .map_err(|e| e.under_address(&addr))?;
                        self.weight += weight;
                        (trace, Diff::UnknownChange)
                    }
                }
            }
        };

        log::trace!(target: "generate", "{} -> {} ({:.4})", addr, callee.name(), trace.score());
        self.score += trace.score();
        self.noise += trace.noise();
        let retval = trace.retval().clone();
        self.push(
            addr,
            Record::Call {
                callee: callee.clone(),
                trace,
            },
        );
        Ok(Diffed::new(retval, diff))
    }

    fn read_param(&self, name: &str) -> GenResult<Value> {
        match self.params {
            Some(store) => store.get_param(name),
            None => Err(GenError::AddressNotFound(Address::from(name))),
        }
    }

    fn argdiff(&self, index: usize) -> Diff {
        match self.op {
            Op::Generate { .. } => Diff::UnknownChange,
            _ => argdiff_at(self.argdiffs, index),
        }
    }

    fn set_retdiff(&mut self, diff: Diff) -> GenResult<()> {
        if self.retdiff.is_some() {
            return Err(GenError::RetdiffAlreadySet);
        }
        self.retdiff = Some(diff);
        Ok(())
    }
}
