//! Sequential (unfold) combinator
//!
//! `Unfold(kernel)` applied to `(len, init_state, params...)` runs
//! `state[i] = kernel(i, state[i - 1], params...)` for `i` in `0..len`, with
//! `state[-1] = init_state`, and returns the list of states. The kernel call
//! for index `i` is traced under `Key::Index(i)`.
//!
//! Revisions work in three phases over `(prev_len, new_len)`: indices past the
//! new length are deleted, retained indices are revised only when their
//! sub-constraints, sub-selection or inputs changed, and new indices are
//! generated fresh. Untouched subtraces are shared with the previous trace.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use im::Vector;
use rand::RngCore;

use crate::address::{Address, Key};
use crate::choices::{AddressSet, ChoiceMap};
use crate::config::EngineConfig;
use crate::diff::{argdiff_at, Diff, SequenceDiff};
use crate::dynamic::state::check_unvisited;
use crate::error::{GenError, GenResult};
use crate::gen_fn::{FnId, GenFnRef, GenerativeFunction};
use crate::trace::{
    downcast, ExtendOutcome, RegenerateOutcome, Trace, TraceRef, UpdateOutcome,
};
use crate::value::Value;

/// Trace of an [`Unfold`] execution
#[derive(Clone, Debug)]
pub struct VectorTrace {
    fn_id: FnId,
    args: Vec<Value>,
    subtraces: Vector<TraceRef>,
    states: Vector<Value>,
    retval: Value,
    score: f64,
    noise: f64,
    num_nonempty: usize,
}

impl VectorTrace {
    pub fn len(&self) -> usize {
        self.subtraces.len()
    }

    pub fn is_empty_sequence(&self) -> bool {
        self.subtraces.is_empty()
    }

    pub fn subtrace(&self, index: usize) -> Option<&TraceRef> {
        self.subtraces.get(index)
    }

    pub fn subtraces(&self) -> impl Iterator<Item = &TraceRef> {
        self.subtraces.iter()
    }

    /// State produced at each index
    pub fn states(&self) -> &Vector<Value> {
        &self.states
    }

    /// Number of indices whose subtrace has addressable choices
    pub fn num_nonempty(&self) -> usize {
        self.num_nonempty
    }
}

impl Trace for VectorTrace {
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
        for (i, sub) in self.subtraces.iter().enumerate() {
            map.insert_submap(Key::Index(i), sub.choices());
        }
        map
    }

    fn project(&self, selection: &AddressSet) -> f64 {
        self.subtraces
            .iter()
            .enumerate()
            .map(|(i, sub)| sub.project(&selection.get_key(&Key::Index(i))))
            .sum()
    }

    fn is_empty(&self) -> bool {
        self.num_nonempty == 0
    }

    fn kind(&self) -> &'static str {
        "VectorTrace"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Arguments of an unfold call, split into their roles
struct UnfoldArgs<'a> {
    len: usize,
    init: &'a Value,
    params: &'a [Value],
}

impl<'a> UnfoldArgs<'a> {
    fn parse(args: &'a [Value]) -> GenResult<Self> {
        match args {
            [len, init, params @ ..] => Ok(Self {
                len: len.as_usize()?,
                init,
                params,
            }),
            _ => Err(GenError::ArgumentCount {
                expected: 2,
                found: args.len(),
            }),
        }
    }

    fn kernel_args(&self, index: usize, state: Value) -> Vec<Value> {
        let mut args = Vec::with_capacity(self.params.len() + 2);
        args.push(Value::Usize(index));
        args.push(state);
        args.extend(self.params.iter().cloned());
        args
    }
}

/// What a revision does at each retained or appended index
#[derive(Clone, Copy)]
enum Revision<'a> {
    Update(&'a ChoiceMap),
    Regenerate(&'a AddressSet),
    Extend(&'a ChoiceMap),
}

/// Sequential combinator over a kernel generative function
#[derive(Clone, Debug)]
pub struct Unfold {
    id: FnId,
    name: String,
    kernel: GenFnRef,
    config: EngineConfig,
}

impl Unfold {
    pub fn new(kernel: GenFnRef) -> Self {
        Self {
            id: FnId::fresh(),
            name: format!("unfold({})", kernel.name()),
            kernel,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn kernel(&self) -> &GenFnRef {
        &self.kernel
    }

    fn previous<'t>(&self, trace: &'t TraceRef) -> GenResult<&'t VectorTrace> {
        let prev = downcast::<VectorTrace>(trace, "VectorTrace")?;
        self.id.check(prev.fn_id, &self.name)?;
        Ok(prev)
    }

    /// Constraints must sit under index keys below `len`
    fn check_constraints(&self, constraints: &ChoiceMap, len: usize) -> GenResult<()> {
        let visited: AddressSet = constraints
            .keys()
            .filter(|key| key.as_index().is_some_and(|i| i < len))
            .map(|key| Address::new(key.clone()))
            .collect();
        check_unvisited(&visited, constraints, &self.config, &self.name)
    }

    fn run_generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(VectorTrace, f64)> {
        let parsed = UnfoldArgs::parse(args)?;
        let mut trace = VectorTrace {
            fn_id: self.id,
            args: args.to_vec(),
            subtraces: Vector::new(),
            states: Vector::new(),
            retval: Value::List(Vector::new()),
            score: 0.0,
            noise: 0.0,
            num_nonempty: 0,
        };
        let mut weight = 0.0;
        let mut state = parsed.init.clone();
        for i in 0..parsed.len {
            let key = Key::Index(i);
            let sub = constraints.submap(&key)?;
            let (subtrace, w) = self
                .kernel
                .generate(&parsed.kernel_args(i, state), &sub, rng)
                .map_err(|e| e.under(&key))?;
            weight += w;
            state = subtrace.retval().clone();
            push(&mut trace, subtrace);
        }
        self.check_constraints(constraints, parsed.len)?;
        trace.retval = Value::List(trace.states.clone());
        Ok((trace, weight))
    }

    /// Delete, retain and append phases shared by update, regenerate and extend
    fn revise(
        &self,
        prev: &VectorTrace,
        args: &[Value],
        argdiffs: &[Diff],
        revision: Revision<'_>,
        rng: &mut dyn RngCore,
    ) -> GenResult<(VectorTrace, f64, Diff, ChoiceMap)> {
        let parsed = UnfoldArgs::parse(args)?;
        let prev_len = prev.len();
        let new_len = parsed.len;
        let params_unchanged = args.len() == prev.args.len()
            && (2..args.len()).all(|i| argdiff_at(argdiffs, i).is_no_change());
        let param_diffs: Vec<Diff> = (2..args.len()).map(|i| argdiff_at(argdiffs, i)).collect();

        match revision {
            Revision::Update(constraints) => {
                let unknown = constraints.leaf_addresses().into_iter().find(|addr| {
                    addr.first().as_index().map_or(true, |i| i >= prev_len)
                });
                if let Some(addr) = unknown {
                    return Err(GenError::NewAddressInUpdate(addr));
                }
                self.check_constraints(constraints, new_len)?;
            }
            Revision::Extend(constraints) => {
                if new_len < prev_len {
                    return Err(GenError::RemovedAddressInExtend(Address::new(new_len)));
                }
                self.check_constraints(constraints, new_len)?;
            }
            Revision::Regenerate(selection) => {
                let unknown = selection.leaf_addresses().into_iter().find(|addr| {
                    addr.first().as_index().map_or(true, |i| i >= prev_len)
                });
                if let Some(addr) = unknown {
                    return Err(GenError::SelectNewAddress(addr));
                }
            }
        }

        let mut trace = prev.clone();
        trace.args = args.to_vec();
        let mut weight = 0.0;
        let mut discarded = ChoiceMap::new();
        let mut changed = BTreeMap::new();

        // delete
        for i in new_len..prev_len {
            if let Some(removed) = prev.subtraces.get(i) {
                trace.score -= removed.score();
                trace.noise -= removed.noise();
                weight -= removed.score();
                if !removed.is_empty() {
                    trace.num_nonempty -= 1;
                }
                if let Revision::Update(_) = revision {
                    discarded.insert_submap(Key::Index(i), removed.choices());
                }
            }
        }
        if new_len < prev_len {
            log::trace!(target: "unfold", "{}: dropped indices {}..{}", self.name, new_len, prev_len);
            trace.subtraces.truncate(new_len);
            trace.states.truncate(new_len);
        }

        // retain
        let mut state_diff = argdiff_at(argdiffs, 1);
        for i in 0..prev_len.min(new_len) {
            let key = Key::Index(i);
            let old = prev.subtraces.get(i).ok_or_else(|| shape_mismatch(i, "missing subtrace"))?;
            let touched = match revision {
                Revision::Update(constraints) | Revision::Extend(constraints) => {
                    let at = Address::new(key.clone());
                    constraints.has_submap(&at) || constraints.has_value(&at)
                }
                Revision::Regenerate(selection) => !selection.get_key(&key).is_empty(),
            };
            if !touched && state_diff.is_no_change() && params_unchanged {
                state_diff = Diff::NoChange;
                continue;
            }

            let state = if i == 0 {
                parsed.init.clone()
            } else {
                trace.states.get(i - 1).cloned().unwrap_or(Value::Unit)
            };
            let kernel_args = parsed.kernel_args(i, state);
            let mut kernel_diffs = vec![Diff::NoChange, state_diff.clone()];
            kernel_diffs.extend(param_diffs.iter().cloned());

            let (new, w, retdiff) = match revision {
                Revision::Update(constraints) => {
                    let sub = constraints.submap(&key)?;
                    let outcome = self
                        .kernel
                        .update(old, &kernel_args, &kernel_diffs, &sub, rng)
                        .map_err(|e| kernel_error(e, i))?;
                    discarded.insert_submap(key.clone(), outcome.discarded);
                    (outcome.trace, outcome.weight, outcome.retdiff)
                }
                Revision::Regenerate(selection) => {
                    let sub = selection.get_key(&key);
                    let outcome = self
                        .kernel
                        .regenerate(old, &kernel_args, &kernel_diffs, &sub, rng)
                        .map_err(|e| kernel_error(e, i))?;
                    (outcome.trace, outcome.weight, outcome.retdiff)
                }
                Revision::Extend(constraints) => {
                    let sub = constraints.submap(&key)?;
                    let outcome = self
                        .kernel
                        .extend(old, &kernel_args, &kernel_diffs, &sub, rng)
                        .map_err(|e| kernel_error(e, i))?;
                    (outcome.trace, outcome.weight, outcome.retdiff)
                }
            };
            if new.kind() != old.kind() {
                return Err(shape_mismatch(
                    i,
                    &format!("{} became {}", old.kind(), new.kind()),
                ));
            }

            weight += w;
            trace.score += new.score() - old.score();
            trace.noise += new.noise() - old.noise();
            match (old.is_empty(), new.is_empty()) {
                (true, false) => trace.num_nonempty += 1,
                (false, true) => trace.num_nonempty -= 1,
                _ => {}
            }
            trace.states.set(i, new.retval().clone());
            trace.subtraces.set(i, new);
            if !retdiff.is_no_change() {
                changed.insert(i, retdiff.clone());
            }
            state_diff = retdiff;
        }

        // append
        for i in prev_len..new_len {
            let key = Key::Index(i);
            let sub = match revision {
                Revision::Update(_) => ChoiceMap::new(),
                Revision::Extend(constraints) => constraints.submap(&key)?,
                Revision::Regenerate(_) => ChoiceMap::new(),
            };
            let state = if i == 0 {
                parsed.init.clone()
            } else {
                trace.states.get(i - 1).cloned().unwrap_or(Value::Unit)
            };
            let (subtrace, w) = self
                .kernel
                .generate(&parsed.kernel_args(i, state), &sub, rng)
                .map_err(|e| e.under(&key))?;
            weight += w;
            push(&mut trace, subtrace);
        }
        if new_len > prev_len {
            log::trace!(target: "unfold", "{}: appended indices {}..{}", self.name, prev_len, new_len);
        }

        trace.retval = Value::List(trace.states.clone());
        let retdiff = SequenceDiff {
            prev_length: prev_len,
            new_length: new_len,
            changed,
        }
        .into_diff();
        Ok((trace, weight, retdiff, discarded))
    }
}

fn push(trace: &mut VectorTrace, subtrace: TraceRef) {
    trace.score += subtrace.score();
    trace.noise += subtrace.noise();
    if !subtrace.is_empty() {
        trace.num_nonempty += 1;
    }
    trace.states.push_back(subtrace.retval().clone());
    trace.subtraces.push_back(subtrace);
}

fn shape_mismatch(index: usize, reason: &str) -> GenError {
    GenError::KernelTraceShapeMismatch {
        index,
        reason: reason.to_string(),
    }
}

/// Re-root a kernel error; a rejected subtrace means the kernel is not type-stable
fn kernel_error(err: GenError, index: usize) -> GenError {
    match err {
        GenError::TraceMismatch { .. } => shape_mismatch(index, &err.to_string()),
        other => other.under(&Key::Index(index)),
    }
}

impl GenerativeFunction for Unfold {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        args: &[Value],
        constraints: &ChoiceMap,
        rng: &mut dyn RngCore,
    ) -> GenResult<(TraceRef, f64)> {
        let (trace, weight) = self.run_generate(args, constraints, rng)?;
        log::debug!(target: "unfold", "{}: generated {} steps, weight {:.4}", self.name, trace.len(), weight);
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
        if constraints.is_empty() && crate::diff::args_noop(&prev.args, args, argdiffs) {
            return Ok(UpdateOutcome::unchanged(trace));
        }
        let (new, weight, retdiff, discarded) =
            self.revise(prev, args, argdiffs, Revision::Update(constraints), rng)?;
        log::debug!(target: "unfold", "{}: update to {} steps, weight {:.4}", self.name, new.len(), weight);
        Ok(UpdateOutcome {
            trace: Arc::new(new),
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
        if selection.is_empty() && crate::diff::args_noop(&prev.args, args, argdiffs) {
            return Ok(RegenerateOutcome::unchanged(trace));
        }
        let (new, weight, retdiff, _) =
            self.revise(prev, args, argdiffs, Revision::Regenerate(selection), rng)?;
        log::debug!(target: "unfold", "{}: regenerate to {} steps, weight {:.4}", self.name, new.len(), weight);
        Ok(RegenerateOutcome {
            trace: Arc::new(new),
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
        if constraints.is_empty() && crate::diff::args_noop(&prev.args, args, argdiffs) {
            return Ok(ExtendOutcome::unchanged(trace));
        }
        let (new, weight, retdiff, _) =
            self.revise(prev, args, argdiffs, Revision::Extend(constraints), rng)?;
        log::debug!(target: "extend", "{}: extend to {} steps, weight {:.4}", self.name, new.len(), weight);
        Ok(ExtendOutcome {
            trace: Arc::new(new),
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
        let parsed = UnfoldArgs::parse(args)?;
        let mut weight = 0.0;
        let mut state = parsed.init.clone();
        let mut states = Vector::new();
        for i in 0..parsed.len {
            let key = Key::Index(i);
            let sub = choices.submap(&key)?;
            let (w, retval) = self
                .kernel
                .assess(&parsed.kernel_args(i, state), &sub, rng)
                .map_err(|e| e.under(&key))?;
            weight += w;
            states.push_back(retval.clone());
            state = retval;
        }
        self.check_constraints(choices, parsed.len)?;
        Ok((weight, Value::List(states)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;
    use crate::config::ConstraintPolicy;
    use crate::distributions::Normal;
    use crate::dynamic::{DynamicFn, Tracer};
    use crate::trace::same_trace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// state + N(0, 1) step at "delta"
    fn random_walk() -> Unfold {
        let kernel = DynamicFn::new("step", |t: &mut dyn Tracer, args: &[Value]| {
            let prev = args[1].as_f64()?;
            let delta = t.choice(&Normal, &[Value::F64(0.0), Value::F64(1.0)], "delta")?;
            Ok(Value::F64(prev + delta.as_f64()?))
        });
        Unfold::new(Arc::new(kernel))
    }

    fn args(len: usize) -> Vec<Value> {
        vec![Value::Usize(len), Value::F64(0.0)]
    }

    fn unchanged_len() -> Vec<Diff> {
        vec![Diff::UnknownChange, Diff::NoChange]
    }

    fn step_kernel(name: &str) -> DynamicFn {
        DynamicFn::new(name, |t: &mut dyn Tracer, args: &[Value]| {
            let prev = args[1].as_f64()?;
            let delta = t.choice(&Normal, &[Value::F64(0.0), Value::F64(1.0)], "delta")?;
            Ok(Value::F64(prev + delta.as_f64()?))
        })
    }

    /// Kernel whose revised traces do not come from the function that generated them
    #[derive(Debug)]
    struct Unstable {
        step: DynamicFn,
        other: DynamicFn,
    }

    impl GenerativeFunction for Unstable {
        fn name(&self) -> &str {
            "unstable"
        }

        fn generate(
            &self,
            args: &[Value],
            constraints: &ChoiceMap,
            rng: &mut dyn RngCore,
        ) -> GenResult<(TraceRef, f64)> {
            self.step.generate(args, constraints, rng)
        }

        fn update(
            &self,
            trace: &TraceRef,
            args: &[Value],
            argdiffs: &[Diff],
            constraints: &ChoiceMap,
            rng: &mut dyn RngCore,
        ) -> GenResult<UpdateOutcome> {
            self.other.update(trace, args, argdiffs, constraints, rng)
        }

        fn regenerate(
            &self,
            _trace: &TraceRef,
            args: &[Value],
            _argdiffs: &[Diff],
            _selection: &AddressSet,
            rng: &mut dyn RngCore,
        ) -> GenResult<RegenerateOutcome> {
            let nested = Unfold::new(Arc::new(step_kernel("nested")));
            let trace = nested.simulate(&[Value::Usize(1), args[1].clone()], rng)?;
            Ok(RegenerateOutcome {
                retdiff: Diff::UnknownChange,
                trace,
                weight: 0.0,
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
            self.step.extend(trace, args, argdiffs, constraints, rng)
        }

        fn assess(
            &self,
            args: &[Value],
            choices: &ChoiceMap,
            rng: &mut dyn RngCore,
        ) -> GenResult<(f64, Value)> {
            self.step.assess(args, choices, rng)
        }
    }

    fn unstable_walk() -> Unfold {
        Unfold::new(Arc::new(Unstable {
            step: step_kernel("step"),
            other: step_kernel("other"),
        }))
    }

    #[test]
    fn test_generate_threads_state() {
        let f = random_walk();
        let constraints = (0..3).fold(ChoiceMap::new(), |map, i| {
            map.with_value(addr!(i, "delta"), 1.0).unwrap()
        });
        let (trace, weight) = f
            .generate(&args(3), &constraints, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(
            trace.retval(),
            &Value::List(Vector::from(vec![Value::F64(1.0), Value::F64(2.0), Value::F64(3.0)]))
        );
        assert!((weight - trace.score()).abs() < 1e-12);
    }

    #[test]
    fn test_growth_preserves_prefix() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(1);
        let trace = f.simulate(&args(2), &mut rng).unwrap();
        let out = f
            .regenerate(&trace, &args(5), &unchanged_len(), &AddressSet::new(), &mut rng)
            .unwrap();

        let prev = trace.as_any().downcast_ref::<VectorTrace>().unwrap();
        let next = out.trace.as_any().downcast_ref::<VectorTrace>().unwrap();
        assert_eq!(next.len(), 5);
        for i in 0..2 {
            assert!(same_trace(prev.subtrace(i).unwrap(), next.subtrace(i).unwrap()));
        }
        let appended: f64 = (2..5).map(|i| next.subtrace(i).unwrap().score()).sum();
        assert!((next.score() - prev.score() - appended).abs() < 1e-9);
        assert_eq!(out.weight, 0.0);
        assert!(matches!(out.retdiff, Diff::Sequence(_)));
    }

    #[test]
    fn test_selecting_missing_index_fails() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(2);
        let trace = f.simulate(&args(2), &mut rng).unwrap();
        let err = f
            .regenerate(
                &trace,
                &args(2),
                &[Diff::NoChange, Diff::NoChange],
                &AddressSet::new().with(addr!(4, "delta")),
                &mut rng,
            )
            .unwrap_err();
        assert_eq!(err, GenError::SelectNewAddress(addr!(4, "delta")));
    }

    #[test]
    fn test_update_changes_downstream_states() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(3);
        let constraints = (0..3).fold(ChoiceMap::new(), |map, i| {
            map.with_value(addr!(i, "delta"), 1.0).unwrap()
        });
        let (trace, _) = f.generate(&args(3), &constraints, &mut rng).unwrap();

        let change = ChoiceMap::new().with_value(addr!(0, "delta"), 2.0).unwrap();
        let out = f
            .update(&trace, &args(3), &[Diff::NoChange, Diff::NoChange], &change, &mut rng)
            .unwrap();
        assert_eq!(
            out.trace.retval(),
            &Value::List(Vector::from(vec![Value::F64(2.0), Value::F64(3.0), Value::F64(4.0)]))
        );
        assert_eq!(out.discarded.get(&addr!(0, "delta")), Some(&Value::F64(1.0)));
        match out.retdiff {
            Diff::Sequence(diff) => assert_eq!(diff.changed.len(), 3),
            other => panic!("expected a sequence diff, got {:?}", other),
        }
    }

    #[test]
    fn test_update_rejects_constraints_on_new_indices() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(4);
        let trace = f.simulate(&args(1), &mut rng).unwrap();
        let constraints = ChoiceMap::new().with_value(addr!(2, "delta"), 0.0).unwrap();
        let err = f
            .update(&trace, &args(3), &unchanged_len(), &constraints, &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::NewAddressInUpdate(addr!(2, "delta")));
    }

    #[test]
    fn test_extend_cannot_shrink() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(5);
        let trace = f.simulate(&args(3), &mut rng).unwrap();
        let err = f
            .extend(&trace, &args(1), &unchanged_len(), &ChoiceMap::new(), &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::RemovedAddressInExtend(addr!(1)));
    }

    #[test]
    fn test_extend_with_constraints_on_new_steps() {
        let f = random_walk();
        let mut rng = StdRng::seed_from_u64(6);
        let trace = f.simulate(&args(1), &mut rng).unwrap();
        let constraints = ChoiceMap::new().with_value(addr!(1, "delta"), 0.5).unwrap();
        let out = f
            .extend(&trace, &args(2), &unchanged_len(), &constraints, &mut rng)
            .unwrap();
        let expected = -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.125;
        assert!((out.weight - expected).abs() < 1e-12);
        assert_eq!(out.trace.choices().get(&addr!(1, "delta")), Some(&Value::F64(0.5)));
    }

    #[test]
    fn test_kernel_rejecting_its_own_trace_is_a_shape_mismatch() {
        let f = unstable_walk();
        let mut rng = StdRng::seed_from_u64(7);
        let trace = f.simulate(&args(2), &mut rng).unwrap();
        let constraints = ChoiceMap::new().with_value(addr!(1, "delta"), 0.5).unwrap();
        let err = f
            .update(&trace, &args(2), &[Diff::NoChange, Diff::NoChange], &constraints, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GenError::KernelTraceShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn test_kernel_changing_trace_kind_is_a_shape_mismatch() {
        let f = unstable_walk();
        let mut rng = StdRng::seed_from_u64(8);
        let trace = f.simulate(&args(2), &mut rng).unwrap();
        let err = f
            .regenerate(
                &trace,
                &args(2),
                &[Diff::NoChange, Diff::NoChange],
                &AddressSet::new().with(addr!(0, "delta")),
                &mut rng,
            )
            .unwrap_err();
        match err {
            GenError::KernelTraceShapeMismatch { index, reason } => {
                assert_eq!(index, 0);
                assert_eq!(reason, "DynamicTrace became VectorTrace");
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_update_constraint_on_removed_index_follows_policy() {
        let mut rng = StdRng::seed_from_u64(9);
        let constraints = ChoiceMap::new().with_value(addr!(2, "delta"), 0.0).unwrap();

        let strict = random_walk();
        let trace = strict.simulate(&args(3), &mut rng).unwrap();
        let err = strict
            .update(&trace, &args(1), &unchanged_len(), &constraints, &mut rng)
            .unwrap_err();
        assert_eq!(err, GenError::UnvisitedConstraints(vec![addr!(2, "delta")]));

        let lenient = random_walk()
            .with_config(EngineConfig::new().constraint_policy(ConstraintPolicy::Warn));
        let trace = lenient.simulate(&args(3), &mut rng).unwrap();
        let out = lenient
            .update(&trace, &args(1), &unchanged_len(), &constraints, &mut rng)
            .unwrap();
        assert_eq!(out.trace.as_any().downcast_ref::<VectorTrace>().unwrap().len(), 1);
    }
}
