//! Property-based tests for fugue-gen
//!
//! Uses proptest to verify the protocol laws that hold for every generative
//! function and every choice map.

use std::sync::Arc;

use fugue_gen::prelude::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// y ~ N(mu, 1)
fn inner() -> GenFnRef {
    Arc::new(DynamicFn::new("inner", |t: &mut dyn Tracer, args: &[Value]| {
        t.choice(&Normal, &[args[0].clone(), Value::F64(1.0)], "y")
    }))
}

/// mu ~ N(0, 1); b ~ Bernoulli(0.5); if b then sub ~ inner(mu); x ~ N(mu, 1)
fn branching() -> DynamicFn {
    let callee = inner();
    DynamicFn::new("branching", move |t: &mut dyn Tracer, _args: &[Value]| {
        let mu = t.choice(&Normal, &[Value::F64(0.0), Value::F64(1.0)], "mu")?;
        let b = t.choice(&Bernoulli, &[Value::F64(0.5)], "b")?;
        if b.as_bool()? {
            t.call(&callee, vec![mu.clone()], "sub")?;
        }
        t.choice(&Normal, &[mu, Value::F64(1.0)], "x")
    })
}

/// x_i = x_{i-1} + N(0, 1) at "delta"
fn random_walk() -> Unfold {
    let kernel = DynamicFn::new("step", |t: &mut dyn Tracer, args: &[Value]| {
        let prev = args[1].as_f64()?;
        let delta = t.choice(&Normal, &[Value::F64(0.0), Value::F64(1.0)], "delta")?;
        Ok(Value::F64(prev + delta.as_f64()?))
    });
    Unfold::new(Arc::new(kernel))
}

fn walk_args(len: usize) -> Vec<Value> {
    vec![Value::Usize(len), Value::F64(0.0)]
}

fn vector(trace: &TraceRef) -> &VectorTrace {
    trace.as_any().downcast_ref::<VectorTrace>().unwrap()
}

/// Score of a dynamic trace recomputed from its records, recursing into sub-calls
fn recomputed_score(trace: &TraceRef) -> f64 {
    match trace.as_any().downcast_ref::<DynamicTrace>() {
        Some(dynamic) => dynamic
            .records()
            .map(|(_, record)| match record {
                Record::Choice { score, .. } => *score,
                Record::Call { trace, .. } => recomputed_score(trace),
            })
            .sum(),
        None => trace.score(),
    }
}

fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        prop::sample::select(vec!["a", "b", "c"]).prop_map(Key::from),
        (0usize..3).prop_map(Key::Index),
    ]
}

fn address_strategy() -> impl Strategy<Value = Address> {
    prop::collection::vec(key_strategy(), 1..4)
        .prop_map(|keys| Address::from_keys(keys).unwrap())
}

fn choice_map_strategy() -> impl Strategy<Value = ChoiceMap> {
    prop::collection::vec((address_strategy(), -5.0..5.0f64), 0..8).prop_map(|entries| {
        let mut map = ChoiceMap::new();
        for (addr, v) in entries {
            // conflicting value/sub-map shapes are skipped
            let _ = map.set_value(&addr, Value::F64(v));
        }
        map
    })
}

fn address_set_strategy() -> impl Strategy<Value = AddressSet> {
    prop::collection::vec(address_strategy(), 0..6)
        .prop_map(|addrs| addrs.into_iter().collect())
}

proptest! {
    // ==================== Choice Map Properties ====================

    #[test]
    fn visited_duality(visited in address_set_strategy(), choices in choice_map_strategy()) {
        prop_assert_eq!(
            all_visited(&visited, &choices),
            get_unvisited(&visited, &choices).is_empty()
        );
    }

    #[test]
    fn everything_visits_all(choices in choice_map_strategy()) {
        prop_assert!(all_visited(&AddressSet::all(), &choices));
        prop_assert_eq!(
            all_visited(&AddressSet::new(), &choices),
            choices.is_empty()
        );
    }

    // ==================== Protocol Laws ====================

    #[test]
    fn full_constraints_weight_equals_score(
        mu in -3.0..3.0f64,
        x in -3.0..3.0f64,
        y in -3.0..3.0f64,
        b in any::<bool>(),
        seed in any::<u64>()
    ) {
        let f = branching();
        let mut constraints = ChoiceMap::new()
            .with_value(addr!("mu"), mu).unwrap()
            .with_value(addr!("b"), b).unwrap()
            .with_value(addr!("x"), x).unwrap();
        if b {
            constraints = constraints.with_value(addr!("sub", "y"), y).unwrap();
        }
        let (trace, weight) = f
            .generate(&[], &constraints, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        prop_assert!((weight - trace.score()).abs() < 1e-9);
        prop_assert_eq!(trace.choices(), constraints);
    }

    #[test]
    fn update_noop_returns_same_trace(seed in any::<u64>()) {
        let f = branching();
        let mut rng = StdRng::seed_from_u64(seed);
        let trace = f.simulate(&[], &mut rng).unwrap();
        let out = f.update(&trace, &[], &[], &ChoiceMap::new(), &mut rng).unwrap();
        prop_assert!(same_trace(&out.trace, &trace));
        prop_assert_eq!(out.weight, 0.0);
        prop_assert_eq!(out.retdiff, Diff::NoChange);
        prop_assert!(out.discarded.is_empty());
    }

    #[test]
    fn regenerate_empty_selection_returns_same_trace(seed in any::<u64>(), len in 0usize..6) {
        let mut rng = StdRng::seed_from_u64(seed);

        let f = branching();
        let trace = f.simulate(&[], &mut rng).unwrap();
        let out = f.regenerate(&trace, &[], &[], &AddressSet::new(), &mut rng).unwrap();
        prop_assert!(same_trace(&out.trace, &trace));
        prop_assert_eq!(out.weight, 0.0);

        let walk = random_walk();
        let trace = walk.simulate(&walk_args(len), &mut rng).unwrap();
        let out = walk
            .regenerate(&trace, &walk_args(len), &[Diff::NoChange, Diff::NoChange], &AddressSet::new(), &mut rng)
            .unwrap();
        prop_assert!(same_trace(&out.trace, &trace));
        prop_assert_eq!(out.weight, 0.0);
        prop_assert_eq!(out.retdiff, Diff::NoChange);
    }

    #[test]
    fn score_is_sum_of_records(seed in any::<u64>(), x in -3.0..3.0f64) {
        let f = branching();
        let mut rng = StdRng::seed_from_u64(seed);
        let trace = f.simulate(&[], &mut rng).unwrap();
        prop_assert!((trace.score() - recomputed_score(&trace)).abs() < 1e-9);

        let constraints = ChoiceMap::new().with_value(addr!("x"), x).unwrap();
        let out = f.update(&trace, &[], &[], &constraints, &mut rng).unwrap();
        prop_assert!((out.trace.score() - recomputed_score(&out.trace)).abs() < 1e-9);

        let out = f
            .regenerate(&out.trace, &[], &[], &AddressSet::new().with(addr!("b")), &mut rng)
            .unwrap();
        prop_assert!((out.trace.score() - recomputed_score(&out.trace)).abs() < 1e-9);
    }

    #[test]
    fn update_weight_is_score_difference(seed in any::<u64>(), x in -3.0..3.0f64) {
        let f = branching();
        let mut rng = StdRng::seed_from_u64(seed);
        let trace = f.simulate(&[], &mut rng).unwrap();
        let constraints = ChoiceMap::new().with_value(addr!("x"), x).unwrap();
        let out = f.update(&trace, &[], &[], &constraints, &mut rng).unwrap();
        prop_assert!((out.weight - (out.trace.score() - trace.score())).abs() < 1e-9);
        let prev_choices = trace.choices();
        prop_assert_eq!(out.discarded.get(&addr!("x")), prev_choices.get(&addr!("x")));
    }

    #[test]
    fn project_empty_is_noise(seed in any::<u64>(), len in 0usize..5) {
        let mut rng = StdRng::seed_from_u64(seed);
        let walk = random_walk();
        let trace = walk.simulate(&walk_args(len), &mut rng).unwrap();
        prop_assert!((trace.project(&AddressSet::new()) - trace.noise()).abs() < 1e-12);
        prop_assert!((trace.project(&AddressSet::all()) - trace.score() - trace.noise()).abs() < 1e-9);
    }

    // ==================== Unfold Properties ====================

    #[test]
    fn unfold_growth_preserves_prefix(seed in any::<u64>(), len in 0usize..6, extra in 0usize..4) {
        let walk = random_walk();
        let mut rng = StdRng::seed_from_u64(seed);
        let trace = walk.simulate(&walk_args(len), &mut rng).unwrap();
        let out = walk
            .regenerate(
                &trace,
                &walk_args(len + extra),
                &[Diff::UnknownChange, Diff::NoChange],
                &AddressSet::new(),
                &mut rng,
            )
            .unwrap();

        let prev = vector(&trace);
        let next = vector(&out.trace);
        prop_assert_eq!(next.len(), len + extra);
        for i in 0..len {
            prop_assert!(same_trace(prev.subtrace(i).unwrap(), next.subtrace(i).unwrap()));
        }
        let appended: f64 = (len..len + extra).map(|i| next.subtrace(i).unwrap().score()).sum();
        prop_assert!((next.score() - prev.score() - appended).abs() < 1e-9);
        prop_assert_eq!(out.weight, 0.0);
    }

    #[test]
    fn unfold_shrink_drops_suffix(seed in any::<u64>(), len in 1usize..7, cut in 0usize..7) {
        let cut = cut.min(len);
        let walk = random_walk();
        let mut rng = StdRng::seed_from_u64(seed);
        let trace = walk.simulate(&walk_args(len), &mut rng).unwrap();
        let out = walk
            .regenerate(
                &trace,
                &walk_args(len - cut),
                &[Diff::UnknownChange, Diff::NoChange],
                &AddressSet::new(),
                &mut rng,
            )
            .unwrap();

        let prev = vector(&trace);
        let next = vector(&out.trace);
        let removed: Vec<&TraceRef> = (len - cut..len).map(|i| prev.subtrace(i).unwrap()).collect();
        let removed_score: f64 = removed.iter().map(|t| t.score()).sum();
        let removed_noise: f64 = removed.iter().map(|t| t.noise()).sum();
        let removed_nonempty = removed.iter().filter(|t| !t.is_empty()).count();

        prop_assert_eq!(next.len(), len - cut);
        prop_assert!((prev.score() - next.score() - removed_score).abs() < 1e-9);
        prop_assert!((prev.noise() - next.noise() - removed_noise).abs() < 1e-9);
        prop_assert_eq!(prev.num_nonempty() - next.num_nonempty(), removed_nonempty);
        prop_assert!((out.weight + removed_score).abs() < 1e-9);
    }
}
