//! Particle batches
//!
//! Runs one protocol operation over many independent particles. Particle `i`
//! draws from its own `StdRng` seeded with `seed + i`, so results do not
//! depend on whether the batch runs on rayon's pool or sequentially.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::choices::ChoiceMap;
use crate::diff::Diff;
use crate::error::GenResult;
use crate::gen_fn::GenerativeFunction;
use crate::trace::{TraceRef, UpdateOutcome};
use crate::value::Value;

fn particle_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(index as u64))
}

/// Simulate `n` independent traces of `gen_fn`
#[cfg(feature = "parallel")]
pub fn simulate_batch<G>(gen_fn: &G, args: &[Value], n: usize, seed: u64) -> GenResult<Vec<TraceRef>>
where
    G: GenerativeFunction + ?Sized,
{
    (0..n)
        .into_par_iter()
        .map(|i| gen_fn.simulate(args, &mut particle_rng(seed, i)))
        .collect()
}

/// Simulate `n` independent traces of `gen_fn` (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn simulate_batch<G>(gen_fn: &G, args: &[Value], n: usize, seed: u64) -> GenResult<Vec<TraceRef>>
where
    G: GenerativeFunction + ?Sized,
{
    (0..n)
        .map(|i| gen_fn.simulate(args, &mut particle_rng(seed, i)))
        .collect()
}

/// Apply the same constraints and argument change to every trace of `gen_fn`
#[cfg(feature = "parallel")]
pub fn update_batch<G>(
    gen_fn: &G,
    traces: &[TraceRef],
    args: &[Value],
    argdiffs: &[Diff],
    constraints: &ChoiceMap,
    seed: u64,
) -> GenResult<Vec<UpdateOutcome>>
where
    G: GenerativeFunction + ?Sized,
{
    traces
        .par_iter()
        .enumerate()
        .map(|(i, trace)| {
            gen_fn.update(trace, args, argdiffs, constraints, &mut particle_rng(seed, i))
        })
        .collect()
}

/// Apply the same update to every trace (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn update_batch<G>(
    gen_fn: &G,
    traces: &[TraceRef],
    args: &[Value],
    argdiffs: &[Diff],
    constraints: &ChoiceMap,
    seed: u64,
) -> GenResult<Vec<UpdateOutcome>>
where
    G: GenerativeFunction + ?Sized,
{
    traces
        .iter()
        .enumerate()
        .map(|(i, trace)| {
            gen_fn.update(trace, args, argdiffs, constraints, &mut particle_rng(seed, i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;
    use crate::distributions::Normal;
    use crate::dynamic::{DynamicFn, Tracer};

    fn model() -> DynamicFn {
        DynamicFn::new("model", |t: &mut dyn Tracer, _args: &[Value]| {
            let mu = t.choice(&Normal, &[Value::F64(0.0), Value::F64(1.0)], "mu")?;
            t.choice(&Normal, &[mu, Value::F64(1.0)], "x")
        })
    }

    #[test]
    fn test_simulate_batch_is_seeded_per_particle() {
        let f = model();
        let a = simulate_batch(&f, &[], 8, 42).unwrap();
        let b = simulate_batch(&f, &[], 8, 42).unwrap();
        assert_eq!(a.len(), 8);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.choices(), y.choices());
            assert_eq!(x.score(), y.score());
        }
        assert_ne!(a[0].choices(), a[1].choices());

        let single = f.simulate(&[], &mut particle_rng(42, 3)).unwrap();
        assert_eq!(single.choices(), a[3].choices());
    }

    #[test]
    fn test_update_batch_conditions_every_particle() {
        let f = model();
        let traces = simulate_batch(&f, &[], 4, 7).unwrap();
        let constraints = ChoiceMap::new().with_value(addr!("x"), 0.25).unwrap();
        let outcomes = update_batch(&f, &traces, &[], &[], &constraints, 8).unwrap();

        for (prev, out) in traces.iter().zip(&outcomes) {
            assert_eq!(out.trace.choices().get(&addr!("x")), Some(&Value::F64(0.25)));
            assert_eq!(out.discarded.get(&addr!("x")), prev.choices().get(&addr!("x")));
            let expected = out.trace.score() - prev.score();
            assert!((out.weight - expected).abs() < 1e-9);
        }
    }
}
