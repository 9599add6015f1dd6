//! Primitive distributions
//!
//! The engine only needs `sample` and `log_density`; anything implementing
//! [`Distribution`] can back a random choice. A few common families are
//! provided on top of `rand_distr`.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand_distr::Distribution as _;

use crate::error::{GenError, GenResult};
use crate::value::Value;

/// A primitive distribution over [`Value`]s, parameterized at each call site
pub trait Distribution: Send + Sync + fmt::Debug {
    /// Name used in error messages
    fn name(&self) -> &'static str;

    /// Draw a value
    fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> GenResult<Value>;

    /// Log-density (or log-mass) of `value`
    fn log_density(&self, value: &Value, params: &[Value]) -> GenResult<f64>;
}

/// Shared handle to a distribution
pub type DistRef = Arc<dyn Distribution>;

fn invalid(distribution: &str, reason: impl Into<String>) -> GenError {
    GenError::InvalidParameters {
        distribution: distribution.to_string(),
        reason: reason.into(),
    }
}

fn one_param(name: &str, params: &[Value]) -> GenResult<f64> {
    match params {
        [a] => a.as_f64(),
        _ => Err(invalid(name, format!("expected 1 parameter, got {}", params.len()))),
    }
}

fn two_params(name: &str, params: &[Value]) -> GenResult<(f64, f64)> {
    match params {
        [a, b] => Ok((a.as_f64()?, b.as_f64()?)),
        _ => Err(invalid(name, format!("expected 2 parameters, got {}", params.len()))),
    }
}

/// Normal distribution, parameters `(mean, std_dev)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Normal;

impl Normal {
    fn params(params: &[Value]) -> GenResult<(f64, f64)> {
        let (mu, sigma) = two_params("normal", params)?;
        if !(sigma > 0.0) || !sigma.is_finite() {
            return Err(invalid("normal", format!("std_dev must be positive, got {}", sigma)));
        }
        Ok((mu, sigma))
    }
}

impl Distribution for Normal {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> GenResult<Value> {
        let (mu, sigma) = Self::params(params)?;
        let normal =
            rand_distr::Normal::new(mu, sigma).map_err(|e| invalid("normal", e.to_string()))?;
        Ok(Value::F64(normal.sample(rng)))
    }

    fn log_density(&self, value: &Value, params: &[Value]) -> GenResult<f64> {
        let (mu, sigma) = Self::params(params)?;
        let z = (value.as_f64()? - mu) / sigma;
        Ok(-0.5 * (2.0 * PI).ln() - sigma.ln() - 0.5 * z * z)
    }
}

/// Bernoulli distribution over `bool`, parameter `(p)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Bernoulli;

impl Bernoulli {
    fn param(params: &[Value]) -> GenResult<f64> {
        let p = one_param("bernoulli", params)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid("bernoulli", format!("p must lie in [0, 1], got {}", p)));
        }
        Ok(p)
    }
}

impl Distribution for Bernoulli {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> GenResult<Value> {
        let p = Self::param(params)?;
        let bernoulli =
            rand_distr::Bernoulli::new(p).map_err(|e| invalid("bernoulli", e.to_string()))?;
        Ok(Value::Bool(bernoulli.sample(rng)))
    }

    fn log_density(&self, value: &Value, params: &[Value]) -> GenResult<f64> {
        let p = Self::param(params)?;
        Ok(if value.as_bool()? { p.ln() } else { (1.0 - p).ln() })
    }
}

/// Continuous uniform distribution, parameters `(low, high)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Uniform;

impl Uniform {
    fn params(params: &[Value]) -> GenResult<(f64, f64)> {
        let (low, high) = two_params("uniform", params)?;
        if !(low < high) || !low.is_finite() || !high.is_finite() {
            return Err(invalid(
                "uniform",
                format!("need finite low < high, got [{}, {})", low, high),
            ));
        }
        Ok((low, high))
    }
}

impl Distribution for Uniform {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> GenResult<Value> {
        let (low, high) = Self::params(params)?;
        Ok(Value::F64(rand_distr::Uniform::new(low, high).sample(rng)))
    }

    fn log_density(&self, value: &Value, params: &[Value]) -> GenResult<f64> {
        let (low, high) = Self::params(params)?;
        let x = value.as_f64()?;
        Ok(if (low..=high).contains(&x) {
            -(high - low).ln()
        } else {
            f64::NEG_INFINITY
        })
    }
}

/// Exponential distribution, parameter `(rate)`
#[derive(Clone, Copy, Debug, Default)]
pub struct Exponential;

impl Exponential {
    fn param(params: &[Value]) -> GenResult<f64> {
        let rate = one_param("exponential", params)?;
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(invalid("exponential", format!("rate must be positive, got {}", rate)));
        }
        Ok(rate)
    }
}

impl Distribution for Exponential {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> GenResult<Value> {
        let rate = Self::param(params)?;
        let exp = rand_distr::Exp::new(rate).map_err(|e| invalid("exponential", e.to_string()))?;
        Ok(Value::F64(exp.sample(rng)))
    }

    fn log_density(&self, value: &Value, params: &[Value]) -> GenResult<f64> {
        let rate = Self::param(params)?;
        let x = value.as_f64()?;
        Ok(if x >= 0.0 {
            rate.ln() - rate * x
        } else {
            f64::NEG_INFINITY
        })
    }
}

pub fn normal() -> DistRef {
    Arc::new(Normal)
}

pub fn bernoulli() -> DistRef {
    Arc::new(Bernoulli)
}

pub fn uniform() -> DistRef {
    Arc::new(Uniform)
}

pub fn exponential() -> DistRef {
    Arc::new(Exponential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn f(x: f64) -> Value {
        Value::F64(x)
    }

    #[test]
    fn test_normal_log_density() {
        let lp = Normal.log_density(&f(0.0), &[f(0.0), f(1.0)]).unwrap();
        assert!((lp - (-0.918_938_533_204_672_7)).abs() < 1e-12);

        let lp = Normal.log_density(&f(3.0), &[f(1.0), f(2.0)]).unwrap();
        let expected = -0.5 * (2.0 * PI).ln() - 2.0_f64.ln() - 0.5;
        assert!((lp - expected).abs() < 1e-12);
    }

    #[test]
    fn test_normal_rejects_bad_sigma() {
        let err = Normal.log_density(&f(0.0), &[f(0.0), f(-1.0)]).unwrap_err();
        assert!(matches!(err, GenError::InvalidParameters { .. }));
    }

    #[test]
    fn test_bernoulli_log_mass() {
        let lp = Bernoulli.log_density(&Value::Bool(true), &[f(0.25)]).unwrap();
        assert!((lp - 0.25_f64.ln()).abs() < 1e-12);
        let lp = Bernoulli.log_density(&Value::Bool(false), &[f(0.25)]).unwrap();
        assert!((lp - 0.75_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_support() {
        let params = [f(0.0), f(4.0)];
        assert!((Uniform.log_density(&f(1.0), &params).unwrap() + 4.0_f64.ln()).abs() < 1e-12);
        assert_eq!(Uniform.log_density(&f(5.0), &params).unwrap(), f64::NEG_INFINITY);
        assert!(Uniform.sample(&[f(1.0), f(1.0)], &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_samples_are_in_support() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = Uniform.sample(&[f(-1.0), f(1.0)], &mut rng).unwrap().as_f64().unwrap();
            assert!((-1.0..1.0).contains(&x));
            let y = Exponential.sample(&[f(2.0)], &mut rng).unwrap().as_f64().unwrap();
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn test_wrong_parameter_count() {
        let err = Normal.sample(&[f(0.0)], &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(err.to_string().contains("expected 2 parameters"));
    }
}
