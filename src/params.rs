//! Parameter store boundary
//!
//! Trainable parameters live outside traces in a process-wide store. Model
//! bodies only read them; gradient accumulation belongs to the optimizer side.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::address::Address;
use crate::error::{GenError, GenResult};
use crate::value::Value;

/// Named parameter storage shared between generative functions and optimizers
pub trait ParamStore: Send + Sync {
    /// Current value of `name`
    fn get_param(&self, name: &str) -> GenResult<Value>;

    /// Overwrite the value of an existing parameter
    fn set_param(&self, name: &str, value: Value) -> GenResult<()>;

    /// Accumulated gradient of `name`
    fn get_param_grad(&self, name: &str) -> GenResult<f64>;

    /// Reset the accumulated gradient of `name` to zero
    fn zero_param_grad(&self, name: &str) -> GenResult<()>;

    /// Create (or reset) `name` with `value` and a zero gradient
    fn init_param(&self, name: &str, value: Value);
}

#[derive(Clone, Debug)]
struct ParamEntry {
    value: Value,
    grad: f64,
}

/// In-process parameter store guarded by a read-write lock
#[derive(Debug, Default)]
pub struct InMemoryParamStore {
    entries: RwLock<HashMap<String, ParamEntry>>,
}

impl InMemoryParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the gradient of `name`
    pub fn accumulate_grad(&self, name: &str, delta: f64) -> GenResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(name).ok_or_else(|| missing(name))?;
        entry.grad += delta;
        Ok(())
    }

    /// Names of all parameters, sorted
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}

fn missing(name: &str) -> GenError {
    GenError::AddressNotFound(Address::from(name))
}

impl ParamStore for InMemoryParamStore {
    fn get_param(&self, name: &str) -> GenResult<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| missing(name))
    }

    fn set_param(&self, name: &str, value: Value) -> GenResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(name).ok_or_else(|| missing(name))?;
        entry.value = value;
        Ok(())
    }

    fn get_param_grad(&self, name: &str) -> GenResult<f64> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .map(|entry| entry.grad)
            .ok_or_else(|| missing(name))
    }

    fn zero_param_grad(&self, name: &str) -> GenResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(name).ok_or_else(|| missing(name))?;
        entry.grad = 0.0;
        Ok(())
    }

    fn init_param(&self, name: &str, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(name.to_string(), ParamEntry { value, grad: 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_get_set() {
        let store = InMemoryParamStore::new();
        store.init_param("theta", Value::F64(0.5));
        assert_eq!(store.get_param("theta").unwrap(), Value::F64(0.5));

        store.set_param("theta", Value::F64(1.5)).unwrap();
        assert_eq!(store.get_param("theta").unwrap(), Value::F64(1.5));
        assert_eq!(store.names(), vec!["theta".to_string()]);
    }

    #[test]
    fn test_missing_param_is_not_found() {
        let store = InMemoryParamStore::new();
        assert_eq!(
            store.get_param("nope"),
            Err(GenError::AddressNotFound(Address::from("nope")))
        );
        assert!(store.set_param("nope", Value::Unit).is_err());
    }

    #[test]
    fn test_gradient_accumulation() {
        let store = InMemoryParamStore::new();
        store.init_param("w", Value::F64(0.0));
        store.accumulate_grad("w", 1.5).unwrap();
        store.accumulate_grad("w", 0.5).unwrap();
        assert_eq!(store.get_param_grad("w").unwrap(), 2.0);
        store.zero_param_grad("w").unwrap();
        assert_eq!(store.get_param_grad("w").unwrap(), 0.0);
    }
}
