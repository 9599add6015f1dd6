//! Change markers threaded through incremental recomputation
//!
//! Diffs are advisory: `UnknownChange` is always a safe answer, while
//! `NoChange` must only be reported when the value is known to be identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Change to a sequence-valued result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceDiff {
    pub prev_length: usize,
    pub new_length: usize,
    /// Retained indices whose element changed, with the element's diff
    pub changed: BTreeMap<usize, Diff>,
}

impl SequenceDiff {
    /// Collapse to `NoChange` when neither the length nor any retained element changed
    pub fn into_diff(self) -> Diff {
        if self.prev_length == self.new_length && self.changed.is_empty() {
            Diff::NoChange
        } else {
            Diff::Sequence(self)
        }
    }

    /// Signed change in length
    pub fn length_delta(&self) -> isize {
        self.new_length as isize - self.prev_length as isize
    }

    /// First index whose element changed or came into or out of existence
    pub fn first_changed(&self) -> Option<usize> {
        let resized = (self.prev_length != self.new_length)
            .then(|| self.prev_length.min(self.new_length));
        match (self.changed.keys().next().copied(), resized) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Change marker for an argument or a return value
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Diff {
    NoChange,
    #[default]
    UnknownChange,
    Sequence(SequenceDiff),
}

impl Diff {
    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange)
    }

    /// Diff between two known values: `NoChange` iff they compare equal
    pub fn between(old: &Value, new: &Value) -> Self {
        if old == new {
            Self::NoChange
        } else {
            Self::UnknownChange
        }
    }

    /// `NoChange` iff every diff is `NoChange`
    pub fn all_unchanged(diffs: &[Diff]) -> bool {
        diffs.iter().all(Diff::is_no_change)
    }
}

/// A value paired with its change marker
#[derive(Clone, Debug, PartialEq)]
pub struct Diffed {
    pub value: Value,
    pub diff: Diff,
}

impl Diffed {
    pub fn new(value: Value, diff: Diff) -> Self {
        Self { value, diff }
    }

    pub fn unchanged(value: Value) -> Self {
        Self::new(value, Diff::NoChange)
    }

    pub fn unknown(value: Value) -> Self {
        Self::new(value, Diff::UnknownChange)
    }
}

/// Argdiff at `index`, `UnknownChange` when the caller supplied fewer diffs than arguments
pub(crate) fn argdiff_at(argdiffs: &[Diff], index: usize) -> Diff {
    argdiffs.get(index).cloned().unwrap_or(Diff::UnknownChange)
}

/// True iff `argdiffs` covers all `arity` arguments with `NoChange`
pub(crate) fn args_unchanged(argdiffs: &[Diff], arity: usize) -> bool {
    argdiffs.len() >= arity && Diff::all_unchanged(&argdiffs[..arity])
}

/// True if revising a trace with `args` and `argdiffs` changes no argument
pub(crate) fn args_noop(prev_args: &[Value], args: &[Value], argdiffs: &[Diff]) -> bool {
    args.len() == prev_args.len() && args_unchanged(argdiffs, args.len())
}
