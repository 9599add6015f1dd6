//! Error types for fugue-gen
//!
//! Every protocol operation is all-or-nothing: on error no trace is returned
//! and the input trace stays valid.

use std::fmt;

use thiserror::Error;

use crate::address::{Address, Key};

/// Role an address plays inside a choice map or trace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressKind {
    /// Address holds a value (a random choice)
    Value,
    /// Address holds a sub-tree (a sub-map or sub-call)
    Submap,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Submap => write!(f, "sub-map"),
        }
    }
}

/// Error type for generative function execution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenError {
    /// A value was expected but a sub-tree was found, or vice versa
    #[error("Address kind mismatch at {address}: expected {expected}, found {found}")]
    AddressKindMismatch {
        address: Address,
        expected: AddressKind,
        found: AddressKind,
    },

    /// Update was given constraints at an address the trace does not have
    #[error("Update constrains new address {0}")]
    NewAddressInUpdate(Address),

    /// Regenerate was given a selection naming an address the trace does not have
    #[error("Selection names address {0} that does not exist in the trace")]
    SelectNewAddress(Address),

    /// A read against a choice map or parameter store missed
    #[error("Address not found: {0}")]
    AddressNotFound(Address),

    /// The function body reported its return-value diff twice
    #[error("Return value diff already set")]
    RetdiffAlreadySet,

    /// A retained kernel trace changed type or shape across an update
    #[error("Kernel trace shape mismatch at index {index}: {reason}")]
    KernelTraceShapeMismatch { index: usize, reason: String },

    /// The function body visited the same address twice
    #[error("Address visited twice: {0}")]
    DuplicateAddress(Address),

    /// A sub-call address is bound to a different generative function than before
    #[error("Generative function changed at {0}")]
    CalleeChanged(Address),

    /// Extend was given constraints at an address the trace already has
    #[error("Extend constrains existing address {0}")]
    ExistingAddressInExtend(Address),

    /// Extend would remove an address from the trace
    #[error("Extend removes address {0}")]
    RemovedAddressInExtend(Address),

    /// Constraints were supplied that the function never visited
    #[error("Constraints not visited: {}", join_addresses(.0))]
    UnvisitedConstraints(Vec<Address>),

    /// A trace produced by another generative function was handed in
    #[error("Trace mismatch: expected {expected}, found {found}")]
    TraceMismatch { expected: String, found: String },

    /// A value had the wrong dynamic type
    #[error("Type mismatch: expected {expected}, found {found}")]
    ValueType { expected: String, found: String },

    /// Wrong number of arguments
    #[error("Argument count mismatch: expected {expected}, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    /// Distribution parameters are out of their domain
    #[error("Invalid parameters for {distribution}: {reason}")]
    InvalidParameters { distribution: String, reason: String },

    /// A static node graph is malformed
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
}

impl GenError {
    /// Re-root every address carried by this error under `key`.
    ///
    /// Used when an error crosses a sub-call boundary, so the reported address is
    /// the full path from the outermost call.
    pub fn under(self, key: &Key) -> Self {
        let prefix = |a: Address| a.prefixed(key.clone());
        match self {
            Self::AddressKindMismatch {
                address,
                expected,
                found,
            } => Self::AddressKindMismatch {
                address: prefix(address),
                expected,
                found,
            },
            Self::NewAddressInUpdate(a) => Self::NewAddressInUpdate(prefix(a)),
            Self::SelectNewAddress(a) => Self::SelectNewAddress(prefix(a)),
            Self::AddressNotFound(a) => Self::AddressNotFound(prefix(a)),
            Self::DuplicateAddress(a) => Self::DuplicateAddress(prefix(a)),
            Self::CalleeChanged(a) => Self::CalleeChanged(prefix(a)),
            Self::ExistingAddressInExtend(a) => Self::ExistingAddressInExtend(prefix(a)),
            Self::RemovedAddressInExtend(a) => Self::RemovedAddressInExtend(prefix(a)),
            Self::UnvisitedConstraints(addrs) => {
                Self::UnvisitedConstraints(addrs.into_iter().map(prefix).collect())
            }
            other => other,
        }
    }

    /// Re-root under every key of `address`, outermost first
    pub fn under_address(self, address: &Address) -> Self {
        address.keys().iter().rev().fold(self, |err, key| err.under(key))
    }

    pub(crate) fn kind_mismatch(address: Address, expected: AddressKind) -> Self {
        let found = match expected {
            AddressKind::Value => AddressKind::Submap,
            AddressKind::Submap => AddressKind::Value,
        };
        Self::AddressKindMismatch {
            address,
            expected,
            found,
        }
    }
}

fn join_addresses(addrs: &[Address]) -> String {
    addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for generative function operations
pub type GenResult<T> = Result<T, GenError>;
