//! Engine configuration

/// What to do with constraints the function body never visited
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstraintPolicy {
    /// Fail the call with `UnvisitedConstraints`
    #[default]
    Error,
    /// Log the ignored addresses at `warn` and carry on
    Warn,
}

/// How a static generative function executes its node graph
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Walk the graph through the dynamic tracer on every call
    Interpreted,
    /// Run closures specialized per constraint schema, cached after first use
    #[default]
    Compiled,
}

/// Configuration shared by generative functions
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Handling of unvisited constraints
    pub constraint_policy: ConstraintPolicy,
    /// Execution strategy for static functions
    pub strategy: ExecutionStrategy,
}

impl EngineConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unvisited-constraint policy
    pub fn constraint_policy(mut self, policy: ConstraintPolicy) -> Self {
        self.constraint_policy = policy;
        self
    }

    /// Set the execution strategy
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Shorthand for the interpreted strategy
    pub fn interpreted() -> Self {
        Self::new().strategy(ExecutionStrategy::Interpreted)
    }

    /// Shorthand for the compiled strategy
    pub fn compiled() -> Self {
        Self::new().strategy(ExecutionStrategy::Compiled)
    }
}
