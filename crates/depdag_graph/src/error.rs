//! Errors for graph validation and ordering.

use depdag_core::FunctionId;

/// Graph result type
pub type GraphResult<T> = Result<T, GraphError>;

fn join_ids(ids: &[FunctionId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Graph error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The node set contains a call cycle
    #[error("cycle detected among functions: [{}]", join_ids(.unresolved))]
    Cycle {
        /// Functions that could not be ordered
        unresolved: Vec<FunctionId>,
    },

    /// Two nodes share one function identity
    #[error("duplicate function node: {function}")]
    DuplicateFunction {
        /// Repeated identity
        function: FunctionId,
    },

    /// An edge declares a zero call multiplier
    #[error("edge {edge_id} from {caller} to {target} has a zero multiplier")]
    ZeroMultiplier {
        /// Calling function
        caller: FunctionId,
        /// Invoked function
        target: FunctionId,
        /// Edge group id
        edge_id: u32,
    },

    /// A function reference has an empty namespace or name
    #[error("empty function reference in {context}")]
    EmptyName {
        /// Where the reference appeared
        context: String,
    },

    /// Graph exceeds the configured node limit
    #[error("graph has {count} nodes, limit is {max}")]
    TooManyNodes {
        /// Node count
        count: usize,
        /// Configured limit
        max: usize,
    },
}
