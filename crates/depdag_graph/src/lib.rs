//! depdag Graph Model
//!
//! Declared call graphs among deployed functions, their structural
//! validation, and the leaf-first ordering the aggregation engine walks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod graph;
pub mod order;
pub mod validate;

pub use error::{GraphError, GraphResult};
pub use graph::{DependencyGraph, FunctionNode, InvocationEdge};
pub use order::{leaf_layers, order_leaf_first, OrderedGraph};
pub use validate::Validator;
