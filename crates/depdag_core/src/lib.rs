//! depdag Core Types
//!
//! Pure types shared by every depdag crate: function identities, resource
//! keys, task identifiers and millisecond response times. No I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{FunctionId, ResourceKey, TaskId, DEFAULT_NAMESPACE};
pub use time::ResponseTime;
