//! Identifiers for depdag entities.
//!
//! Functions and tracked resources are both addressed by a structured
//! (namespace, name) pair. Equality and hashing are structural, so two
//! functions with the same name in different namespaces never collide.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Namespace assumed when a reference omits one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Splits `namespace/name` (or a bare `name`) into its two parts.
fn split_qualified(kind: &str, s: &str) -> Result<(String, String), CoreError> {
    let (namespace, name) = match s.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (DEFAULT_NAMESPACE, s),
    };

    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return Err(CoreError::InvalidId {
            reason: format!("{} reference '{}' is not of the form [namespace/]name", kind, s),
        });
    }

    Ok((namespace.to_string(), name.to_string()))
}

/// Function identity - the (namespace, name) of a deployed function
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    /// Namespace the function is deployed in
    pub namespace: String,
    /// Function name
    pub name: String,
}

impl FunctionId {
    /// Create a new function identity
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an identity in the default namespace
    #[must_use]
    pub fn in_default(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, name)
    }

    /// Get namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for FunctionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = split_qualified("function", s)?;
        Ok(Self { namespace, name })
    }
}

/// Resource key - identifies one tracked dependency graph resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Namespace of the resource
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// Create a new resource key
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = split_qualified("resource", s)?;
        Ok(Self { namespace, name })
    }
}

/// Task identifier - identifies one spawned periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new random TaskId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{}", self.0)
    }
}
