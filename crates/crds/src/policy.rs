//! Entity policy
//!
//! The set of mutating operations the operator may perform against the remote
//! counterpart of a resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A mutating operation on a remote Auth0 entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum EntityPolicy {
    /// Allows the operator to create the entity in the tenant
    #[serde(alias = "create")]
    Create,
    /// Allows the operator to update the entity in the tenant
    #[serde(alias = "update")]
    Update,
    /// Allows the operator to delete the entity from the tenant
    #[serde(alias = "delete")]
    Delete,
}

impl fmt::Display for EntityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Policy applied when a resource omits `policy`.
#[must_use]
pub fn default_policy() -> Vec<EntityPolicy> {
    vec![EntityPolicy::Create, EntityPolicy::Update, EntityPolicy::Delete]
}
