//! Reference resolver.
//!
//! Turns a reference into a concrete remote identifier. Resolution is pure: local targets
//! are looked up through a [`ReferenceLookup`] snapshot and nothing is fetched here. A
//! remote id always wins over a local name and skips the lookup entirely.

use crate::error::ReconcileError;
use crate::view::{ResourceKey, ResourceView};
use auth0_client::ResourceKind;
use serde::Deserialize;
use std::fmt;

/// A reference in kind-agnostic form
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Resource server identifier, only meaningful for audience references
    #[serde(default)]
    pub identifier: Option<String>,
}

impl From<&crds::TenantReference> for Reference {
    fn from(reference: &crds::TenantReference) -> Self {
        Self {
            namespace: reference.namespace.clone(),
            name: Some(reference.name.clone()),
            ..Default::default()
        }
    }
}

/// Which identity of the target a reference resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    /// `status.id`
    Id,
    /// `status.identifier`
    Identifier,
}

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Concrete identifier, ready for use
    Value(String),
    /// Only a remote id is known; the identifier must be read from the remote
    RemoteIdentifier {
        /// Kind of the remote object
        kind: ResourceKind,
        /// Its remote id
        id: String,
    },
}

/// Why a reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The local target does not exist
    NotFound(ResourceKey),
    /// The local target exists but has no remote identity yet
    NotReady(ResourceKey),
    /// The reference names neither a local target nor a remote id
    Ambiguous(&'static str),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "{key} does not exist"),
            Self::NotReady(key) => write!(f, "{key} has no remote identity yet"),
            Self::Ambiguous(field) => write!(f, "{field} sets neither name nor id"),
        }
    }
}

impl From<ResolveError> for ReconcileError {
    fn from(error: ResolveError) -> Self {
        let message = error.to_string();
        match error {
            ResolveError::NotFound(_) => Self::ReferenceNotFound(message),
            ResolveError::NotReady(_) => Self::ReferenceNotReady(message),
            ResolveError::Ambiguous(_) => Self::ReferenceAmbiguous(message),
        }
    }
}

/// Read access to local resources during resolution
pub trait ReferenceLookup {
    /// The resource stored under `key`, if any
    fn lookup(&self, key: &ResourceKey) -> Option<&ResourceView>;
}

/// Local key a reference points at, when it points at one
#[must_use]
pub fn local_key(reference: &Reference, target: ResourceKind, namespace: &str) -> Option<ResourceKey> {
    reference.name.as_ref().map(|name| {
        ResourceKey::new(
            target,
            reference.namespace.as_deref().unwrap_or(namespace),
            name.as_str(),
        )
    })
}

/// Whether resolving `reference` needs the local target
#[must_use]
pub fn needs_lookup(reference: &Reference, wants: IdentityField) -> bool {
    let direct = match wants {
        IdentityField::Id => reference.id.is_some(),
        IdentityField::Identifier => reference.identifier.is_some() || reference.id.is_some(),
    };
    !direct && reference.name.is_some()
}

/// Resolve a reference
///
/// # Arguments
/// * `field` - Name of the referencing field, used in error messages
/// * `reference` - The reference
/// * `target` - Kind the reference points at
/// * `wants` - Which identity of the target is needed
/// * `namespace` - Namespace of the referencing resource, the default for local lookups
/// * `lookup` - Snapshot of local resources
pub fn resolve(
    field: &'static str,
    reference: &Reference,
    target: ResourceKind,
    wants: IdentityField,
    namespace: &str,
    lookup: &impl ReferenceLookup,
) -> Result<Resolution, ResolveError> {
    if wants == IdentityField::Identifier {
        if let Some(identifier) = &reference.identifier {
            return Ok(Resolution::Value(identifier.clone()));
        }
    }
    if let Some(id) = &reference.id {
        return Ok(match wants {
            IdentityField::Id => Resolution::Value(id.clone()),
            IdentityField::Identifier => Resolution::RemoteIdentifier {
                kind: target,
                id: id.clone(),
            },
        });
    }

    let key = local_key(reference, target, namespace).ok_or(ResolveError::Ambiguous(field))?;
    let view = lookup
        .lookup(&key)
        .ok_or_else(|| ResolveError::NotFound(key.clone()))?;
    let value = match wants {
        IdentityField::Id => view.status.id.clone(),
        IdentityField::Identifier => view.status.identifier.clone(),
    };
    value
        .map(Resolution::Value)
        .ok_or(ResolveError::NotReady(key))
}
