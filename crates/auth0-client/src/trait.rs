//! Auth0ClientTrait for mocking
//!
//! This trait abstracts the Management API client so the reconciler can be driven by
//! the in-memory mock in unit tests. The concrete `Auth0Client` implements it.

use crate::error::Auth0Error;
use crate::models::{FindDescriptor, RemoteObject, ResourceKind, TenantAccess};
use serde_json::Value;

/// Remote state operations against an Auth0 tenant
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Errors are classified through [`Auth0Error::classify`].
#[async_trait::async_trait]
pub trait Auth0ClientTrait: Send + Sync {
    /// Locate a pre-existing object; `Ok(None)` when nothing matches
    async fn find(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        descriptor: &FindDescriptor,
    ) -> Result<Option<RemoteObject>, Auth0Error>;

    /// Create an object from a full payload
    async fn create(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        payload: &Value,
    ) -> Result<RemoteObject, Auth0Error>;

    /// Apply a partial update and return the resulting remote state
    async fn update(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
        delta: &Value,
    ) -> Result<Value, Auth0Error>;

    /// Delete an object
    async fn delete(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), Auth0Error>;
}
