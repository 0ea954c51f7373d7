//! Kind-agnostic projection of the Auth0 CRDs.
//!
//! The reconciler works on [`ResourceView`] only. Each CRD implements
//! [`ManagedResource`] to project itself: typed `find`, `init` and `conf` blocks become
//! JSON documents, everything else the engine needs is lifted out of metadata and spec.

use crate::error::StoreError;
use auth0_client::ResourceKind;
use crds::{
    A0Client, A0ClientGrant, A0Connection, A0ResourceServer, A0Tenant, EntityPolicy, EntityStatus,
    TenantAuth, TenantReference,
};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation selecting which controller partition owns a resource
pub const PARTITION_ANNOTATION: &str = "kubernetes.auth0.com/partition";

/// Finalizer guarding remote cleanup
pub const FINALIZER: &str = "kubernetes.auth0.com/finalizer";

/// Identity of a managed resource: kind, namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    /// Entity kind
    pub kind: ResourceKind,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ResourceKey {
    /// Build a key
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// What the reconciler sees of a managed resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub key: ResourceKey,
    pub uid: Option<String>,
    pub resource_version: Option<String>,
    pub generation: Option<i64>,
    /// Deletion has been requested
    pub deleting: bool,
    pub finalizers: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub policy: Vec<EntityPolicy>,
    /// Owning tenant, absent only on tenants
    pub tenant_ref: Option<TenantReference>,
    /// Management API access, present only on tenants
    pub tenant_auth: Option<TenantAuth>,
    pub find: Option<Map<String, Value>>,
    pub init: Option<Map<String, Value>>,
    pub conf: Option<Map<String, Value>>,
    pub status: EntityStatus,
}

impl ResourceView {
    /// Whether the guarding finalizer is present
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers.iter().any(|f| f == FINALIZER)
    }

    /// Value of the partition annotation
    #[must_use]
    pub fn partition(&self) -> Option<&str> {
        self.annotations.get(PARTITION_ANNOTATION).map(String::as_str)
    }
}

/// A CRD the controller manages
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Entity kind backed by this CRD
    const KIND: ResourceKind;

    /// Project into a view
    fn view(&self) -> Result<ResourceView, StoreError>;
}

fn to_document<T: Serialize>(value: Option<&T>) -> Result<Option<Map<String, Value>>, StoreError> {
    match value.map(serde_json::to_value).transpose()? {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(StoreError::Serialization(serde::de::Error::custom(format!(
            "expected an object, found {other}"
        )))),
    }
}

fn base_view<K: Resource<DynamicType = ()>>(
    obj: &K,
    kind: ResourceKind,
    policy: &[EntityPolicy],
    status: Option<&EntityStatus>,
) -> ResourceView {
    let meta = obj.meta();
    ResourceView {
        key: ResourceKey::new(
            kind,
            meta.namespace.clone().unwrap_or_else(|| "default".to_string()),
            meta.name.clone().unwrap_or_default(),
        ),
        uid: meta.uid.clone(),
        resource_version: meta.resource_version.clone(),
        generation: meta.generation,
        deleting: meta.deletion_timestamp.is_some(),
        finalizers: meta.finalizers.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default(),
        policy: policy.to_vec(),
        tenant_ref: None,
        tenant_auth: None,
        find: None,
        init: None,
        conf: None,
        status: status.cloned().unwrap_or_default(),
    }
}

impl ManagedResource for A0Tenant {
    const KIND: ResourceKind = ResourceKind::Tenant;

    fn view(&self) -> Result<ResourceView, StoreError> {
        let mut view = base_view(self, Self::KIND, &self.spec.policy, self.status.as_ref());
        view.tenant_auth = Some(self.spec.auth.clone());
        view.init = to_document(self.spec.init.as_ref())?;
        view.conf = to_document(self.spec.conf.as_ref())?;
        Ok(view)
    }
}

impl ManagedResource for A0Client {
    const KIND: ResourceKind = ResourceKind::Client;

    fn view(&self) -> Result<ResourceView, StoreError> {
        let mut view = base_view(self, Self::KIND, &self.spec.policy, self.status.as_ref());
        view.tenant_ref = Some(self.spec.tenant_ref.clone());
        view.find = to_document(self.spec.find.as_ref())?;
        view.init = to_document(self.spec.init.as_ref())?;
        view.conf = to_document(self.spec.conf.as_ref())?;
        Ok(view)
    }
}

impl ManagedResource for A0ClientGrant {
    const KIND: ResourceKind = ResourceKind::ClientGrant;

    fn view(&self) -> Result<ResourceView, StoreError> {
        let mut view = base_view(self, Self::KIND, &self.spec.policy, self.status.as_ref());
        view.tenant_ref = Some(self.spec.tenant_ref.clone());
        view.init = to_document(self.spec.init.as_ref())?;
        view.conf = to_document(self.spec.conf.as_ref())?;
        Ok(view)
    }
}

impl ManagedResource for A0Connection {
    const KIND: ResourceKind = ResourceKind::Connection;

    fn view(&self) -> Result<ResourceView, StoreError> {
        let mut view = base_view(self, Self::KIND, &self.spec.policy, self.status.as_ref());
        view.tenant_ref = Some(self.spec.tenant_ref.clone());
        view.find = to_document(self.spec.find.as_ref())?;
        view.init = to_document(self.spec.init.as_ref())?;
        view.conf = to_document(self.spec.conf.as_ref())?;
        Ok(view)
    }
}

impl ManagedResource for A0ResourceServer {
    const KIND: ResourceKind = ResourceKind::ResourceServer;

    fn view(&self) -> Result<ResourceView, StoreError> {
        let mut view = base_view(self, Self::KIND, &self.spec.policy, self.status.as_ref());
        view.tenant_ref = Some(self.spec.tenant_ref.clone());
        view.init = to_document(self.spec.init.as_ref())?;
        view.conf = to_document(self.spec.conf.as_ref())?;
        Ok(view)
    }
}

/// Key of a typed object
pub fn key_of<K: ManagedResource>(obj: &K) -> ResourceKey {
    ResourceKey::new(
        K::KIND,
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any(),
    )
}
