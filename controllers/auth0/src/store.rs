//! Local object store.
//!
//! The reconciler reads managed resources, writes their status subresource and publishes
//! events through [`ObjectStore`]. [`KubeStore`] is the Kubernetes implementation; tests use
//! the in-memory store from `test_utils`.
//!
//! Status writes are optimistic: the write carries the resource version the caller read,
//! and a concurrent change surfaces as [`StoreError::Conflict`]. The status is replaced
//! whole rather than merge-patched, so explicit `null`s inside `lastConf` survive.

use crate::error::StoreError;
use crate::view::{FINALIZER, ManagedResource, ResourceKey, ResourceView};
use auth0_client::{ResourceKind, TenantAccess};
use crds::{A0Client, A0ClientGrant, A0Connection, A0ResourceServer, A0Tenant, API_GROUP, API_VERSION, EntityStatus};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client};
use serde_json::{Value, json};
use tracing::debug;

/// Reporting controller name used on events
pub const REPORTING_CONTROLLER: &str = "kubernetes.auth0.com/operator";

/// Severity of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// Informational
    Normal,
    /// Needs attention
    Warning,
}

/// An event to attach to a managed resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub severity: EventSeverity,
    /// CamelCase reason, e.g. `Success`
    pub reason: String,
    /// Human-readable note
    pub note: String,
    /// What the controller did, e.g. `Create`
    pub action: String,
}

impl EventRecord {
    /// Informational event
    pub fn normal(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Normal,
            reason: reason.to_string(),
            note: note.into(),
            action: action.to_string(),
        }
    }

    /// Warning event
    pub fn warning(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Warning,
            reason: reason.to_string(),
            note: note.into(),
            action: action.to_string(),
        }
    }
}

/// Read and status-write access to managed resources
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the current view of a resource; `Ok(None)` when it does not exist
    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceView>, StoreError>;

    /// List resources of a kind, in one namespace or all of them
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, StoreError>;

    /// Replace the status of `view`, failing with `Conflict` if the resource changed
    /// since `view` was read
    async fn write_status(&self, view: &ResourceView, status: &EntityStatus) -> Result<(), StoreError>;

    /// Add the controller finalizer, returning the updated view
    async fn add_finalizer(&self, view: &ResourceView) -> Result<ResourceView, StoreError>;

    /// Remove the controller finalizer
    async fn remove_finalizer(&self, view: &ResourceView) -> Result<(), StoreError>;

    /// Read the management API credentials of a tenant
    async fn read_tenant_credentials(&self, tenant: &ResourceView) -> Result<TenantAccess, StoreError>;

    /// Publish an event on a resource
    async fn publish_event(&self, view: &ResourceView, event: EventRecord) -> Result<(), StoreError>;
}

/// Body of a status subresource replace: identity, the resource version the caller
/// read, and the full status. The API server ignores a missing `spec` on this endpoint.
pub fn status_document(view: &ResourceView, status: &EntityStatus) -> Result<Value, StoreError> {
    Ok(json!({
        "apiVersion": format!("{API_GROUP}/{API_VERSION}"),
        "kind": view.key.kind.crd_kind(),
        "metadata": {
            "name": view.key.name,
            "namespace": view.key.namespace,
            "resourceVersion": view.resource_version,
        },
        "status": serde_json::to_value(status)?,
    }))
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

fn write_error(key: &ResourceKey, error: kube::Error) -> StoreError {
    if is_conflict(&error) {
        StoreError::Conflict(key.to_string())
    } else if is_not_found(&error) {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Kube(error)
    }
}

/// Kubernetes-backed object store
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store; `instance` identifies this controller replica on events
    pub fn new(client: Client, instance: String) -> Self {
        let reporter = Reporter {
            controller: REPORTING_CONTROLLER.to_string(),
            instance: Some(instance),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    fn api<K: ManagedResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K: ManagedResource>(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<ResourceView>, StoreError> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await?
            .map(|obj| obj.view())
            .transpose()
    }

    async fn list_typed<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, StoreError> {
        let api: Api<K> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        api.list(&ListParams::default())
            .await?
            .items
            .iter()
            .map(ManagedResource::view)
            .collect()
    }

    async fn replace_status_typed<K: ManagedResource>(
        &self,
        view: &ResourceView,
        document: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.api::<K>(&view.key.namespace)
            .replace_status(&view.key.name, &PostParams::default(), document)
            .await
            .map_err(|e| write_error(&view.key, e))?;
        Ok(())
    }

    async fn patch_metadata_typed<K: ManagedResource>(
        &self,
        view: &ResourceView,
        patch: &Value,
    ) -> Result<ResourceView, StoreError> {
        self.api::<K>(&view.key.namespace)
            .patch(&view.key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| write_error(&view.key, e))?
            .view()
    }

    async fn patch_metadata(&self, view: &ResourceView, patch: &Value) -> Result<ResourceView, StoreError> {
        match view.key.kind {
            ResourceKind::Tenant => self.patch_metadata_typed::<A0Tenant>(view, patch).await,
            ResourceKind::Client => self.patch_metadata_typed::<A0Client>(view, patch).await,
            ResourceKind::ClientGrant => self.patch_metadata_typed::<A0ClientGrant>(view, patch).await,
            ResourceKind::Connection => self.patch_metadata_typed::<A0Connection>(view, patch).await,
            ResourceKind::ResourceServer => {
                self.patch_metadata_typed::<A0ResourceServer>(view, patch).await
            }
        }
    }

    fn finalizer_patch(view: &ResourceView, finalizers: Vec<String>) -> Value {
        json!({
            "metadata": {
                "resourceVersion": view.resource_version,
                "finalizers": finalizers,
            }
        })
    }

    fn object_reference(view: &ResourceView) -> ObjectReference {
        ObjectReference {
            api_version: Some(format!("{API_GROUP}/{API_VERSION}")),
            kind: Some(view.key.kind.crd_kind().to_string()),
            name: Some(view.key.name.clone()),
            namespace: Some(view.key.namespace.clone()),
            uid: view.uid.clone(),
            resource_version: view.resource_version.clone(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceView>, StoreError> {
        match key.kind {
            ResourceKind::Tenant => self.get_typed::<A0Tenant>(key).await,
            ResourceKind::Client => self.get_typed::<A0Client>(key).await,
            ResourceKind::ClientGrant => self.get_typed::<A0ClientGrant>(key).await,
            ResourceKind::Connection => self.get_typed::<A0Connection>(key).await,
            ResourceKind::ResourceServer => self.get_typed::<A0ResourceServer>(key).await,
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, StoreError> {
        match kind {
            ResourceKind::Tenant => self.list_typed::<A0Tenant>(namespace).await,
            ResourceKind::Client => self.list_typed::<A0Client>(namespace).await,
            ResourceKind::ClientGrant => self.list_typed::<A0ClientGrant>(namespace).await,
            ResourceKind::Connection => self.list_typed::<A0Connection>(namespace).await,
            ResourceKind::ResourceServer => self.list_typed::<A0ResourceServer>(namespace).await,
        }
    }

    async fn write_status(&self, view: &ResourceView, status: &EntityStatus) -> Result<(), StoreError> {
        let document = serde_json::to_vec(&status_document(view, status)?)?;
        debug!("Writing status of {}", view.key);
        match view.key.kind {
            ResourceKind::Tenant => self.replace_status_typed::<A0Tenant>(view, document).await,
            ResourceKind::Client => self.replace_status_typed::<A0Client>(view, document).await,
            ResourceKind::ClientGrant => self.replace_status_typed::<A0ClientGrant>(view, document).await,
            ResourceKind::Connection => self.replace_status_typed::<A0Connection>(view, document).await,
            ResourceKind::ResourceServer => {
                self.replace_status_typed::<A0ResourceServer>(view, document).await
            }
        }
    }

    async fn add_finalizer(&self, view: &ResourceView) -> Result<ResourceView, StoreError> {
        if view.has_finalizer() {
            return Ok(view.clone());
        }
        let mut finalizers = view.finalizers.clone();
        finalizers.push(FINALIZER.to_string());
        debug!("Adding finalizer to {}", view.key);
        self.patch_metadata(view, &Self::finalizer_patch(view, finalizers)).await
    }

    async fn remove_finalizer(&self, view: &ResourceView) -> Result<(), StoreError> {
        if !view.has_finalizer() {
            return Ok(());
        }
        let finalizers: Vec<String> = view
            .finalizers
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        debug!("Removing finalizer from {}", view.key);
        match self.patch_metadata(view, &Self::finalizer_patch(view, finalizers)).await {
            Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn read_tenant_credentials(&self, tenant: &ResourceView) -> Result<TenantAccess, StoreError> {
        let auth = tenant.tenant_auth.as_ref().ok_or_else(|| StoreError::Credentials {
            secret: tenant.key.to_string(),
            reason: "tenant declares no auth block".to_string(),
        })?;
        let namespace = auth
            .secret_ref
            .namespace
            .clone()
            .unwrap_or_else(|| tenant.key.namespace.clone());
        let secret_name = format!("{namespace}/{}", auth.secret_ref.name);

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets
            .get_opt(&auth.secret_ref.name)
            .await?
            .ok_or_else(|| StoreError::Credentials {
                secret: secret_name.clone(),
                reason: "not found".to_string(),
            })?;

        let field = |key: &str| -> Result<String, StoreError> {
            let bytes = secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .ok_or_else(|| StoreError::Credentials {
                    secret: secret_name.clone(),
                    reason: format!("missing key {key}"),
                })?;
            String::from_utf8(bytes.0.clone())
                .map(|value| value.trim().to_string())
                .map_err(|_| StoreError::Credentials {
                    secret: secret_name.clone(),
                    reason: format!("key {key} is not valid UTF-8"),
                })
        };

        Ok(TenantAccess {
            domain: auth.domain.clone(),
            client_id: field("clientId")?,
            client_secret: field("clientSecret")?,
        })
    }

    async fn publish_event(&self, view: &ResourceView, event: EventRecord) -> Result<(), StoreError> {
        let event = Event {
            type_: match event.severity {
                EventSeverity::Normal => EventType::Normal,
                EventSeverity::Warning => EventType::Warning,
            },
            reason: event.reason,
            note: Some(event.note),
            action: event.action,
            secondary: None,
        };
        self.recorder
            .publish(&event, &Self::object_reference(view))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::view_builder;
    use crds::PassthroughDocument;

    #[test]
    fn test_status_document_keeps_explicit_nulls() {
        let view = view_builder(ResourceKind::Client, "web").status_id("cl_1").build();
        let status = EntityStatus {
            id: Some("cl_1".to_string()),
            last_conf: json!({"name": "Web", "client_metadata": {"team": "core", "legacy": null}})
                .as_object()
                .cloned()
                .map(PassthroughDocument::from),
            ..EntityStatus::default()
        };

        let document = status_document(&view, &status).unwrap();
        assert_eq!(document["kind"], "A0Client");
        assert_eq!(document["apiVersion"], "kubernetes.auth0.com/v1");
        assert_eq!(document["metadata"]["name"], "web");
        assert_eq!(document["metadata"]["resourceVersion"], json!(view.resource_version));
        assert_eq!(
            document["status"]["lastConf"],
            json!({"name": "Web", "client_metadata": {"team": "core", "legacy": null}})
        );
        assert!(document.get("spec").is_none());
    }

    #[test]
    fn test_event_record_constructors() {
        let event = EventRecord::warning("Deleting", "Delete", "left in place");
        assert_eq!(event.severity, EventSeverity::Warning);
        assert_eq!(event.reason, "Deleting");
        assert_eq!(EventRecord::normal("Success", "Create", "ok").severity, EventSeverity::Normal);
    }
}
