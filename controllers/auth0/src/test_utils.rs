//! Test utilities for unit testing reconcilers
//!
//! `view_builder` creates resource views with sensible defaults, `InMemoryStore` stands in
//! for the Kubernetes API with resource versions, finalizer semantics and conflict injection.

use crate::error::StoreError;
use crate::store::{EventRecord, ObjectStore};
use crate::view::{FINALIZER, PARTITION_ANNOTATION, ResourceKey, ResourceView};
use auth0_client::{ResourceKind, TenantAccess};
use crds::{
    EntityPolicy, EntityStatus, PassthroughDocument, SecretReference, TenantAuth, TenantReference,
    default_policy,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

fn document(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Builder for test resource views
#[derive(Debug, Clone)]
pub struct ViewBuilder {
    view: ResourceView,
}

/// Start a view of `kind` named `name` in namespace `default`.
/// Non-tenant kinds reference tenant `acme`; tenants carry auth for `<name>.auth0.com`.
pub fn view_builder(kind: ResourceKind, name: &str) -> ViewBuilder {
    let (tenant_ref, tenant_auth) = if kind == ResourceKind::Tenant {
        let auth = TenantAuth {
            domain: format!("{name}.auth0.com"),
            secret_ref: SecretReference {
                name: format!("{name}-m2m"),
                namespace: None,
            },
        };
        (None, Some(auth))
    } else {
        let tenant = TenantReference {
            namespace: None,
            name: "acme".to_string(),
        };
        (Some(tenant), None)
    };

    ViewBuilder {
        view: ResourceView {
            key: ResourceKey::new(kind, "default", name),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            generation: Some(1),
            deleting: false,
            finalizers: Vec::new(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            policy: default_policy(),
            tenant_ref,
            tenant_auth,
            find: None,
            init: None,
            conf: None,
            status: EntityStatus::default(),
        },
    }
}

impl ViewBuilder {
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.view.key.namespace = namespace.to_string();
        self
    }

    pub fn policy(mut self, policy: &[EntityPolicy]) -> Self {
        self.view.policy = policy.to_vec();
        self
    }

    pub fn conf(mut self, conf: Value) -> Self {
        self.view.conf = Some(document(conf));
        self
    }

    pub fn init(mut self, init: Value) -> Self {
        self.view.init = Some(document(init));
        self
    }

    pub fn find(mut self, find: Value) -> Self {
        self.view.find = Some(document(find));
        self
    }

    pub fn status_id(mut self, id: &str) -> Self {
        self.view.status.id = Some(id.to_string());
        self
    }

    pub fn identifier(mut self, identifier: &str) -> Self {
        self.view.status.identifier = Some(identifier.to_string());
        self
    }

    pub fn last_conf(mut self, last_conf: Value) -> Self {
        self.view.status.last_conf = Some(PassthroughDocument(document(last_conf)));
        self
    }

    /// Reference tenant `name` in the same namespace
    pub fn tenant(mut self, name: &str) -> Self {
        self.view.tenant_ref = Some(TenantReference {
            namespace: None,
            name: name.to_string(),
        });
        self
    }

    pub fn no_tenant(mut self) -> Self {
        self.view.tenant_ref = None;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.view.deleting = true;
        self
    }

    pub fn finalizer(mut self) -> Self {
        if !self.view.has_finalizer() {
            self.view.finalizers.push(FINALIZER.to_string());
        }
        self
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.view
            .annotations
            .insert(PARTITION_ANNOTATION.to_string(), partition.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.view.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ResourceView {
        self.view
    }
}

#[derive(Debug, Default)]
struct StoreState {
    views: BTreeMap<ResourceKey, ResourceView>,
    events: Vec<(ResourceKey, EventRecord)>,
    /// Status writes that will fail with a conflict, as if someone else wrote first
    pending_conflicts: usize,
    status_writes: usize,
    missing_secrets: BTreeSet<String>,
    revision: u64,
}

impl StoreState {
    fn bump(&mut self, key: &ResourceKey) {
        self.revision += 1;
        let revision = self.revision.to_string();
        if let Some(view) = self.views.get_mut(key) {
            view.resource_version = Some(revision);
        }
    }

    fn current(&self, view: &ResourceView) -> Result<&ResourceView, StoreError> {
        let stored = self
            .views
            .get(&view.key)
            .ok_or_else(|| StoreError::NotFound(view.key.to_string()))?;
        if stored.resource_version != view.resource_version {
            return Err(StoreError::Conflict(view.key.to_string()));
        }
        Ok(stored)
    }
}

/// In-memory object store with optimistic concurrency
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                revision: 100,
                ..Default::default()
            }),
        }
    }

    /// Store a view, assigning a fresh resource version
    pub fn insert(&self, view: ResourceView) {
        let mut state = self.state.lock().unwrap();
        let key = view.key.clone();
        state.views.insert(key.clone(), view);
        state.bump(&key);
    }

    pub fn view(&self, kind: ResourceKind, name: &str) -> Option<ResourceView> {
        self.state
            .lock()
            .unwrap()
            .views
            .get(&ResourceKey::new(kind, "default", name))
            .cloned()
    }

    /// Change the declared `conf`, as an edit of the manifest would
    pub fn set_conf(&self, kind: ResourceKind, name: &str, conf: Value) {
        self.edit(kind, name, |view| view.conf = Some(document(conf)));
    }

    /// Request deletion, as `kubectl delete` would
    pub fn delete(&self, kind: ResourceKind, name: &str) {
        let key = ResourceKey::new(kind, "default", name);
        let mut state = self.state.lock().unwrap();
        let gone = match state.views.get_mut(&key) {
            Some(view) if view.finalizers.is_empty() => true,
            Some(view) => {
                view.deleting = true;
                false
            }
            None => false,
        };
        if gone {
            state.views.remove(&key);
        } else {
            state.bump(&key);
        }
    }

    /// Apply an arbitrary spec edit and bump the generation
    pub fn edit(&self, kind: ResourceKind, name: &str, change: impl FnOnce(&mut ResourceView)) {
        let key = ResourceKey::new(kind, "default", name);
        let mut state = self.state.lock().unwrap();
        if let Some(view) = state.views.get_mut(&key) {
            change(view);
            view.generation = Some(view.generation.unwrap_or(0) + 1);
        }
        state.bump(&key);
    }

    /// Fail the next `count` status writes with a conflict, bumping the resource version
    /// each time
    pub fn conflict_next_status_writes(&self, count: usize) {
        self.state.lock().unwrap().pending_conflicts = count;
    }

    /// Make the credentials secret named `name` unreadable
    pub fn remove_secret(&self, name: &str) {
        self.state.lock().unwrap().missing_secrets.insert(name.to_string());
    }

    /// Number of successful status writes
    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    /// Events published on the resource
    pub fn events(&self, kind: ResourceKind, name: &str) -> Vec<EventRecord> {
        let key = ResourceKey::new(kind, "default", name);
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceView>, StoreError> {
        Ok(self.state.lock().unwrap().views.get(key).cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceView>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .views
            .values()
            .filter(|v| v.key.kind == kind)
            .filter(|v| namespace.is_none_or(|ns| v.key.namespace == ns))
            .cloned()
            .collect())
    }

    async fn write_status(&self, view: &ResourceView, status: &EntityStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.current(view)?;
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            state.bump(&view.key);
            return Err(StoreError::Conflict(view.key.to_string()));
        }
        if let Some(stored) = state.views.get_mut(&view.key) {
            stored.status = status.clone();
        }
        state.status_writes += 1;
        state.bump(&view.key);
        Ok(())
    }

    async fn add_finalizer(&self, view: &ResourceView) -> Result<ResourceView, StoreError> {
        let mut state = self.state.lock().unwrap();
        let current = state.current(view)?.clone();
        if current.has_finalizer() {
            return Ok(current);
        }
        if let Some(stored) = state.views.get_mut(&view.key) {
            stored.finalizers.push(FINALIZER.to_string());
        }
        state.bump(&view.key);
        state
            .views
            .get(&view.key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(view.key.to_string()))
    }

    async fn remove_finalizer(&self, view: &ResourceView) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.current(view)?;
        let released = match state.views.get_mut(&view.key) {
            Some(stored) => {
                stored.finalizers.retain(|f| f != FINALIZER);
                stored.deleting && stored.finalizers.is_empty()
            }
            None => false,
        };
        if released {
            state.views.remove(&view.key);
        } else {
            state.bump(&view.key);
        }
        Ok(())
    }

    async fn read_tenant_credentials(&self, tenant: &ResourceView) -> Result<TenantAccess, StoreError> {
        let auth = tenant.tenant_auth.as_ref().ok_or_else(|| StoreError::Credentials {
            secret: tenant.key.to_string(),
            reason: "tenant declares no auth block".to_string(),
        })?;
        if self
            .state
            .lock()
            .unwrap()
            .missing_secrets
            .contains(&auth.secret_ref.name)
        {
            return Err(StoreError::Credentials {
                secret: auth.secret_ref.name.clone(),
                reason: "not found".to_string(),
            });
        }
        Ok(TenantAccess {
            domain: auth.domain.clone(),
            client_id: "m2m".to_string(),
            client_secret: "secret".to_string(),
        })
    }

    async fn publish_event(&self, view: &ResourceView, event: EventRecord) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push((view.key.clone(), event));
        Ok(())
    }
}
