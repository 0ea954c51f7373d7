//! Mock Auth0Client for unit testing
//!
//! This module provides an in-memory implementation of [`Auth0ClientTrait`] that records
//! every call, so tests can assert which remote operations were (or were never) issued.

use crate::auth0_trait::Auth0ClientTrait;
use crate::error::Auth0Error;
use crate::models::{FindDescriptor, RemoteObject, ResourceKind, TenantAccess};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Remote operation kinds recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `find`
    Find,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

/// A recorded remote call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Operation issued
    pub operation: MockOperation,
    /// Entity kind
    pub kind: ResourceKind,
    /// Target id for update/delete
    pub id: Option<String>,
    /// Payload for create/update
    pub payload: Option<Value>,
    /// Descriptor for find
    pub descriptor: Option<FindDescriptor>,
}

/// Mock Auth0Client for testing
///
/// Objects live in memory keyed by kind and id. Failures can be queued per operation and
/// are returned once each, in order.
#[derive(Clone, Default)]
pub struct MockAuth0Client {
    objects: Arc<Mutex<HashMap<(ResourceKind, String), RemoteObject>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failures: Arc<Mutex<VecDeque<(MockOperation, Auth0Error)>>>,
    queued_ids: Arc<Mutex<VecDeque<String>>>,
    next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockAuth0Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAuth0Client").finish_non_exhaustive()
    }
}

impl MockAuth0Client {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remote object (for test setup)
    pub fn add_object(&self, kind: ResourceKind, object: RemoteObject) {
        self.objects
            .lock()
            .unwrap()
            .insert((kind, object.id.clone()), object);
    }

    /// Remove a remote object behind the operator's back (for drift tests)
    pub fn remove_object(&self, kind: ResourceKind, id: &str) {
        self.objects.lock().unwrap().remove(&(kind, id.to_string()));
    }

    /// Current remote state of an object
    pub fn object(&self, kind: ResourceKind, id: &str) -> Option<RemoteObject> {
        self.objects.lock().unwrap().get(&(kind, id.to_string())).cloned()
    }

    /// Number of stored objects of a kind
    pub fn object_count(&self, kind: ResourceKind) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Use `id` for the next created object
    pub fn queue_id(&self, id: impl Into<String>) {
        self.queued_ids.lock().unwrap().push_back(id.into());
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: MockOperation, error: Auth0Error) {
        self.failures.lock().unwrap().push_back((operation, error));
    }

    /// Every call issued so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of one operation
    pub fn calls_for(&self, operation: MockOperation) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: RecordedCall) -> Result<(), Auth0Error> {
        let operation = call.operation;
        self.calls.lock().unwrap().push(call);
        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(op, _)| *op == operation) {
            if let Some((_, error)) = failures.remove(pos) {
                return Err(error);
            }
        }
        Ok(())
    }

    fn next_id(&self, kind: ResourceKind) -> String {
        if let Some(id) = self.queued_ids.lock().unwrap().pop_front() {
            return id;
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}_{}", kind.crd_kind().to_lowercase(), *next)
    }

    fn matches(kind: ResourceKind, object: &RemoteObject, descriptor: &FindDescriptor) -> bool {
        let field = |name: &str| object.state.get(name).and_then(Value::as_str);
        match descriptor {
            FindDescriptor::Tenant => kind == ResourceKind::Tenant,
            FindDescriptor::ById(id) => &object.id == id,
            FindDescriptor::ByName(name) => field("name") == Some(name.as_str()),
            FindDescriptor::ByIdentifier(identifier) => object.identifier.as_deref() == Some(identifier.as_str()),
            FindDescriptor::ByCallbackUrls { urls, mode } => {
                let callbacks: Vec<String> = object
                    .state
                    .get("callbacks")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                mode.matches(urls, &callbacks)
            }
            FindDescriptor::ByGrant { client_id, audience } => {
                field("client_id") == Some(client_id.as_str())
                    && field("audience") == Some(audience.as_str())
            }
        }
    }
}

#[async_trait::async_trait]
impl Auth0ClientTrait for MockAuth0Client {
    async fn find(
        &self,
        _access: &TenantAccess,
        kind: ResourceKind,
        descriptor: &FindDescriptor,
    ) -> Result<Option<RemoteObject>, Auth0Error> {
        self.record(RecordedCall {
            operation: MockOperation::Find,
            kind,
            id: None,
            payload: None,
            descriptor: Some(descriptor.clone()),
        })?;
        let objects = self.objects.lock().unwrap();
        let mut candidates: Vec<&RemoteObject> = objects
            .iter()
            .filter(|((k, _), obj)| *k == kind && Self::matches(kind, obj, descriptor))
            .map(|(_, obj)| obj)
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates.first().map(|obj| (*obj).clone()))
    }

    async fn create(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        payload: &Value,
    ) -> Result<RemoteObject, Auth0Error> {
        self.record(RecordedCall {
            operation: MockOperation::Create,
            kind,
            id: None,
            payload: Some(payload.clone()),
            descriptor: None,
        })?;
        let id = if kind == ResourceKind::Tenant {
            access.domain.clone()
        } else {
            self.next_id(kind)
        };
        let mut state = payload.clone();
        if let Value::Object(map) = &mut state {
            map.insert(kind.id_field().to_string(), Value::String(id.clone()));
        }
        let identifier = kind
            .identifier_field()
            .and_then(|f| payload.get(f))
            .and_then(Value::as_str)
            .map(str::to_string);
        let object = RemoteObject { id: id.clone(), identifier, state };
        self.objects
            .lock()
            .unwrap()
            .insert((kind, id), object.clone());
        Ok(object)
    }

    async fn update(
        &self,
        _access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
        delta: &Value,
    ) -> Result<Value, Auth0Error> {
        self.record(RecordedCall {
            operation: MockOperation::Update,
            kind,
            id: Some(id.to_string()),
            payload: Some(delta.clone()),
            descriptor: None,
        })?;
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| Auth0Error::NotFound(format!("{kind} {id}")))?;
        if let (Value::Object(state), Value::Object(delta)) = (&mut object.state, delta) {
            for (key, value) in delta {
                if value.is_null() {
                    state.remove(key);
                } else {
                    state.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(object.state.clone())
    }

    async fn delete(
        &self,
        _access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), Auth0Error> {
        self.record(RecordedCall {
            operation: MockOperation::Delete,
            kind,
            id: Some(id.to_string()),
            payload: None,
            descriptor: None,
        })?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Auth0Error::NotFound(format!("{kind} {id}")))
    }
}
