//! Reconciliation of Auth0 resources.
//!
//! One state machine serves every kind:
//! - `orderer`: collect referenced resources, reject cycles, block on unready references
//! - `resolver`: turn references into remote identifiers
//! - `drift`: plan the remote write from `conf`, `lastConf` and a remote existence check
//! - `policy`: gate every mutating call on the declared policy
//! - `kinds`: the per-kind payload and lookup rules
//! - `labels`: connection membership declared by client labels
//!
//! A run re-reads the resource and re-plans whenever a status write hits a resource
//! version conflict, so a stale view is never written back.

pub mod drift;
pub mod kinds;
pub mod labels;
pub mod orderer;
pub mod policy;
pub mod resolver;


use crate::backoff::{ExponentialBackoff, rate_limit_delay};
use crate::config::Config;
use crate::error::{ControllerError, Disposition, ReconcileError, StoreError};
use crate::metrics;
use crate::reconcile_helpers::{
    EVENT_API_ERROR, EVENT_DELETING, EVENT_RATE_LIMIT, EVENT_RETRY, EVENT_SUCCESS, REASON_BLOCKED,
    REASON_PERMANENT_ERROR, REASON_POLICY_DENIED, REASON_RATE_LIMITED, REASON_RECONCILED,
    REASON_RETRYING, applied_status, bound_status, failed_status, settled_status, stamped,
    status_needs_update,
};
use crate::reconciler::drift::{Observation, Plan};
use crate::reconciler::orderer::{DependencyGraph, Readiness, ResolvedReferences};
use crate::reconciler::resolver::{Reference, ReferenceLookup, Resolution, local_key};
use crate::store::{EventRecord, ObjectStore};
use crate::view::{ResourceKey, ResourceView};
use auth0_client::{Auth0ClientTrait, ErrorClass, FindDescriptor, ResourceKind, TenantAccess};
use chrono::{DateTime, Utc};
use crds::EntityPolicy;
use kube_runtime::controller::Action;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Planning passes per run before the key is requeued
const MAX_PASSES: usize = 3;

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: ExponentialBackoff,
    /// Start of the current run of failures
    failing_since: DateTime<Utc>,
}

impl BackoffState {
    fn new(config: &Config, now: DateTime<Utc>) -> Self {
        Self {
            backoff: ExponentialBackoff::new(config.backoff_base, config.backoff_max),
            failing_since: now,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Remote state matches the declaration, or policy forbids making it match
    Settled {
        /// A remote write happened during the run
        wrote: bool,
    },
    /// Deletion handled and finalizer removed
    Finalized,
    /// The resource disappeared during the run
    Missing,
}

enum Step {
    Done(Outcome),
    /// Re-read the resource and plan again
    Replan,
}

/// Reconciles Auth0 resources.
pub struct Reconciler {
    pub(crate) client: Arc<dyn Auth0ClientTrait>,
    pub(crate) store: Arc<dyn ObjectStore>,
    config: Config,
    /// Failure tracking per resource
    backoff_states: Arc<Mutex<HashMap<ResourceKey, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Arc<dyn Auth0ClientTrait>, store: Arc<dyn ObjectStore>, config: Config) -> Self {
        Self {
            client,
            store,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether this controller instance owns `view`
    #[must_use]
    pub fn in_partition(&self, view: &ResourceView) -> bool {
        view.partition() == self.config.partition.as_deref()
    }

    /// Reconcile the resource stored under `key` and decide when to look at it again
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Action, ControllerError> {
        let _timer = metrics::start_reconcile_timer(key.kind);

        let Some(view) = self.store.get(key).await? else {
            debug!("{} no longer exists", key);
            self.reset_backoff(key);
            return Ok(Action::await_change());
        };
        if !self.in_partition(&view) {
            debug!(
                "Skipping {}: partition {:?} is not ours",
                key,
                view.partition()
            );
            return Ok(Action::await_change());
        }

        metrics::increment_reconciliations(key.kind);
        debug!("Reconciling {}", key);

        match self.reconcile_once(view).await {
            Ok(outcome) => {
                self.reset_backoff(key);
                Ok(match outcome {
                    Outcome::Settled { .. } => Action::requeue(self.config.reconcile_interval),
                    Outcome::Finalized | Outcome::Missing => Action::await_change(),
                })
            }
            Err(error) => Ok(self.handle_error(key, error).await),
        }
    }

    /// Run the state machine, re-planning on conflicts
    pub(crate) async fn reconcile_once(&self, view: ResourceView) -> Result<Outcome, ReconcileError> {
        let key = view.key.clone();
        let mut view = view;
        let mut last_error = None;

        for pass in 1..=MAX_PASSES {
            let step = if view.deleting {
                self.finalize(&view).await
            } else {
                self.converge(&view).await
            };
            match step {
                Ok(Step::Done(outcome)) => return Ok(outcome),
                Ok(Step::Replan) => {
                    debug!("Re-planning {} (pass {})", key, pass);
                    last_error = None;
                }
                Err(e) if e.replans() => {
                    debug!("{} changed underneath pass {}: {}", key, pass, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            view = match self.store.get(&key).await? {
                Some(fresh) => fresh,
                None => return Ok(Outcome::Missing),
            };
        }

        // remote failures keep their own disposition so they are backed off
        match last_error {
            Some(e) if e.disposition() != Disposition::Conflict => Err(e),
            _ => Err(StoreError::Conflict(format!("{key} still changing after {MAX_PASSES} passes")).into()),
        }
    }

    /// Resolving, Planning and Applying for a live resource
    async fn converge(&self, view: &ResourceView) -> Result<Step, ReconcileError> {
        let kind = view.key.kind;
        if view.conf.is_none() {
            return Err(ReconcileError::InvalidSpec("missing configuration".to_string()));
        }

        let graph = orderer::collect(self.store.as_ref(), view).await?;
        let resolved = match orderer::check(view, &graph)? {
            Readiness::Ready(resolved) => resolved,
            Readiness::Blocked(reason) => return Err(reason.into()),
        };

        let access = self.tenant_access(view, &graph, &resolved).await?;
        let values = self.concrete_values(&access, resolved.values).await?;
        let last_conf = view.status.last_conf.as_ref().map(|doc| doc.as_map());
        let mut desired = kinds::desired_payload(view, &values);
        if kind == ResourceKind::Connection {
            let clients = self
                .store
                .list(ResourceKind::Client, self.config.watch_namespace.as_deref())
                .await?;
            labels::merge_enabled_clients(&mut desired, labels::labelled_client_ids(&view.key, &clients), last_conf);
        }
        let init = kinds::init_payload(view);

        let observation = self.observe(view, &access, &desired).await?;
        let plan = drift::plan(kind, &desired, init.as_ref(), last_conf, observation)?;
        debug!("Planned {} for {}", plan.name(), view.key);

        self.apply(view, &access, &desired, plan).await
    }

    async fn tenant_access(
        &self,
        view: &ResourceView,
        graph: &DependencyGraph,
        resolved: &ResolvedReferences,
    ) -> Result<TenantAccess, ReconcileError> {
        if view.key.kind == ResourceKind::Tenant {
            return Ok(self.store.read_tenant_credentials(view).await?);
        }
        let key = resolved
            .tenant
            .as_ref()
            .ok_or_else(|| ReconcileError::InvalidSpec("tenantRef does not name a tenant".to_string()))?;
        let tenant = graph
            .lookup(key)
            .ok_or_else(|| ReconcileError::ReferenceNotFound(format!("{key} does not exist")))?;
        Ok(self.store.read_tenant_credentials(tenant).await?)
    }

    /// Read identifiers that are only known remotely
    async fn concrete_values(
        &self,
        access: &TenantAccess,
        resolutions: BTreeMap<&'static str, Resolution>,
    ) -> Result<BTreeMap<&'static str, String>, ReconcileError> {
        let mut values = BTreeMap::new();
        for (field, resolution) in resolutions {
            let value = match resolution {
                Resolution::Value(value) => value,
                Resolution::RemoteIdentifier { kind, id } => self
                    .client
                    .find(access, kind, &FindDescriptor::ById(id.clone()))
                    .await
                    .map_err(ReconcileError::remote("find"))?
                    .and_then(|remote| remote.identifier)
                    .ok_or_else(|| {
                        ReconcileError::ReferenceNotFound(format!("{field}: remote {kind} {id} does not exist"))
                    })?,
            };
            values.insert(field, value);
        }
        Ok(values)
    }

    async fn observe(
        &self,
        view: &ResourceView,
        access: &TenantAccess,
        desired: &Map<String, Value>,
    ) -> Result<Observation, ReconcileError> {
        let kind = view.key.kind;
        match view.status.id.as_deref() {
            None => {
                let found = match kinds::find_descriptor(view, desired)? {
                    Some(descriptor) => {
                        debug!("Looking for an existing {} by {}", kind, descriptor);
                        self.client
                            .find(access, kind, &descriptor)
                            .await
                            .map_err(ReconcileError::remote("find"))?
                    }
                    None => None,
                };
                Ok(Observation::Unbound(found))
            }
            Some(id) => {
                let live = self
                    .client
                    .find(access, kind, &kinds::live_descriptor(kind, id))
                    .await
                    .map_err(ReconcileError::remote("find"))?;
                if live.is_some() {
                    Ok(Observation::Live)
                } else {
                    warn!("{} is bound to {} {} which no longer exists", view.key, kind, id);
                    Ok(Observation::Vanished)
                }
            }
        }
    }

    async fn apply(
        &self,
        view: &ResourceView,
        access: &TenantAccess,
        desired: &Map<String, Value>,
        plan: Plan,
    ) -> Result<Step, ReconcileError> {
        let kind = view.key.kind;
        match plan {
            Plan::NoOp => self.settle(view, true, REASON_RECONCILED, None).await,

            Plan::Create { .. } if !policy::allows(view, EntityPolicy::Create) => {
                info!("Create of {} is not permitted by policy, skipping", view.key);
                self.settle(
                    view,
                    false,
                    REASON_POLICY_DENIED,
                    Some("Create is not permitted by policy".to_string()),
                )
                .await
            }
            Plan::Create { payload } => self.create(view, access, desired, payload, "create").await,

            Plan::Recreate { .. } if !policy::allows(view, EntityPolicy::Create) => {
                Err(ReconcileError::OrphanedReference {
                    kind,
                    id: view.status.id.clone().unwrap_or_default(),
                })
            }
            Plan::Recreate { payload } => {
                warn!("Recreating vanished remote object for {}", view.key);
                self.create(view, access, desired, payload, "recreate").await
            }

            Plan::Adopt(found) => {
                let view = self.store.add_finalizer(view).await?;
                info!("Adopting existing {} {} for {}", kind, found.id, view.key);
                let status = stamped(bound_status(&view.status, &found.id, found.identifier));
                self.store.write_status(&view, &status).await?;
                self.publish(
                    &view,
                    EventRecord::normal(EVENT_SUCCESS, "Adopt", format!("Adopted existing {kind} {}", found.id)),
                )
                .await;
                Ok(Step::Replan)
            }

            Plan::Update { delta } if !policy::allows(view, EntityPolicy::Update) => {
                info!(
                    "Update of {} is not permitted by policy, leaving {} drifted field(s) in place",
                    view.key,
                    delta.len()
                );
                self.settle(
                    view,
                    true,
                    REASON_POLICY_DENIED,
                    Some("Update is not permitted by policy; remote drift left in place".to_string()),
                )
                .await
            }
            Plan::Update { delta } => {
                let id = view
                    .status
                    .id
                    .clone()
                    .ok_or_else(|| StoreError::Conflict(format!("{} lost its remote id", view.key)))?;
                let payload = kinds::update_payload(kind, delta);
                let view = self.store.add_finalizer(view).await?;
                let wrote = !payload.is_empty();
                if wrote {
                    info!("Updating {} {} for {} ({:?})", kind, id, view.key, payload.keys().collect::<Vec<_>>());
                    self.client
                        .update(access, kind, &id, &Value::Object(payload))
                        .await
                        .map_err(ReconcileError::remote("update"))?;
                    metrics::increment_remote_operations(kind, "update");
                }
                self.persist_applied(&view, &id, None, drift::snapshot(kind, desired))
                    .await?;
                if wrote {
                    self.publish(
                        &view,
                        EventRecord::normal(EVENT_SUCCESS, "Update", format!("Updated {kind} {id}")),
                    )
                    .await;
                }
                Ok(Step::Done(Outcome::Settled { wrote }))
            }
        }
    }

    async fn create(
        &self,
        view: &ResourceView,
        access: &TenantAccess,
        desired: &Map<String, Value>,
        payload: Map<String, Value>,
        operation: &'static str,
    ) -> Result<Step, ReconcileError> {
        let kind = view.key.kind;
        kinds::validate_create(kind, &payload)?;
        let view = self.store.add_finalizer(view).await?;

        info!("Creating {} for {}", kind, view.key);
        let created = self
            .client
            .create(access, kind, &Value::Object(payload))
            .await
            .map_err(ReconcileError::remote(operation))?;
        metrics::increment_remote_operations(kind, operation);

        self.persist_applied(
            &view,
            &created.id,
            created.identifier.clone(),
            drift::snapshot(kind, desired),
        )
        .await?;
        info!("{} is backed by {} {}", view.key, kind, created.id);
        self.publish(
            &view,
            EventRecord::normal(EVENT_SUCCESS, "Create", format!("Created {kind} {}", created.id)),
        )
        .await;
        Ok(Step::Done(Outcome::Settled { wrote: true }))
    }

    /// Record a confirmed remote write. Conflicts re-read the resource and apply the same
    /// identity and snapshot to the fresh status; re-planning here would repeat the write.
    async fn persist_applied(
        &self,
        view: &ResourceView,
        id: &str,
        identifier: Option<String>,
        last_conf: Map<String, Value>,
    ) -> Result<(), ReconcileError> {
        let mut current = view.clone();
        for _ in 0..MAX_PASSES {
            let status = stamped(applied_status(
                &current.status,
                id,
                identifier.clone(),
                last_conf.clone(),
                current.generation,
            ));
            match self.store.write_status(&current, &status).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(_)) => {
                    debug!("Status of {} changed, re-reading before recording {}", view.key, id);
                    current = self
                        .store
                        .get(&view.key)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(view.key.to_string()))?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!("could not record {id} on {}", view.key)).into())
    }

    async fn settle(
        &self,
        view: &ResourceView,
        ready: bool,
        reason: &str,
        message: Option<String>,
    ) -> Result<Step, ReconcileError> {
        let status = settled_status(&view.status, ready, reason, message, view.generation);
        if status_needs_update(&view.status, &status) {
            self.store.write_status(view, &stamped(status)).await?;
        } else {
            debug!("{} is up to date", view.key);
        }
        Ok(Step::Done(Outcome::Settled { wrote: false }))
    }

    /// Deletion: remote delete when permitted, then release the finalizer
    async fn finalize(&self, view: &ResourceView) -> Result<Step, ReconcileError> {
        if !view.has_finalizer() {
            return Ok(Step::Done(Outcome::Finalized));
        }
        let kind = view.key.kind;

        if kind == ResourceKind::Tenant {
            let dependents = self.dependents_of(view).await?;
            if !dependents.is_empty() {
                let names: Vec<String> = dependents.iter().map(ToString::to_string).collect();
                return Err(ReconcileError::DependentsRemain(names.join(", ")));
            }
        }

        if let Some(id) = view.status.id.as_deref() {
            if policy::allows(view, EntityPolicy::Delete) && kinds::deletable(kind) {
                let access = self.owner_access(view).await?;
                info!("Deleting {} {} for {}", kind, id, view.key);
                match self.client.delete(&access, kind, id).await {
                    Ok(()) => metrics::increment_remote_operations(kind, "delete"),
                    Err(e) if e.classify() == ErrorClass::NotFound => {
                        debug!("{} {} was already gone", kind, id);
                    }
                    Err(e) => return Err(ReconcileError::remote("delete")(e)),
                }
                self.publish(
                    view,
                    EventRecord::normal(EVENT_SUCCESS, "Delete", format!("Deleted {kind} {id}")),
                )
                .await;
            } else {
                let why = if kinds::deletable(kind) {
                    "policy does not permit Delete"
                } else {
                    "it cannot be deleted through the management API"
                };
                warn!("Leaving {} {} in place for {}: {}", kind, id, view.key, why);
                self.publish(
                    view,
                    EventRecord::warning(EVENT_DELETING, "Delete", format!("{kind} {id} left in place: {why}")),
                )
                .await;
            }
        }

        self.store.remove_finalizer(view).await?;
        info!("Finalized {}", view.key);
        Ok(Step::Done(Outcome::Finalized))
    }

    /// Resources still owned by `tenant`
    async fn dependents_of(&self, tenant: &ResourceView) -> Result<Vec<ResourceKey>, ReconcileError> {
        let mut dependents = Vec::new();
        for kind in ResourceKind::ALL.into_iter().filter(|k| *k != ResourceKind::Tenant) {
            let views = self
                .store
                .list(kind, self.config.watch_namespace.as_deref())
                .await?;
            dependents.extend(
                views
                    .into_iter()
                    .filter(|v| owner_key(v).as_ref() == Some(&tenant.key))
                    .map(|v| v.key),
            );
        }
        Ok(dependents)
    }

    async fn owner_access(&self, view: &ResourceView) -> Result<TenantAccess, ReconcileError> {
        let key = owner_key(view)
            .ok_or_else(|| ReconcileError::InvalidSpec("tenantRef is required".to_string()))?;
        let tenant = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ReconcileError::ReferenceNotFound(format!("{key} does not exist")))?;
        Ok(self.store.read_tenant_credentials(&tenant).await?)
    }

    async fn publish(&self, view: &ResourceView, event: EventRecord) {
        if let Err(e) = self.store.publish_event(view, event).await {
            warn!("Failed to publish event on {}: {}", view.key, e);
        }
    }

    /// Classify a failed run, record it on the resource and pick the requeue
    async fn handle_error(&self, key: &ResourceKey, error: ReconcileError) -> Action {
        metrics::increment_reconcile_errors(key.kind, error.class_label());
        let message = error.to_string();

        let (action, reason, failing, event) = match error.disposition() {
            Disposition::Conflict => {
                debug!("{} kept changing, requeueing: {}", key, message);
                return Action::requeue(Duration::ZERO);
            }
            Disposition::Blocked => {
                metrics::increment_blocked(key.kind);
                let (delay, _) = self.record_failure(key);
                info!("{} is blocked: {} (retry in {}s)", key, message, delay.as_secs());
                (Action::requeue(delay), REASON_BLOCKED, None, None)
            }
            Disposition::Transient { retry_at } => {
                let (backoff, failing) = self.record_failure(key);
                if error.is_rate_limited() {
                    let delay = rate_limit_delay(retry_at, Utc::now());
                    warn!("{} hit the rate limit, retry in {}s", key, delay.as_secs());
                    let note = format!("Rate limited, retrying in {}s", delay.as_secs());
                    (
                        Action::requeue(delay),
                        REASON_RATE_LIMITED,
                        Some(failing),
                        Some(EventRecord::warning(EVENT_RATE_LIMIT, "Reconcile", note)),
                    )
                } else {
                    warn!("{} failed: {} (retry in {}s)", key, message, backoff.as_secs());
                    let note = format!("{message}, retrying in {}s", backoff.as_secs());
                    (
                        Action::requeue(backoff),
                        REASON_RETRYING,
                        Some(failing),
                        Some(EventRecord::warning(EVENT_RETRY, "Reconcile", note)),
                    )
                }
            }
            Disposition::Permanent => {
                error!("{} failed permanently: {}", key, message);
                (
                    Action::await_change(),
                    REASON_PERMANENT_ERROR,
                    None,
                    Some(EventRecord::warning(EVENT_API_ERROR, "Reconcile", message.clone())),
                )
            }
        };

        self.record_error_status(key, reason, message, failing, event).await;
        action
    }

    /// Best effort: the requeue decision stands even when the status cannot be written
    async fn record_error_status(
        &self,
        key: &ResourceKey,
        reason: &str,
        message: String,
        failing: Option<bool>,
        event: Option<EventRecord>,
    ) {
        let view = match self.store.get(key).await {
            Ok(Some(view)) => view,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read {} to record error: {}", key, e);
                return;
            }
        };
        let status = failed_status(&view.status, reason, message, failing);
        if status_needs_update(&view.status, &status) {
            if let Err(e) = self.store.write_status(&view, &stamped(status)).await {
                warn!("Failed to record error status on {}: {}", key, e);
            }
        }
        if let Some(event) = event {
            self.publish(&view, event).await;
        }
    }

    /// Count a failure and return the next delay and whether failures outlived the
    /// staleness budget
    fn record_failure(&self, key: &ResourceKey) -> (Duration, bool) {
        let now = Utc::now();
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.clone())
                    .or_insert_with(|| BackoffState::new(&self.config, now));
                let delay = state.backoff.next_backoff();
                let failing = (now - state.failing_since)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed > self.config.staleness_budget);
                (delay, failing)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
                (self.config.backoff_max, false)
            }
        }
    }

    /// Delay before retrying `key` after an infrastructure error
    pub fn next_backoff(&self, key: &ResourceKey) -> Duration {
        self.record_failure(key).0
    }

    fn reset_backoff(&self, key: &ResourceKey) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

/// Local key of the tenant owning `view`
fn owner_key(view: &ResourceView) -> Option<ResourceKey> {
    let tenant_ref = view.tenant_ref.as_ref()?;
    local_key(&Reference::from(tenant_ref), ResourceKind::Tenant, &view.key.namespace)
}
