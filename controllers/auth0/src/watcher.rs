//! Kubernetes resource watchers.
//!
//! One `kube_runtime::Controller` per CRD kind, all driving the same [`Reconciler`].
//! Besides its own objects, each controller watches the kinds its resources reference, so
//! a tenant or client getting its remote identity wakes the resources blocked on it
//! without waiting for their backoff to expire. Connections also watch clients, whose
//! labels decide the connection's enabled clients.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::reconciler::kinds;
use crate::reconciler::labels::affected_connections;
use crate::reconciler::orderer::local_dependencies;
use crate::view::{ManagedResource, ResourceKey, key_of};
use auth0_client::ResourceKind;
use crds::{A0Client, A0ResourceServer, A0Tenant};
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::{
    Controller,
    controller::{Action, Config as ControllerConfig},
    reflector::ObjectRef,
    watcher,
};
use std::sync::Arc;
use tracing::{debug, error, info};

fn api<K: ManagedResource>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Objects among `objects` holding a reference to `changed`
fn referencing<K: ManagedResource>(objects: &[Arc<K>], changed: &ResourceKey) -> Vec<ObjectRef<K>> {
    objects
        .iter()
        .filter(|obj| match obj.view() {
            Ok(view) => local_dependencies(&view).contains(changed),
            Err(_) => false,
        })
        .map(|obj| ObjectRef::from_obj(obj.as_ref()))
        .collect()
}

/// Requeue `K` objects referencing a changed `D` object
fn trigger_dependents<K, D>(controller: Controller<K>, client: &Client, namespace: Option<&str>) -> Controller<K>
where
    K: ManagedResource,
    D: ManagedResource,
{
    let store = controller.store();
    controller.watches(
        api::<D>(client, namespace),
        watcher::Config::default(),
        move |changed: D| {
            let changed = key_of(&changed);
            let dependents = referencing(&store.state(), &changed);
            if !dependents.is_empty() {
                debug!("{} changed, requeueing {} dependent(s)", changed, dependents.len());
            }
            dependents
        },
    )
}

/// Objects among `connections` whose enabled clients depend on `client`
fn labelled_targets<K: ManagedResource>(connections: &[Arc<K>], client: &A0Client) -> Vec<ObjectRef<K>> {
    let Ok(client) = client.view() else {
        return Vec::new();
    };
    let views: Vec<_> = connections.iter().filter_map(|obj| obj.view().ok()).collect();
    affected_connections(&client, &views)
        .into_iter()
        .map(|key| ObjectRef::new(&key.name).within(&key.namespace))
        .collect()
}

/// Requeue connections when a client's label or remote id changes
fn trigger_labelled<K: ManagedResource>(
    controller: Controller<K>,
    client: &Client,
    namespace: Option<&str>,
) -> Controller<K> {
    let store = controller.store();
    controller.watches(
        api::<A0Client>(client, namespace),
        watcher::Config::default(),
        move |changed: A0Client| {
            let targets = labelled_targets(&store.state(), &changed);
            if !targets.is_empty() {
                debug!("{} changed, requeueing {} connection(s)", key_of(&changed), targets.len());
            }
            targets
        },
    )
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    config: Config,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, config: Config) -> Self {
        Self {
            reconciler,
            client,
            config,
        }
    }

    /// Run the controller for `K` until shutdown is signalled
    pub async fn watch<K: ManagedResource>(&self) -> Result<(), ControllerError> {
        let kind = K::KIND;
        let namespace = self.config.watch_namespace.as_deref();
        info!("Starting {} watcher", kind);

        let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
            let key = key_of(obj.as_ref());
            let delay = ctx.next_backoff(&key);
            error!("Reconciliation error for {}: {} (retry in {}s)", key, error, delay.as_secs());
            Action::requeue(delay)
        };

        let reconcile = |obj: Arc<K>, ctx: Arc<Reconciler>| async move {
            let key = key_of(obj.as_ref());
            ctx.reconcile(&key).await
        };

        // Debounce batches bursts of events, such as our own status writes
        let controller_config = ControllerConfig::default()
            .debounce(self.config.debounce)
            .concurrency(self.config.worker_concurrency);

        let mut controller = Controller::new(api::<K>(&self.client, namespace), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal();

        for dependency in kinds::dependency_kinds(kind) {
            controller = match dependency {
                ResourceKind::Tenant => trigger_dependents::<K, A0Tenant>(controller, &self.client, namespace),
                ResourceKind::Client => trigger_dependents::<K, A0Client>(controller, &self.client, namespace),
                ResourceKind::ResourceServer => {
                    trigger_dependents::<K, A0ResourceServer>(controller, &self.client, namespace)
                }
                ResourceKind::ClientGrant | ResourceKind::Connection => controller,
            };
        }
        if kind == ResourceKind::Connection {
            controller = trigger_labelled(controller, &self.client, namespace);
        }

        controller
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled {} {}", kind, obj.name),
                    Err(e) => error!("Controller error for {}: {}", kind, e),
                }
            })
            .await;

        info!("{} watcher stopped", kind);
        Ok(())
    }
}
