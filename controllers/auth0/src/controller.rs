//! Main controller implementation.
//!
//! Builds the Kubernetes client, the object store and the Management API client, then
//! runs one watcher per CRD kind until all of them have drained after a shutdown signal.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::Watcher;
use auth0_client::Auth0Client;
use crds::{A0Client, A0ClientGrant, A0Connection, A0ResourceServer, A0Tenant};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type WatcherHandle = JoinHandle<Result<(), ControllerError>>;

/// Main controller for Auth0 resource management.
#[derive(Debug)]
pub struct Controller {
    tenant_watcher: WatcherHandle,
    resource_server_watcher: WatcherHandle,
    connection_watcher: WatcherHandle,
    client_watcher: WatcherHandle,
    client_grant_watcher: WatcherHandle,
}

fn flatten(kind: &str, result: Result<Result<(), ControllerError>, tokio::task::JoinError>) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{kind} watcher panicked: {e}")))?
        .map_err(|e| ControllerError::Watch(format!("{kind} watcher error: {e}")))
}

/// Wait for every watcher to finish draining. A failing watcher ends the wait at once.
async fn join_watchers(watchers: Vec<(&'static str, WatcherHandle)>) -> Result<(), ControllerError> {
    let mut pending: FuturesUnordered<_> = watchers
        .into_iter()
        .map(|(kind, handle)| async move { (kind, flatten(kind, handle.await)) })
        .collect();
    while let Some((kind, result)) = pending.next().await {
        result?;
        debug!("{} watcher drained, {} still running", kind, pending.len());
    }
    Ok(())
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Auth0 Controller");

        let kube_client = Client::try_default().await?;

        // Events are attributed to this replica
        let instance = std::env::var("POD_NAME").unwrap_or_else(|_| format!("auth0-controller-{}", uuid::Uuid::new_v4()));
        let store = KubeStore::new(kube_client.clone(), instance);

        let auth0_client = Auth0Client::new(config.remote_timeout)?;

        let reconciler = Arc::new(Reconciler::new(Arc::new(auth0_client), Arc::new(store), config.clone()));
        let watcher = Arc::new(Watcher::new(reconciler, kube_client, config));

        let tenant_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch::<A0Tenant>().await })
        };
        let resource_server_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch::<A0ResourceServer>().await })
        };
        let connection_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch::<A0Connection>().await })
        };
        let client_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch::<A0Client>().await })
        };
        let client_grant_watcher = tokio::spawn(async move { watcher.watch::<A0ClientGrant>().await });

        Ok(Self {
            tenant_watcher,
            resource_server_watcher,
            connection_watcher,
            client_watcher,
            client_grant_watcher,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Auth0 Controller running");

        // On a shutdown signal each watcher finishes its in-flight reconciles before returning
        join_watchers(vec![
            ("A0Tenant", self.tenant_watcher),
            ("A0ResourceServer", self.resource_server_watcher),
            ("A0Connection", self.connection_watcher),
            ("A0Client", self.client_watcher),
            ("A0ClientGrant", self.client_grant_watcher),
        ])
        .await?;

        info!("Auth0 Controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_waits_for_slow_watchers_to_drain() {
        let drained = Arc::new(AtomicBool::new(false));
        let slow = {
            let drained = drained.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                drained.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let idle = tokio::spawn(async { Ok(()) });

        join_watchers(vec![("A0Tenant", idle), ("A0Client", slow)]).await.unwrap();
        assert!(drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_watcher_ends_the_wait() {
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let failed = tokio::spawn(async { Err(ControllerError::Watch("stream closed".to_string())) });

        let err = join_watchers(vec![("A0Client", stuck), ("A0Connection", failed)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("A0Connection"));
    }
}
