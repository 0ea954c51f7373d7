//! Auth0 Controller
//!
//! Reconciles the Auth0 operator CRDs against the Auth0 Management API:
//! - A0Tenant: tenant settings and Management API credentials
//! - A0ResourceServer: APIs
//! - A0Connection: identity provider connections
//! - A0Client: applications
//! - A0ClientGrant: client access to an API
//!
//! Resources reference each other by name or by remote id; a resource is only applied
//! once everything it references exists remotely.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconcile_helpers;
mod reconciler;
mod server;
mod store;
mod view;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::server::{ServerState, start_server};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Auth0 Controller");

    let config = Config::from_env()?;
    config.log();

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let port = config.metrics_port;
    let probe_state = server_state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(port, probe_state).await {
            error!("HTTP server error: {}", e);
        }
    });

    let controller = Controller::new(config).await?;
    server_state.mark_ready();
    controller.run().await?;

    Ok(())
}
