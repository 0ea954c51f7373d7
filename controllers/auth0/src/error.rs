//! Controller-specific error types.
//!
//! `ControllerError` covers process-level failures (startup, configuration, watches).
//! `StoreError` covers the local object store. `ReconcileError` is the per-resource
//! taxonomy the reconciler maps onto a retry disposition.

use auth0_client::{Auth0Error, ErrorClass, ResourceKind};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in the Auth0 Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Auth0 client error
    #[error("Auth0 error: {0}")]
    Auth0(#[from] Auth0Error),

    /// Local object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Errors raised by the local object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency failure: the object changed since it was read
    #[error("resource version conflict on {0}")]
    Conflict(String),

    /// The object disappeared between read and write
    #[error("{0} not found")]
    NotFound(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Tenant credentials secret missing or malformed
    #[error("credentials secret {secret}: {reason}")]
    Credentials {
        /// `namespace/name` of the secret
        secret: String,
        /// What is wrong with it
        reason: String,
    },

    /// Object could not be projected into a view
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of a single reconciliation run
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A referenced resource does not exist locally
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// A referenced resource exists but has no remote identity yet
    #[error("reference not ready: {0}")]
    ReferenceNotReady(String),

    /// A reference names neither a local resource nor a remote id
    #[error("reference ambiguous: {0}")]
    ReferenceAmbiguous(String),

    /// Resources still depend on a tenant being deleted
    #[error("still referenced by {0}")]
    DependentsRemain(String),

    /// References form a cycle
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    /// The remote object vanished and policy forbids recreating it
    #[error("remote {kind} {id} no longer exists and policy does not permit Create")]
    OrphanedReference {
        /// Kind of the vanished object
        kind: ResourceKind,
        /// Remote id recorded in status
        id: String,
    },

    /// The declaration cannot be applied as written
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// A field that cannot change after creation was changed
    #[error("field {0} cannot be changed after creation")]
    ImmutableField(String),

    /// Remote operation failed
    #[error("{operation} failed: {source}")]
    Remote {
        /// Remote operation that failed
        operation: &'static str,
        /// Underlying classified error
        #[source]
        source: Auth0Error,
    },

    /// Local store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the reconciler reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Waiting on another resource; requeue with backoff
    Blocked,
    /// Retry with backoff; `retry_at` is set when the remote named a reset time
    Transient {
        /// Rate limit reset reported by the remote
        retry_at: Option<DateTime<Utc>>,
    },
    /// Re-fetch and re-run immediately
    Conflict,
    /// Surface on the resource and wait for a declaration change
    Permanent,
}

impl ReconcileError {
    /// Wrap a remote error for `operation`
    pub fn remote(operation: &'static str) -> impl FnOnce(Auth0Error) -> Self {
        move |source| Self::Remote { operation, source }
    }

    /// Classify the failure
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::ReferenceNotFound(_)
            | Self::ReferenceNotReady(_)
            | Self::ReferenceAmbiguous(_)
            | Self::DependentsRemain(_) => Disposition::Blocked,
            Self::DependencyCycle(_)
            | Self::OrphanedReference { .. }
            | Self::InvalidSpec(_)
            | Self::ImmutableField(_) => Disposition::Permanent,
            Self::Remote { source, .. } => match source.classify() {
                // a missing remote target is retried with backoff, never in a tight loop
                ErrorClass::NotFound => Disposition::Transient { retry_at: None },
                // remote uniqueness clash, needs a declaration change
                ErrorClass::Conflict | ErrorClass::Permanent => Disposition::Permanent,
                ErrorClass::Transient => Disposition::Transient {
                    retry_at: source.rate_limit_reset(),
                },
            },
            Self::Store(StoreError::Conflict(_) | StoreError::NotFound(_)) => Disposition::Conflict,
            Self::Store(StoreError::Kube(_) | StoreError::Credentials { .. }) => {
                Disposition::Transient { retry_at: None }
            }
            Self::Store(StoreError::Serialization(_)) => Disposition::Permanent,
        }
    }

    /// Whether the run should re-read the resource and plan again.
    ///
    /// Local write conflicts do, and so does an update whose bound object vanished: the
    /// next pass observes it as gone and plans a recreate.
    #[must_use]
    pub fn replans(&self) -> bool {
        match self {
            Self::Remote { operation, source } => {
                *operation == "update" && source.classify() == ErrorClass::NotFound
            }
            _ => self.disposition() == Disposition::Conflict,
        }
    }

    /// Whether the failure came from a remote rate limit
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                source: Auth0Error::RateLimited { .. },
                ..
            }
        )
    }

    /// Short label used for metrics
    #[must_use]
    pub fn class_label(&self) -> &'static str {
        match self.disposition() {
            Disposition::Blocked => "blocked",
            Disposition::Transient { .. } if self.is_rate_limited() => "rate_limited",
            Disposition::Transient { .. } => "transient",
            Disposition::Conflict => "conflict",
            Disposition::Permanent => "permanent",
        }
    }
}
