//! Auth0 Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Auth0 operator: tenants, clients,
//! client grants, connections and resource servers.

pub mod client;
pub mod client_grant;
pub mod connection;
pub mod passthrough;
pub mod policy;
pub mod references;
pub mod resource_server;
pub mod status;
pub mod tenant;

pub use client::*;
pub use client_grant::*;
pub use connection::*;
pub use passthrough::PassthroughDocument;
pub use policy::*;
pub use references::*;
pub use resource_server::*;
pub use status::*;
pub use tenant::*;

/// API group shared by every Auth0 operator CRD
pub const API_GROUP: &str = "kubernetes.auth0.com";

/// API version shared by every Auth0 operator CRD
pub const API_VERSION: &str = "v1";
