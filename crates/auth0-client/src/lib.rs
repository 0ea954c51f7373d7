//! Auth0 Management API Client
//!
//! The remote state capability used by the Auth0 operator: find, create, update and
//! delete of tenant settings, clients, client grants, connections and resource servers.
//!
//! # Example
//!
//! ```no_run
//! use auth0_client::{Auth0Client, Auth0ClientTrait, FindDescriptor, ResourceKind, TenantAccess};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Auth0Client::new(Duration::from_secs(30))?;
//! let access = TenantAccess {
//!     domain: "acme.eu.auth0.com".to_string(),
//!     client_id: "m2m-client".to_string(),
//!     client_secret: "secret".to_string(),
//! };
//!
//! let existing = client
//!     .find(&access, ResourceKind::Client, &FindDescriptor::ByName("web".to_string()))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Classified errors**: every failure maps onto not-found, conflict, transient or permanent
//! - **Token caching**: client-credentials tokens are reused per tenant until expiry
//! - **Pagination**: collection lookups follow `include_totals` pages
//! - **Mocking**: `MockAuth0Client` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod auth0_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth0_trait::Auth0ClientTrait;
pub use client::Auth0Client;
pub use error::{Auth0Error, ErrorClass};
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockAuth0Client, MockOperation, RecordedCall};
