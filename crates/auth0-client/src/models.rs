//! Auth0 client models
//!
//! Kind-agnostic shapes exchanged between the reconciler and the Management API client.
//! Payloads are plain JSON documents; the client only knows where each kind lives.

use crds::CallbackUrlMatchMode;
use serde_json::Value;
use std::fmt;

/// The closed set of Auth0 entity kinds the operator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Tenant settings (singleton per tenant)
    Tenant,
    /// Application
    Client,
    /// Client-to-API grant
    ClientGrant,
    /// Identity provider connection
    Connection,
    /// API
    ResourceServer,
}

impl ResourceKind {
    /// All kinds in dependency order (owners before dependents)
    pub const ALL: [ResourceKind; 5] = [
        Self::Tenant,
        Self::ResourceServer,
        Self::Connection,
        Self::Client,
        Self::ClientGrant,
    ];

    /// Kubernetes kind name of the CRD backing this entity
    #[must_use]
    pub fn crd_kind(self) -> &'static str {
        match self {
            Self::Tenant => "A0Tenant",
            Self::Client => "A0Client",
            Self::ClientGrant => "A0ClientGrant",
            Self::Connection => "A0Connection",
            Self::ResourceServer => "A0ResourceServer",
        }
    }

    /// Management API collection path
    #[must_use]
    pub fn api_path(self) -> &'static str {
        match self {
            Self::Tenant => "/api/v2/tenants/settings",
            Self::Client => "/api/v2/clients",
            Self::ClientGrant => "/api/v2/client-grants",
            Self::Connection => "/api/v2/connections",
            Self::ResourceServer => "/api/v2/resource-servers",
        }
    }

    /// Field carrying the remote id in API responses
    #[must_use]
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Client => "client_id",
            _ => "id",
        }
    }

    /// Field carrying a secondary remote identifier, for kinds that have one
    #[must_use]
    pub fn identifier_field(self) -> Option<&'static str> {
        match self {
            Self::ResourceServer => Some("identifier"),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.crd_kind())
    }
}

/// How to locate a pre-existing remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindDescriptor {
    /// The tenant settings singleton
    Tenant,
    /// Exact remote id
    ById(String),
    /// Display name (clients, connections)
    ByName(String),
    /// Resource server audience
    ByIdentifier(String),
    /// Client callbacks compared with the given mode
    ByCallbackUrls {
        /// Declared callback URLs
        urls: Vec<String>,
        /// Set comparison to apply
        mode: CallbackUrlMatchMode,
    },
    /// Client grant for a client and audience pair
    ByGrant {
        /// Resolved client id
        client_id: String,
        /// Resolved resource server identifier
        audience: String,
    },
}

impl fmt::Display for FindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant => write!(f, "tenant settings"),
            Self::ById(id) => write!(f, "id={id}"),
            Self::ByName(name) => write!(f, "name={name}"),
            Self::ByIdentifier(identifier) => write!(f, "identifier={identifier}"),
            Self::ByCallbackUrls { urls, mode } => write!(f, "callbacks({mode:?})={}", urls.join(",")),
            Self::ByGrant { client_id, audience } => {
                write!(f, "client_id={client_id},audience={audience}")
            }
        }
    }
}

/// A remote Auth0 object as returned by the Management API
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    /// Remote id
    pub id: String,
    /// Secondary identifier (resource server audience)
    pub identifier: Option<String>,
    /// Full remote representation
    pub state: Value,
}

impl RemoteObject {
    /// Build a remote object from an API response body, extracting id and identifier
    /// with the kind's field names.
    #[must_use]
    pub fn from_state(kind: ResourceKind, state: Value) -> Option<Self> {
        let id = state.get(kind.id_field())?.as_str()?.to_string();
        let identifier = kind
            .identifier_field()
            .and_then(|field| state.get(field))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { id, identifier, state })
    }
}

/// Management API access for one tenant
#[derive(Clone, PartialEq, Eq)]
pub struct TenantAccess {
    /// Tenant domain, e.g. `acme.eu.auth0.com`
    pub domain: String,
    /// Machine-to-machine client id
    pub client_id: String,
    /// Machine-to-machine client secret
    pub client_secret: String,
}

impl fmt::Debug for TenantAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantAccess")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_field_is_used_for_clients() {
        let obj = RemoteObject::from_state(
            ResourceKind::Client,
            json!({"client_id": "abc", "name": "web"}),
        )
        .unwrap();
        assert_eq!(obj.id, "abc");
        assert_eq!(obj.identifier, None);
    }

    #[test]
    fn test_resource_server_identifier_is_extracted() {
        let obj = RemoteObject::from_state(
            ResourceKind::ResourceServer,
            json!({"id": "rs_1", "identifier": "https://api.acme"}),
        )
        .unwrap();
        assert_eq!(obj.identifier.as_deref(), Some("https://api.acme"));
    }

    #[test]
    fn test_missing_id_yields_none() {
        assert!(RemoteObject::from_state(ResourceKind::Connection, json!({"name": "db"})).is_none());
    }

    #[test]
    fn test_tenant_access_debug_redacts_secret() {
        let access = TenantAccess {
            domain: "acme.auth0.com".to_string(),
            client_id: "m2m".to_string(),
            client_secret: "s3cret".to_string(),
        };
        assert!(!format!("{access:?}").contains("s3cret"));
    }
}
