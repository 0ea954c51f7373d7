//! Cross-resource references
//!
//! A reference points at another managed resource either locally, by namespace and
//! name, or remotely, by an Auth0 identifier supplied directly. When both are given the
//! remote identifier wins and no local lookup takes place.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the `A0Tenant` that owns a resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TenantReference {
    /// Namespace of the tenant (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the `A0Tenant` resource
    pub name: String,
}

/// Reference to an `A0Client`, resolving to its Auth0 client id
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientReference {
    /// Namespace of the client (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the `A0Client` resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Auth0 client id, used as-is without a local lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reference to an `A0ResourceServer`, resolving to its API identifier (audience)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceServerReference {
    /// Namespace of the resource server (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the `A0ResourceServer` resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Auth0 resource server id; the identifier is looked up remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource server identifier (audience), used as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Reference to the Kubernetes Secret holding management API credentials
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret (defaults to the tenant's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
