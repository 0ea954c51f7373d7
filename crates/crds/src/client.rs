//! A0Client Custom Resource Definition
//!
//! Declares an Auth0 application. A client may adopt an existing application through
//! `find`, by client id or by its callback URLs.

use crate::passthrough::PassthroughDocument;
use crate::policy::{EntityPolicy, default_policy};
use crate::references::TenantReference;
use crate::status::EntityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A0ClientSpec defines the desired state of an Auth0 application
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubernetes.auth0.com",
    version = "v1",
    kind = "A0Client",
    namespaced,
    status = "EntityStatus",
    shortname = "a0client",
    printcolumn = r#"{"name":"ID", "type":"string", "jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct A0ClientSpec {
    /// Operations the operator may perform
    #[serde(default = "default_policy")]
    pub policy: Vec<EntityPolicy>,

    /// Owning tenant
    pub tenant_ref: TenantReference,

    /// Adoption rules for a pre-existing application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<ClientFind>,

    /// Configuration applied only on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ClientConf>,

    /// Configuration enforced on every reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<ClientConf>,
}

/// How callback URLs of a remote client are compared with the declared ones
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallbackUrlMatchMode {
    /// Remote callbacks and declared callbacks are the same set
    #[default]
    Exact,
    /// Every declared callback is present on the remote client
    Subset,
}

impl CallbackUrlMatchMode {
    /// Compare declared URLs against a remote client's callbacks. Order and duplicates
    /// are ignored; an empty declaration never matches.
    #[must_use]
    pub fn matches(self, declared: &[String], remote: &[String]) -> bool {
        use std::collections::BTreeSet;

        if declared.is_empty() {
            return false;
        }
        let declared: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
        let remote: BTreeSet<&str> = remote.iter().map(String::as_str).collect();
        match self {
            Self::Exact => declared == remote,
            Self::Subset => declared.is_subset(&remote),
        }
    }
}

/// Adoption rules for a pre-existing client
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ClientFind {
    /// Adopt the client with this id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Adopt the client whose callbacks match these URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_urls: Option<Vec<String>>,

    /// Matching mode for `callback_urls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url_match_mode: Option<CallbackUrlMatchMode>,
}

/// Auth0 application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClientConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `native`, `spa`, `regular_web`, `non_interactive`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_first_party: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_conformant: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_origins: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_logout_urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_clients: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_aliases: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiate_login_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin_authentication: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_login_page_on: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_login_page: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_usage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_require_behavior: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_pushed_authorization_requests: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_proof_of_possession: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_level: Option<String>,

    /// Free-form string metadata; keys removed here are cleared remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_configuration: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_logout: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_organization: Option<PassthroughDocument>,
}
