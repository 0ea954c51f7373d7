//! A0Connection Custom Resource Definition
//!
//! Declares an Auth0 identity provider connection.

use crate::passthrough::PassthroughDocument;
use crate::policy::{EntityPolicy, default_policy};
use crate::references::TenantReference;
use crate::status::EntityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A0ConnectionSpec defines the desired state of an Auth0 connection
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubernetes.auth0.com",
    version = "v1",
    kind = "A0Connection",
    namespaced,
    status = "EntityStatus",
    shortname = "a0conn",
    printcolumn = r#"{"name":"ID", "type":"string", "jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct A0ConnectionSpec {
    /// Operations the operator may perform
    #[serde(default = "default_policy")]
    pub policy: Vec<EntityPolicy>,

    /// Owning tenant
    pub tenant_ref: TenantReference,

    /// Adoption rules for a pre-existing connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<ConnectionFind>,

    /// Configuration applied only on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ConnectionConf>,

    /// Configuration enforced on every reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<ConnectionConf>,
}

/// Adoption rules for a pre-existing connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConnectionFind {
    /// Adopt the connection with this id; when unset the connection is found by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Auth0 connection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConnectionConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Identity provider strategy (`auth0`, `google-oauth2`, `samlp`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realms: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_as_button: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_domain_connection: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_ticket_url: Option<String>,

    /// Strategy-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PassthroughDocument>,

    /// Remote client ids enabled on the connection, besides the A0Clients labelled onto it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_clients: Option<Vec<String>>,
}
