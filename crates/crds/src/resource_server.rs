//! A0ResourceServer Custom Resource Definition
//!
//! Declares an Auth0 API. Its `identifier` is the audience client grants refer to.

use crate::passthrough::PassthroughDocument;
use crate::policy::{EntityPolicy, default_policy};
use crate::references::TenantReference;
use crate::status::EntityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A0ResourceServerSpec defines the desired state of an Auth0 API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubernetes.auth0.com",
    version = "v1",
    kind = "A0ResourceServer",
    namespaced,
    status = "EntityStatus",
    shortname = "a0api",
    printcolumn = r#"{"name":"Identifier", "type":"string", "jsonPath":".status.identifier"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct A0ResourceServerSpec {
    /// Operations the operator may perform
    #[serde(default = "default_policy")]
    pub policy: Vec<EntityPolicy>,

    /// Owning tenant
    pub tenant_ref: TenantReference,

    /// Configuration applied only on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ResourceServerConf>,

    /// Configuration enforced on every reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<ResourceServerConf>,
}

/// A scope exposed by an API
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceServerScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Auth0 API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceServerConf {
    /// Unique API identifier (audience); fixed after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<ResourceServerScope>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_offline_access: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_lifetime: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_lifetime_for_web: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_consent_for_verifiable_first_party_clients: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_policies: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_dialect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_encryption: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_possession: Option<PassthroughDocument>,
}
