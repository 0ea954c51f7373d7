//! A0ClientGrant Custom Resource Definition
//!
//! Grants a client access to an API (resource server) with a set of scopes.

use crate::policy::{EntityPolicy, default_policy};
use crate::references::{ClientReference, ResourceServerReference, TenantReference};
use crate::status::EntityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A0ClientGrantSpec defines the desired state of an Auth0 client grant
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubernetes.auth0.com",
    version = "v1",
    kind = "A0ClientGrant",
    namespaced,
    status = "EntityStatus",
    shortname = "a0grant",
    printcolumn = r#"{"name":"ID", "type":"string", "jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct A0ClientGrantSpec {
    /// Operations the operator may perform
    #[serde(default = "default_policy")]
    pub policy: Vec<EntityPolicy>,

    /// Owning tenant
    pub tenant_ref: TenantReference,

    /// Configuration applied only on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ClientGrantConf>,

    /// Configuration enforced on every reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<ClientGrantConf>,
}

/// Auth0 client grant configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientGrantConf {
    /// Client receiving the grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ClientReference>,

    /// API the grant gives access to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<ResourceServerReference>,

    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
}
