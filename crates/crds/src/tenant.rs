//! A0Tenant Custom Resource Definition
//!
//! Declares the settings of an Auth0 tenant and the credentials used to reach its
//! management API. Tenant settings always exist remotely, so a tenant is adopted on
//! first reconciliation and only ever updated afterwards.

use crate::passthrough::PassthroughDocument;
use crate::policy::{EntityPolicy, default_policy};
use crate::references::SecretReference;
use crate::status::EntityStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A0TenantSpec defines the desired state of an Auth0 tenant
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubernetes.auth0.com",
    version = "v1",
    kind = "A0Tenant",
    namespaced,
    status = "EntityStatus",
    shortname = "a0tenant",
    printcolumn = r#"{"name":"Domain", "type":"string", "jsonPath":".spec.auth.domain"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct A0TenantSpec {
    /// Operations the operator may perform
    #[serde(default = "default_policy")]
    pub policy: Vec<EntityPolicy>,

    /// Tenant name
    pub name: String,

    /// Management API access
    pub auth: TenantAuth,

    /// Settings applied only when the tenant is first reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<TenantConf>,

    /// Settings enforced on every reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<TenantConf>,
}

/// Management API location and credentials
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TenantAuth {
    /// Tenant domain, e.g. `acme.eu.auth0.com`
    pub domain: String,

    /// Secret with `clientId` and `clientSecret` keys for a machine-to-machine application
    pub secret_ref: SecretReference,
}

/// Auth0 tenant settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TenantConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_locales: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_audience: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_version: Option<String>,

    /// Idle session lifetime in hours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_session_lifetime: Option<i32>,

    /// Session lifetime in hours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_lifetime: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_logout_urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<PassthroughDocument>,

    /// Tenant feature flags (`enable_sso` must not change once set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_password: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_mfa_page: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_page: Option<PassthroughDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_flow: Option<PassthroughDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_to_all_operations() {
        let spec: A0TenantSpec = serde_json::from_value(serde_json::json!({
            "name": "acme",
            "auth": {"domain": "acme.auth0.com", "secretRef": {"name": "acme-m2m"}},
            "conf": {"friendly_name": "Acme"}
        }))
        .unwrap();
        assert_eq!(spec.policy, default_policy());
    }

    #[test]
    fn test_unset_conf_fields_are_not_serialized() {
        let conf = TenantConf {
            friendly_name: Some("Acme".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&conf).unwrap(),
            serde_json::json!({"friendly_name": "Acme"})
        );
    }
}
