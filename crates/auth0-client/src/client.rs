//! Auth0 Management API client
//!
//! Implements [`Auth0ClientTrait`] over the Management API v2. Tenant settings are a
//! singleton: "create" and "update" are both a PATCH of `/api/v2/tenants/settings`, and
//! the tenant domain doubles as its remote id.

use crate::auth0_trait::Auth0ClientTrait;
use crate::common::HttpClient;
use crate::error::Auth0Error;
use crate::models::{FindDescriptor, RemoteObject, ResourceKind, TenantAccess};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Page size used when listing collections
const PER_PAGE: usize = 100;

/// Auth0 Management API client
#[derive(Debug)]
pub struct Auth0Client {
    http: HttpClient,
}

impl Auth0Client {
    /// Create a new client
    ///
    /// # Arguments
    /// * `timeout` - Bound applied to every request, token requests included
    pub fn new(timeout: Duration) -> Result<Self, Auth0Error> {
        Self::build(timeout, None)
    }

    /// Create a client that sends every tenant's requests to `base_url`
    /// (local Management API stand-ins and tests)
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Auth0Error> {
        Self::build(timeout, Some(base_url.into()))
    }

    fn build(timeout: Duration, base_url: Option<String>) -> Result<Self, Auth0Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http: HttpClient::new(client, base_url),
        })
    }

    fn object_path(kind: ResourceKind, id: &str) -> String {
        format!("{}/{}", kind.api_path(), urlencoding::encode(id))
    }

    /// Fetch a single object; 404 becomes `Ok(None)`
    async fn get_by_id(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<RemoteObject>, Auth0Error> {
        if kind == ResourceKind::ClientGrant {
            return Ok(self
                .list_all(access, kind, &[])
                .await?
                .into_iter()
                .find(|grant| grant.id == id));
        }

        match self
            .http
            .send(access, Method::GET, &Self::object_path(kind, id), &[], None)
            .await
        {
            Ok(state) => Ok(RemoteObject::from_state(kind, state)),
            Err(Auth0Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List every object of a kind, following `include_totals` pagination
    async fn list_all(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        filters: &[(&str, String)],
    ) -> Result<Vec<RemoteObject>, Auth0Error> {
        let collection = match kind {
            ResourceKind::Client => "clients",
            ResourceKind::ClientGrant => "client_grants",
            ResourceKind::Connection => "connections",
            ResourceKind::ResourceServer => "resource_servers",
            ResourceKind::Tenant => {
                return Err(Auth0Error::InvalidRequest(
                    "tenant settings cannot be listed".to_string(),
                ));
            }
        };

        let mut results = Vec::new();
        let mut page = 0usize;
        loop {
            let mut query: Vec<(&str, String)> = filters.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", PER_PAGE.to_string()));
            query.push(("include_totals", "true".to_string()));

            let body = self
                .http
                .send(access, Method::GET, kind.api_path(), &query, None)
                .await?;
            let (items, total) = match &body {
                Value::Array(items) => (items.clone(), None),
                Value::Object(map) => (
                    map.get(collection)
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                    map.get("total").and_then(Value::as_u64),
                ),
                _ => (Vec::new(), None),
            };

            let fetched = items.len();
            results.extend(
                items
                    .into_iter()
                    .filter_map(|item| RemoteObject::from_state(kind, item)),
            );
            debug!("Listed {} {} (page {})", fetched, kind, page);

            let exhausted = match total {
                Some(total) => results.len() as u64 >= total,
                None => true,
            };
            if fetched == 0 || fetched < PER_PAGE || exhausted {
                break;
            }
            page += 1;
        }
        Ok(results)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Auth0ClientTrait for Auth0Client {
    async fn find(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        descriptor: &FindDescriptor,
    ) -> Result<Option<RemoteObject>, Auth0Error> {
        debug!("Finding {} by {}", kind, descriptor);
        match descriptor {
            FindDescriptor::Tenant => {
                let state = self
                    .http
                    .send(access, Method::GET, ResourceKind::Tenant.api_path(), &[], None)
                    .await?;
                Ok(Some(RemoteObject {
                    id: access.domain.clone(),
                    identifier: None,
                    state,
                }))
            }
            FindDescriptor::ById(id) => self.get_by_id(access, kind, id).await,
            FindDescriptor::ByName(name) => {
                let filters: Vec<(&str, String)> = if kind == ResourceKind::Connection {
                    vec![("name", name.clone())]
                } else {
                    Vec::new()
                };
                Ok(self
                    .list_all(access, kind, &filters)
                    .await?
                    .into_iter()
                    .find(|obj| obj.state.get("name").and_then(Value::as_str) == Some(name)))
            }
            FindDescriptor::ByIdentifier(identifier) => Ok(self
                .list_all(access, kind, &[])
                .await?
                .into_iter()
                .find(|obj| obj.identifier.as_deref() == Some(identifier))),
            FindDescriptor::ByCallbackUrls { urls, mode } => Ok(self
                .list_all(access, ResourceKind::Client, &[])
                .await?
                .into_iter()
                .find(|obj| mode.matches(urls, &string_list(obj.state.get("callbacks"))))),
            FindDescriptor::ByGrant { client_id, audience } => {
                let filters = vec![("client_id", client_id.clone()), ("audience", audience.clone())];
                Ok(self
                    .list_all(access, ResourceKind::ClientGrant, &filters)
                    .await?
                    .into_iter()
                    .find(|obj| {
                        obj.state.get("client_id").and_then(Value::as_str) == Some(client_id)
                            && obj.state.get("audience").and_then(Value::as_str) == Some(audience)
                    }))
            }
        }
    }

    async fn create(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        payload: &Value,
    ) -> Result<RemoteObject, Auth0Error> {
        if kind == ResourceKind::Tenant {
            let state = self
                .http
                .send(access, Method::PATCH, kind.api_path(), &[], Some(payload))
                .await?;
            return Ok(RemoteObject {
                id: access.domain.clone(),
                identifier: None,
                state,
            });
        }

        let state = self
            .http
            .send(access, Method::POST, kind.api_path(), &[], Some(payload))
            .await?;
        RemoteObject::from_state(kind, state).ok_or_else(|| Auth0Error::Api {
            status: 200,
            message: format!("{kind} create response carried no {}", kind.id_field()),
        })
    }

    async fn update(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
        delta: &Value,
    ) -> Result<Value, Auth0Error> {
        let path = if kind == ResourceKind::Tenant {
            kind.api_path().to_string()
        } else {
            Self::object_path(kind, id)
        };
        self.http
            .send(access, Method::PATCH, &path, &[], Some(delta))
            .await
    }

    async fn delete(
        &self,
        access: &TenantAccess,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), Auth0Error> {
        if kind == ResourceKind::Tenant {
            return Err(Auth0Error::InvalidRequest(
                "tenants cannot be deleted through the management API".to_string(),
            ));
        }
        self.http
            .send(access, Method::DELETE, &Self::object_path(kind, id), &[], None)
            .await?;
        Ok(())
    }
}
