//! Common utilities for the Auth0 Management API client
//!
//! Request plumbing shared by every entity kind: URL building, bearer tokens and
//! response classification.

pub mod token;

use crate::error::Auth0Error;
use crate::models::TenantAccess;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use token::TokenCache;
use tracing::debug;

/// HTTP client wrapper with per-tenant authentication
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    base_url_override: Option<String>,
    tokens: TokenCache,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url_override: Option<String>) -> Self {
        Self {
            client,
            base_url_override: base_url_override.map(|u| u.trim_end_matches('/').to_string()),
            tokens: TokenCache::default(),
        }
    }

    /// Base URL for a tenant domain
    pub fn base_url(&self, domain: &str) -> String {
        match &self.base_url_override {
            Some(url) => url.clone(),
            None => format!("https://{}", domain.trim_end_matches('/')),
        }
    }

    /// Build a full URL from a path
    pub fn build_url(&self, access: &TenantAccess, path: &str) -> String {
        format!("{}{}", self.base_url(&access.domain), path)
    }

    /// Send an authenticated request and return the decoded JSON body.
    /// Empty bodies decode to `Value::Null`.
    pub async fn send(
        &self,
        access: &TenantAccess,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, Auth0Error> {
        let token = self
            .tokens
            .access_token(&self.client, &self.base_url(&access.domain), access)
            .await?;
        let url = self.build_url(access, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Map non-success statuses onto classified errors
pub async fn check_status(response: Response) -> Result<Response, Auth0Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));
        return Err(Auth0Error::RateLimited { reset });
    }

    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body);
    Err(match status {
        StatusCode::NOT_FOUND => Auth0Error::NotFound(message),
        StatusCode::CONFLICT => Auth0Error::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Auth0Error::Authentication(message),
        _ => Auth0Error::Api { status: status.as_u16(), message },
    })
}

/// Extract the `message` of an Auth0 error body, falling back to the raw text
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}
