//! Management API tokens
//!
//! Tokens come from the OAuth2 client-credentials grant and are cached per tenant
//! domain until shortly before they expire.

use crate::common::check_status;
use crate::error::Auth0Error;
use crate::models::TenantAccess;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Refresh tokens this long before their stated expiry
const EXPIRY_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    client_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    86_400
}

/// Per-domain token cache
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl TokenCache {
    fn cached(&self, access: &TenantAccess) -> Option<String> {
        let tokens = self.tokens.lock().ok()?;
        let cached = tokens.get(&access.domain)?;
        (cached.client_id == access.client_id && cached.expires_at > Utc::now())
            .then(|| cached.token.clone())
    }

    /// Return a valid token for the tenant, requesting a new one when needed
    pub async fn access_token(
        &self,
        client: &Client,
        base_url: &str,
        access: &TenantAccess,
    ) -> Result<String, Auth0Error> {
        if let Some(token) = self.cached(access) {
            return Ok(token);
        }

        debug!("Requesting management API token for {}", access.domain);
        let audience = format!("https://{}/api/v2/", access.domain);
        let response = client
            .post(format!("{base_url}/oauth/token"))
            .json(&serde_json::json!({
                "grant_type": "client_credentials",
                "client_id": access.client_id,
                "client_secret": access.client_secret,
                "audience": audience,
            }))
            .send()
            .await?;

        let response = match check_status(response).await {
            Ok(response) => response,
            Err(Auth0Error::Api { status, message }) if (400..500).contains(&status) => {
                return Err(Auth0Error::Authentication(message));
            }
            Err(e) => return Err(e),
        };
        let body: TokenResponse = response.json().await?;

        let expires_at =
            Utc::now() + Duration::seconds((body.expires_in - EXPIRY_MARGIN_SECONDS).max(0));
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(
                access.domain.clone(),
                CachedToken {
                    client_id: access.client_id.clone(),
                    token: body.access_token.clone(),
                    expires_at,
                },
            );
        }
        Ok(body.access_token)
    }
}
