//! HTTP tests for the Auth0 Management API client using wiremock.

use auth0_client::{
    Auth0Client, Auth0ClientTrait, Auth0Error, ErrorClass, FindDescriptor, ResourceKind,
    TenantAccess,
};
use crds::CallbackUrlMatchMode;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn access() -> TenantAccess {
    TenantAccess {
        domain: "acme.auth0.com".to_string(),
        client_id: "m2m".to_string(),
        client_secret: "secret".to_string(),
    }
}

async fn server_with_token() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_json(json!({
            "grant_type": "client_credentials",
            "client_id": "m2m",
            "client_secret": "secret",
            "audience": "https://acme.auth0.com/api/v2/"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_in": 86400})),
        )
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer) -> Auth0Client {
    Auth0Client::with_base_url(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_token_is_requested_once_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_in": 86400})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/settings"))
        .and(bearer_token("tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"friendly_name": "Acme"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    for _ in 0..2 {
        let found = client
            .find(&access(), ResourceKind::Tenant, &FindDescriptor::Tenant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "acme.auth0.com");
        assert_eq!(found.state["friendly_name"], "Acme");
    }
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "access_denied", "message": "Unauthorized"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .find(&access(), ResourceKind::Tenant, &FindDescriptor::Tenant)
        .await
        .unwrap_err();
    assert!(matches!(err, Auth0Error::Authentication(_)));
    assert_eq!(err.classify(), ErrorClass::Permanent);
}

#[tokio::test]
async fn test_find_by_id_not_found_is_none() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/clients/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Client not found"})))
        .mount(&server)
        .await;

    let found = client(&server)
        .find(&access(), ResourceKind::Client, &FindDescriptor::ById("missing".to_string()))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_find_by_callback_urls_subset() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/clients"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clients": [
                {"client_id": "c1", "name": "other", "callbacks": ["https://other/cb"]},
                {"client_id": "c2", "name": "web", "callbacks": ["https://web/cb", "https://web/alt"]}
            ],
            "total": 2,
            "start": 0,
            "limit": 100
        })))
        .mount(&server)
        .await;

    let descriptor = FindDescriptor::ByCallbackUrls {
        urls: vec!["https://web/cb".to_string()],
        mode: CallbackUrlMatchMode::Subset,
    };
    let found = client(&server)
        .find(&access(), ResourceKind::Client, &descriptor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "c2");

    let exact = FindDescriptor::ByCallbackUrls {
        urls: vec!["https://web/cb".to_string()],
        mode: CallbackUrlMatchMode::Exact,
    };
    assert!(
        client(&server)
            .find(&access(), ResourceKind::Client, &exact)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_find_resource_server_by_identifier() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/resource-servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource_servers": [
                {"id": "rs_mgmt", "identifier": "https://acme.auth0.com/api/v2/", "name": "Auth0 Management API"},
                {"id": "rs_1", "identifier": "https://api.acme", "name": "API"}
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    let descriptor = FindDescriptor::ByIdentifier("https://api.acme".to_string());
    let found = client(&server)
        .find(&access(), ResourceKind::ResourceServer, &descriptor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "rs_1");
    assert_eq!(found.identifier.as_deref(), Some("https://api.acme"));

    let missing = FindDescriptor::ByIdentifier("https://other.acme".to_string());
    assert!(
        client(&server)
            .find(&access(), ResourceKind::ResourceServer, &missing)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_find_grant_by_client_and_audience() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/client-grants"))
        .and(query_param("client_id", "c1"))
        .and(query_param("audience", "https://api.acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_grants": [
                {"id": "cgr_1", "client_id": "c1", "audience": "https://api.acme", "scope": ["read"]}
            ],
            "total": 1
        })))
        .mount(&server)
        .await;

    let found = client(&server)
        .find(
            &access(),
            ResourceKind::ClientGrant,
            &FindDescriptor::ByGrant {
                client_id: "c1".to_string(),
                audience: "https://api.acme".to_string(),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "cgr_1");
}

#[tokio::test]
async fn test_create_resource_server_returns_identifier() {
    let server = server_with_token().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/resource-servers"))
        .and(body_json(json!({"identifier": "https://api.acme", "name": "API"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "rs_1", "identifier": "https://api.acme", "name": "API"
        })))
        .mount(&server)
        .await;

    let created = client(&server)
        .create(
            &access(),
            ResourceKind::ResourceServer,
            &json!({"identifier": "https://api.acme", "name": "API"}),
        )
        .await
        .unwrap();
    assert_eq!(created.id, "rs_1");
    assert_eq!(created.identifier.as_deref(), Some("https://api.acme"));
}

#[tokio::test]
async fn test_tenant_create_patches_settings() {
    let server = server_with_token().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/tenants/settings"))
        .and(body_json(json!({"friendly_name": "Acme"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"friendly_name": "Acme"})))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create(&access(), ResourceKind::Tenant, &json!({"friendly_name": "Acme"}))
        .await
        .unwrap();
    assert_eq!(created.id, "acme.auth0.com");
}

#[tokio::test]
async fn test_update_sends_patch_to_object_path() {
    let server = server_with_token().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/clients/c1"))
        .and(body_json(json!({"name": "web2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"client_id": "c1", "name": "web2"})))
        .expect(1)
        .mount(&server)
        .await;

    let state = client(&server)
        .update(&access(), ResourceKind::Client, "c1", &json!({"name": "web2"}))
        .await
        .unwrap();
    assert_eq!(state["name"], "web2");
}

#[tokio::test]
async fn test_rate_limit_carries_reset() {
    let server = server_with_token().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/connections/con_1"))
        .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "1900000000"))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete(&access(), ResourceKind::Connection, "con_1")
        .await
        .unwrap_err();
    assert_eq!(err.classify(), ErrorClass::Transient);
    assert_eq!(err.rate_limit_reset().map(|r| r.timestamp()), Some(1_900_000_000));
}

#[tokio::test]
async fn test_server_error_is_transient_and_validation_is_permanent() {
    let server = server_with_token().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/clients"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/connections"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Payload validation error"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let transient = client
        .create(&access(), ResourceKind::Client, &json!({"name": "web"}))
        .await
        .unwrap_err();
    assert_eq!(transient.classify(), ErrorClass::Transient);

    let permanent = client
        .create(&access(), ResourceKind::Connection, &json!({"name": "db"}))
        .await
        .unwrap_err();
    assert_eq!(permanent.classify(), ErrorClass::Permanent);
    assert!(permanent.to_string().contains("Payload validation error"));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/settings"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = Auth0Client::with_base_url(server.uri(), Duration::from_millis(100)).unwrap();
    let err = client
        .find(&access(), ResourceKind::Tenant, &FindDescriptor::Tenant)
        .await
        .unwrap_err();
    assert_eq!(err.classify(), ErrorClass::Transient);
}

#[tokio::test]
async fn test_tenant_delete_is_rejected_locally() {
    let server = server_with_token().await;
    let err = client(&server)
        .delete(&access(), ResourceKind::Tenant, "acme.auth0.com")
        .await
        .unwrap_err();
    assert_eq!(err.classify(), ErrorClass::Permanent);
}
