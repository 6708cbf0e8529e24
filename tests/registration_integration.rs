//! Registration and admission integration tests
//!
//! These tests wire the administrative API adapter, the retrying transport, the
//! registration engine and the admission router together against one mock
//! identity provider.

use anyhow::Context;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use realm_registrar::{
    admin::{AdminClient, AdminCredentials},
    admission::RealmValidator,
    errors::{is_http_error, is_unauthorized},
    http::{AppState, build_router},
    registration::{ClientMetadata, GrantType, RegistrationClient},
    transport::{AuthRetryTransport, ReqwestTransport, RequestContext},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGISTRATION_PATH: &str = "/realms/org-2/clients-registrations/openid-connect";

fn admin_client(server: &MockServer) -> Arc<AdminClient> {
    let credentials = AdminCredentials {
        realm: "master".to_string(),
        client_id: "realm-registrar".to_string(),
        client_secret: "s3cret".to_string(),
    };
    Arc::new(
        AdminClient::new(
            reqwest::Client::new(),
            server.uri().parse().unwrap(),
            "org-2",
            credentials,
        )
        .unwrap(),
    )
}

fn registration_client(admin: &Arc<AdminClient>) -> RegistrationClient {
    let transport = AuthRetryTransport::new(
        Arc::new(ReqwestTransport::default()),
        Some(admin.clone()),
    );
    RegistrationClient::new(Arc::new(transport)).with_token_source(admin.clone())
}

fn client_document(server: &MockServer, token: &str) -> Value {
    json!({
        "client_id": "billing",
        "client_secret": "billing-secret",
        "client_id_issued_at": 1_700_000_000,
        "client_secret_expires_at": 0,
        "registration_access_token": token,
        "registration_client_uri": format!("{}{REGISTRATION_PATH}/billing", server.uri()),
        "client_name": "Billing",
        "redirect_uris": ["https://billing.example.com/callback"],
        "grant_types": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_method": "client_secret_basic",
    })
}

async fn mount_admin_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "admin-token",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_token_rotation(server: &MockServer, fresh_token: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/admin/realms/org-2/clients"))
        .and(query_param("clientId", "billing"))
        .and(header_eq("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "uuid-2", "clientId": "billing"},
        ])))
        .expect(times)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/org-2/clients/uuid-2/registration-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "registrationAccessToken": fresh_token,
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_register_then_read_with_expired_token() {
    let server = MockServer::start().await;
    mount_admin_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/org-2/clients-initial-access"))
        .and(body_json(json!({"count": 1, "expiration": 300})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": "initial-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REGISTRATION_PATH))
        .and(header_eq("authorization", "Bearer initial-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(client_document(&server, "rat-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REGISTRATION_PATH}/billing")))
        .and(header_eq("authorization", "Bearer rat-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REGISTRATION_PATH}/billing")))
        .and(header_eq("authorization", "Bearer rat-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(client_document(&server, "rat-2")))
        .expect(1)
        .mount(&server)
        .await;
    mount_token_rotation(&server, "rat-2", 1).await;

    let admin = admin_client(&server);
    let registration = registration_client(&admin);
    let ctx = RequestContext::new();

    let metadata = ClientMetadata {
        client_name: Some("Billing".to_string()),
        redirect_uris: vec!["https://billing.example.com/callback".to_string()],
        grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        ..Default::default()
    };
    let endpoint = admin.registration_endpoint().unwrap();
    let registered = registration
        .register(&ctx, endpoint.as_str(), &metadata)
        .await
        .unwrap();
    assert_eq!(registered.client_id, "billing");
    assert_eq!(registered.registration_access_token, "rat-1");

    let read = registration
        .read(
            &ctx,
            &registered.client_id,
            &registered.registration_client_uri,
            &registered.registration_access_token,
        )
        .await
        .unwrap();
    assert_eq!(read.registration_access_token, "rat-2");
    assert_eq!(read.metadata.client_name.as_deref(), Some("Billing"));
}

#[tokio::test]
async fn test_update_replays_body_after_refresh() {
    let server = MockServer::start().await;
    mount_admin_token(&server).await;
    mount_token_rotation(&server, "rat-2", 1).await;
    Mock::given(method("PUT"))
        .and(path(format!("{REGISTRATION_PATH}/billing")))
        .and(header_eq("authorization", "Bearer rat-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{REGISTRATION_PATH}/billing")))
        .and(header_eq("authorization", "Bearer rat-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(client_document(&server, "rat-3")))
        .expect(1)
        .mount(&server)
        .await;

    let admin = admin_client(&server);
    let registration = registration_client(&admin);
    let metadata = ClientMetadata {
        client_name: Some("Billing v2".to_string()),
        redirect_uris: vec!["https://billing.example.com/v2/callback".to_string()],
        ..Default::default()
    };

    let updated = registration
        .update(
            &RequestContext::new(),
            "billing",
            &format!("{}{REGISTRATION_PATH}/billing", server.uri()),
            "rat-1",
            &metadata,
        )
        .await
        .unwrap();
    assert_eq!(updated.registration_access_token, "rat-3");

    let puts: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "PUT")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0], puts[1]);
    assert_eq!(puts[1]["client_id"], "billing");
    assert_eq!(puts[1]["client_name"], "Billing v2");
}

#[tokio::test]
async fn test_delete_rejected_after_refresh_is_unauthorized() {
    let server = MockServer::start().await;
    mount_admin_token(&server).await;
    mount_token_rotation(&server, "rat-2", 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{REGISTRATION_PATH}/billing")))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(2)
        .mount(&server)
        .await;

    let admin = admin_client(&server);
    let registration = registration_client(&admin);

    let err = registration
        .delete(
            &RequestContext::new(),
            "billing",
            &format!("{}{REGISTRATION_PATH}/billing", server.uri()),
            "rat-1",
        )
        .await
        .context("deleting client billing")
        .unwrap_err();

    assert!(is_http_error(err.as_ref()));
    assert!(is_unauthorized(err.as_ref()));
    assert!(format!("{err:#}").contains("HTTP 401"));
}

async fn admission_request(router: axum::Router, uid: &str, realm: &str) -> Value {
    let review = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "operation": "CREATE",
            "object": {
                "apiVersion": "identity.example.com/v1",
                "kind": "RealmConfig",
                "metadata": {"name": realm, "namespace": "tenants"},
                "spec": {"realmName": realm},
            },
        },
    });
    let response = router
        .oneshot(
            Request::post("/validate/realmconfigs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(review.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice::<Value>(&bytes).unwrap()["response"].clone()
}

#[tokio::test]
async fn test_admission_against_identity_provider() {
    let server = MockServer::start().await;
    mount_admin_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/org-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"realm": "org-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/org-2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/org-3"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let validator = RealmValidator::new(admin_client(&server), vec!["admin".to_string()]);
    let router = build_router(AppState::new(Arc::new(validator), CancellationToken::new()));

    let admitted = admission_request(router.clone(), "uid-1", "org-2").await;
    assert_eq!(admitted["uid"], "uid-1");
    assert_eq!(admitted["allowed"], true);

    let existing = admission_request(router.clone(), "uid-2", "org-1").await;
    assert_eq!(existing["allowed"], false);
    assert_eq!(existing["status"]["code"], 403);
    assert!(
        existing["status"]["message"]
            .as_str()
            .unwrap()
            .contains("already exists")
    );

    let unavailable = admission_request(router.clone(), "uid-3", "org-3").await;
    assert_eq!(unavailable["allowed"], false);

    let reserved = admission_request(router, "uid-4", "master").await;
    assert_eq!(reserved["allowed"], false);
}
