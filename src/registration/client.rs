//! OAuth 2.0 Dynamic Client Registration client (RFC 7591 / RFC 7592).
//!
//! Each operation is an independent request/response exchange. The engine holds
//! no credentials of its own: register asks the configured
//! [`RegistrationTokenSource`] for an initial access token, and read, update and
//! delete use the registration access token supplied by the caller. Expired
//! tokens are handled below this layer by the transport, which learns the
//! client identity from the [`RequestContext`] attached to each request.

use http::StatusCode;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Response};
use std::sync::Arc;
use url::Url;

use super::types::{ClientInformation, ClientMetadata, Operation};
use crate::credentials::RegistrationTokenSource;
use crate::errors::{HttpStatusError, RegistrationError};
use crate::transport::{RequestContext, Transport};

const APPLICATION_JSON: &str = "application/json";

/// Dynamic client registration engine
pub struct RegistrationClient {
    transport: Arc<dyn Transport>,
    token_source: Option<Arc<dyn RegistrationTokenSource>>,
}

impl RegistrationClient {
    /// Create a client without an initial access token source; `register` will fail.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            token_source: None,
        }
    }

    pub fn with_token_source(mut self, token_source: Arc<dyn RegistrationTokenSource>) -> Self {
        self.token_source = Some(token_source);
        self
    }

    /// Register a new client at `endpoint`. Succeeds only on HTTP 201.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        metadata: &ClientMetadata,
    ) -> Result<ClientInformation, RegistrationError> {
        let operation = Operation::Register;
        let token_source = self
            .token_source
            .as_ref()
            .ok_or(RegistrationError::NoCredentialSource)?;

        let url = parse_url(operation, endpoint)?;
        let body = encode(operation, metadata)?;

        // Initial access tokens are single-use and cannot be refreshed.
        let ctx = ctx.anonymous();
        let token = token_source
            .token_for_registration(&ctx)
            .await
            .map_err(RegistrationError::InitialAccessToken)?;

        let request = build_request(operation, Method::POST, url, &token, Some(body))?;
        let response = self
            .dispatch(&ctx, operation, request, StatusCode::CREATED)
            .await?;
        let information = decode(operation, response).await?;

        tracing::debug!(client_id = %information.client_id, "client registered");
        Ok(information)
    }

    /// Read the current registration of `client_id`. Succeeds only on HTTP 200.
    pub async fn read(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        registration_uri: &str,
        access_token: &str,
    ) -> Result<ClientInformation, RegistrationError> {
        let operation = Operation::Read;
        let url = registration_url(operation, registration_uri)?;

        let request = build_request(operation, Method::GET, url, access_token, None)?;
        let response = self
            .dispatch(&ctx.for_client(client_id), operation, request, StatusCode::OK)
            .await?;
        decode(operation, response).await
    }

    /// Replace the registered metadata of `client_id` wholesale. Succeeds only on HTTP 200.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        registration_uri: &str,
        access_token: &str,
        metadata: &ClientMetadata,
    ) -> Result<ClientInformation, RegistrationError> {
        let operation = Operation::Update;
        let url = registration_url(operation, registration_uri)?;

        // RFC 7592 requires the client_id in the update document.
        let mut document = serde_json::to_value(metadata)
            .map_err(|source| RegistrationError::Encode { operation, source })?;
        if let Some(members) = document.as_object_mut() {
            members.insert("client_id".to_string(), client_id.into());
        }
        let body = encode(operation, &document)?;

        let request = build_request(operation, Method::PUT, url, access_token, Some(body))?;
        let response = self
            .dispatch(&ctx.for_client(client_id), operation, request, StatusCode::OK)
            .await?;
        decode(operation, response).await
    }

    /// Delete the registration of `client_id`. Succeeds only on HTTP 204.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        registration_uri: &str,
        access_token: &str,
    ) -> Result<(), RegistrationError> {
        let operation = Operation::Delete;
        let url = registration_url(operation, registration_uri)?;

        let request = build_request(operation, Method::DELETE, url, access_token, None)?;
        let response = self
            .dispatch(
                &ctx.for_client(client_id),
                operation,
                request,
                StatusCode::NO_CONTENT,
            )
            .await?;
        drop(response);

        tracing::debug!(client_id, "client deleted");
        Ok(())
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        request: Request,
        expected: StatusCode,
    ) -> Result<Response, RegistrationError> {
        let response = self
            .transport
            .execute(ctx, request)
            .await
            .map_err(|source| RegistrationError::Transport { operation, source })?;

        if response.status() == expected {
            Ok(response)
        } else {
            Err(HttpStatusError::from_response(operation, response)
                .await
                .into())
        }
    }
}

fn registration_url(operation: Operation, registration_uri: &str) -> Result<Url, RegistrationError> {
    if registration_uri.trim().is_empty() {
        return Err(RegistrationError::MissingRegistrationUri(operation));
    }
    parse_url(operation, registration_uri)
}

fn parse_url(operation: Operation, value: &str) -> Result<Url, RegistrationError> {
    Url::parse(value).map_err(|source| RegistrationError::InvalidEndpoint {
        operation,
        url: value.to_string(),
        source,
    })
}

fn encode<T: serde::Serialize>(operation: Operation, value: &T) -> Result<Vec<u8>, RegistrationError> {
    serde_json::to_vec(value).map_err(|source| RegistrationError::Encode { operation, source })
}

fn build_request(
    operation: Operation,
    method: Method,
    url: Url,
    token: &str,
    body: Option<Vec<u8>>,
) -> Result<Request, RegistrationError> {
    let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| RegistrationError::InvalidToken(operation))?;
    authorization.set_sensitive(true);

    let mut request = Request::new(method, url);
    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

    if let Some(body) = body {
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        *request.body_mut() = Some(body.into());
    }

    Ok(request)
}

async fn decode(operation: Operation, response: Response) -> Result<ClientInformation, RegistrationError> {
    let body = response.bytes().await.map_err(|err| RegistrationError::Transport {
        operation,
        source: crate::errors::TransportError::Body(err),
    })?;
    serde_json::from_slice(&body).map_err(|source| RegistrationError::Decode { operation, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AdminError, is_http_error, is_not_found};
    use crate::registration::types::GrantType;
    use crate::transport::ReqwestTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticTokenSource(&'static str);

    #[async_trait]
    impl RegistrationTokenSource for StaticTokenSource {
        async fn token_for_registration(
            &self,
            _ctx: &RequestContext,
        ) -> Result<String, AdminError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingTokenSource;

    #[async_trait]
    impl RegistrationTokenSource for FailingTokenSource {
        async fn token_for_registration(
            &self,
            _ctx: &RequestContext,
        ) -> Result<String, AdminError> {
            Err(AdminError::UnexpectedStatus {
                operation: "initial access token",
                status: StatusCode::FORBIDDEN,
                body: String::new(),
            })
        }
    }

    fn registration_client() -> RegistrationClient {
        RegistrationClient::new(Arc::new(ReqwestTransport::default()))
            .with_token_source(Arc::new(StaticTokenSource("initial-token")))
    }

    fn metadata() -> ClientMetadata {
        ClientMetadata {
            client_name: Some("Billing".to_string()),
            redirect_uris: vec!["https://billing.example.com/callback".to_string()],
            grant_types: vec![GrantType::AuthorizationCode],
            ..Default::default()
        }
    }

    fn client_uri(server: &MockServer) -> String {
        format!("{}/register/client-123", server.uri())
    }

    #[tokio::test]
    async fn test_register_returns_client_information() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(header("authorization", "Bearer initial-token"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "client_name": "Billing",
                "redirect_uris": ["https://billing.example.com/callback"],
                "grant_types": ["authorization_code"],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "client_id": "client-123",
                "client_secret": "secret-456",
                "registration_access_token": "rat-1",
                "registration_client_uri": client_uri(&server),
                "client_name": "Billing",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let information = registration_client()
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap();

        assert_eq!(information.client_id, "client-123");
        assert_eq!(information.client_secret.as_deref(), Some("secret-456"));
        assert_eq!(information.registration_access_token, "rat-1");
        assert_eq!(information.registration_client_uri, client_uri(&server));
        assert_eq!(information.metadata.client_name.as_deref(), Some("Billing"));
    }

    #[tokio::test]
    async fn test_register_rejection_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_redirect_uri"}"#),
            )
            .mount(&server)
            .await;

        let err = registration_client()
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("HTTP 400"));
        assert!(err.to_string().contains("invalid_redirect_uri"));
        assert!(matches!(
            &err,
            RegistrationError::Http(http) if http.operation == Operation::Register
        ));
    }

    #[tokio::test]
    async fn test_register_requires_exactly_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "client-123",
            })))
            .mount(&server)
            .await;

        let err = registration_client()
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap_err();

        assert!(is_http_error(&err));
    }

    #[tokio::test]
    async fn test_register_without_token_source() {
        let server = MockServer::start().await;
        let client = RegistrationClient::new(Arc::new(ReqwestTransport::default()));

        let err = client
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::NoCredentialSource));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_register_token_source_failure() {
        let server = MockServer::start().await;
        let client = RegistrationClient::new(Arc::new(ReqwestTransport::default()))
            .with_token_source(Arc::new(FailingTokenSource));

        let err = client
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InitialAccessToken(_)));
        assert!(!is_http_error(&err));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_register_malformed_response_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = registration_client()
            .register(
                &RequestContext::new(),
                &format!("{}/register", server.uri()),
                &metadata(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Decode {
                operation: Operation::Register,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_read_uses_registration_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/register/client-123"))
            .and(header("authorization", "Bearer rat-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "client-123",
                "registration_access_token": "rat-2",
                "registration_client_uri": client_uri(&server),
                "redirect_uris": ["https://billing.example.com/callback"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let information = registration_client()
            .read(&RequestContext::new(), "client-123", &client_uri(&server), "rat-1")
            .await
            .unwrap();

        assert_eq!(information.client_id, "client-123");
        assert_eq!(information.registration_access_token, "rat-2");
    }

    #[tokio::test]
    async fn test_update_sends_full_document() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/register/client-123"))
            .and(header("authorization", "Bearer rat-1"))
            .and(body_json(json!({
                "client_id": "client-123",
                "client_name": "Billing",
                "redirect_uris": ["https://billing.example.com/callback"],
                "grant_types": ["authorization_code"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "client-123",
                "client_name": "Billing",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let information = registration_client()
            .update(
                &RequestContext::new(),
                "client-123",
                &client_uri(&server),
                "rat-1",
                &metadata(),
            )
            .await
            .unwrap();

        assert_eq!(information.metadata.client_name.as_deref(), Some("Billing"));
    }

    #[tokio::test]
    async fn test_delete_succeeds_on_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/register/client-123"))
            .and(header("authorization", "Bearer rat-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        registration_client()
            .delete(&RequestContext::new(), "client-123", &client_uri(&server), "rat-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_of_missing_client_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = registration_client()
            .delete(&RequestContext::new(), "client-123", &client_uri(&server), "rat-1")
            .await
            .unwrap_err();

        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_empty_registration_uri_makes_no_request() {
        let server = MockServer::start().await;
        let client = registration_client();
        let ctx = RequestContext::new();

        let err = client.delete(&ctx, "client-123", "", "rat-1").await.unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::MissingRegistrationUri(Operation::Delete)
        ));

        let err = client.read(&ctx, "client-123", " ", "rat-1").await.unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::MissingRegistrationUri(Operation::Read)
        ));

        let err = client
            .update(&ctx, "client-123", "", "rat-1", &metadata())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::MissingRegistrationUri(Operation::Update)
        ));

        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }
}
