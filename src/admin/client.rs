//! Identity provider administrative API adapter.
//!
//! [`AdminClient`] authenticates itself with the client-credentials grant and
//! supplies the capabilities the rest of the crate consumes: initial access
//! tokens for registration, registration access token refresh, and realm
//! existence lookups for admission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::types::{
    AdminTokenResponse, ClientRepresentation, InitialAccessRequest, InitialAccessResponse,
    RegistrationAccessTokenResponse,
};
use crate::admission::RealmDirectory;
use crate::credentials::{RegistrationTokenSource, TokenRefresher};
use crate::errors::{AdminError, read_bounded_body};
use crate::transport::RequestContext;

/// Admin tokens are renewed this long before the provider says they expire.
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 30;

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 300;

/// Upper bound on the lifetime honoured from a token response.
const MAX_TOKEN_LIFETIME_SECONDS: i64 = 86_400;

pub const DEFAULT_INITIAL_ACCESS_EXPIRATION: Duration = Duration::from_secs(300);

/// Client-credentials identity used against the administrative API
#[derive(Clone)]
pub struct AdminCredentials {
    /// Realm holding the administrative client
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    realm: String,
    credentials: AdminCredentials,
    initial_access_expiration: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl AdminClient {
    /// Creates an adapter managing clients of `realm`.
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        realm: impl Into<String>,
        credentials: AdminCredentials,
    ) -> Result<Self, AdminError> {
        if base_url.cannot_be_a_base() {
            return Err(AdminError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self {
            http,
            base_url,
            realm: realm.into(),
            credentials,
            initial_access_expiration: DEFAULT_INITIAL_ACCESS_EXPIRATION,
            token: Mutex::new(None),
        })
    }

    pub fn with_initial_access_expiration(mut self, expiration: Duration) -> Self {
        self.initial_access_expiration = expiration;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The dynamic client registration endpoint of the managed realm.
    pub fn registration_endpoint(&self) -> Result<Url, AdminError> {
        self.endpoint(&[
            "realms",
            &self.realm,
            "clients-registrations",
            "openid-connect",
        ])
    }

    /// Whether `realm` exists. Only 200 and 404 are answers; anything else is an error.
    pub async fn realm_exists(&self, ctx: &RequestContext, realm: &str) -> Result<bool, AdminError> {
        const OPERATION: &str = "realm lookup";

        let url = self.endpoint(&["admin", "realms", realm])?;
        let response = self
            .send(ctx, OPERATION, self.authorized(ctx, self.http.get(url)).await?)
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AdminError::UnexpectedStatus {
                operation: OPERATION,
                status,
                body: read_bounded_body(response).await,
            }),
        }
    }

    /// Issues a single-use initial access token for the managed realm.
    pub async fn token_for_registration(&self, ctx: &RequestContext) -> Result<String, AdminError> {
        const OPERATION: &str = "initial access token";

        let url = self.endpoint(&["admin", "realms", &self.realm, "clients-initial-access"])?;
        let body = InitialAccessRequest {
            count: 1,
            expiration: i64::try_from(self.initial_access_expiration.as_secs()).unwrap_or(i64::MAX),
        };
        let request = self.authorized(ctx, self.http.post(url).json(&body)).await?;
        let response = expect_success(OPERATION, self.send(ctx, OPERATION, request).await?).await?;
        let issued: InitialAccessResponse = decode(ctx, OPERATION, response).await?;

        tracing::debug!(realm = %self.realm, "initial access token issued");
        Ok(issued.token)
    }

    /// Rotates the registration access token of `client_id` and returns the new one.
    pub async fn refresh_token(
        &self,
        ctx: &RequestContext,
        client_id: &str,
    ) -> Result<String, AdminError> {
        const OPERATION: &str = "registration access token";

        let client = self.find_client(ctx, client_id).await?;
        let url = self.endpoint(&[
            "admin",
            "realms",
            &self.realm,
            "clients",
            &client.id,
            "registration-access-token",
        ])?;
        let request = self.authorized(ctx, self.http.post(url)).await?;
        let response = expect_success(OPERATION, self.send(ctx, OPERATION, request).await?).await?;
        let refreshed: RegistrationAccessTokenResponse = decode(ctx, OPERATION, response).await?;

        tracing::debug!(realm = %self.realm, client_id, "registration access token rotated");
        Ok(refreshed.registration_access_token)
    }

    /// Looks up the client whose `clientId` equals `client_id` exactly.
    pub async fn find_client(
        &self,
        ctx: &RequestContext,
        client_id: &str,
    ) -> Result<ClientRepresentation, AdminError> {
        const OPERATION: &str = "client lookup";

        let mut url = self.endpoint(&["admin", "realms", &self.realm, "clients"])?;
        url.query_pairs_mut().append_pair("clientId", client_id);

        let request = self.authorized(ctx, self.http.get(url)).await?;
        let response = expect_success(OPERATION, self.send(ctx, OPERATION, request).await?).await?;
        let clients: Vec<ClientRepresentation> = decode(ctx, OPERATION, response).await?;

        clients
            .into_iter()
            .find(|client| client.client_id == client_id)
            .ok_or_else(|| AdminError::ClientNotFound(client_id.to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AdminError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(
        &self,
        ctx: &RequestContext,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, AdminError> {
        let token = self.access_token(ctx).await?;
        Ok(request
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, AdminError> {
        ctx.run(request.send())
            .await
            .ok_or(AdminError::Cancelled(operation))?
            .map_err(|source| AdminError::Request { operation, source })
    }

    /// Returns the cached admin token, fetching a new one when it is near expiry.
    ///
    /// The lock is held across the fetch so concurrent callers share one request.
    async fn access_token(&self, ctx: &RequestContext) -> Result<String, AdminError> {
        const OPERATION: &str = "admin token";

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.expires_at > Utc::now()) {
            return Ok(token.value.clone());
        }

        let url = self.endpoint(&[
            "realms",
            &self.credentials.realm,
            "protocol",
            "openid-connect",
            "token",
        ])?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let request = self.http.post(url).form(&form);
        let response = expect_success(OPERATION, self.send(ctx, OPERATION, request).await?).await?;
        let issued: AdminTokenResponse = decode(ctx, OPERATION, response).await?;

        let expires_at = token_expiry(Utc::now(), issued.expires_in);
        tracing::debug!(realm = %self.credentials.realm, %expires_at, "admin token acquired");

        *cached = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at,
        });
        Ok(issued.access_token)
    }
}

/// Lifetimes outside `0..=MAX_TOKEN_LIFETIME_SECONDS` are clamped; a token
/// with no usable lifetime left is already expired.
fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let lifetime = expires_in
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS)
        .clamp(0, MAX_TOKEN_LIFETIME_SECONDS)
        .saturating_sub(TOKEN_EXPIRY_MARGIN_SECONDS);
    chrono::Duration::try_seconds(lifetime)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

async fn expect_success(operation: &'static str, response: Response) -> Result<Response, AdminError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    Err(AdminError::UnexpectedStatus {
        operation,
        status,
        body: read_bounded_body(response).await,
    })
}

async fn decode<T: DeserializeOwned>(
    ctx: &RequestContext,
    operation: &'static str,
    response: Response,
) -> Result<T, AdminError> {
    ctx.run(response.json::<T>())
        .await
        .ok_or(AdminError::Cancelled(operation))?
        .map_err(|source| AdminError::Decode { operation, source })
}

#[async_trait]
impl RegistrationTokenSource for AdminClient {
    async fn token_for_registration(&self, ctx: &RequestContext) -> Result<String, AdminError> {
        AdminClient::token_for_registration(self, ctx).await
    }
}

#[async_trait]
impl TokenRefresher for AdminClient {
    async fn refresh_token(
        &self,
        ctx: &RequestContext,
        client_id: &str,
    ) -> Result<String, AdminError> {
        AdminClient::refresh_token(self, ctx, client_id).await
    }
}

#[async_trait]
impl RealmDirectory for AdminClient {
    async fn realm_exists(&self, ctx: &RequestContext, realm: &str) -> Result<bool, AdminError> {
        AdminClient::realm_exists(self, ctx, realm).await
    }
}
