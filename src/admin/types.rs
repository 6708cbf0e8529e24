//! Administrative API representations.

use serde::{Deserialize, Serialize};

/// Client entry returned by `GET /admin/realms/{realm}/clients`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// Provider-internal identifier
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Body of `POST /admin/realms/{realm}/clients-initial-access`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct InitialAccessRequest {
    pub count: u32,
    /// Seconds; 0 means the token does not expire
    pub expiration: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InitialAccessResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistrationAccessTokenResponse {
    pub registration_access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AdminTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}
