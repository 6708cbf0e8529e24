//! Dynamic Client Registration wire types (RFC 7591 / RFC 7592).
//!
//! Optional members are omitted from the serialized form instead of being sent
//! as `null` or empty arrays. Members the provider returns that are not modelled
//! here are kept in `extra` so an echoed document survives a round-trip.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Logical DCR action, independent of the HTTP verb used to perform it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Register,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 2.0 grant types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
    Implicit,
    Password,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
    #[serde(untagged)]
    Other(String),
}

/// OAuth 2.0 response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
    Token,
    IdToken,
    #[serde(untagged)]
    Other(String),
}

/// Token endpoint client authentication methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    ClientSecretJwt,
    PrivateKeyJwt,
    TlsClientAuth,
    None,
    #[serde(untagged)]
    Other(String),
}

/// Parses a wire name; names that are not modelled become `Other`.
macro_rules! impl_from_wire_name {
    ($($ty:ty),+) => {$(
        impl FromStr for $ty {
            type Err = Infallible;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ok(serde_json::from_value(serde_json::Value::String(value.to_string()))
                    .unwrap_or_else(|_| Self::Other(value.to_string())))
            }
        }
    )+};
}

impl_from_wire_name!(GrantType, ResponseType, ClientAuthMethod);

/// Client metadata sent on register and update, and echoed back by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<GrantType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<ResponseType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<ClientAuthMethod>,

    /// Space-separated scope values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    /// Provider-specific members not modelled above
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Registration response returned by register, read and update.
///
/// `registration_access_token` and `registration_client_uri` are opaque
/// provider values and are the only credentials valid for later read, update
/// and delete calls on this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInformation {
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Seconds since epoch, 0 when not provided
    #[serde(default, skip_serializing_if = "is_zero")]
    pub client_id_issued_at: i64,

    /// Seconds since epoch, 0 when not provided or non-expiring
    #[serde(default, skip_serializing_if = "is_zero")]
    pub client_secret_expires_at: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registration_access_token: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registration_client_uri: String,

    #[serde(flatten)]
    pub metadata: ClientMetadata,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
