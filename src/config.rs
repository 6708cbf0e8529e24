//! Environment-based configuration types for the registrar runtime settings.

use anyhow::Result;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::admin::AdminCredentials;
use crate::errors::ConfigError;

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// Certificate bundles for HTTPS connections
#[derive(Clone)]
pub struct CertificateBundles(Vec<String>);

/// HTTP client timeout configuration
#[derive(Clone)]
pub struct HttpClientTimeout(Duration);

/// Identity provider base URL
#[derive(Clone, Debug)]
pub struct IdpBaseUrl(Url);

/// Administrative client secret; never printed
#[derive(Clone)]
pub struct AdminClientSecret(String);

/// Realm names that may never be provisioned
#[derive(Clone)]
pub struct RealmDenyList(Vec<String>);

/// Lifetime requested for initial access tokens
#[derive(Clone, Debug)]
pub struct InitialAccessTokenExpiration(Duration);

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub certificate_bundles: CertificateBundles,
    pub user_agent: String,
    pub http_client_timeout: HttpClientTimeout,
    pub idp_base_url: IdpBaseUrl,
    pub idp_realm: String,
    pub idp_admin_realm: String,
    pub idp_admin_client_id: String,
    pub idp_admin_client_secret: AdminClientSecret,
    pub realm_deny_list: RealmDenyList,
    pub initial_access_token_expiration: InitialAccessTokenExpiration,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let certificate_bundles: CertificateBundles =
            optional_env("CERTIFICATE_BUNDLES").try_into()?;
        let default_user_agent = format!("realm-registrar/{}", version()?);
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "10s").try_into()?;
        let http_port: HttpPort = default_env("HTTP_PORT", "8443").try_into()?;
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let idp_base_url: IdpBaseUrl = require_env("IDP_BASE_URL")?.try_into()?;
        let idp_realm = default_env("IDP_REALM", "master");
        let idp_admin_realm = default_env("IDP_ADMIN_REALM", "master");
        let idp_admin_client_id = require_env("IDP_ADMIN_CLIENT_ID")?;
        let idp_admin_client_secret: AdminClientSecret =
            require_env("IDP_ADMIN_CLIENT_SECRET")?.try_into()?;
        let realm_deny_list: RealmDenyList = optional_env("REALM_DENY_LIST").try_into()?;
        let initial_access_token_expiration: InitialAccessTokenExpiration =
            default_env("INITIAL_ACCESS_TOKEN_EXPIRATION", "5m").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            certificate_bundles,
            user_agent,
            http_client_timeout,
            idp_base_url,
            idp_realm,
            idp_admin_realm,
            idp_admin_client_id,
            idp_admin_client_secret,
            realm_deny_list,
            initial_access_token_expiration,
        })
    }

    pub fn admin_credentials(&self) -> AdminCredentials {
        AdminCredentials {
            realm: self.idp_admin_realm.clone(),
            client_id: self.idp_admin_client_id.clone(),
            client_secret: self.idp_admin_client_secret.as_ref().clone(),
        }
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::EnvVarRequired(name.to_string()).into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_duration(value: String) -> Result<Duration, ConfigError> {
    duration_str::parse(&value).map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8443))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<Option<String>> for CertificateBundles {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        Ok(Self(
            value
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<String>>(),
        ))
    }
}

impl TryFrom<String> for CertificateBundles {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(Some(value))
    }
}

impl AsRef<Vec<String>> for CertificateBundles {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

impl TryFrom<String> for HttpClientTimeout {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(10)));
        }
        parse_duration(value).map(Self)
    }
}

impl AsRef<Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for IdpBaseUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Url::parse(&value)
            .map(Self)
            .map_err(|err| ConfigError::UrlParsingFailed(value, err))
    }
}

impl AsRef<Url> for IdpBaseUrl {
    fn as_ref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for AdminClientSecret {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(value))
    }
}

impl AsRef<String> for AdminClientSecret {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl fmt::Debug for AdminClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminClientSecret([REDACTED])")
    }
}

impl TryFrom<Option<String>> for RealmDenyList {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        if value.is_empty() {
            return Ok(Self(Vec::new()));
        }

        let realms = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        Ok(Self(realms))
    }
}

impl TryFrom<String> for RealmDenyList {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(Some(value))
    }
}

impl AsRef<Vec<String>> for RealmDenyList {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

impl TryFrom<String> for InitialAccessTokenExpiration {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(value).map(Self)
    }
}

impl AsRef<Duration> for InitialAccessTokenExpiration {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}
