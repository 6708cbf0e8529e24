//! Admission check for realm configuration resources.
//!
//! Creation is strict: the realm name must be non-empty, not reserved, not
//! deny-listed, and not already present in the identity provider. Any failure to
//! establish that, including an unreachable provider, rejects the request.
//!
//! Updates and deletions are always admitted. A reconciler that has already
//! created the realm must still be able to add finalizers and write status to
//! its resource, which would otherwise be rejected as "already exists".

use async_trait::async_trait;
use std::sync::Arc;

use super::types::RealmConfig;
use crate::errors::{AdminError, AdmissionError};
use crate::transport::RequestContext;

/// The identity provider's root realm; never provisioned through a resource.
pub const RESERVED_REALM: &str = "master";

/// Non-blocking messages returned alongside an admitted request
pub type Warnings = Vec<String>;

/// Realm existence lookups
#[async_trait]
pub trait RealmDirectory: Send + Sync {
    async fn realm_exists(&self, ctx: &RequestContext, realm: &str) -> Result<bool, AdminError>;
}

pub struct RealmValidator {
    directory: Arc<dyn RealmDirectory>,
    deny_list: Vec<String>,
}

impl RealmValidator {
    pub fn new(directory: Arc<dyn RealmDirectory>, deny_list: Vec<String>) -> Self {
        Self {
            directory,
            deny_list,
        }
    }

    pub async fn validate_create(
        &self,
        ctx: &RequestContext,
        config: &RealmConfig,
    ) -> Result<Warnings, AdmissionError> {
        let result = self.check_create(ctx, &config.spec.realm_name).await;
        match &result {
            Ok(_) => tracing::debug!(realm = %config.spec.realm_name.trim(), "realm creation admitted"),
            Err(err) => tracing::warn!(realm = %config.spec.realm_name.trim(), error = %err, "realm creation rejected"),
        }
        result
    }

    pub async fn validate_update(
        &self,
        _ctx: &RequestContext,
        _old: &RealmConfig,
        _new: &RealmConfig,
    ) -> Result<Warnings, AdmissionError> {
        Ok(Warnings::new())
    }

    pub async fn validate_delete(
        &self,
        _ctx: &RequestContext,
        _config: &RealmConfig,
    ) -> Result<Warnings, AdmissionError> {
        Ok(Warnings::new())
    }

    async fn check_create(
        &self,
        ctx: &RequestContext,
        realm_name: &str,
    ) -> Result<Warnings, AdmissionError> {
        let realm = realm_name.trim();
        if realm.is_empty() {
            return Err(AdmissionError::EmptyRealmName);
        }
        if realm == RESERVED_REALM {
            return Err(AdmissionError::ReservedRealm(realm.to_string()));
        }
        if self.deny_list.iter().any(|denied| denied == realm) {
            return Err(AdmissionError::DeniedRealm(realm.to_string()));
        }

        let exists = self
            .directory
            .realm_exists(ctx, realm)
            .await
            .map_err(|source| AdmissionError::ExistenceCheckFailed {
                realm: realm.to_string(),
                source,
            })?;
        if exists {
            return Err(AdmissionError::RealmExists(realm.to_string()));
        }

        Ok(Warnings::new())
    }
}
