//! Handles POST /validate/realmconfigs - Kubernetes validating admission webhook
//!
//! Every decision is returned as an `AdmissionReview` echoing the request uid.
//! Validator rejections are denials with code 403. A CREATE whose object cannot
//! be read as a realm configuration is denied with code 400.

use axum::{Json, extract::State};
use serde_json::Value;

use super::context::AppState;
use crate::admission::{
    AdmissionOperation, AdmissionResponse, AdmissionReview, RealmConfig, Warnings,
};
use crate::errors::{AdmissionError, Result, WebhookError};

const DENIED: u16 = 403;
const BAD_OBJECT: u16 = 400;

pub async fn handle_validate_realmconfigs(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview>,
) -> Result<Json<AdmissionReview>> {
    let request = review.request.ok_or(WebhookError::MissingRequest)?;
    let ctx = state.request_context();
    let uid = request.uid;

    tracing::debug!(
        uid = %uid,
        operation = ?request.operation,
        name = ?request.name,
        namespace = ?request.namespace,
        "admission review received"
    );

    let response = match request.operation {
        AdmissionOperation::Create => match decode_object(request.object) {
            Ok(config) => decide(uid, state.validator.validate_create(&ctx, &config).await),
            Err(err) => AdmissionResponse::deny(uid, BAD_OBJECT, err.to_string()),
        },
        AdmissionOperation::Update => {
            let old = decode_object(request.old_object).unwrap_or_default();
            let new = decode_object(request.object).unwrap_or_default();
            decide(uid, state.validator.validate_update(&ctx, &old, &new).await)
        }
        AdmissionOperation::Delete => {
            let old = decode_object(request.old_object).unwrap_or_default();
            decide(uid, state.validator.validate_delete(&ctx, &old).await)
        }
        AdmissionOperation::Connect => AdmissionResponse::allow(uid, Warnings::new()),
    };

    Ok(Json(AdmissionReview::from_response(response)))
}

fn decode_object(object: Option<Value>) -> std::result::Result<RealmConfig, AdmissionError> {
    let object =
        object.ok_or_else(|| AdmissionError::InvalidObject("request has no object".to_string()))?;
    serde_json::from_value(object).map_err(|err| AdmissionError::InvalidObject(err.to_string()))
}

fn decide(
    uid: String,
    result: std::result::Result<Warnings, AdmissionError>,
) -> AdmissionResponse {
    match result {
        Ok(warnings) => AdmissionResponse::allow(uid, warnings),
        Err(err) => AdmissionResponse::deny(uid, DENIED, err.to_string()),
    }
}
