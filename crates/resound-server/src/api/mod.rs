//! JSON API plumbing
//!
//! Error envelope, authentication middleware and the helpers shared by the
//! catalog, track and search handlers. Every error leaves the server as
//! `{"status": n, "error": {"type": ..., "reason": ...}}`.

pub mod catalogs;
pub mod search;
pub mod tracks;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use resound::service::Account;
use resound::{Catalog, Error as EngineError};

use crate::auth::AuthError;
use crate::state::AppState;

/// Page size for track listings.
pub const TRACK_PAGE_SIZE: usize = 100;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: ErrorBody,
}

/// An error response in the API envelope format.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    reason: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, reason: impl Into<String>) -> Self {
        ApiError {
            status,
            kind,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", reason)
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "duplicate", reason)
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", reason)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", reason)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: self.status.as_u16(),
            error: ErrorBody {
                kind: self.kind,
                reason: self.reason,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidFingerprint
            | EngineError::InvalidFingerprintVersion
            | EngineError::FingerprintTooLong => {
                ApiError::bad_request(format!("Invalid request: {err}"))
            }
            other => {
                tracing::error!("Request failed: {other}");
                ApiError::internal()
            }
        }
    }
}

/// Resolve the account behind a request and stash it in the extensions.
pub async fn require_account(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let external_id = match state.auth.authenticate(request.headers()).await {
        Ok(account) => account,
        Err(AuthError::NotAuthorized) => {
            return Err(ApiError::unauthorized("Not authorized"));
        }
        Err(AuthError::Provider(reason)) => {
            tracing::error!("Failed to authenticate account: {reason}");
            return Err(ApiError::internal());
        }
    };
    let account = state
        .service
        .account(&external_id)
        .await
        .map_err(ApiError::from)?;
    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

/// Validate a catalog name and hand out the account's catalog handle.
pub(crate) fn account_catalog(account: &Account, name: &str) -> Result<Catalog, ApiError> {
    if !resound::is_valid_catalog_name(name) {
        return Err(ApiError::bad_request("Invalid catalog name"));
    }
    Ok(account.catalog(name))
}

pub(crate) fn check_track_id(id: &str) -> Result<(), ApiError> {
    if !resound::is_valid_track_id(id) {
        return Err(ApiError::bad_request("Invalid track ID"));
    }
    Ok(())
}
