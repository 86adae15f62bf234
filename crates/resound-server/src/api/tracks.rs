//! Track handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use resound::catalog::Metadata;
use resound::service::Account;
use resound::Fingerprint;

use crate::api::{account_catalog, check_track_id, ApiError};
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub catalog: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTrackRequest {
    pub fingerprint: String,
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub allow_duplicate: bool,
}

pub async fn create_track(
    Extension(account): Extension<Account>,
    Path((catalog_name, track_id)): Path<(String, String)>,
    body: Result<Json<CreateTrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    put_track(account, catalog_name, track_id, body).await
}

/// Anonymous track creation; the server assigns a UUIDv4 id.
pub async fn create_anonymous_track(
    Extension(account): Extension<Account>,
    Path(catalog_name): Path<String>,
    body: Result<Json<CreateTrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    let catalog = account_catalog(&account, &catalog_name)?;
    let track_id = catalog.new_track_id();
    put_track(account, catalog_name, track_id, body).await
}

async fn put_track(
    account: Account,
    catalog_name: String,
    track_id: String,
    body: CreateTrackRequest,
) -> Result<Json<TrackResponse>, ApiError> {
    let catalog = account_catalog(&account, &catalog_name)?;
    check_track_id(&track_id)?;

    let fingerprint = Fingerprint::from_base64(&body.fingerprint)
        .map_err(|err| ApiError::bad_request(format!("Invalid request: {err}")))?;

    let created = catalog
        .create_track(
            &track_id,
            &fingerprint,
            body.metadata.as_ref(),
            body.allow_duplicate,
        )
        .await?;
    if !created {
        return Err(ApiError::conflict(
            "Duplicate fingerprint, use allow_duplicate=true if you want to add it anyway",
        ));
    }

    metrics::track_action("create");
    Ok(Json(TrackResponse {
        catalog: catalog_name,
        id: track_id,
        metadata: None,
    }))
}

pub async fn get_track(
    Extension(account): Extension<Account>,
    Path((catalog_name, track_id)): Path<(String, String)>,
) -> Result<Json<TrackResponse>, ApiError> {
    let catalog = account_catalog(&account, &catalog_name)?;
    check_track_id(&track_id)?;

    match catalog.get_track(&track_id).await? {
        Some(track) => {
            metrics::track_action("get");
            Ok(Json(TrackResponse {
                catalog: catalog_name,
                id: track.id,
                metadata: track.metadata,
            }))
        }
        None => Err(ApiError::not_found(format!("Track {track_id} not found"))),
    }
}

pub async fn delete_track(
    Extension(account): Extension<Account>,
    Path((catalog_name, track_id)): Path<(String, String)>,
) -> Result<Json<TrackResponse>, ApiError> {
    let catalog = account_catalog(&account, &catalog_name)?;
    check_track_id(&track_id)?;

    catalog.delete_track(&track_id).await?;
    metrics::track_action("delete");
    Ok(Json(TrackResponse {
        catalog: catalog_name,
        id: track_id,
        metadata: None,
    }))
}
