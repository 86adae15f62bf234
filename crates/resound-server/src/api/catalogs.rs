//! Catalog handlers

use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use resound::catalog::Metadata;
use resound::service::Account;

use crate::api::{account_catalog, ApiError, TRACK_PAGE_SIZE};
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub catalog: String,
}

#[derive(Debug, Serialize)]
pub struct ListCatalogsResponse {
    pub catalogs: Vec<CatalogResponse>,
}

pub async fn list_catalogs(
    Extension(account): Extension<Account>,
) -> Result<Json<ListCatalogsResponse>, ApiError> {
    let catalogs = account
        .list_catalogs()
        .await?
        .into_iter()
        .map(|catalog| CatalogResponse { catalog })
        .collect();
    Ok(Json(ListCatalogsResponse { catalogs }))
}

#[derive(Debug, Deserialize)]
pub struct GetCatalogQuery {
    /// Present (with any value) to request the track listing
    tracks: Option<String>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListTracksResponse {
    pub catalog: String,
    pub tracks: Vec<ListTracksResponseTrack>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListTracksResponseTrack {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

pub async fn get_catalog(
    Extension(account): Extension<Account>,
    Path(name): Path<String>,
    Query(query): Query<GetCatalogQuery>,
) -> Result<Response, ApiError> {
    let catalog = account_catalog(&account, &name)?;
    if !catalog.exists().await? {
        return Err(ApiError::not_found("Catalog not found"));
    }

    if query.tracks.is_none() {
        return Ok(Json(CatalogResponse { catalog: name }).into_response());
    }

    let listing = catalog
        .list_tracks(query.cursor.as_deref(), TRACK_PAGE_SIZE)
        .await?;
    let cursor = if listing.has_more {
        listing.tracks.last().map(|track| track.id.clone())
    } else {
        None
    };
    let response = ListTracksResponse {
        catalog: name,
        tracks: listing
            .tracks
            .into_iter()
            .map(|track| ListTracksResponseTrack {
                id: track.id,
                metadata: track.metadata,
            })
            .collect(),
        has_more: listing.has_more,
        cursor,
    };
    Ok(Json(response).into_response())
}

pub async fn create_catalog(
    Extension(account): Extension<Account>,
    Path(name): Path<String>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let catalog = account_catalog(&account, &name)?;
    catalog.create().await?;
    metrics::catalog_action("create");
    Ok(Json(CatalogResponse { catalog: name }))
}

pub async fn delete_catalog(
    Extension(account): Extension<Account>,
    Path(name): Path<String>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let catalog = account_catalog(&account, &name)?;
    catalog.delete().await?;
    metrics::catalog_action("delete");
    Ok(Json(CatalogResponse { catalog: name }))
}
