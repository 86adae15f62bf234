//! Search handler

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use resound::catalog::{Metadata, SearchOptions};
use resound::service::Account;
use resound::Fingerprint;

use crate::api::{account_catalog, ApiError};
use crate::metrics;

/// Streaming queries longer than this are rejected outright: the broadcast
/// fan-out makes long stream queries disproportionately expensive.
pub const MAX_STREAM_QUERY_FRAMES: usize = 300;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub fingerprint: String,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub catalog: String,
    pub results: Vec<SearchResponseResult>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseResult {
    pub id: String,
    #[serde(rename = "match")]
    pub match_info: SearchResponseResultMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseResultMatch {
    /// Start of the match inside the master recording, in seconds
    pub position: f64,
    /// Matched duration in seconds
    pub duration: f64,
}

pub async fn search(
    Extension(account): Extension<Account>,
    Path(catalog_name): Path<String>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    let catalog = account_catalog(&account, &catalog_name)?;

    let fingerprint = Fingerprint::from_base64(&body.fingerprint)
        .map_err(|err| ApiError::bad_request(format!("Invalid request: {err}")))?;
    if body.stream && fingerprint.hashes.len() > MAX_STREAM_QUERY_FRAMES {
        return Err(ApiError::bad_request(
            "Fingerprint too long for stream search",
        ));
    }

    let search_type = if body.stream { "stream" } else { "normal" };
    let timer = metrics::search_started(search_type);
    let results = catalog
        .search(&fingerprint, SearchOptions { stream: body.stream })
        .await?;
    drop(timer);

    let response = SearchResponse {
        catalog: catalog_name,
        results: results
            .results
            .into_iter()
            .map(|result| SearchResponseResult {
                id: result.id,
                match_info: SearchResponseResultMatch {
                    position: result.match_result.master_offset().as_secs_f64(),
                    duration: result.match_result.matching_duration().as_secs_f64(),
                },
                metadata: result.metadata,
            })
            .collect(),
    };
    Ok(Json(response))
}
