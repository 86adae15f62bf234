//! Catalog operations
//!
//! A [`Catalog`] is an owning handle over the storage adapter, scoped to one
//! account and one catalog name. It implements the write path (track
//! create/replace/delete), the read path (track lookup and listing) and the
//! full search pipeline: query extraction, index fan-out, candidate scoring,
//! per-candidate matching and result assembly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::index::{build_chunks, search_index, select_candidates};
use crate::matcher::{match_fingerprints, MatchResult};
use crate::query::extract_query;
use crate::store::{Store, TrackInsert};

/// String-keyed track metadata.
pub type Metadata = HashMap<String, String>;

/// Options for a catalog search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Treat the query as a sub-interval of unknown position (scan all index
    /// segments) instead of assuming it starts at the track beginning.
    pub stream: bool,
}

/// One track matched by a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub metadata: Option<Metadata>,
    pub match_result: MatchResult,
}

/// All tracks matched by a search.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
}

/// A stored track as seen by API consumers.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: String,
    pub metadata: Option<Metadata>,
}

/// One page of a track listing.
#[derive(Debug, Clone, Default)]
pub struct TrackListing {
    pub tracks: Vec<TrackInfo>,
    pub has_more: bool,
}

/// Catalog and track identifiers must not collide with reserved routes.
pub fn is_valid_catalog_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('_')
}

/// See [`is_valid_catalog_name`].
pub fn is_valid_track_id(id: &str) -> bool {
    !id.is_empty() && !id.starts_with('_')
}

/// Handle to one (possibly not yet created) catalog of an account.
pub struct Catalog {
    store: Arc<dyn Store>,
    account_id: i64,
    name: String,
    // Cached internal id; zero means unresolved. Racing resolutions agree on
    // the value, so a plain relaxed atomic is enough.
    id: AtomicI64,
}

impl Catalog {
    pub(crate) fn new(store: Arc<dyn Store>, account_id: i64, name: String) -> Self {
        Catalog {
            store,
            account_id,
            name,
            id: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_id(&self) -> Result<Option<i64>> {
        let cached = self.id.load(Ordering::Relaxed);
        if cached != 0 {
            return Ok(Some(cached));
        }
        match self
            .store
            .lookup_catalog(self.account_id, &self.name)
            .await?
        {
            Some(id) => {
                self.id.store(id, Ordering::Relaxed);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.lookup_id().await?.is_some())
    }

    /// Create the catalog if it does not exist yet. Idempotent.
    pub async fn create(&self) -> Result<()> {
        if self.lookup_id().await?.is_some() {
            return Ok(());
        }
        let id = self
            .store
            .create_catalog(self.account_id, &self.name)
            .await?;
        self.id.store(id, Ordering::Relaxed);
        tracing::info!(
            "Created catalog {} for account {}",
            self.name,
            self.account_id
        );
        Ok(())
    }

    /// Delete the catalog with all of its tracks. Deleting a missing catalog
    /// is not an error.
    pub async fn delete(&self) -> Result<()> {
        let deleted = self
            .store
            .delete_catalog(self.account_id, &self.name)
            .await?;
        self.id.store(0, Ordering::Relaxed);
        if deleted.is_some() {
            tracing::info!(
                "Deleted catalog {} for account {}",
                self.name,
                self.account_id
            );
        }
        Ok(())
    }

    /// Fresh identifier for an anonymous track.
    pub fn new_track_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Create or replace a track. Returns false when `allow_duplicate` is
    /// unset and another track already carries the same fingerprint.
    ///
    /// The catalog is created lazily on first write. Replacement is
    /// delete-then-insert within one storage transaction, so concurrent
    /// searches never observe a half-updated track.
    pub async fn create_track(
        &self,
        external_id: &str,
        fp: &Fingerprint,
        metadata: Option<&Metadata>,
        allow_duplicate: bool,
    ) -> Result<bool> {
        self.create().await?;
        let catalog_id = self
            .lookup_id()
            .await?
            .ok_or_else(|| Error::storage_msg("catalog vanished during create_track"))?;

        let compressed = fingerprint::compress(fp);
        let sha1: [u8; 20] = Sha1::digest(&compressed).into();
        let metadata_bytes = metadata.map(serde_json::to_vec).transpose()?;
        let values = extract_query(fp);
        let chunks = build_chunks(&values);

        let write = self
            .store
            .replace_track(
                catalog_id,
                TrackInsert {
                    external_id,
                    fingerprint: &compressed,
                    fingerprint_sha1: sha1,
                    metadata: metadata_bytes.as_deref(),
                    chunks: &chunks,
                    allow_duplicate,
                },
            )
            .await?;

        if write.created {
            if write.replaced {
                tracing::info!("Updated track {} in catalog {}", external_id, self.name);
            } else {
                tracing::info!("Inserted track {} into catalog {}", external_id, self.name);
            }
        }
        Ok(write.created)
    }

    /// Delete a track. Missing catalogs and tracks are not errors.
    pub async fn delete_track(&self, external_id: &str) -> Result<()> {
        let catalog_id = match self.lookup_id().await? {
            Some(id) => id,
            None => return Ok(()),
        };
        if self
            .store
            .delete_track(catalog_id, external_id)
            .await?
            .is_some()
        {
            tracing::info!("Deleted track {} from catalog {}", external_id, self.name);
        }
        Ok(())
    }

    /// Look a track up by external id.
    pub async fn get_track(&self, external_id: &str) -> Result<Option<TrackInfo>> {
        let catalog_id = match self.lookup_id().await? {
            Some(id) => id,
            None => return Ok(None),
        };
        match self.store.get_track(catalog_id, external_id).await? {
            Some(row) => Ok(Some(TrackInfo {
                id: row.external_id,
                metadata: decode_metadata(row.metadata.as_deref())?,
            })),
            None => Ok(None),
        }
    }

    /// Page through the catalog's tracks in external-id order.
    pub async fn list_tracks(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TrackListing> {
        let catalog_id = match self.lookup_id().await? {
            Some(id) => id,
            None => return Ok(TrackListing::default()),
        };
        let page = self.store.list_tracks(catalog_id, cursor, limit).await?;
        let mut tracks = Vec::with_capacity(page.tracks.len());
        for row in page.tracks {
            tracks.push(TrackInfo {
                id: row.external_id,
                metadata: decode_metadata(row.metadata.as_deref())?,
            });
        }
        Ok(TrackListing {
            tracks,
            has_more: page.has_more,
        })
    }

    /// Find the catalog tracks matching a query fingerprint.
    ///
    /// Searching a catalog that does not exist yields an empty result.
    pub async fn search(
        &self,
        query: &Fingerprint,
        opts: SearchOptions,
    ) -> Result<SearchResults> {
        let catalog_id = match self.lookup_id().await? {
            Some(id) => id,
            None => return Ok(SearchResults::default()),
        };

        let values = extract_query(query);
        let hits =
            search_index(self.store.as_ref(), catalog_id, &values, opts.stream).await?;
        let candidates = select_candidates(&hits);

        let mut matches: Vec<(i64, MatchResult)> = Vec::new();
        for (track_id, _count) in candidates {
            let data = self.store.load_fingerprint(catalog_id, track_id).await?;
            let master = fingerprint::parse(&data)?;
            let result = match_fingerprints(&master, query)?;
            if !result.is_empty() {
                matches.push((track_id, result));
            }
        }

        let ids: Vec<i64> = matches.iter().map(|(id, _)| *id).collect();
        let rows = self.store.load_track_rows(catalog_id, &ids).await?;
        let mut rows_by_id: HashMap<i64, _> =
            rows.into_iter().map(|row| (row.id, row)).collect();

        let mut results = Vec::with_capacity(matches.len());
        for (track_id, match_result) in matches {
            let row = rows_by_id
                .remove(&track_id)
                .ok_or_else(|| Error::storage_msg("matched track row disappeared"))?;
            results.push(SearchResult {
                id: row.external_id,
                metadata: decode_metadata(row.metadata.as_deref())?,
                match_result,
            });
        }
        Ok(SearchResults { results })
    }
}

fn decode_metadata(bytes: Option<&[u8]>) -> Result<Option<Metadata>> {
    match bytes {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_catalog_name("music"));
        assert!(is_valid_track_id("track-1"));
        assert!(!is_valid_catalog_name("_search"));
        assert!(!is_valid_track_id("_health"));
        assert!(!is_valid_catalog_name(""));
        assert!(!is_valid_track_id(""));
    }
}
