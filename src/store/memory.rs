//! In-memory storage backend
//!
//! Keeps the whole catalog state behind a single async lock. Used by the
//! test suite and useful for embedding the engine without a database; the
//! single-lock design gives every operation the same atomicity the
//! PostgreSQL backend gets from transactions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::index::{segment_for_ordinal, NUM_INDEX_SEGMENTS};
use crate::store::{Store, TrackInsert, TrackPage, TrackRow, TrackWrite};

#[derive(Debug, Default)]
struct TrackData {
    external_id: String,
    fingerprint: Vec<u8>,
    fingerprint_sha1: [u8; 20],
    metadata: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct CatalogData {
    next_track_id: i64,
    tracks: BTreeMap<i64, TrackData>,
    by_external: BTreeMap<String, i64>,
    segments: Vec<Vec<ChunkRow>>,
}

#[derive(Debug)]
struct ChunkRow {
    track_id: i64,
    values: Vec<i32>,
}

impl CatalogData {
    fn new() -> Self {
        CatalogData {
            next_track_id: 1,
            tracks: BTreeMap::new(),
            by_external: BTreeMap::new(),
            segments: (0..NUM_INDEX_SEGMENTS).map(|_| Vec::new()).collect(),
        }
    }

    fn remove_track(&mut self, track_id: i64) {
        if let Some(track) = self.tracks.remove(&track_id) {
            self.by_external.remove(&track.external_id);
        }
        for segment in &mut self.segments {
            segment.retain(|chunk| chunk.track_id != track_id);
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_account_id: i64,
    accounts: HashMap<String, i64>,
    next_catalog_id: i64,
    catalogs: HashMap<(i64, String), i64>,
    data: HashMap<i64, CatalogData>,
}

/// In-process [`Store`] implementation.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner {
                next_account_id: 1,
                next_catalog_id: 1,
                ..Inner::default()
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_catalog(catalog_id: i64) -> Error {
    Error::storage_msg(format!("unknown catalog id {catalog_id}"))
}

/// Multiset intersection size between a stored chunk and the query.
fn multiset_overlap(values: &[i32], query_counts: &HashMap<i32, usize>) -> usize {
    let mut chunk_counts: HashMap<i32, usize> = HashMap::new();
    for &value in values {
        *chunk_counts.entry(value).or_default() += 1;
    }
    chunk_counts
        .iter()
        .map(|(value, &count)| count.min(query_counts.get(value).copied().unwrap_or(0)))
        .sum()
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_account(&self, external_id: &str) -> Result<i64> {
        let mut inner = self.inner.write().await;
        if let Some(&id) = inner.accounts.get(external_id) {
            return Ok(id);
        }
        let id = inner.next_account_id;
        inner.next_account_id += 1;
        inner.accounts.insert(external_id.to_string(), id);
        Ok(id)
    }

    async fn list_catalogs(&self, account_id: i64) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner
            .catalogs
            .keys()
            .filter(|(owner, _)| *owner == account_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn lookup_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>> {
        let inner = self.inner.read().await;
        Ok(inner.catalogs.get(&(account_id, name.to_string())).copied())
    }

    async fn create_catalog(&self, account_id: i64, name: &str) -> Result<i64> {
        let mut inner = self.inner.write().await;
        if let Some(&id) = inner.catalogs.get(&(account_id, name.to_string())) {
            return Ok(id);
        }
        let id = inner.next_catalog_id;
        inner.next_catalog_id += 1;
        inner.catalogs.insert((account_id, name.to_string()), id);
        inner.data.insert(id, CatalogData::new());
        Ok(id)
    }

    async fn delete_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>> {
        let mut inner = self.inner.write().await;
        match inner.catalogs.remove(&(account_id, name.to_string())) {
            Some(id) => {
                inner.data.remove(&id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn replace_track(
        &self,
        catalog_id: i64,
        track: TrackInsert<'_>,
    ) -> Result<TrackWrite> {
        let mut inner = self.inner.write().await;
        let data = inner
            .data
            .get_mut(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;

        let previous = data.by_external.get(track.external_id).copied();

        // The duplicate guard ignores the track being replaced, matching the
        // delete-then-check order of the transactional backends.
        if !track.allow_duplicate {
            let duplicate = data.tracks.iter().any(|(&id, row)| {
                Some(id) != previous && row.fingerprint_sha1 == track.fingerprint_sha1
            });
            if duplicate {
                return Ok(TrackWrite {
                    created: false,
                    replaced: false,
                });
            }
        }

        if let Some(old_id) = previous {
            data.remove_track(old_id);
        }

        let id = data.next_track_id;
        data.next_track_id += 1;
        data.tracks.insert(
            id,
            TrackData {
                external_id: track.external_id.to_string(),
                fingerprint: track.fingerprint.to_vec(),
                fingerprint_sha1: track.fingerprint_sha1,
                metadata: track.metadata.map(<[u8]>::to_vec),
            },
        );
        data.by_external.insert(track.external_id.to_string(), id);
        for chunk in track.chunks {
            data.segments[segment_for_ordinal(chunk.ordinal)].push(ChunkRow {
                track_id: id,
                values: chunk.values.clone(),
            });
        }

        Ok(TrackWrite {
            created: true,
            replaced: previous.is_some(),
        })
    }

    async fn delete_track(&self, catalog_id: i64, external_id: &str) -> Result<Option<i64>> {
        let mut inner = self.inner.write().await;
        let data = inner
            .data
            .get_mut(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;
        match data.by_external.get(external_id).copied() {
            Some(id) => {
                data.remove_track(id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn get_track(
        &self,
        catalog_id: i64,
        external_id: &str,
    ) -> Result<Option<TrackRow>> {
        let inner = self.inner.read().await;
        let data = inner
            .data
            .get(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;
        Ok(data.by_external.get(external_id).map(|&id| {
            let track = &data.tracks[&id];
            TrackRow {
                id,
                external_id: track.external_id.clone(),
                metadata: track.metadata.clone(),
            }
        }))
    }

    async fn list_tracks(
        &self,
        catalog_id: i64,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TrackPage> {
        let inner = self.inner.read().await;
        let data = inner
            .data
            .get(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;

        let mut tracks = Vec::new();
        let mut has_more = false;
        for (external_id, &id) in &data.by_external {
            if let Some(cursor) = cursor {
                if external_id.as_str() <= cursor {
                    continue;
                }
            }
            if tracks.len() == limit {
                has_more = true;
                break;
            }
            tracks.push(TrackRow {
                id,
                external_id: external_id.clone(),
                metadata: data.tracks[&id].metadata.clone(),
            });
        }
        Ok(TrackPage { tracks, has_more })
    }

    async fn load_fingerprint(&self, catalog_id: i64, track_id: i64) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        let data = inner
            .data
            .get(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;
        data.tracks
            .get(&track_id)
            .map(|track| track.fingerprint.clone())
            .ok_or_else(|| Error::storage_msg(format!("unknown track id {track_id}")))
    }

    async fn load_track_rows(&self, catalog_id: i64, ids: &[i64]) -> Result<Vec<TrackRow>> {
        let inner = self.inner.read().await;
        let data = inner
            .data
            .get(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                data.tracks.get(id).map(|track| TrackRow {
                    id: *id,
                    external_id: track.external_id.clone(),
                    metadata: track.metadata.clone(),
                })
            })
            .collect())
    }

    async fn query_segment(
        &self,
        catalog_id: i64,
        segment: usize,
        query: &[i32],
    ) -> Result<Vec<(i64, usize)>> {
        let inner = self.inner.read().await;
        let data = inner
            .data
            .get(&catalog_id)
            .ok_or_else(|| missing_catalog(catalog_id))?;

        let mut query_counts: HashMap<i32, usize> = HashMap::new();
        for &value in query {
            *query_counts.entry(value).or_default() += 1;
        }

        let mut hits = Vec::new();
        for chunk in &data.segments[segment] {
            let overlap = multiset_overlap(&chunk.values, &query_counts);
            if overlap > 0 {
                hits.push((chunk.track_id, overlap));
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexChunk;

    fn chunk(ordinal: u32, values: Vec<i32>) -> IndexChunk {
        IndexChunk { ordinal, values }
    }

    fn insert<'a>(
        external_id: &'a str,
        fingerprint: &'a [u8],
        sha1: u8,
        chunks: &'a [IndexChunk],
        allow_duplicate: bool,
    ) -> TrackInsert<'a> {
        TrackInsert {
            external_id,
            fingerprint,
            fingerprint_sha1: [sha1; 20],
            metadata: None,
            chunks,
            allow_duplicate,
        }
    }

    #[tokio::test]
    async fn test_account_ids_are_stable() {
        let store = MemoryStore::new();
        let a = store.get_account("alpha").await.unwrap();
        let b = store.get_account("beta").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get_account("alpha").await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_catalog_lifecycle() {
        let store = MemoryStore::new();
        assert_eq!(store.lookup_catalog(1, "main").await.unwrap(), None);
        let id = store.create_catalog(1, "main").await.unwrap();
        assert_eq!(store.create_catalog(1, "main").await.unwrap(), id);
        assert_eq!(store.lookup_catalog(1, "main").await.unwrap(), Some(id));
        assert_eq!(store.list_catalogs(1).await.unwrap(), vec!["main"]);
        assert_eq!(store.delete_catalog(1, "main").await.unwrap(), Some(id));
        assert_eq!(store.delete_catalog(1, "main").await.unwrap(), None);
        assert!(store.list_catalogs(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_track_removes_previous_chunks() {
        let store = MemoryStore::new();
        let catalog = store.create_catalog(1, "main").await.unwrap();

        let first = [chunk(0, vec![10, 20]), chunk(1, vec![30])];
        let write = store
            .replace_track(catalog, insert("a", b"fp1", 1, &first, true))
            .await
            .unwrap();
        assert!(write.created);
        assert!(!write.replaced);

        let second = [chunk(0, vec![40])];
        let write = store
            .replace_track(catalog, insert("a", b"fp2", 2, &second, true))
            .await
            .unwrap();
        assert!(write.created);
        assert!(write.replaced);

        // The old chunks are gone from every segment.
        assert!(store
            .query_segment(catalog, 0, &[10, 20])
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .query_segment(catalog, 1, &[30])
            .await
            .unwrap()
            .is_empty());
        let hits = store.query_segment(catalog, 0, &[40]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 1);
    }

    #[tokio::test]
    async fn test_duplicate_guard_ignores_replaced_track() {
        let store = MemoryStore::new();
        let catalog = store.create_catalog(1, "main").await.unwrap();

        let chunks = [chunk(0, vec![1])];
        assert!(store
            .replace_track(catalog, insert("a", b"fp", 7, &chunks, false))
            .await
            .unwrap()
            .created);

        // Same fingerprint under another id is blocked...
        let write = store
            .replace_track(catalog, insert("b", b"fp", 7, &chunks, false))
            .await
            .unwrap();
        assert!(!write.created);

        // ...but re-writing the same track is not.
        assert!(store
            .replace_track(catalog, insert("a", b"fp", 7, &chunks, false))
            .await
            .unwrap()
            .created);

        // A blocked write must leave no trace behind.
        assert_eq!(store.get_track(catalog, "b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_segment_counts_multiset_overlap() {
        let store = MemoryStore::new();
        let catalog = store.create_catalog(1, "main").await.unwrap();
        let chunks = [chunk(0, vec![5, 5, 9, 13])];
        store
            .replace_track(catalog, insert("a", b"fp", 1, &chunks, true))
            .await
            .unwrap();

        let hits = store
            .query_segment(catalog, 0, &[5, 5, 5, 13, 99])
            .await
            .unwrap();
        // min(2,3) fives + one thirteen
        assert_eq!(hits, vec![(1, 3)]);

        assert!(store
            .query_segment(catalog, 0, &[99, 100])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_tracks_pagination() {
        let store = MemoryStore::new();
        let catalog = store.create_catalog(1, "main").await.unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            store
                .replace_track(catalog, insert(name, b"fp", name.as_bytes()[0], &[], true))
                .await
                .unwrap();
        }

        let page = store.list_tracks(catalog, None, 2).await.unwrap();
        assert_eq!(page.tracks.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.tracks[1].external_id, "b");

        let page = store.list_tracks(catalog, Some("b"), 2).await.unwrap();
        assert_eq!(page.tracks[0].external_id, "c");
        assert!(page.has_more);

        let page = store.list_tracks(catalog, Some("d"), 2).await.unwrap();
        assert_eq!(page.tracks.len(), 1);
        assert!(!page.has_more);
    }
}
