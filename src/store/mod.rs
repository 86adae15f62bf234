//! Storage adapter abstraction
//!
//! The engine is storage-agnostic: every catalog, track and index operation
//! goes through the [`Store`] trait. Two backends ship with the crate, a
//! PostgreSQL implementation for production (`postgres` feature) and an
//! in-memory implementation used by tests and embedders.
//!
//! Implementations own the transaction discipline. Each mutating method is a
//! single transaction: a track replacement either fully lands (row plus all
//! index chunks, any previous track gone) or leaves no trace, and searches
//! observe a consistent snapshot.

use async_trait::async_trait;

use crate::error::Result;

mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// One chunk of a track's query values, addressed by its ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChunk {
    pub ordinal: u32,
    pub values: Vec<i32>,
}

/// Everything needed to (re)create one track in a single transaction.
#[derive(Debug)]
pub struct TrackInsert<'a> {
    pub external_id: &'a str,
    /// Compressed fingerprint bytes
    pub fingerprint: &'a [u8],
    /// SHA1 of the compressed fingerprint, for duplicate detection
    pub fingerprint_sha1: [u8; 20],
    /// Raw JSON metadata bytes, if any
    pub metadata: Option<&'a [u8]>,
    pub chunks: &'a [IndexChunk],
    /// When false, an identical fingerprint on another track aborts the write
    pub allow_duplicate: bool,
}

/// Outcome of a track write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackWrite {
    /// False when a duplicate fingerprint blocked the insert
    pub created: bool,
    /// True when a previous track with the same external id was replaced
    pub replaced: bool,
}

/// A stored track row, without the fingerprint payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRow {
    pub id: i64,
    pub external_id: String,
    pub metadata: Option<Vec<u8>>,
}

/// One page of a track listing.
#[derive(Debug, Clone)]
pub struct TrackPage {
    pub tracks: Vec<TrackRow>,
    pub has_more: bool,
}

/// Storage contract consumed by the engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Map an external account id to its internal id, creating the account
    /// row on first use.
    async fn get_account(&self, external_id: &str) -> Result<i64>;

    /// Names of all catalogs owned by an account.
    async fn list_catalogs(&self, account_id: i64) -> Result<Vec<String>>;

    /// Internal id of a catalog, if it exists.
    async fn lookup_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>>;

    /// Create a catalog (idempotent) and initialise its index segments.
    async fn create_catalog(&self, account_id: i64, name: &str) -> Result<i64>;

    /// Drop a catalog with all of its tracks and index state.
    async fn delete_catalog(&self, account_id: i64, name: &str) -> Result<Option<i64>>;

    /// Atomically replace (or create) a track: any existing track with the
    /// same external id is removed, the duplicate guard is checked against
    /// the remaining tracks, then the row and all index chunks are written.
    async fn replace_track(
        &self,
        catalog_id: i64,
        track: TrackInsert<'_>,
    ) -> Result<TrackWrite>;

    /// Remove a track and its index chunks. Returns the internal id when a
    /// track was actually deleted.
    async fn delete_track(&self, catalog_id: i64, external_id: &str) -> Result<Option<i64>>;

    /// Load a track row by external id.
    async fn get_track(&self, catalog_id: i64, external_id: &str)
        -> Result<Option<TrackRow>>;

    /// Page through tracks in external-id order, starting after `cursor`.
    async fn list_tracks(
        &self,
        catalog_id: i64,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TrackPage>;

    /// Load the compressed fingerprint of a track.
    async fn load_fingerprint(&self, catalog_id: i64, track_id: i64) -> Result<Vec<u8>>;

    /// Load track rows for a set of internal ids.
    async fn load_track_rows(&self, catalog_id: i64, ids: &[i64]) -> Result<Vec<TrackRow>>;

    /// Per-chunk overlap counts of one index segment against a query.
    ///
    /// Every stored chunk that intersects the query contributes one entry
    /// whose count is the multiset intersection size between the chunk's
    /// values and the query. A track may appear multiple times; callers sum.
    async fn query_segment(
        &self,
        catalog_id: i64,
        segment: usize,
        query: &[i32],
    ) -> Result<Vec<(i64, usize)>>;
}
