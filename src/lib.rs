/*!
 * Resound - Private audio fingerprint matching engine
 *
 * Each account owns named catalogs of fingerprinted tracks. Given a query
 * fingerprint, the engine shortlists candidate tracks through a partitioned
 * inverted index and decides per candidate whether and where the audio truly
 * matches:
 *
 * - Fingerprint codec: compact textual/binary fingerprint representation
 * - Query extraction: bit-sampled projection of frame hashes for indexing
 * - Partitioned index: 16 segments, parallel fan-out, anchored or streaming
 * - Matcher: offset histogram alignment, popcount distance curve, Gaussian
 *   smoothing, gradient edge detection, section scoring
 * - Storage abstraction: PostgreSQL (intarray-backed) or in-memory
 */

pub mod catalog;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod query;
pub mod service;
pub mod store;

pub use catalog::{
    is_valid_catalog_name, is_valid_track_id, Catalog, Metadata, SearchOptions,
    SearchResult, SearchResults, TrackInfo, TrackListing,
};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintConfig, MAX_FINGERPRINT_FRAMES};
pub use matcher::{match_fingerprints, MatchResult, Section};
pub use query::{extract_query, hash_bit_mask};
pub use service::{Account, Service};
pub use store::{MemoryStore, Store};

#[cfg(feature = "postgres")]
pub use store::PostgresStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
