//! Partitioned inverted index
//!
//! Query values of every track are split into fixed-size chunks spread over a
//! fan of index segments. Searches run the segments through a bounded worker
//! pool and fold the per-segment hit counts into one map, which the candidate
//! scorer thresholds into a ranked shortlist for the matcher.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::store::{IndexChunk, Store};

/// Number of physical index segments per catalog.
pub const NUM_INDEX_SEGMENTS: usize = 16;

/// Maximum number of query values stored in one index chunk.
pub const VALUES_PER_CHUNK: usize = 128;

/// Width of the segment fan-out worker pool.
pub const SEARCH_CONCURRENCY: usize = 8;

/// Split a track's query values into index chunks. Chunk `k` lands in
/// segment `k % NUM_INDEX_SEGMENTS`; the final chunk may be short.
pub fn build_chunks(values: &[i32]) -> Vec<IndexChunk> {
    values
        .chunks(VALUES_PER_CHUNK)
        .enumerate()
        .map(|(ordinal, chunk)| IndexChunk {
            ordinal: ordinal as u32,
            values: chunk.to_vec(),
        })
        .collect()
}

/// Physical segment for a chunk ordinal.
pub fn segment_for_ordinal(ordinal: u32) -> usize {
    ordinal as usize % NUM_INDEX_SEGMENTS
}

/// Fan a query out over the index segments and sum hit counts per track.
///
/// Streaming searches broadcast the full query to every segment, because the
/// query's position inside the master is unknown. Anchored searches assume
/// the query lines up with the track start and probe only segments 0 and 1
/// with the query's first two chunks; the remaining segments stay untouched,
/// which is a deliberate trade of recall for fan-out.
///
/// Segments are statically assigned to `SEARCH_CONCURRENCY` workers by
/// `segment % SEARCH_CONCURRENCY`; the workers are joined before the result
/// is folded, and the first segment failure aborts the whole search.
pub async fn search_index(
    store: &dyn Store,
    catalog_id: i64,
    values: &[i32],
    stream: bool,
) -> Result<HashMap<i64, usize>> {
    let mut shards: [Option<&[i32]>; NUM_INDEX_SEGMENTS] = [None; NUM_INDEX_SEGMENTS];
    if stream {
        shards = [Some(values); NUM_INDEX_SEGMENTS];
    } else if !values.is_empty() {
        if values.len() < VALUES_PER_CHUNK {
            shards[0] = Some(values);
        } else {
            shards[0] = Some(&values[..VALUES_PER_CHUNK]);
            if values.len() > VALUES_PER_CHUNK {
                let end = values.len().min(2 * VALUES_PER_CHUNK);
                shards[1] = Some(&values[VALUES_PER_CHUNK..end]);
            }
        }
    }

    let workers = (0..SEARCH_CONCURRENCY).map(|worker| {
        let shards = &shards;
        async move {
            let mut hits: HashMap<i64, usize> = HashMap::new();
            let mut segment = worker;
            while segment < NUM_INDEX_SEGMENTS {
                if let Some(query) = shards[segment] {
                    if !query.is_empty() {
                        for (track_id, count) in
                            store.query_segment(catalog_id, segment, query).await?
                        {
                            *hits.entry(track_id).or_default() += count;
                        }
                    }
                }
                segment += SEARCH_CONCURRENCY;
            }
            Ok::<_, Error>(hits)
        }
    });

    let partials = futures::future::try_join_all(workers).await?;

    let mut hits: HashMap<i64, usize> = HashMap::new();
    for partial in partials {
        for (track_id, count) in partial {
            *hits.entry(track_id).or_default() += count;
        }
    }
    Ok(hits)
}

/// Threshold the hit map and rank the survivors.
///
/// Tracks scoring below a tenth of the best hit count (never below two) are
/// dropped; the rest are returned in ascending hit order, the order in which
/// the matcher consumes them. Ties break on track id.
pub fn select_candidates(hits: &HashMap<i64, usize>) -> Vec<(i64, usize)> {
    let max_count = hits.values().copied().max().unwrap_or(0);
    let threshold = (max_count / 10).max(2);

    let mut candidates: Vec<(i64, usize)> = hits
        .iter()
        .filter(|&(_, &count)| count >= threshold)
        .map(|(&track_id, &count)| (track_id, count))
        .collect();
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    candidates
}
