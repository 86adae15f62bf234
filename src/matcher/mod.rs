//! Fingerprint matcher
//!
//! Decides whether and where two fingerprints cover the same audio. The
//! pipeline runs in two stages: a hash-offset histogram aligns the query
//! against the master, then for each candidate alignment the bit-distance
//! curve is smoothed, differentiated and segmented into sections whose mean
//! distance decides acceptance. The whole matcher is CPU-bound and never
//! suspends; callers run it inline per candidate.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fingerprint::{
    config_for_version, Fingerprint, FingerprintConfig, MAX_FINGERPRINT_FRAMES,
};
use crate::query::{hash_bit_mask, NUM_ALIGN_BITS};

mod filter;
mod gradient;

pub use filter::{box_filter, gaussian_filter};
pub use gradient::gradient;

/// A candidate alignment must score at least `K / 10` of the strongest one.
const MAX_OFFSET_THRESHOLD_DIV: usize = 10;

/// Number of alignment peaks tried before giving up.
const NUM_OFFSET_CANDIDATES: usize = 3;

/// Normalised gradient magnitude above which a sample becomes an edge.
const EDGE_GRADIENT_THRESHOLD: f64 = 3.0;

/// Sections with a mean bit distance at or above this are rejected.
const MAX_SECTION_SCORE: f64 = 13.0;

const SMOOTHING_SIGMA: f64 = 3.6;
const SMOOTHING_PASSES: usize = 5;
const GRADIENT_WINDOW: usize = 7;

/// A contiguous interval of aligned frames accepted as matching audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    /// Alignment offset (master frame index minus query frame index)
    pub offset: i32,
    /// First frame of the section, relative to the aligned slices
    pub start: usize,
    /// One past the last frame of the section
    pub end: usize,
    /// Mean popcount distance over the section
    pub score: f64,
}

/// Outcome of matching a query fingerprint against a master.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub version: u8,
    pub config: &'static FingerprintConfig,
    pub master_length: usize,
    pub query_length: usize,
    pub sections: Vec<Section>,
}

impl MatchResult {
    /// True when no section was accepted at any candidate offset.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total matched audio length.
    pub fn matching_duration(&self) -> Duration {
        let frames: usize = self.sections.iter().map(|s| s.end - s.start).sum();
        self.config.total_duration(frames)
    }

    /// Position of the match inside the master recording.
    pub fn master_offset(&self) -> Duration {
        match self.sections.first() {
            Some(section) => self
                .config
                .offset_duration(section.start + section.offset.max(0) as usize),
            None => Duration::ZERO,
        }
    }

    /// Position of the match inside the query recording.
    pub fn query_offset(&self) -> Duration {
        match self.sections.first() {
            Some(section) => self
                .config
                .offset_duration(section.start + (-section.offset.min(0)) as usize),
            None => Duration::ZERO,
        }
    }

    /// Total audio length of the master recording.
    pub fn master_duration(&self) -> Duration {
        self.config.total_duration(self.master_length)
    }

    /// Total audio length of the query recording.
    pub fn query_duration(&self) -> Duration {
        self.config.total_duration(self.query_length)
    }
}

/// Match `query` against `master`.
///
/// Fails with [`Error::InvalidFingerprintVersion`] when the versions differ
/// or are unsupported, and with [`Error::FingerprintTooLong`] when either
/// side exceeds the frame limit. An absent match is not an error: the result
/// simply carries no sections.
pub fn match_fingerprints(master: &Fingerprint, query: &Fingerprint) -> Result<MatchResult> {
    if master.version != query.version {
        return Err(Error::InvalidFingerprintVersion);
    }
    let config =
        config_for_version(master.version).ok_or(Error::InvalidFingerprintVersion)?;
    if master.hashes.len() > MAX_FINGERPRINT_FRAMES
        || query.hashes.len() > MAX_FINGERPRINT_FRAMES
    {
        return Err(Error::FingerprintTooLong);
    }

    let mut result = MatchResult {
        version: master.version,
        config,
        master_length: master.hashes.len(),
        query_length: query.hashes.len(),
        sections: Vec::new(),
    };

    for (offset, _count) in offset_peaks(&master.hashes, &query.hashes) {
        let sections = sections_at_offset(&master.hashes, &query.hashes, offset);
        if !sections.is_empty() {
            result.sections = sections;
            break;
        }
    }

    Ok(result)
}

/// Histogram of alignment offsets between two hash sequences, over the
/// alignment bit mask. Returns the surviving local-maximum peaks, strongest
/// first, at most [`NUM_OFFSET_CANDIDATES`] of them.
pub fn offset_peaks(master: &[u32], query: &[u32]) -> Vec<(i32, usize)> {
    let mask = hash_bit_mask(NUM_ALIGN_BITS);

    let mut master_ha: Vec<(u32, u32)> = master
        .iter()
        .enumerate()
        .map(|(i, &h)| (h & mask, i as u32))
        .collect();
    let mut query_ha: Vec<(u32, u32)> = query
        .iter()
        .enumerate()
        .map(|(i, &h)| (h & mask, i as u32))
        .collect();
    master_ha.sort_unstable();
    query_ha.sort_unstable();

    // Single linear merge; equal-hash runs contribute all index pairs.
    let mut offsets: BTreeMap<i32, usize> = BTreeMap::new();
    let (mut i, mut j) = (0, 0);
    while i < master_ha.len() && j < query_ha.len() {
        let (mh, _) = master_ha[i];
        let (qh, _) = query_ha[j];
        if mh < qh {
            i += 1;
        } else if mh > qh {
            j += 1;
        } else {
            let i_end = master_ha[i..].partition_point(|&(h, _)| h == mh) + i;
            let j_end = query_ha[j..].partition_point(|&(h, _)| h == qh) + j;
            for &(_, mi) in &master_ha[i..i_end] {
                for &(_, qi) in &query_ha[j..j_end] {
                    let offset = mi as i32 - qi as i32;
                    *offsets.entry(offset).or_default() += 1;
                }
            }
            i = i_end;
            j = j_end;
        }
    }

    let max_count = match offsets.values().copied().max() {
        Some(max) => max,
        None => return Vec::new(),
    };
    let threshold = max_count / MAX_OFFSET_THRESHOLD_DIV;

    let mut peaks: Vec<(i32, usize)> = Vec::new();
    for (&offset, &count) in &offsets {
        if count < threshold {
            continue;
        }
        let prev = offsets.get(&(offset - 1)).copied().unwrap_or(0);
        let next = offsets.get(&(offset + 1)).copied().unwrap_or(0);
        if prev <= count && next < count {
            peaks.push((offset, count));
        }
    }
    peaks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    peaks.truncate(NUM_OFFSET_CANDIDATES);
    peaks
}

/// Segment the aligned overlap at `offset` and keep the sections whose mean
/// bit distance stays under the acceptance cap.
fn sections_at_offset(master: &[u32], query: &[u32], offset: i32) -> Vec<Section> {
    let (m, q) = if offset >= 0 {
        (&master[offset as usize..], query)
    } else {
        (master, &query[(-offset) as usize..])
    };
    let n = m.len().min(q.len());
    if n == 0 {
        return Vec::new();
    }

    let diff: Vec<f64> = (0..n).map(|i| (m[i] ^ q[i]).count_ones() as f64).collect();

    let mut smoothed = diff.clone();
    gaussian_filter(&mut smoothed, SMOOTHING_SIGMA, SMOOTHING_PASSES);

    let mut grad = vec![0.0; n];
    gradient(&smoothed, &mut grad, GRADIENT_WINDOW);

    let mut edges = Vec::with_capacity(8);
    edges.push(0);
    for i in 1..n.saturating_sub(1) {
        let x0 = grad[i - 1].abs();
        let x1 = grad[i].abs();
        let x2 = grad[i + 1].abs();
        if x0 <= x1 && x2 < x1 {
            let g = x1 / (1.0 + smoothed[i] / 4.0);
            if g > EDGE_GRADIENT_THRESHOLD {
                edges.push(i);
            }
        }
    }
    edges.push(n);

    let mut sections = Vec::new();
    for pair in edges.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if end <= start {
            continue;
        }
        let score = diff[start..end].iter().sum::<f64>() / (end - start) as f64;
        if score < MAX_SECTION_SCORE {
            sections.push(Section {
                offset,
                start,
                end,
                score,
            });
        }
    }
    sections
}
