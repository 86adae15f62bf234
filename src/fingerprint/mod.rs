//! Fingerprint model, codec and audio configuration
//!
//! A fingerprint is an ordered sequence of 32-bit frame hashes produced by a
//! Chromaprint-style extractor at a fixed audio configuration, identified by a
//! version byte. Fingerprints travel as URL-safe base64 over the wire and as
//! a compressed byte sequence at rest; both forms round-trip exactly.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{Error, Result};

mod codec;

pub use codec::{compress, parse};

/// Maximum number of frames a fingerprint may carry.
pub const MAX_FINGERPRINT_FRAMES: usize = u16::MAX as usize;

/// A parsed audio fingerprint. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Extractor version that produced the hashes
    pub version: u8,
    /// One 32-bit hash per analysis frame
    pub hashes: Vec<u32>,
}

impl Fingerprint {
    /// Parse the textual (URL-safe base64) fingerprint representation.
    pub fn from_base64(text: &str) -> Result<Self> {
        let trimmed = text.trim().trim_end_matches('=');
        let data = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|_| Error::InvalidFingerprint)?;
        parse(&data)
    }

    /// Serialise to the textual representation.
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(compress(self))
    }

    /// Audio configuration for this fingerprint's version, if supported.
    pub fn config(&self) -> Option<&'static FingerprintConfig> {
        config_for_version(self.version)
    }
}

/// Audio analysis parameters of a fingerprint version. All quantities that
/// translate frame indices into wall-clock positions derive from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintConfig {
    pub sample_rate: u32,
    pub frame_size: u32,
    pub frame_overlap: u32,
    pub num_filter_coefficients: u32,
    pub max_filter_width: u32,
}

static CONFIG_V1: FingerprintConfig = FingerprintConfig {
    sample_rate: 11025,
    frame_size: 4096,
    frame_overlap: 4096 - 4096 / 3,
    num_filter_coefficients: 5,
    max_filter_width: 16,
};

/// Look up the audio configuration for a fingerprint version.
pub fn config_for_version(version: u8) -> Option<&'static FingerprintConfig> {
    match version {
        1 => Some(&CONFIG_V1),
        _ => None,
    }
}

impl FingerprintConfig {
    fn hop_size(&self) -> u32 {
        self.frame_size - self.frame_overlap
    }

    /// Seconds of audio each frame index step represents.
    pub fn item_duration_secs(&self) -> f64 {
        self.hop_size() as f64 / self.sample_rate as f64
    }

    /// Latency of the analysis filter chain in seconds.
    pub fn delay_secs(&self) -> f64 {
        let filter_frames =
            (self.num_filter_coefficients - 1) + (self.max_filter_width - 1);
        (self.hop_size() as f64 * filter_frames as f64 + self.frame_overlap as f64)
            / self.sample_rate as f64
    }

    /// Wall-clock position of frame `i`.
    pub fn offset_duration(&self, i: usize) -> Duration {
        Duration::from_secs_f64(i as f64 * self.item_duration_secs())
    }

    /// Wall-clock length of `i` frames of audio, zero for zero frames.
    pub fn total_duration(&self, i: usize) -> Duration {
        if i == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(i as f64 * self.item_duration_secs() + self.delay_secs())
    }
}
