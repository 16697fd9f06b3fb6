//! Payload encoding for the disk tier.
//!
//! A payload file is one header byte naming the compression followed by the
//! JSON encoding of a [`CacheItem`].

use crate::cache::CacheItem;
use crate::error::{CacheError, Result};

const HEADER_RAW: u8 = 0;
const HEADER_ZSTD: u8 = 1;

/// Trait for compression algorithms.
pub trait Compressor: Send + Sync {
    /// Compress data.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Zstd compressor with configurable level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Create a new Zstd compressor with default level (3).
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(3)
    }

    /// Level ranges from -7 (fastest) to 22 (best compression).
    #[must_use]
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| CacheError::Compression(e.to_string()))
    }
}

// == Payload Codec ==
/// Encodes items for disk, optionally compressing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec {
    compressor: Option<ZstdCompressor>,
}

impl PayloadCodec {
    /// Codec that writes plain JSON payloads.
    pub fn plain() -> Self {
        Self { compressor: None }
    }

    /// Codec that writes zstd-compressed payloads.
    pub fn compressed() -> Self {
        Self {
            compressor: Some(ZstdCompressor::new()),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compressor.is_some()
    }

    /// Encodes `item` into a payload file body.
    pub fn encode(&self, item: &CacheItem) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(item)?;
        let mut payload = Vec::with_capacity(json.len() + 1);
        match &self.compressor {
            Some(compressor) => {
                payload.push(HEADER_ZSTD);
                payload.extend(compressor.compress(&json)?);
            }
            None => {
                payload.push(HEADER_RAW);
                payload.extend(json);
            }
        }
        Ok(payload)
    }

    /// Decodes a payload file body.
    ///
    /// The header byte decides decompression, so payloads written with
    /// either setting can be read by any codec.
    pub fn decode(&self, payload: &[u8]) -> Result<CacheItem> {
        let (header, body) = payload
            .split_first()
            .ok_or_else(|| CacheError::Compression("empty payload".to_string()))?;

        match *header {
            HEADER_RAW => Ok(serde_json::from_slice(body)?),
            HEADER_ZSTD => {
                let json = ZstdCompressor::new().decompress(body)?;
                Ok(serde_json::from_slice(&json)?)
            }
            other => Err(CacheError::Compression(format!(
                "unknown payload header {}",
                other
            ))),
        }
    }
}
