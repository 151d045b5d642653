use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::error::ChunkError;

/// Default chunk size: 64 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 << 20;

/// Largest chunk a single store put is asked to accept: 5 GiB.
pub const MAX_CHUNK_SIZE: u64 = 5 << 30;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Bytes per chunk; the last chunk of an item may be shorter.
    pub chunk_size: u64,
    /// When false, content that fits in a single chunk is stored as one
    /// plain object instead of a one-chunk manifest.
    pub chunk_small_content: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, chunk_small_content: true }
    }
}

impl ChunkerConfig {
    pub fn with_chunk_size(chunk_size: u64) -> Self {
        Self { chunk_size, ..Self::default() }
    }

    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open {:?}", path))?;
        let cfg: ChunkerConfig =
            serde_json::from_reader(f).with_context(|| format!("parse {:?}", path))?;
        cfg.validate().with_context(|| format!("validate {:?}", path))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk_size {} exceeds the maximum of {MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk_size {} does not fit in memory on this platform",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StitchOptions {
    /// Check every chunk, and the whole item, against the manifest
    /// checksums while reading.
    pub verify_checksums: bool,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self { verify_checksums: true }
    }
}
