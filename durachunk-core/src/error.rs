//! Error types for chunking, manifest handling, and content store access.

/// Errors reported by a [`ContentStore`](crate::store::ContentStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested content item does not exist.
    #[error("content not found: {space_id}/{content_id}")]
    NotFound {
        /// Space (container) that was searched.
        space_id: String,
        /// Content id that was requested.
        content_id: String,
    },

    /// The number of bytes received differs from the declared size.
    #[error("size mismatch for {content_id}: declared {expected} bytes, received {actual}")]
    SizeMismatch {
        /// Content id being written.
        content_id: String,
        /// Size declared by the caller.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },

    /// The checksum computed by the store differs from the one supplied.
    #[error("checksum mismatch for {content_id}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Content id being written.
        content_id: String,
        /// Checksum supplied by the caller.
        expected: String,
        /// Checksum computed over the received bytes.
        actual: String,
    },

    /// The id cannot be mapped onto the backend (e.g. path traversal).
    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    /// A stored property document could not be read or written.
    #[error("property document error: {0}")]
    Properties(#[from] serde_json::Error),

    /// An I/O error occurred in the backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(space_id: &str, content_id: &str) -> Self {
        StoreError::NotFound { space_id: space_id.to_string(), content_id: content_id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors produced by the chunking, verification and stitching operations.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The manifest document cannot be parsed or lacks required fields.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// A stored manifest is absent, empty, unparsable or internally inconsistent.
    #[error("invalid manifest {manifest_id}: {reason}")]
    InvalidManifest {
        /// Id of the manifest that was requested.
        manifest_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A chunk or the manifest could not be written to the store.
    #[error("failed to write {content_id}")]
    ChunkWriteFailed {
        /// Id of the object whose write failed.
        content_id: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A chunk listed in a manifest is absent from the store.
    #[error("chunk not found: {space_id}/{chunk_id}")]
    ChunkNotFound {
        /// Space that was searched.
        space_id: String,
        /// Missing chunk id.
        chunk_id: String,
    },

    /// The id does not name (and cannot be resolved to) a manifest.
    #[error("not a manifest id: {0}")]
    NotAManifestId(String),

    /// The id cannot be used as the base id of a chunked item.
    #[error("invalid base id {0:?}: empty, or already a manifest or chunk id")]
    InvalidBaseId(String),

    /// The source needs more chunks than the id format can number.
    #[error("content needs more than {max} chunks")]
    TooManyChunks {
        /// Maximum supported chunk count.
        max: u32,
    },

    /// A manifest entry was given a byte size of zero.
    #[error("chunk {0} has zero byte size")]
    EmptyChunk(String),

    /// Two manifest entries claim the same index.
    #[error("duplicate chunk index {0}")]
    DuplicateIndex(u32),

    /// Two manifest entries claim the same chunk id.
    #[error("duplicate chunk id {0}")]
    DuplicateChunkId(String),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChunkError>;
