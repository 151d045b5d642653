//! Content store interface consumed by the chunker, verifier and stitcher.
//!
//! A store holds named byte blobs grouped in spaces, each with a flat map of
//! string properties. The store computes the checksum of what it persisted and
//! reports it back; that value is authoritative for the chunk manifests.

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Content properties, keyed by name. Ordered so stored documents are stable.
pub type Properties = BTreeMap<String, String>;

pub const PROP_SIZE: &str = "content-size";
pub const PROP_CHECKSUM: &str = "content-checksum";
pub const PROP_MIMETYPE: &str = "content-mimetype";
pub const PROP_MODIFIED: &str = "content-modified";

/// A content item opened for reading.
pub struct Content {
    pub stream: Box<dyn Read + Send>,
    pub properties: Properties,
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Content").field("properties", &self.properties).finish_non_exhaustive()
    }
}

/// Blocking access to an object store.
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// chunking, verification and stitching operation.
pub trait ContentStore: Send + Sync {
    /// Store `byte_size` bytes read from `content` under `content_id`.
    ///
    /// If `checksum` is given, the store rejects the write when its own
    /// checksum of the received bytes differs. Returns the stored checksum.
    #[allow(clippy::too_many_arguments)]
    fn put(
        &self,
        space_id: &str,
        content_id: &str,
        content: &mut dyn Read,
        byte_size: u64,
        mimetype: &str,
        checksum: Option<&str>,
        properties: &Properties,
    ) -> Result<String, StoreError>;

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError>;

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError>;

    fn delete(&self, space_id: &str, content_id: &str) -> Result<(), StoreError>;

    /// Content ids in `space_id`, optionally restricted to a prefix. No
    /// ordering is promised.
    fn list(&self, space_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError>;
}

/// Size recorded in `properties`, if present and numeric.
pub fn property_size(properties: &Properties) -> Option<u64> {
    properties.get(PROP_SIZE).and_then(|s| s.trim().parse().ok())
}

pub fn property_checksum(properties: &Properties) -> Option<&str> {
    properties.get(PROP_CHECKSUM).map(String::as_str)
}

/// Caller properties merged with the system properties a store records on
/// every write. System keys win.
pub(crate) fn system_properties(
    properties: &Properties,
    byte_size: u64,
    mimetype: &str,
    checksum: &str,
) -> Properties {
    let mut props = properties.clone();
    props.insert(PROP_SIZE.to_string(), byte_size.to_string());
    props.insert(PROP_MIMETYPE.to_string(), mimetype.to_string());
    props.insert(PROP_CHECKSUM.to_string(), checksum.to_string());
    props.insert(PROP_MODIFIED.to_string(), chrono::Utc::now().to_rfc3339());
    props
}

/// Shared put validation: declared size and optional caller checksum.
pub(crate) fn check_received(
    content_id: &str,
    byte_size: u64,
    received: u64,
    expected_checksum: Option<&str>,
    actual_checksum: &str,
) -> Result<(), StoreError> {
    if received != byte_size {
        return Err(StoreError::SizeMismatch {
            content_id: content_id.to_string(),
            expected: byte_size,
            actual: received,
        });
    }
    if let Some(expected) = expected_checksum {
        if expected != actual_checksum {
            return Err(StoreError::ChecksumMismatch {
                content_id: content_id.to_string(),
                expected: expected.to_string(),
                actual: actual_checksum.to_string(),
            });
        }
    }
    Ok(())
}
