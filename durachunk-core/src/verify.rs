use tracing::{debug, warn};

use crate::error::Result;
use crate::manifest::ChunkManifest;
use crate::stitch::FileStitcher;
use crate::store::{property_checksum, property_size, ContentStore};

/// Why a chunk failed verification. Size is checked before checksum, so a
/// chunk wrong in both reports `SizeMismatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    None,
    /// `actual` is `None` when the store reported no usable size.
    SizeMismatch { expected: u64, actual: Option<u64> },
    /// `actual` is `None` when the store reported no checksum.
    ChecksumMismatch { expected: String, actual: Option<String> },
    ChunkNotFound,
    /// The store failed for a reason other than a missing chunk.
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkVerification {
    pub chunk_id: String,
    pub index: u32,
    pub reason: FailureReason,
}

impl ChunkVerification {
    pub fn is_success(&self) -> bool {
        self.reason == FailureReason::None
    }
}

/// Per-chunk results in manifest order; one per manifest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub results: Vec<ChunkVerification>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ChunkVerification::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChunkVerification> + '_ {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Cross-checks a manifest against the properties the store holds for each
/// chunk. Mismatches are collected, not raised; nothing is retried here.
pub struct ManifestVerifier<'a, S: ContentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ContentStore + ?Sized> ManifestVerifier<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn verify_all_chunks(
        &self,
        space_id: &str,
        manifest: &ChunkManifest,
    ) -> VerificationReport {
        let mut results = Vec::with_capacity(manifest.len());
        for entry in manifest.entries() {
            let reason = match self.store.get_properties(space_id, &entry.chunk_id) {
                Err(e) if e.is_not_found() => FailureReason::ChunkNotFound,
                Err(e) => FailureReason::FetchFailed(e.to_string()),
                Ok(props) => {
                    let size = property_size(&props);
                    let checksum = property_checksum(&props);
                    if size != Some(entry.byte_size) {
                        FailureReason::SizeMismatch { expected: entry.byte_size, actual: size }
                    } else if checksum != Some(entry.checksum.as_str()) {
                        FailureReason::ChecksumMismatch {
                            expected: entry.checksum.clone(),
                            actual: checksum.map(str::to_string),
                        }
                    } else {
                        FailureReason::None
                    }
                }
            };
            if reason != FailureReason::None {
                warn!(space_id, chunk_id = %entry.chunk_id, ?reason, "chunk failed verification");
            }
            results.push(ChunkVerification {
                chunk_id: entry.chunk_id.clone(),
                index: entry.index,
                reason,
            });
        }
        let report = VerificationReport { results };
        debug!(space_id, chunks = report.len(), ok = report.is_success(), "verified manifest");
        report
    }

    /// Load the manifest for `id` (manifest id or base id) and verify it.
    pub fn verify_manifest_id(&self, space_id: &str, id: &str) -> Result<VerificationReport> {
        let manifest = FileStitcher::new(self.store).get_manifest(space_id, id)?;
        Ok(self.verify_all_chunks(space_id, &manifest))
    }
}
