//! Naming of chunk and manifest content items.
//!
//! A chunked item with base id `photo.tif` is stored as
//! `photo.tif.dura-chunk-0000`, `photo.tif.dura-chunk-0001`, ... plus
//! `photo.tif.dura-manifest`. These names are visible in the store, so the
//! suffixes and the index width must never change.

use crate::error::{ChunkError, Result};

/// Suffix appended to a base id to form its manifest id.
pub const MANIFEST_SUFFIX: &str = ".dura-manifest";

/// Separator between a base id and the zero-padded chunk index.
pub const CHUNK_SUFFIX: &str = ".dura-chunk-";

/// Digits used for the chunk index.
pub const CHUNK_INDEX_WIDTH: usize = 4;

/// Largest number of chunks a single item may be split into. Keeps every
/// chunk id at exactly [`CHUNK_INDEX_WIDTH`] digits so string order matches
/// index order.
pub const MAX_CHUNK_COUNT: u32 = 10_000;

/// True iff `id` ends with the manifest suffix and has a non-empty base.
pub fn is_manifest_id(id: &str) -> bool {
    id.len() > MANIFEST_SUFFIX.len() && id.ends_with(MANIFEST_SUFFIX)
}

/// True iff `id` is `base + CHUNK_SUFFIX + digits` with a non-empty base.
pub fn is_chunk_id(id: &str) -> bool {
    split_chunk_id(id).is_some()
}

pub fn manifest_id(base_id: &str) -> String {
    format!("{base_id}{MANIFEST_SUFFIX}")
}

/// Chunk id for `index`, zero-padded to [`CHUNK_INDEX_WIDTH`] digits.
pub fn chunk_id(base_id: &str, index: u32) -> String {
    format!("{base_id}{CHUNK_SUFFIX}{index:0width$}", width = CHUNK_INDEX_WIDTH)
}

/// Strip the manifest suffix from `id`.
///
/// Ids that do not end with the suffix (plain base ids, chunk ids, or ids
/// with trailing characters after the suffix such as `a.dura-manifest7`)
/// are returned unchanged. Use [`resolve_manifest_id`] when chunk ids must
/// be rejected instead.
pub fn base_id_from_manifest_id(id: &str) -> &str {
    if is_manifest_id(id) {
        &id[..id.len() - MANIFEST_SUFFIX.len()]
    } else {
        id
    }
}

pub fn base_id_from_chunk_id(id: &str) -> Option<&str> {
    split_chunk_id(id).map(|(base, _)| base)
}

pub fn chunk_index(id: &str) -> Option<u32> {
    split_chunk_id(id).and_then(|(_, digits)| digits.parse().ok())
}

/// Map a base id or manifest id onto the manifest id. Chunk ids are refused.
pub fn resolve_manifest_id(id: &str) -> Result<String> {
    if id.is_empty() || is_chunk_id(id) || id == MANIFEST_SUFFIX {
        return Err(ChunkError::NotAManifestId(id.to_string()));
    }
    if is_manifest_id(id) {
        Ok(id.to_string())
    } else {
        Ok(manifest_id(id))
    }
}

/// Check that `base_id` can name a chunked item: non-empty, and neither a
/// manifest id nor a chunk id, so its manifest id resolves back to it.
pub fn validate_base_id(base_id: &str) -> Result<()> {
    if base_id.is_empty() || base_id.ends_with(MANIFEST_SUFFIX) || is_chunk_id(base_id) {
        return Err(ChunkError::InvalidBaseId(base_id.to_string()));
    }
    Ok(())
}

fn split_chunk_id(id: &str) -> Option<(&str, &str)> {
    let pos = id.rfind(CHUNK_SUFFIX)?;
    let base = &id[..pos];
    let digits = &id[pos + CHUNK_SUFFIX.len()..];
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, digits))
}
