//! Splitting a source stream into stored chunks plus a manifest.
//!
//! Chunks are written in source order with strictly increasing indices.
//! A failed write aborts the whole upload but leaves the chunks that were
//! already stored in place; callers needing all-or-nothing behaviour remove
//! them with [`remove_chunked`].

use std::io::{self, Read};

use tracing::{debug, info, warn};

use crate::checksum::checksum_hex;
use crate::config::ChunkerConfig;
use crate::error::{ChunkError, Result};
use crate::ids::{self, MAX_CHUNK_COUNT};
use crate::manifest::ChunkManifest;
use crate::manifest_xml::{self, MANIFEST_MIMETYPE};
use crate::stitch::FileStitcher;
use crate::store::{ContentStore, Properties};

/// Mimetype under which individual chunks are stored.
pub const CHUNK_MIMETYPE: &str = "application/octet-stream";

/// Outcome of [`ChunkWriter::store`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredContent {
    /// Stored as one plain object under the base id.
    Single { content_id: String, checksum: String, byte_size: u64 },
    /// Stored as chunks plus a manifest.
    Chunked(ChunkManifest),
}

pub struct ChunkWriter<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    cfg: ChunkerConfig,
}

impl<'a, S: ContentStore + ?Sized> ChunkWriter<'a, S> {
    pub fn new(store: &'a S, cfg: ChunkerConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.cfg
    }

    /// Chunk `source` into `space_id` under `base_id` and store the manifest.
    ///
    /// Writes one object per chunk plus the manifest document, which carries
    /// `properties` as its stored properties. An empty source yields a
    /// manifest with no entries. `base_id` must pass
    /// [`ids::validate_base_id`]; nothing is written otherwise.
    pub fn write<R: Read>(
        &self,
        space_id: &str,
        base_id: &str,
        mimetype: &str,
        mut source: R,
        properties: &Properties,
    ) -> Result<ChunkManifest> {
        ids::validate_base_id(base_id)?;
        let chunk_len = self.cfg.chunk_size;
        let mut buf = Vec::new();
        let mut whole = blake3::Hasher::new();
        let mut manifest = ChunkManifest::new(base_id, mimetype);
        let mut total: u64 = 0;

        loop {
            let n = read_chunk(&mut source, chunk_len, &mut buf)?;
            if n == 0 {
                break;
            }
            let index = manifest.len() as u32;
            if index >= MAX_CHUNK_COUNT {
                return Err(ChunkError::TooManyChunks { max: MAX_CHUNK_COUNT });
            }
            let data = &buf[..];
            whole.update(data);
            total += n as u64;

            let chunk_id = ids::chunk_id(base_id, index);
            let local = checksum_hex(data);
            let mut reader: &[u8] = data;
            let stored = self
                .store
                .put(
                    space_id,
                    &chunk_id,
                    &mut reader,
                    n as u64,
                    CHUNK_MIMETYPE,
                    Some(local.as_str()),
                    &Properties::new(),
                )
                .map_err(|source| ChunkError::ChunkWriteFailed {
                    content_id: chunk_id.clone(),
                    source,
                })?;
            debug!(space_id, chunk_id = %chunk_id, index, size = n, "stored chunk");
            manifest.add_entry(chunk_id, stored, n as u64)?;

            if (n as u64) < chunk_len {
                break;
            }
        }

        manifest.set_source_byte_size(total);
        manifest.set_source_checksum(whole.finalize().to_hex().to_string());
        manifest.check_complete()?;

        let manifest_id = ids::manifest_id(base_id);
        let doc = manifest_xml::serialize(&manifest)?;
        let mut reader = doc.as_bytes();
        self.store
            .put(
                space_id,
                &manifest_id,
                &mut reader,
                doc.len() as u64,
                MANIFEST_MIMETYPE,
                Some(checksum_hex(doc.as_bytes()).as_str()),
                properties,
            )
            .map_err(|source| ChunkError::ChunkWriteFailed {
                content_id: manifest_id.clone(),
                source,
            })?;
        info!(
            space_id,
            manifest_id = %manifest_id,
            chunks = manifest.len(),
            size = total,
            "stored chunked content"
        );
        Ok(manifest)
    }

    /// Store `source` under `base_id`, chunking only when it has to.
    ///
    /// With `chunk_small_content` off, a source no larger than one chunk is
    /// written as a single plain object; everything else goes through
    /// [`ChunkWriter::write`].
    pub fn store<R: Read>(
        &self,
        space_id: &str,
        base_id: &str,
        mimetype: &str,
        mut source: R,
        properties: &Properties,
    ) -> Result<StoredContent> {
        ids::validate_base_id(base_id)?;
        if self.cfg.chunk_small_content {
            return self
                .write(space_id, base_id, mimetype, source, properties)
                .map(StoredContent::Chunked);
        }

        let chunk_len = self.cfg.chunk_size;
        let mut head = Vec::new();
        let n = read_chunk(&mut source, chunk_len, &mut head)?;
        let mut probe = Vec::new();
        if n as u64 == chunk_len {
            read_chunk(&mut source, 1, &mut probe)?;
        }

        if probe.is_empty() {
            let mut reader: &[u8] = &head;
            let checksum = self
                .store
                .put(
                    space_id,
                    base_id,
                    &mut reader,
                    n as u64,
                    mimetype,
                    Some(checksum_hex(&head).as_str()),
                    properties,
                )
                .map_err(|source| ChunkError::ChunkWriteFailed {
                    content_id: base_id.to_string(),
                    source,
                })?;
            info!(space_id, content_id = base_id, size = n, "stored content without chunking");
            return Ok(StoredContent::Single {
                content_id: base_id.to_string(),
                checksum,
                byte_size: n as u64,
            });
        }

        let rest = io::Cursor::new(head).chain(io::Cursor::new(probe)).chain(source);
        self.write(space_id, base_id, mimetype, rest, properties).map(StoredContent::Chunked)
    }
}

/// Delete a chunked item: every chunk listed in its manifest, then the
/// manifest itself. `id` may be the base id or the manifest id. Chunks that
/// are already gone are skipped. Returns the number of objects deleted.
pub fn remove_chunked<S: ContentStore + ?Sized>(
    store: &S,
    space_id: &str,
    id: &str,
) -> Result<usize> {
    let manifest_id = ids::resolve_manifest_id(id)?;
    let manifest = FileStitcher::new(store).get_manifest(space_id, &manifest_id)?;
    let mut deleted = 0usize;
    for entry in manifest.entries() {
        match store.delete(space_id, &entry.chunk_id) {
            Ok(()) => deleted += 1,
            Err(e) if e.is_not_found() => {
                warn!(space_id, chunk_id = %entry.chunk_id, "chunk already missing during removal");
            }
            Err(e) => return Err(e.into()),
        }
    }
    store.delete(space_id, &manifest_id)?;
    info!(space_id, manifest_id = %manifest_id, deleted = deleted + 1, "removed chunked content");
    Ok(deleted + 1)
}

/// Replace the contents of `buf` with up to `limit` bytes from `source`.
/// The buffer grows with the data read, never to `limit` up front.
fn read_chunk<R: Read + ?Sized>(
    source: &mut R,
    limit: u64,
    buf: &mut Vec<u8>,
) -> io::Result<usize> {
    buf.clear();
    (&mut *source).take(limit).read_to_end(buf)
}
