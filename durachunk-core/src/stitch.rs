//! Reassembling chunked content into one readable stream.
//!
//! The stream is lazy: chunk `i` is fetched only when the reader reaches
//! it, and chunk `i - 1` is closed first, so at most one chunk stream is open
//! however large the item is.

use std::io::{self, Read};

use tracing::{debug, warn};

use crate::config::StitchOptions;
use crate::error::{ChunkError, Result};
use crate::ids;
use crate::manifest::{ChunkManifest, ManifestEntry};
use crate::manifest_xml;
use crate::store::{ContentStore, Properties, PROP_CHECKSUM, PROP_MIMETYPE, PROP_SIZE};

pub struct FileStitcher<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    opts: StitchOptions,
}

/// A reassembled content item.
pub struct StitchedContent<'a, S: ContentStore + ?Sized> {
    pub manifest: ChunkManifest,
    /// Properties of the stored manifest object, with size, mimetype and
    /// checksum replaced by the values of the original content.
    pub properties: Properties,
    pub stream: ChunkSequenceReader<'a, S>,
}

impl<'a, S: ContentStore + ?Sized> FileStitcher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_options(store, StitchOptions::default())
    }

    pub fn with_options(store: &'a S, opts: StitchOptions) -> Self {
        Self { store, opts }
    }

    /// Fetch and decode the manifest for `id` (a manifest id or a base id).
    pub fn get_manifest(&self, space_id: &str, id: &str) -> Result<ChunkManifest> {
        self.load(space_id, id).map(|(_, manifest, _)| manifest)
    }

    /// Open the content described by the manifest for `id` (a manifest id
    /// or a base id).
    ///
    /// The manifest must list chunks `0..n` without gaps and their sizes must
    /// add up to the recorded source size; otherwise the call fails before
    /// any chunk is fetched.
    pub fn get_content_from_manifest(
        &self,
        space_id: &str,
        id: &str,
    ) -> Result<StitchedContent<'a, S>> {
        let (manifest_id, manifest, stored) = self.load(space_id, id)?;
        manifest.check_complete().map_err(|e| ChunkError::InvalidManifest {
            manifest_id: manifest_id.clone(),
            reason: e.to_string(),
        })?;

        let mut properties = stored;
        properties.insert(PROP_SIZE.to_string(), manifest.source_byte_size().to_string());
        properties.insert(PROP_MIMETYPE.to_string(), manifest.source_mimetype().to_string());
        match manifest.source_checksum() {
            Some(c) => properties.insert(PROP_CHECKSUM.to_string(), c.to_string()),
            None => properties.remove(PROP_CHECKSUM),
        };

        debug!(space_id, manifest_id = %manifest_id, chunks = manifest.len(), "stitching content");
        let stream = ChunkSequenceReader::new(self.store, space_id, &manifest, &self.opts);
        Ok(StitchedContent { manifest, properties, stream })
    }

    fn load(&self, space_id: &str, id: &str) -> Result<(String, ChunkManifest, Properties)> {
        let manifest_id = ids::resolve_manifest_id(id)?;
        let invalid = |reason: String| ChunkError::InvalidManifest {
            manifest_id: manifest_id.clone(),
            reason,
        };

        let mut content = match self.store.get(space_id, &manifest_id) {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return Err(invalid(e.to_string())),
            Err(e) => return Err(e.into()),
        };
        let mut doc = Vec::new();
        content.stream.read_to_end(&mut doc).map_err(|e| invalid(format!("read failed: {e}")))?;
        if doc.iter().all(u8::is_ascii_whitespace) {
            return Err(invalid("empty document".to_string()));
        }
        let manifest = manifest_xml::deserialize_bytes(&doc).map_err(|e| invalid(e.to_string()))?;
        Ok((manifest_id, manifest, content.properties))
    }
}

struct OpenChunk {
    pos: usize,
    stream: Box<dyn Read + Send>,
    hasher: blake3::Hasher,
    read: u64,
}

/// Sequential reader over the chunks of one manifest, in index order.
pub struct ChunkSequenceReader<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    space_id: String,
    entries: Vec<ManifestEntry>,
    next: usize,
    current: Option<OpenChunk>,
    verify: bool,
    whole: blake3::Hasher,
    source_checksum: Option<String>,
    finished: bool,
    failed: bool,
}

impl<'a, S: ContentStore + ?Sized> ChunkSequenceReader<'a, S> {
    fn new(store: &'a S, space_id: &str, manifest: &ChunkManifest, opts: &StitchOptions) -> Self {
        Self {
            store,
            space_id: space_id.to_string(),
            entries: manifest.entries().cloned().collect(),
            next: 0,
            current: None,
            verify: opts.verify_checksums,
            whole: blake3::Hasher::new(),
            source_checksum: manifest.source_checksum().map(str::to_string),
            finished: false,
            failed: false,
        }
    }

    /// Release the currently open chunk stream. Further reads return an
    /// error rather than resuming mid-item.
    pub fn close(&mut self) {
        self.current = None;
        self.failed = true;
    }

    /// Chunks opened so far.
    pub fn chunks_opened(&self) -> usize {
        self.next
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    fn open(&self, pos: usize) -> io::Result<OpenChunk> {
        let entry = &self.entries[pos];
        debug!(
            space_id = %self.space_id,
            chunk_id = %entry.chunk_id,
            index = entry.index,
            "opening chunk"
        );
        match self.store.get(&self.space_id, &entry.chunk_id) {
            Ok(content) => Ok(OpenChunk {
                pos,
                stream: content.stream,
                hasher: blake3::Hasher::new(),
                read: 0,
            }),
            Err(e) if e.is_not_found() => Err(io::Error::new(
                io::ErrorKind::NotFound,
                ChunkError::ChunkNotFound {
                    space_id: self.space_id.clone(),
                    chunk_id: entry.chunk_id.clone(),
                },
            )),
            Err(e) => Err(io::Error::other(ChunkError::Store(e))),
        }
    }

    /// Checks run when a chunk reaches EOF.
    fn finish_chunk(&self, chunk: OpenChunk) -> io::Result<()> {
        let entry = &self.entries[chunk.pos];
        if chunk.read != entry.byte_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "chunk {} is {} bytes, manifest records {}",
                    entry.chunk_id, chunk.read, entry.byte_size
                ),
            ));
        }
        if self.verify {
            let got = chunk.hasher.finalize().to_hex().to_string();
            if got != entry.checksum {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "chunk {} checksum {} does not match manifest checksum {}",
                        entry.chunk_id, got, entry.checksum
                    ),
                ));
            }
        }
        Ok(())
    }

    fn finish_item(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if !self.verify {
            return Ok(());
        }
        if let Some(expected) = &self.source_checksum {
            let got = self.whole.finalize().to_hex().to_string();
            if &got != expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("content checksum {got} does not match manifest checksum {expected}"),
                ));
            }
        }
        Ok(())
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() {
                if self.next >= self.entries.len() {
                    self.finish_item()?;
                    return Ok(0);
                }
                let opened = self.open(self.next)?;
                self.current = Some(opened);
                self.next += 1;
            }
            let Some(chunk) = self.current.as_mut() else {
                continue;
            };

            let n = chunk.stream.read(buf)?;
            if n > 0 {
                chunk.read += n as u64;
                let entry = &self.entries[chunk.pos];
                if chunk.read > entry.byte_size {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "chunk {} is longer than the {} bytes recorded in the manifest",
                            entry.chunk_id, entry.byte_size
                        ),
                    ));
                }
                if self.verify {
                    chunk.hasher.update(&buf[..n]);
                    self.whole.update(&buf[..n]);
                }
                return Ok(n);
            }

            if let Some(done) = self.current.take() {
                self.finish_chunk(done)?;
            }
        }
    }
}

impl<S: ContentStore + ?Sized> Read for ChunkSequenceReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failed {
            return Err(io::Error::other("stitched stream is closed after an earlier failure"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                warn!(space_id = %self.space_id, error = %e, "stitched read failed");
                self.current = None;
                self.failed = true;
                Err(e)
            }
        }
    }
}

impl<S: ContentStore + ?Sized> Read for StitchedContent<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}
