use serde::{Deserialize, Serialize};
use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::HashSet;

use crate::error::{ChunkError, Result};

/// Describes the original content item before chunking.
///
/// An empty `source_checksum` means "not known yet" and is stored as `None`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManifestHeader {
    pub source_content_id: String,
    pub source_mimetype: String,
    pub source_byte_size: u64,
    pub source_checksum: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub chunk_id: String,
    pub checksum: String,
    pub index: u32,
    pub byte_size: u64,
}

/// Chunking description of one content item: a header plus chunk entries
/// keyed (and therefore always traversed) by index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkManifest {
    header: ManifestHeader,
    entries: BTreeMap<u32, ManifestEntry>,
    chunk_ids: HashSet<String>,
}

impl ChunkManifest {
    pub fn new(source_content_id: impl Into<String>, source_mimetype: impl Into<String>) -> Self {
        Self::with_header(ManifestHeader {
            source_content_id: source_content_id.into(),
            source_mimetype: source_mimetype.into(),
            source_byte_size: 0,
            source_checksum: None,
        })
    }

    pub fn with_header(mut header: ManifestHeader) -> Self {
        if header.source_checksum.as_deref() == Some("") {
            header.source_checksum = None;
        }
        Self { header, entries: BTreeMap::new(), chunk_ids: HashSet::new() }
    }

    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    pub fn source_content_id(&self) -> &str {
        &self.header.source_content_id
    }

    pub fn source_mimetype(&self) -> &str {
        &self.header.source_mimetype
    }

    pub fn source_byte_size(&self) -> u64 {
        self.header.source_byte_size
    }

    pub fn set_source_byte_size(&mut self, size: u64) {
        self.header.source_byte_size = size;
    }

    pub fn source_checksum(&self) -> Option<&str> {
        self.header.source_checksum.as_deref()
    }

    /// Record the whole-content checksum. An empty string clears it.
    pub fn set_source_checksum(&mut self, checksum: impl Into<String>) {
        let checksum = checksum.into();
        self.header.source_checksum = (!checksum.is_empty()).then_some(checksum);
    }

    /// Append an entry at the next sequential index.
    pub fn add_entry(
        &mut self,
        chunk_id: impl Into<String>,
        checksum: impl Into<String>,
        byte_size: u64,
    ) -> Result<&ManifestEntry> {
        let chunk_id = chunk_id.into();
        if byte_size == 0 {
            return Err(ChunkError::EmptyChunk(chunk_id));
        }
        if self.chunk_ids.contains(&chunk_id) {
            return Err(ChunkError::DuplicateChunkId(chunk_id));
        }
        let index = self.next_index()?;
        self.chunk_ids.insert(chunk_id.clone());
        let entry = ManifestEntry { chunk_id, checksum: checksum.into(), index, byte_size };
        Ok(self.entries.entry(index).or_insert(entry))
    }

    /// Insert an entry with a caller-supplied index. Duplicate indices and
    /// duplicate chunk ids are rejected.
    pub fn insert_entry(&mut self, entry: ManifestEntry) -> Result<()> {
        if entry.byte_size == 0 {
            return Err(ChunkError::EmptyChunk(entry.chunk_id));
        }
        if self.chunk_ids.contains(&entry.chunk_id) {
            return Err(ChunkError::DuplicateChunkId(entry.chunk_id));
        }
        match self.entries.entry(entry.index) {
            Entry::Occupied(_) => Err(ChunkError::DuplicateIndex(entry.index)),
            Entry::Vacant(slot) => {
                self.chunk_ids.insert(entry.chunk_id.clone());
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Entries in ascending index order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> + '_ {
        self.entries.values()
    }

    pub fn entry(&self, index: u32) -> Option<&ManifestEntry> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_byte_size(&self) -> u64 {
        self.entries.values().map(|e| e.byte_size).sum()
    }

    /// Ok iff the indices are exactly `0..len`.
    pub fn check_contiguous(&self) -> Result<()> {
        for (expected, index) in self.entries.keys().enumerate() {
            if *index as usize != expected {
                return Err(ChunkError::MalformedManifest(format!(
                    "chunk index {expected} is missing (next recorded index is {index})"
                )));
            }
        }
        Ok(())
    }

    /// Contiguous indices and entry sizes summing to the header size.
    pub fn check_complete(&self) -> Result<()> {
        self.check_contiguous()?;
        let total = self.entries_byte_size();
        if total != self.header.source_byte_size {
            return Err(ChunkError::MalformedManifest(format!(
                "chunk sizes sum to {total} bytes but the header records {}",
                self.header.source_byte_size
            )));
        }
        Ok(())
    }

    fn next_index(&self) -> Result<u32> {
        match self.entries.keys().next_back() {
            None => Ok(0),
            Some(last) => last.checked_add(1).ok_or(ChunkError::TooManyChunks { max: u32::MAX }),
        }
    }
}
