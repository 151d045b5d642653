//! In-memory content store.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{check_received, system_properties, Content, ContentStore, Properties};
use crate::checksum::HashingReader;
use crate::error::StoreError;

/// Upper bound on the buffer reserved from a caller's declared size; the
/// declared size is only checked once the stream ends.
const PREALLOC_LIMIT: u64 = 1 << 20;

struct Item {
    data: Arc<Vec<u8>>,
    properties: Properties,
}

/// Content store backed by a `RwLock<HashMap>`.
///
/// Useful in tests and for staging small uploads. Reads hand out a shared
/// snapshot of the bytes, so a concurrent overwrite never changes an open
/// stream.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<(String, String), Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all spaces.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Overwrite the bytes of an existing item without touching its
    /// properties.
    pub fn replace_data(
        &self,
        space_id: &str,
        content_id: &str,
        data: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut items = self.write();
        let item = items
            .get_mut(&key(space_id, content_id))
            .ok_or_else(|| StoreError::not_found(space_id, content_id))?;
        item.data = Arc::new(data);
        Ok(())
    }

    /// Overwrite one property of an existing item.
    pub fn set_property(
        &self,
        space_id: &str,
        content_id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut items = self.write();
        let item = items
            .get_mut(&key(space_id, content_id))
            .ok_or_else(|| StoreError::not_found(space_id, content_id))?;
        item.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(String, String), Item>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(String, String), Item>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key(space_id: &str, content_id: &str) -> (String, String) {
    (space_id.to_string(), content_id.to_string())
}

/// `Read` over a shared byte buffer.
struct SharedBytes(Cursor<Arc<Vec<u8>>>);

impl Read for SharedBytes {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let pos = self.0.position() as usize;
        let data = self.0.get_ref();
        let n = buf.len().min(data.len().saturating_sub(pos));
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.0.set_position((pos + n) as u64);
        Ok(n)
    }
}

impl ContentStore for MemoryStore {
    fn put(
        &self,
        space_id: &str,
        content_id: &str,
        content: &mut dyn Read,
        byte_size: u64,
        mimetype: &str,
        checksum: Option<&str>,
        properties: &Properties,
    ) -> Result<String, StoreError> {
        let mut reader = HashingReader::new(content);
        let mut data = Vec::with_capacity(byte_size.min(PREALLOC_LIMIT) as usize);
        reader.read_to_end(&mut data)?;
        let stored = reader.checksum();
        check_received(content_id, byte_size, reader.bytes_read(), checksum, &stored)?;

        debug!(space_id, content_id, size = data.len(), "storing content in memory");
        let properties = system_properties(properties, byte_size, mimetype, &stored);
        self.write().insert(key(space_id, content_id), Item { data: Arc::new(data), properties });
        Ok(stored)
    }

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError> {
        let items = self.read();
        let item = items
            .get(&key(space_id, content_id))
            .ok_or_else(|| StoreError::not_found(space_id, content_id))?;
        Ok(Content {
            stream: Box::new(SharedBytes(Cursor::new(Arc::clone(&item.data)))),
            properties: item.properties.clone(),
        })
    }

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        self.read()
            .get(&key(space_id, content_id))
            .map(|item| item.properties.clone())
            .ok_or_else(|| StoreError::not_found(space_id, content_id))
    }

    fn delete(&self, space_id: &str, content_id: &str) -> Result<(), StoreError> {
        match self.write().remove(&key(space_id, content_id)) {
            Some(_) => {
                debug!(space_id, content_id, "deleted content from memory");
                Ok(())
            }
            None => Err(StoreError::not_found(space_id, content_id)),
        }
    }

    fn list(&self, space_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read()
            .keys()
            .filter(|(space, id)| space == space_id && prefix.map_or(true, |p| id.starts_with(p)))
            .map(|(_, id)| id.clone())
            .collect())
    }
}
