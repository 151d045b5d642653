#![allow(dead_code)]

use durachunk_core::store::{Content, ContentStore, MemoryStore, Properties};
use durachunk_core::StoreError;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}

/// Store that only answers property lookups, from a fixed table.
/// Ids missing from the table are reported as not found.
#[derive(Default)]
pub struct PropertiesOnlyStore {
    pub props: HashMap<String, Properties>,
    pub broken: Vec<String>,
}

impl ContentStore for PropertiesOnlyStore {
    fn put(
        &self,
        _space_id: &str,
        _content_id: &str,
        _content: &mut dyn Read,
        _byte_size: u64,
        _mimetype: &str,
        _checksum: Option<&str>,
        _properties: &Properties,
    ) -> Result<String, StoreError> {
        unimplemented!("read-only test store")
    }

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError> {
        Err(StoreError::not_found(space_id, content_id))
    }

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        if self.broken.iter().any(|b| b == content_id) {
            return Err(StoreError::Io(std::io::Error::other("connection reset")));
        }
        self.props.get(content_id).cloned().ok_or_else(|| StoreError::not_found(space_id, content_id))
    }

    fn delete(&self, _space_id: &str, _content_id: &str) -> Result<(), StoreError> {
        unimplemented!("read-only test store")
    }

    fn list(&self, _space_id: &str, _prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        Ok(self.props.keys().cloned().collect())
    }
}

/// Wraps a [`MemoryStore`]: lists ids in shuffled order, records the order
/// of `get` calls, and tracks how many returned streams are alive at once.
/// Gets of ids in `broken` fail with an I/O error.
pub struct TracingStore {
    pub inner: MemoryStore,
    pub gets: Mutex<Vec<String>>,
    pub broken: Vec<String>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    seed: u64,
}

impl TracingStore {
    pub fn new(inner: MemoryStore, seed: u64) -> Self {
        Self {
            inner,
            gets: Mutex::new(Vec::new()),
            broken: Vec::new(),
            open: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            seed,
        }
    }

    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_streams(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }
}

struct CountedStream {
    inner: Box<dyn Read + Send>,
    open: Arc<AtomicUsize>,
}

impl Read for CountedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContentStore for TracingStore {
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
        self.inner.put(space_id, content_id, content, byte_size, mimetype, checksum, properties)
    }

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError> {
        self.gets.lock().unwrap().push(content_id.to_string());
        if self.broken.iter().any(|b| b == content_id) {
            return Err(StoreError::Io(std::io::Error::other("connection reset")));
        }
        let content = self.inner.get(space_id, content_id)?;
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        Ok(Content {
            stream: Box::new(CountedStream { inner: content.stream, open: Arc::clone(&self.open) }),
            properties: content.properties,
        })
    }

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        self.inner.get_properties(space_id, content_id)
    }

    fn delete(&self, space_id: &str, content_id: &str) -> Result<(), StoreError> {
        self.inner.delete(space_id, content_id)
    }

    fn list(&self, space_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        let mut ids = self.inner.list(space_id, prefix)?;
        ids.sort();
        ids.shuffle(&mut StdRng::seed_from_u64(self.seed));
        Ok(ids)
    }
}

/// Fails every `put` whose content id appears in `fail_on`; otherwise
/// delegates to a [`MemoryStore`]. Returned checksums can be rewritten.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_on: Vec<String>,
    pub uppercase_checksums: bool,
}

impl FlakyStore {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on: ids.iter().map(|s| s.to_string()).collect(),
            uppercase_checksums: false,
        }
    }
}

impl ContentStore for FlakyStore {
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
        if self.fail_on.iter().any(|f| f == content_id) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let stored =
            self.inner.put(space_id, content_id, content, byte_size, mimetype, checksum, properties)?;
        Ok(if self.uppercase_checksums { stored.to_uppercase() } else { stored })
    }

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError> {
        self.inner.get(space_id, content_id)
    }

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        self.inner.get_properties(space_id, content_id)
    }

    fn delete(&self, space_id: &str, content_id: &str) -> Result<(), StoreError> {
        self.inner.delete(space_id, content_id)
    }

    fn list(&self, space_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.inner.list(space_id, prefix)
    }
}
