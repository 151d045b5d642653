//! Directory-backed content store.
//!
//! Layout under the store root:
//!
//! ```text
//! {root}/{space}/data/{content_id}        content bytes
//! {root}/{space}/meta/{content_id}.json   properties
//! {root}/{space}/tmp/                     in-flight writes
//! {root}/{space}/.lock                    commit lock
//! ```
//!
//! Bytes and properties are staged in `tmp/` and renamed into place under an
//! exclusive lock, so readers never observe a half-written item or bytes
//! without their properties. A failed put removes its staged files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{check_received, system_properties, Content, ContentStore, Properties};
use crate::checksum::HashingReader;
use crate::error::StoreError;
use crate::path_safety::validate_id_path;

const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";
const LOCK_FILE: &str = ".lock";

pub struct FileStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, tmp_seq: AtomicU64::new(0) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn space_dir(&self, space_id: &str) -> Result<PathBuf, StoreError> {
        if space_id.contains('/') {
            return Err(StoreError::InvalidContentId(format!("space id {space_id:?}")));
        }
        validate_id_path(&self.root, space_id)
    }

    fn data_path(&self, space_id: &str, content_id: &str) -> Result<PathBuf, StoreError> {
        validate_id_path(&self.space_dir(space_id)?.join(DATA_DIR), content_id)
    }

    fn meta_path(&self, space_id: &str, content_id: &str) -> Result<PathBuf, StoreError> {
        let p = validate_id_path(&self.space_dir(space_id)?.join(META_DIR), content_id)?;
        let mut name = p.into_os_string();
        name.push(".json");
        Ok(PathBuf::from(name))
    }

    fn lock(&self, space_id: &str, exclusive: bool) -> Result<Option<File>, StoreError> {
        let space = self.space_dir(space_id)?;
        if !exclusive && !space.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&space)?;
        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(space.join(LOCK_FILE))?;
        if exclusive {
            f.lock_exclusive()?;
        } else {
            f.lock_shared()?;
        }
        Ok(Some(f))
    }

    /// Move a staged item into place under the space lock. Data goes first;
    /// if its properties cannot follow, the data is removed again so the
    /// item is never readable without matching properties.
    fn commit(
        &self,
        space_id: &str,
        tmp_data: &Path,
        tmp_meta: &Path,
        data_path: &Path,
        meta_path: &Path,
    ) -> Result<(), StoreError> {
        let _guard = self.lock(space_id, true)?;
        for dir in [data_path.parent(), meta_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir)?;
        }
        fs::rename(tmp_data, data_path)?;
        if let Err(e) = fs::rename(tmp_meta, meta_path) {
            warn!(space_id, path = %data_path.display(), error = %e, "property commit failed");
            let _ = fs::remove_file(data_path);
            let _ = fs::remove_file(meta_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn read_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        let path = self.meta_path(space_id, content_id)?;
        let f = File::open(&path).map_err(|e| not_found_or(e, space_id, content_id))?;
        Ok(serde_json::from_reader(io::BufReader::new(f))?)
    }
}

fn not_found_or(e: io::Error, space_id: &str, content_id: &str) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::not_found(space_id, content_id)
    } else {
        StoreError::Io(e)
    }
}

impl ContentStore for FileStore {
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
        let data_path = self.data_path(space_id, content_id)?;
        let meta_path = self.meta_path(space_id, content_id)?;
        let tmp_dir = self.space_dir(space_id)?.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir)?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_data = tmp_dir.join(format!("put-{}-{seq}", std::process::id()));
        let tmp_meta = tmp_dir.join(format!("put-{}-{seq}.json", std::process::id()));

        let result = (|| -> Result<(u64, String), StoreError> {
            let mut reader = HashingReader::new(content);
            let mut out = BufWriter::new(File::create(&tmp_data)?);
            io::copy(&mut reader, &mut out)?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            let (received, stored) = (reader.bytes_read(), reader.checksum());
            check_received(content_id, byte_size, received, checksum, &stored)?;

            let props = system_properties(properties, byte_size, mimetype, &stored);
            let mut meta = File::create(&tmp_meta)?;
            meta.write_all(serde_json::to_string_pretty(&props)?.as_bytes())?;
            meta.sync_all()?;

            self.commit(space_id, &tmp_data, &tmp_meta, &data_path, &meta_path)?;
            Ok((received, stored))
        })();
        let (received, stored) = match result {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&tmp_data);
                let _ = fs::remove_file(&tmp_meta);
                return Err(e);
            }
        };

        debug!(
            space_id,
            content_id,
            path = %data_path.display(),
            size = received,
            "stored content to file"
        );
        Ok(stored)
    }

    fn get(&self, space_id: &str, content_id: &str) -> Result<Content, StoreError> {
        let _guard = self.lock(space_id, false)?;
        let path = self.data_path(space_id, content_id)?;
        let file = File::open(&path).map_err(|e| not_found_or(e, space_id, content_id))?;
        let properties = self.read_properties(space_id, content_id)?;
        Ok(Content { stream: Box::new(io::BufReader::new(file)), properties })
    }

    fn get_properties(&self, space_id: &str, content_id: &str) -> Result<Properties, StoreError> {
        let _guard = self.lock(space_id, false)?;
        if !self.data_path(space_id, content_id)?.is_file() {
            return Err(StoreError::not_found(space_id, content_id));
        }
        self.read_properties(space_id, content_id)
    }

    fn delete(&self, space_id: &str, content_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock(space_id, true)?;
        let data_path = self.data_path(space_id, content_id)?;
        fs::remove_file(&data_path).map_err(|e| not_found_or(e, space_id, content_id))?;
        if let Err(e) = fs::remove_file(self.meta_path(space_id, content_id)?) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(space_id, content_id, error = %e, "failed to remove property file");
            }
        }
        debug!(space_id, content_id, "deleted content file");
        Ok(())
    }

    fn list(&self, space_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        let data_dir = self.space_dir(space_id)?.join(DATA_DIR);
        if !data_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for ent in WalkDir::new(&data_dir).min_depth(1) {
            let ent = ent.map_err(|e| StoreError::Io(e.into()))?;
            if !ent.file_type().is_file() {
                continue;
            }
            let Some(rel) = pathdiff::diff_paths(ent.path(), &data_dir) else {
                continue;
            };
            let id = rel.to_string_lossy().replace('\\', "/");
            if prefix.map_or(true, |p| id.starts_with(p)) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
