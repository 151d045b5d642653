use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Map a space or content id onto a path under `root`.
///
/// Ids are `/`-separated relative names: no absolute paths, no `..`, no `.`
/// or empty segments, no backslashes. Existing symlinks along the way are
/// refused so an id can never resolve outside `root`.
pub fn validate_id_path(root: &Path, id: &str) -> Result<PathBuf, StoreError> {
    if id.is_empty() || id.contains('\\') || id.contains('\0') {
        return Err(StoreError::InvalidContentId(id.to_string()));
    }
    if id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(StoreError::InvalidContentId(id.to_string()));
    }
    let rel = Path::new(id);
    if rel.is_absolute() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(StoreError::InvalidContentId(id.to_string()));
    }

    let mut cur = root.to_path_buf();
    for comp in rel.components() {
        cur = cur.join(comp);
        if let Ok(m) = std::fs::symlink_metadata(&cur) {
            if m.file_type().is_symlink() {
                return Err(StoreError::InvalidContentId(format!("symlink in path: {id}")));
            }
        }
    }
    Ok(cur)
}
