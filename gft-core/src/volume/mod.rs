//! Numbered volume sets: `<base>.001`, `<base>.002`, ...

use std::path::{Path, PathBuf};

pub mod merge;
pub mod split;

pub const MAX_VOLUMES: u64 = 999;

pub fn volume_path(base: &Path, index: u32) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(format!(".{index:03}"));
    PathBuf::from(s)
}

/// Three ASCII digits, e.g. `001`.
pub fn volume_index(ext: &str) -> Option<u32> {
    if ext.len() == 3 && ext.bytes().all(|b| b.is_ascii_digit()) {
        ext.parse().ok()
    } else {
        None
    }
}

/// Base archive path when `path` names a volume (`.NNN`) or a split
/// manifest (`.split`).
pub fn detect(path: &Path) -> Option<PathBuf> {
    let ext = path.extension()?.to_str()?;
    if volume_index(ext).is_some() || ext == crate::container::split_manifest::EXTENSION {
        Some(path.with_extension(""))
    } else {
        None
    }
}

pub fn is_volume_set(path: &Path) -> bool {
    detect(path).is_some()
}

/// A path names a volume set when it carries a volume/manifest suffix, or
/// when it does not exist but its first volume does.
pub fn is_split_input(path: &Path) -> bool {
    is_volume_set(path) || (!path.exists() && volume_path(path, 1).exists())
}
