use crate::codec::SourceEntry;
use crate::error::{GftError, Result};
use crate::util::io::mode_of;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Regular files under `roots` (directories walked recursively), sorted and
/// de-duplicated.
pub fn expand(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        let md = fs::metadata(root).map_err(|_| GftError::NotFound(root.clone()))?;
        if md.is_file() {
            files.push(fs::canonicalize(root)?);
            continue;
        }
        for e in WalkDir::new(root).follow_links(false) {
            let e = e.map_err(|e| GftError::Io(std::io::Error::other(e)))?;
            if e.file_type().is_file() {
                files.push(fs::canonicalize(e.path())?);
            }
            // symlinks and special files are skipped
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Deepest directory containing every path.
pub fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = paths.iter();
    let mut acc: PathBuf = iter.next()?.clone();
    for p in iter {
        while !p.starts_with(&acc) {
            if !acc.pop() {
                return None;
            }
        }
    }
    Some(acc)
}

/// Source entries for `roots`. Archive paths are relative to the common
/// ancestor of the roots' parent directories, so a single file keeps just
/// its base name and a single directory keeps its own name as prefix.
pub fn collect(roots: &[PathBuf]) -> Result<Vec<SourceEntry>> {
    if roots.is_empty() {
        return Err(GftError::InvalidRequest("no source files given".into()));
    }
    let mut parents = Vec::with_capacity(roots.len());
    for r in roots {
        let abs = fs::canonicalize(r).map_err(|_| GftError::NotFound(r.clone()))?;
        parents.push(abs.parent().map(Path::to_path_buf).unwrap_or(abs));
    }
    let base = common_ancestor(&parents).unwrap_or_default();
    debug!(base = %base.display(), "archive root");

    let mut out = Vec::new();
    for path in expand(roots)? {
        let md = fs::metadata(&path)?;
        let rel = path
            .strip_prefix(&base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
        let mtime = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        out.push(SourceEntry {
            size: md.len(),
            mode: mode_of(&md),
            mtime,
            rel,
            path,
        });
    }
    if out.is_empty() {
        return Err(GftError::InvalidRequest("sources contain no regular files".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_of_siblings_and_nested() {
        let p = |s: &str| PathBuf::from(s);
        assert_eq!(common_ancestor(&[p("/a/b/c"), p("/a/b/d/e")]), Some(p("/a/b")));
        assert_eq!(common_ancestor(&[p("/a/b")]), Some(p("/a/b")));
        assert_eq!(common_ancestor(&[p("/x"), p("/y")]), Some(p("/")));
        assert_eq!(common_ancestor(&[]), None);
    }

    #[test]
    fn single_file_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("deep/one.txt");
        fs::create_dir_all(f.parent().unwrap()).unwrap();
        fs::write(&f, b"1").unwrap();
        let entries = collect(&[f]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel, PathBuf::from("one.txt"));
        assert_eq!(entries[0].size, 1);
    }

    #[test]
    fn directory_keeps_its_name_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("a"), b"a").unwrap();
        fs::write(root.join("src/b"), b"b").unwrap();
        let entries = collect(&[root.clone(), root.join("a")]).unwrap();
        let rels: Vec<_> = entries.iter().map(|e| e.rel.clone()).collect();
        assert_eq!(rels, vec![PathBuf::from("proj/a"), PathBuf::from("proj/src/b")]);
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect(&[dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, GftError::NotFound(_)));
    }
}
