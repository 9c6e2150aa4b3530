use crate::error::{GftError, Result};
use std::path::{Component, Path, PathBuf};

/// Join an archive entry name under `root`, refusing anything that could
/// land outside it.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf> {
    let rel = Path::new(name);
    let mut clean = PathBuf::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(GftError::CorruptContainer(format!(
                    "unsafe entry path: {name}"
                )));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(GftError::CorruptContainer(format!(
            "empty entry path: {name:?}"
        )));
    }
    Ok(root.join(clean))
}

/// Entry names always use forward slashes regardless of host.
pub fn entry_name(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
