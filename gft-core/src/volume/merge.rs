use crate::container::split_manifest::{SplitManifest, manifest_path};
use crate::error::{GftError, Result};
use crate::hash::crc32::checksum_hex;
use crate::session::Tick;
use crate::util::crc_forward::CrcForward;
use crate::util::io::{copy_with, sync_close};
use crate::volume::{detect, volume_index, volume_path};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Base path for a volume, a manifest or an already-stripped base.
pub fn base_of(path: &Path) -> PathBuf {
    detect(path).unwrap_or_else(|| path.to_path_buf())
}

/// Contiguous volumes `base.001 ..`, in order.
///
/// Fails with `NoVolumesFound` when `base.001` is absent and with `VolumeGap`
/// when a volume exists beyond the first missing index.
pub fn enumerate(base: &Path) -> Result<Vec<PathBuf>> {
    let dir = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| GftError::InvalidRequest(format!("bad volume base {}", base.display())))?;

    let mut present = BTreeSet::new();
    let entries = fs::read_dir(&dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => GftError::NoVolumesFound(base.to_path_buf()),
        _ => e.into(),
    })?;
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(idx) = name
            .strip_prefix(stem.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(volume_index)
            && idx > 0
        {
            present.insert(idx);
        }
    }

    if !present.contains(&1) {
        return Err(GftError::NoVolumesFound(base.to_path_buf()));
    }
    let mut volumes = Vec::new();
    let mut next = 1u32;
    while present.contains(&next) {
        volumes.push(volume_path(base, next));
        next += 1;
    }
    if present.range(next..).next().is_some() {
        return Err(GftError::VolumeGap(volume_path(base, next)));
    }
    Ok(volumes)
}

/// Concatenate the volume set of `first_or_base` into `output`.
pub fn merge(first_or_base: &Path, output: &Path, tick: &dyn Tick) -> Result<Vec<PathBuf>> {
    let base = base_of(first_or_base);
    let volumes = enumerate(&base)?;
    if volumes.iter().any(|v| v == output) {
        return Err(GftError::InvalidRequest(format!(
            "merge output {} overlaps the volume set",
            output.display()
        )));
    }
    info!(base = %base.display(), count = volumes.len(), "merging volumes");
    let mut out = BufWriter::new(File::create(output)?);
    for v in &volumes {
        let mut r = BufReader::new(File::open(v)?);
        let n = copy_with(&mut r, &mut out, tick)?;
        debug!(volume = %v.display(), bytes = n, "appended");
    }
    sync_close(out.into_inner().map_err(|e| e.into_error())?)?;
    Ok(volumes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestCheck {
    Matched,
    /// Manifest CRC differs from the merged archive.
    Mismatch { expected: String, actual: String },
    Absent,
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub output: PathBuf,
    pub volumes: Vec<PathBuf>,
    pub crc32: String,
    pub manifest: Option<ManifestCheck>,
}

/// Merge, then optionally compare against the `.split` manifest next to the
/// base. A missing manifest or a differing CRC is reported, not raised.
pub fn merge_verified(
    first_or_base: &Path,
    output: &Path,
    verify: bool,
    tick: &dyn Tick,
) -> Result<MergeReport> {
    let volumes = merge(first_or_base, output, tick)?;
    let crc32 = checksum_hex(output)?;
    let manifest = if verify {
        let base = base_of(first_or_base);
        Some(match SplitManifest::read(&manifest_path(&base))? {
            None => {
                warn!(base = %base.display(), "no split manifest; merged archive not verified");
                ManifestCheck::Absent
            }
            Some(m) if m.crc32.eq_ignore_ascii_case(&crc32) => ManifestCheck::Matched,
            Some(m) => {
                warn!(expected = %m.crc32, actual = %crc32, "merged archive differs from manifest");
                ManifestCheck::Mismatch {
                    expected: m.crc32,
                    actual: crc32.clone(),
                }
            }
        })
    } else {
        None
    };
    Ok(MergeReport {
        output: output.to_path_buf(),
        volumes,
        crc32,
        manifest,
    })
}

/// CRC-32 of the volumes read back to back.
pub fn volumes_crc(volumes: &[PathBuf]) -> Result<u32> {
    let mut sink = CrcForward::new(io::sink());
    for v in volumes {
        let mut r = BufReader::new(File::open(v)?);
        io::copy(&mut r, &mut sink)?;
    }
    Ok(sink.crc())
}
