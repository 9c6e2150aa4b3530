//! Decompression orchestrator: reassemble volumes if needed, extract,
//! report checksums.

use crate::codec::{ExtractedFile, Format, OpenParams};
use crate::container::split_manifest::{SplitManifest, manifest_path};
use crate::error::{GftError, Result};
use crate::hash::crc32;
use crate::session::Session;
use crate::util::io::{CleanupGuard, remove_quietly};
use crate::volume::merge::{base_of, merge};
use crate::volume::is_split_input;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct DecompressRequest {
    /// Archive, one of its volumes, or its `.split` manifest.
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Detected from the source name when absent.
    pub format: Option<Format>,
    pub decrypt: Option<OpenParams>,
    pub verify: bool,
    pub expected_crc: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DecompressReport {
    pub files: Vec<ExtractedFile>,
    /// CRC-32 of the (merged) archive, when computed.
    pub archive_crc: Option<String>,
    /// Outcome of comparing against the expected CRC, if one was given.
    pub checksum_ok: Option<bool>,
    pub volumes: Vec<PathBuf>,
}

pub fn merged_path(source: &Path) -> PathBuf {
    let mut s: OsString = source.as_os_str().to_owned();
    s.push(".merged");
    PathBuf::from(s)
}

pub fn decompress(req: &DecompressRequest, session: &Session<'_>) -> Result<DecompressReport> {
    let format = match req.format {
        Some(f) => f,
        None => Format::detect(&req.source).ok_or_else(|| {
            GftError::InvalidRequest(format!(
                "cannot tell the archive format of {}",
                req.source.display()
            ))
        })?,
    };
    let archiver = format.archiver();
    let split_input = is_split_input(&req.source);
    if split_input && !archiver.supports_split() {
        return Err(GftError::UnsupportedFeature(format!(
            "{format} archives cannot be read from volumes"
        )));
    }
    if req.decrypt.is_some() && !archiver.supports_encryption() {
        return Err(GftError::UnsupportedFeature(format!(
            "{format} archives are never encrypted"
        )));
    }

    let mut report = DecompressReport::default();
    let mut scratch = CleanupGuard::armed();
    let archive = if split_input {
        let merged = merged_path(&req.source);
        scratch.track(&merged);
        let tick = session.progress.bytes("merging volumes", 0);
        report.volumes = merge(&req.source, &merged, tick.as_ref())?;
        tick.finish();
        merged
    } else {
        if !req.source.is_file() {
            return Err(GftError::NotFound(req.source.clone()));
        }
        req.source.clone()
    };

    // computed up front so an unreadable archive fails before any output
    if req.verify || req.expected_crc.is_some() {
        report.archive_crc = Some(crc32::checksum_hex(&archive)?);
    }

    let created_dest = !req.dest.exists();
    fs::create_dir_all(&req.dest)?;
    let mut written = Vec::new();
    match archiver.read(&archive, &req.dest, req.decrypt.as_ref(), &mut written, session) {
        Ok(files) => report.files = files,
        Err(e) => {
            if created_dest {
                remove_quietly(&req.dest);
            } else {
                for p in written.iter().rev() {
                    remove_quietly(p);
                }
            }
            return Err(e);
        }
    }

    if let (Some(expected), Some(actual)) = (&req.expected_crc, &report.archive_crc) {
        let ok = expected.trim().eq_ignore_ascii_case(actual);
        if !ok {
            warn!(expected = %expected.trim(), actual = %actual, "archive checksum mismatch");
        }
        report.checksum_ok = Some(ok);
    }
    if req.verify && split_input {
        let base = base_of(&req.source);
        match SplitManifest::read(&manifest_path(&base))? {
            Some(m) => {
                let actual = report.archive_crc.as_deref().unwrap_or_default();
                if !m.crc32.eq_ignore_ascii_case(actual) {
                    warn!(expected = %m.crc32, actual = %actual, "merged archive differs from split manifest");
                }
            }
            None => warn!(base = %base.display(), "no split manifest; volume set not verified"),
        }
    }

    info!(
        archive = %req.source.display(),
        dest = %req.dest.display(),
        files = report.files.len(),
        "decompression finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::zip::ZipArchiver;
    use crate::codec::{Archiver, SourceEntry};

    fn make_zip(dir: &Path) -> PathBuf {
        let src = dir.join("f.txt");
        fs::write(&src, b"payload").unwrap();
        let archive = dir.join("a.zip");
        ZipArchiver
            .write(
                &[SourceEntry {
                    path: src,
                    size: 7,
                    mode: 0o644,
                    mtime: 0,
                    rel: PathBuf::from("f.txt"),
                }],
                &archive,
                None,
                &Session::silent(),
            )
            .unwrap();
        archive
    }

    #[test]
    fn expected_crc_mismatch_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_zip(dir.path());
        let req = DecompressRequest {
            source: archive,
            dest: dir.path().join("out"),
            expected_crc: Some("00000000".into()),
            ..Default::default()
        };
        let rep = decompress(&req, &Session::silent()).unwrap();
        assert_eq!(rep.checksum_ok, Some(false));
        assert_eq!(fs::read(dir.path().join("out/f.txt")).unwrap(), b"payload");
    }

    #[test]
    fn unknown_extension_needs_explicit_format() {
        let dir = tempfile::tempdir().unwrap();
        let req = DecompressRequest {
            source: dir.path().join("a.bin"),
            dest: dir.path().join("out"),
            ..Default::default()
        };
        assert!(matches!(
            decompress(&req, &Session::silent()),
            Err(GftError::InvalidRequest(_))
        ));
    }

    #[test]
    fn corrupt_archive_removes_created_dest() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.zip");
        fs::write(&bad, b"not a zip at all").unwrap();
        let dest = dir.path().join("out");
        let req = DecompressRequest {
            source: bad,
            dest: dest.clone(),
            ..Default::default()
        };
        let err = decompress(&req, &Session::silent()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptContainer);
        assert!(!dest.exists());
    }

    #[test]
    fn split_tar_gz_input_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let vol = dir.path().join("a.tar.gz.001");
        fs::write(&vol, b"x").unwrap();
        let req = DecompressRequest {
            source: vol,
            dest: dir.path().join("out"),
            ..Default::default()
        };
        let err = decompress(&req, &Session::silent()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFeature);
        assert!(!dir.path().join("out").exists());
    }
}
