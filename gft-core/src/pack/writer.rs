//! Compression orchestrator: validate, write the archive (to a temporary
//! full archive when splitting), slice volumes, verify.

use crate::codec::{Format, SealParams, SourceEntry};
use crate::container::split_manifest::{SplitManifest, manifest_path};
use crate::crypto::cipher::{DEFAULT_CIPHER, lookup};
use crate::crypto::kdf::{DEFAULT_SALT_LEN, derive_key, generate_salt, parse_salt};
use crate::error::{GftError, Result};
use crate::hash::crc32;
use crate::session::Session;
use crate::util::io::CleanupGuard;
use crate::volume::merge::volumes_crc;
use crate::volume::split::split;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct EncryptOptions {
    pub passphrase: Zeroizing<Vec<u8>>,
    /// Hex; generated when absent.
    pub salt_hex: Option<String>,
    /// Defaults to the cipher's largest key.
    pub key_len: Option<usize>,
    pub cipher: String,
}

impl EncryptOptions {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            salt_hex: None,
            key_len: None,
            cipher: DEFAULT_CIPHER.to_string(),
        }
    }
}

impl std::fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("passphrase", &"[REDACTED]")
            .field("salt_hex", &self.salt_hex)
            .field("key_len", &self.key_len)
            .field("cipher", &self.cipher)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub sources: Vec<SourceEntry>,
    pub output: PathBuf,
    pub format: Format,
    /// Bytes per volume; 0 disables splitting.
    pub volume_size: u64,
    pub encrypt: Option<EncryptOptions>,
    pub verify: bool,
    pub write_manifest: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CompressReport {
    pub output: PathBuf,
    pub volumes: Vec<PathBuf>,
    pub manifest: Option<PathBuf>,
    /// CRC-32 of the full archive, when computed.
    pub crc32: Option<String>,
    pub entries: usize,
    pub salt_hex: Option<String>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn temp_path(output: &Path) -> PathBuf {
    with_suffix(output, ".tmp")
}

/// Everything that can be rejected is rejected before the first byte is written.
fn validate(req: &CompressRequest) -> Result<()> {
    if req.sources.is_empty() {
        return Err(GftError::InvalidRequest("no source files given".into()));
    }
    let archiver = req.format.archiver();
    if req.volume_size > 0 && !archiver.supports_split() {
        return Err(GftError::UnsupportedFeature(format!(
            "{} archives cannot be split into volumes",
            req.format
        )));
    }
    if req.encrypt.is_some() && !archiver.supports_encryption() {
        return Err(GftError::UnsupportedFeature(format!(
            "{} archives cannot be encrypted",
            req.format
        )));
    }
    if let Some(enc) = &req.encrypt
        && enc.passphrase.is_empty()
    {
        return Err(GftError::InvalidRequest("passphrase must not be empty".into()));
    }
    let out = fs::canonicalize(&req.output).ok();
    if req.sources.iter().any(|s| Some(&s.path) == out.as_ref()) {
        return Err(GftError::InvalidRequest(format!(
            "output {} is also a source",
            req.output.display()
        )));
    }
    Ok(())
}

pub fn compress(req: &CompressRequest, session: &Session<'_>) -> Result<CompressReport> {
    validate(req)?;
    let archiver = req.format.archiver();

    // derive once per invocation
    let mut salt_hex = None;
    let mut key_material = None;
    if let Some(enc) = &req.encrypt {
        let cap = lookup(&enc.cipher)?;
        let key_len = enc.key_len.unwrap_or_else(|| cap.default_key_len());
        cap.check_key_len(key_len)?;
        let hex = match &enc.salt_hex {
            Some(h) => h.trim().to_ascii_lowercase(),
            None => generate_salt(DEFAULT_SALT_LEN)?,
        };
        let salt = parse_salt(&hex)?;
        let key = derive_key(&enc.passphrase, &salt, key_len)?;
        key_material = Some((cap, key, salt));
        salt_hex = Some(hex);
    }
    let seal = match (&key_material, &salt_hex) {
        (Some((cap, key, salt)), Some(hex)) => Some(SealParams {
            cap: *cap,
            key: key.as_bytes(),
            salt,
            salt_hex: hex,
        }),
        _ => None,
    };

    let mut partial = CleanupGuard::armed();
    let mut report = CompressReport {
        output: req.output.clone(),
        entries: req.sources.len(),
        salt_hex: salt_hex.clone(),
        ..Default::default()
    };

    if req.volume_size == 0 {
        if req.write_manifest {
            warn!("manifest requested without splitting; skipped");
        }
        partial.track(&req.output);
        archiver.write(&req.sources, &req.output, seal.as_ref(), session)?;
        if req.verify {
            report.crc32 = Some(crc32::checksum_hex(&req.output)?);
        }
    } else {
        let tmp = temp_path(&req.output);
        let mut scratch = CleanupGuard::armed();
        scratch.track(&tmp);
        archiver.write(&req.sources, &tmp, seal.as_ref(), session)?;

        let full_crc = if req.verify || req.write_manifest {
            Some(crc32::checksum(&tmp)?)
        } else {
            None
        };
        let total = fs::metadata(&tmp)?.len();
        let tick = session.progress.bytes("splitting", total);
        report.volumes = split(&tmp, &req.output, req.volume_size, partial.tracked(), tick.as_ref())?;
        tick.finish();

        if let (true, Some(crc)) = (req.write_manifest, full_crc) {
            let path = manifest_path(&req.output);
            partial.track(&path);
            SplitManifest {
                source: req.output.to_string_lossy().into_owned(),
                total_size: total,
                split_size: req.volume_size,
                volume_count: report.volumes.len() as u32,
                crc32: crc32::to_hex(crc),
            }
            .write(&path)?;
            report.manifest = Some(path);
        } else if manifest_path(&req.output).is_file() {
            let stale = manifest_path(&req.output);
            fs::remove_file(&stale)?;
            debug!(manifest = %stale.display(), "removed stale manifest");
        }
        if let (true, Some(crc)) = (req.verify, full_crc) {
            let joined = volumes_crc(&report.volumes)?;
            if joined != crc {
                return Err(GftError::ChecksumMismatch {
                    path: req.output.clone(),
                    expected: crc32::to_hex(crc),
                    actual: crc32::to_hex(joined),
                });
            }
        }
        report.crc32 = full_crc.map(crc32::to_hex);
        // scratch drops here and removes the temporary archive
    }

    partial.disarm();
    info!(
        output = %req.output.display(),
        volumes = report.volumes.len(),
        crc32 = report.crc32.as_deref().unwrap_or("-"),
        "compression finished"
    );
    Ok(report)
}
