//! File-by-file encryption and decryption. One file failing does not stop
//! the rest; the report lists both outcomes.

use crate::crypto::cipher::{Capability, lookup};
use crate::crypto::file::{decrypt_file, encrypt_file};
use crate::crypto::kdf::{DEFAULT_SALT_LEN, derive_key, generate_salt, parse_salt};
use crate::crypto::nonce::NonceLedger;
use crate::error::{GftError, Result};
use crate::pack::walker::collect;
use crate::session::Session;
use crate::util::io::remove_quietly;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use zeroize::Zeroizing;

pub const ENCRYPTED_EXT: &str = "enc";
pub const DECRYPTED_EXT: &str = "dec";

pub struct BatchRequest {
    pub sources: Vec<PathBuf>,
    /// Target file for a single source; target directory otherwise.
    pub output: Option<PathBuf>,
    pub passphrase: Zeroizing<Vec<u8>>,
    pub salt_hex: Option<String>,
    pub key_len: Option<usize>,
    pub cipher: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(PathBuf, PathBuf)>,
    pub failed: Vec<(PathBuf, GftError)>,
    /// Salt used for encryption (generated or given).
    pub salt_hex: Option<String>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// `x.enc` → `x`, anything else → `x.dec`.
pub fn decrypted_name(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == ENCRYPTED_EXT => path.with_extension(""),
        _ => append_ext(path, DECRYPTED_EXT),
    }
}

pub fn encrypted_name(path: &Path) -> PathBuf {
    append_ext(path, ENCRYPTED_EXT)
}

fn rename(path: &Path, dir: Direction) -> PathBuf {
    match dir {
        Direction::Encrypt => encrypted_name(path),
        Direction::Decrypt => decrypted_name(path),
    }
}

/// (source, destination) pairs.
fn plan(req: &BatchRequest, dir: Direction) -> Result<Vec<(PathBuf, PathBuf)>> {
    let entries = collect(&req.sources)?;
    let single = entries.len() == 1 && req.sources.len() == 1;
    let mut pairs = Vec::with_capacity(entries.len());
    for e in entries {
        let dst = match &req.output {
            None => rename(&e.path, dir),
            Some(out) if single && !out.is_dir() => out.clone(),
            Some(out) => rename(&out.join(&e.rel), dir),
        };
        if dst == e.path {
            return Err(GftError::InvalidRequest(format!(
                "output would overwrite source {}",
                e.path.display()
            )));
        }
        pairs.push((e.path, dst));
    }
    Ok(pairs)
}

fn validate(req: &BatchRequest) -> Result<Capability> {
    if req.passphrase.is_empty() {
        return Err(GftError::InvalidRequest("passphrase must not be empty".into()));
    }
    let cap = lookup(&req.cipher)?;
    if let Some(len) = req.key_len {
        cap.check_key_len(len)?;
    }
    Ok(cap)
}

fn prepare_parent(dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn encrypt_batch(req: &BatchRequest, session: &Session<'_>) -> Result<BatchReport> {
    let cap = validate(req)?;
    let key_len = req.key_len.unwrap_or_else(|| cap.default_key_len());
    let salt_hex = match &req.salt_hex {
        Some(h) => h.trim().to_ascii_lowercase(),
        None => generate_salt(DEFAULT_SALT_LEN)?,
    };
    let salt = parse_salt(&salt_hex)?;
    let key = derive_key(&req.passphrase, &salt, key_len)?;
    let pairs = plan(req, Direction::Encrypt)?;

    let mut report = BatchReport {
        salt_hex: Some(salt_hex),
        ..Default::default()
    };
    let mut nonces = NonceLedger::new();
    let batch = session.progress.batch("encrypting", pairs.len() as u64);
    for (src, dst) in pairs {
        let tick = session.progress.bytes(&src.to_string_lossy(), 0);
        let existed = dst.exists();
        let res = prepare_parent(&dst).and_then(|_| {
            encrypt_file(&src, &dst, cap, key.as_bytes(), &salt, &mut nonces, tick.as_ref())
        });
        tick.finish();
        batch.inc(1);
        record(&mut report, src, dst, existed, res);
    }
    batch.finish();
    info!(ok = report.succeeded.len(), failed = report.failed.len(), "encryption batch finished");
    Ok(report)
}

pub fn decrypt_batch(req: &BatchRequest, session: &Session<'_>) -> Result<BatchReport> {
    let cap = validate(req)?;
    let key_len = req.key_len.unwrap_or_else(|| cap.default_key_len());
    let salt = req.salt_hex.as_deref().map(parse_salt).transpose()?;
    let pairs = plan(req, Direction::Decrypt)?;

    let mut report = BatchReport::default();
    let batch = session.progress.batch("decrypting", pairs.len() as u64);
    for (src, dst) in pairs {
        let tick = session.progress.bytes(&src.to_string_lossy(), 0);
        let existed = dst.exists();
        let res = prepare_parent(&dst).and_then(|_| {
            decrypt_file(&src, &dst, cap, &req.passphrase, salt.as_deref(), key_len, tick.as_ref())
        });
        tick.finish();
        batch.inc(1);
        record(&mut report, src, dst, existed, res);
    }
    batch.finish();
    info!(ok = report.succeeded.len(), failed = report.failed.len(), "decryption batch finished");
    Ok(report)
}

/// A failed item's output is removed unless it was there before the attempt.
fn record(
    report: &mut BatchReport,
    src: PathBuf,
    dst: PathBuf,
    existed: bool,
    res: Result<u64>,
) {
    match res {
        Ok(bytes) => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), bytes, "done");
            report.succeeded.push((src, dst));
        }
        Err(e) => {
            error!(src = %src.display(), error = %e, "file failed");
            if !existed {
                remove_quietly(&dst);
            }
            report.failed.push((src, e));
        }
    }
}
