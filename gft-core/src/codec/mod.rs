//! Container formats: shared entry types, format detection and the
//! [`Archiver`] seam both codecs implement.

use crate::crypto::cipher::Capability;
use crate::error::{GftError, Result};
use crate::session::Session;
use crate::util::crc_forward::CrcForward;
use crate::util::io::{BUF_SIZE, copy_with, read_full, set_mode, sync_close};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub mod targz;
pub mod zip;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Zip,
    TarGz,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Zip => "zip",
            Format::TarGz => "tar.gz",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(Format::Zip),
            "tar.gz" | "tgz" | "targz" => Ok(Format::TarGz),
            other => Err(GftError::UnsupportedFeature(format!("format {other:?}"))),
        }
    }

    /// From the archive name, ignoring a trailing volume or manifest suffix.
    pub fn detect(path: &Path) -> Option<Self> {
        let base = crate::volume::detect(path).unwrap_or_else(|| path.to_path_buf());
        let name = base.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Format::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Format::TarGz)
        } else {
            None
        }
    }

    pub fn archiver(&self) -> &'static dyn Archiver {
        match self {
            Format::Zip => &zip::ZipArchiver,
            Format::TarGz => &targz::TarGzArchiver,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One regular file queued for archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
    /// Location inside the archive.
    pub rel: PathBuf,
}

/// Parameters for sealing entries on write. The key is already derived.
pub struct SealParams<'a> {
    pub cap: Capability,
    pub key: &'a [u8],
    pub salt: &'a [u8],
    pub salt_hex: &'a str,
}

/// Decryption inputs as given by the caller; gaps are filled from the
/// archive (comment or entry header).
#[derive(Default)]
pub struct OpenParams {
    pub passphrase: Zeroizing<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    pub key_len: Option<usize>,
    pub cipher: Option<String>,
}

impl std::fmt::Debug for OpenParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenParams")
            .field("passphrase", &"[REDACTED]")
            .field("salt", &self.salt.as_ref().map(hex::encode))
            .field("key_len", &self.key_len)
            .field("cipher", &self.cipher)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub size: u64,
    pub crc32: u32,
}

pub trait Archiver: Send + Sync {
    fn format(&self) -> Format;
    fn supports_split(&self) -> bool;
    fn supports_encryption(&self) -> bool;

    fn write(
        &self,
        entries: &[SourceEntry],
        dest: &Path,
        seal: Option<&SealParams<'_>>,
        session: &Session<'_>,
    ) -> Result<()>;

    /// Every created file is pushed onto `written` before its first byte.
    fn read(
        &self,
        archive: &Path,
        dest: &Path,
        open: Option<&OpenParams>,
        written: &mut Vec<PathBuf>,
        session: &Session<'_>,
    ) -> Result<Vec<ExtractedFile>>;
}

/// Materialize one file entry: the first block is pulled (and for encrypted
/// entries authenticated) before the file exists; the handle is synced and
/// closed before the mode bits are applied.
pub(crate) fn write_entry(
    src: &mut dyn Read,
    out_path: &Path,
    mode: Option<u32>,
    written: &mut Vec<PathBuf>,
    session: &Session<'_>,
) -> Result<ExtractedFile> {
    let mut first = vec![0u8; BUF_SIZE];
    let got = read_full(src, &mut first)?;
    first.truncate(got);

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    written.push(out_path.to_path_buf());
    let tick = session.progress.bytes(&out_path.to_string_lossy(), 0);
    let mut out = CrcForward::new(BufWriter::new(File::create(out_path)?));
    out.write_all(&first)?;
    tick.inc(got as u64);
    drop(first);
    copy_with(src, &mut out, tick.as_ref())?;
    tick.finish();

    let (buf, crc32, size) = out.into_parts();
    sync_close(buf.into_inner().map_err(|e| e.into_error())?)?;
    if let Some(m) = mode {
        set_mode(out_path, m)?;
    }
    Ok(ExtractedFile {
        path: out_path.to_path_buf(),
        size,
        crc32,
    })
}
