//! Whole-file CRC-32 (IEEE) used for archive and extracted-file verification.

use crate::error::{GftError, Result};
use crc32fast::Hasher;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUF: usize = 64 * 1024;

/// Stream `path` through a CRC-32 accumulator.
pub fn checksum(path: &Path) -> Result<u32> {
    let f = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GftError::NotFound(path.to_path_buf()),
        _ => GftError::Io(e),
    })?;
    checksum_reader(f)
}

pub fn checksum_reader(mut r: impl Read) -> Result<u32> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Lowercase, zero-padded 8-digit hex.
pub fn to_hex(crc: u32) -> String {
    format!("{crc:08x}")
}

pub fn checksum_hex(path: &Path) -> Result<String> {
    checksum(path).map(to_hex)
}

/// Compare the file's CRC-32 with `expected` (hex, case-insensitive).
pub fn verify(path: &Path, expected: &str) -> Result<bool> {
    let actual = checksum_hex(path)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}
