//! Byte layout of encrypted entries.
//!
//! Streaming (AEAD) entry:
//! ```text
//! nonce[12] | salt_len u32 BE | salt | { ct_len u64 BE | ciphertext+tag }+
//! ```
//! The last chunk is authenticated as final, see [`crate::crypto::aead`].
//! Block-cipher entry:
//! ```text
//! iv[8] | salt_len u32 BE | salt | ciphertext (PKCS#7, multiple of 8)
//! ```

use crate::crypto::cipher::TAG_LEN;
use crate::crypto::nonce::{NONCE_LEN, Nonce};
use crate::error::{GftError, Result};
use crate::util::io::read_full;
use std::io::{Read, Write};

/// Plaintext bytes sealed per chunk; every chunk but the last is full.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const MAX_CHUNK_CT: u64 = (CHUNK_SIZE + TAG_LEN) as u64;
pub const MAX_SALT_LEN: u32 = 1024;
pub const BLOCK_IV_LEN: usize = 8;

fn read_exact_or_corrupt(mut r: impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    let n = read_full(&mut r, buf)?;
    if n != buf.len() {
        return Err(GftError::CorruptContainer(format!(
            "truncated {what}: wanted {} bytes, got {n}",
            buf.len()
        )));
    }
    Ok(())
}

fn read_salt(mut r: impl Read) -> Result<Vec<u8>> {
    let mut l = [0u8; 4];
    read_exact_or_corrupt(&mut r, &mut l, "salt length")?;
    let salt_len = u32::from_be_bytes(l);
    if salt_len > MAX_SALT_LEN {
        return Err(GftError::CorruptContainer(format!(
            "salt length {salt_len} exceeds {MAX_SALT_LEN}"
        )));
    }
    let mut salt = vec![0u8; salt_len as usize];
    read_exact_or_corrupt(&mut r, &mut salt, "salt")?;
    Ok(salt)
}

fn write_salt(mut w: impl Write, salt: &[u8]) -> Result<()> {
    let len = u32::try_from(salt.len())
        .ok()
        .filter(|l| *l <= MAX_SALT_LEN)
        .ok_or_else(|| GftError::InvalidRequest(format!("salt too long: {}", salt.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(salt)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub nonce: Nonce,
    pub salt: Vec<u8>,
}

impl EntryHeader {
    pub fn write_to(&self, mut w: impl Write) -> Result<()> {
        w.write_all(&self.nonce)?;
        write_salt(w, &self.salt)
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        read_exact_or_corrupt(&mut r, &mut nonce, "nonce")?;
        let salt = read_salt(r)?;
        Ok(Self { nonce, salt })
    }

    pub fn encoded_len(&self) -> usize {
        NONCE_LEN + 4 + self.salt.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub iv: [u8; BLOCK_IV_LEN],
    pub salt: Vec<u8>,
}

impl BlockHeader {
    pub fn write_to(&self, mut w: impl Write) -> Result<()> {
        w.write_all(&self.iv)?;
        write_salt(w, &self.salt)
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut iv = [0u8; BLOCK_IV_LEN];
        read_exact_or_corrupt(&mut r, &mut iv, "IV")?;
        let salt = read_salt(r)?;
        Ok(Self { iv, salt })
    }
}

pub fn write_chunk(mut w: impl Write, ciphertext: &[u8]) -> Result<()> {
    w.write_all(&(ciphertext.len() as u64).to_be_bytes())?;
    w.write_all(ciphertext)?;
    Ok(())
}

/// Next chunk length, or `None` on a clean end of stream.
pub fn read_chunk_len(mut r: impl Read) -> Result<Option<u64>> {
    let mut l = [0u8; 8];
    match read_full(&mut r, &mut l)? {
        0 => Ok(None),
        8 => {
            let len = u64::from_be_bytes(l);
            if len < TAG_LEN as u64 || len > MAX_CHUNK_CT {
                return Err(GftError::CorruptContainer(format!(
                    "chunk length {len} out of range"
                )));
            }
            Ok(Some(len))
        }
        n => Err(GftError::CorruptContainer(format!(
            "truncated chunk length ({n} of 8 bytes)"
        ))),
    }
}

pub fn read_chunk_body(r: impl Read, len: u64) -> Result<Vec<u8>> {
    let mut ct = vec![0u8; len as usize];
    read_exact_or_corrupt(r, &mut ct, "chunk body")?;
    Ok(ct)
}

/// What the framing of one streaming entry looks like, without decrypting.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub header: EntryHeader,
    pub chunk_lens: Vec<u64>,
}

impl FrameReport {
    pub fn chunk_count(&self) -> usize {
        self.chunk_lens.len()
    }

    pub fn plaintext_lens(&self) -> Vec<u64> {
        self.chunk_lens.iter().map(|l| l - TAG_LEN as u64).collect()
    }

    pub fn plaintext_total(&self) -> u64 {
        self.plaintext_lens().iter().sum()
    }
}

pub fn inspect(mut r: impl Read) -> Result<FrameReport> {
    let header = EntryHeader::read_from(&mut r)?;
    let mut chunk_lens = Vec::new();
    while let Some(len) = read_chunk_len(&mut r)? {
        let skipped = std::io::copy(&mut (&mut r).take(len), &mut std::io::sink())?;
        if skipped != len {
            return Err(GftError::CorruptContainer(format!(
                "truncated chunk {}: {skipped} of {len} bytes",
                chunk_lens.len()
            )));
        }
        chunk_lens.push(len);
    }
    Ok(FrameReport { header, chunk_lens })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> EntryHeader {
        EntryHeader {
            nonce: [5u8; NONCE_LEN],
            salt: vec![1, 2, 3],
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), header().encoded_len());
        assert_eq!(&buf[12..16], &[0, 0, 0, 3]);
        assert_eq!(EntryHeader::read_from(&buf[..]).unwrap(), header());
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        for cut in [0, 5, 12, 14, buf.len() - 1] {
            let err = EntryHeader::read_from(&buf[..cut]).unwrap_err();
            assert!(matches!(err, GftError::CorruptContainer(_)), "cut {cut}");
        }
    }

    #[test]
    fn absurd_salt_length_is_corrupt() {
        let mut buf = vec![0u8; NONCE_LEN];
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            EntryHeader::read_from(&buf[..]),
            Err(GftError::CorruptContainer(_))
        ));
    }

    #[test]
    fn inspect_replays_chunk_lengths() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        write_chunk(&mut buf, &[0u8; 40]).unwrap();
        write_chunk(&mut buf, &[0u8; 17]).unwrap();
        let rep = inspect(&buf[..]).unwrap();
        assert_eq!(rep.chunk_lens, vec![40, 17]);
        assert_eq!(rep.plaintext_lens(), vec![24, 1]);
        assert_eq!(rep.header.salt, vec![1, 2, 3]);

        // cut inside the second chunk body
        let err = inspect(&buf[..buf.len() - 3]).unwrap_err();
        assert!(matches!(err, GftError::CorruptContainer(_)));
        // cut inside a length prefix
        let err = inspect(&buf[..header().encoded_len() + 4]).unwrap_err();
        assert!(matches!(err, GftError::CorruptContainer(_)));
    }

    #[test]
    fn block_header_round_trip() {
        let h = BlockHeader {
            iv: [9u8; BLOCK_IV_LEN],
            salt: vec![7; 16],
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        assert_eq!(BlockHeader::read_from(&buf[..]).unwrap(), h);
    }
}
