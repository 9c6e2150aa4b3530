//! Whole-file and whole-entry encryption on top of the cipher capabilities.

use crate::container::frame::{BLOCK_IV_LEN, BlockHeader, EntryHeader};
use crate::crypto::aead::{OpenReader, SealWriter};
use crate::crypto::cipher::{BlockCipher, Capability};
use crate::crypto::kdf::{derive_key, random_bytes};
use crate::crypto::nonce::NonceLedger;
use crate::error::{GftError, Result};
use crate::session::Tick;
use crate::util::io::{copy_with, sync_close};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use zeroize::Zeroizing;

/// Seal a fully buffered plaintext with a block cipher and write the block container.
pub fn seal_block_entry(
    mut w: impl Write,
    cipher: &dyn BlockCipher,
    key: &[u8],
    salt: &[u8],
    plaintext: &[u8],
) -> Result<()> {
    let mut iv = [0u8; BLOCK_IV_LEN];
    random_bytes(&mut iv)?;
    let ct = cipher.encrypt(key, &iv, plaintext)?;
    BlockHeader {
        iv,
        salt: salt.to_vec(),
    }
    .write_to(&mut w)?;
    w.write_all(&ct)?;
    Ok(())
}

/// Read the block container header and the remaining ciphertext.
pub fn read_block_entry(mut r: impl Read) -> Result<(BlockHeader, Vec<u8>)> {
    let header = BlockHeader::read_from(&mut r)?;
    let mut ct = Vec::new();
    r.read_to_end(&mut ct)?;
    Ok((header, ct))
}

pub fn open_block_entry(
    r: impl Read,
    cipher: &dyn BlockCipher,
    key: &[u8],
    expected_salt: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    let (header, ct) = read_block_entry(r)?;
    check_salt(expected_salt, &header.salt)?;
    Ok(Zeroizing::new(cipher.decrypt(key, &header.iv, &ct)?))
}

pub(crate) fn check_salt(expected: Option<&[u8]>, found: &[u8]) -> Result<()> {
    match expected {
        Some(e) if e != found => Err(GftError::SaltMismatch {
            expected: hex::encode(e),
            found: hex::encode(found),
        }),
        _ => Ok(()),
    }
}

/// Encrypt `src` into `dst` as a standalone container. Returns plaintext bytes.
pub fn encrypt_file(
    src: &Path,
    dst: &Path,
    cap: Capability,
    key: &[u8],
    salt: &[u8],
    nonces: &mut NonceLedger,
    tick: &dyn Tick,
) -> Result<u64> {
    let mut input = BufReader::new(File::open(src)?);
    let out = File::create(dst)?;
    let n = match cap {
        Capability::Streaming(cipher) => {
            let mut w = SealWriter::new(BufWriter::new(out), cipher, key, nonces.fresh()?, salt)?;
            let n = copy_with(&mut input, &mut w, tick)?;
            let (buf, _chunks) = w.finish()?;
            sync_close(buf.into_inner().map_err(|e| e.into_error())?)?;
            n
        }
        Capability::Block(cipher) => {
            let mut plain = Zeroizing::new(Vec::new());
            input.read_to_end(&mut plain)?;
            tick.inc(plain.len() as u64);
            let mut w = BufWriter::new(out);
            seal_block_entry(&mut w, cipher, key, salt, &plain)?;
            sync_close(w.into_inner().map_err(|e| e.into_error())?)?;
            plain.len() as u64
        }
    };
    Ok(n)
}

/// Salt recorded in the header of an encrypted file.
pub fn header_salt(src: &Path, cap: Capability) -> Result<Vec<u8>> {
    let mut f = BufReader::new(File::open(src)?);
    Ok(match cap {
        Capability::Streaming(_) => EntryHeader::read_from(&mut f)?.salt,
        Capability::Block(_) => BlockHeader::read_from(&mut f)?.salt,
    })
}

/// Decrypt a standalone container. Without `salt` the header salt is used
/// for key derivation; with it, a different header salt is rejected.
pub fn decrypt_file(
    src: &Path,
    dst: &Path,
    cap: Capability,
    passphrase: &[u8],
    salt: Option<&[u8]>,
    key_len: usize,
    tick: &dyn Tick,
) -> Result<u64> {
    let found = header_salt(src, cap)?;
    check_salt(salt, &found)?;
    let key = derive_key(passphrase, &found, key_len)?;
    let input = BufReader::new(File::open(src)?);

    match cap {
        Capability::Streaming(cipher) => {
            let mut r = OpenReader::new(input, cipher, key.as_bytes(), Some(&found))?;
            // first chunk is authenticated before the output file exists
            let mut first = [0u8; 1];
            let got = r.read(&mut first)?;
            let mut w = BufWriter::new(File::create(dst)?);
            w.write_all(&first[..got])?;
            tick.inc(got as u64);
            let n = copy_with(&mut r, &mut w, tick)? + got as u64;
            sync_close(w.into_inner().map_err(|e| e.into_error())?)?;
            Ok(n)
        }
        Capability::Block(cipher) => {
            let plain = open_block_entry(input, cipher, key.as_bytes(), Some(&found))?;
            let mut w = BufWriter::new(File::create(dst)?);
            w.write_all(&plain)?;
            tick.inc(plain.len() as u64);
            sync_close(w.into_inner().map_err(|e| e.into_error())?)?;
            Ok(plain.len() as u64)
        }
    }
}
