//! Chunked AEAD framing over plain `Read`/`Write`.
//!
//! [`SealWriter`] buffers plaintext into [`CHUNK_SIZE`] blocks and emits one
//! sealed chunk per block; [`OpenReader`] reverses it. Chunk `i` is sealed
//! under the entry nonce with bytes 4..12 set to `i` (big-endian), so
//! reordering or editing chunks fails authentication. The last chunk carries
//! [`FINAL_AAD`] and every other chunk [`MIDDLE_AAD`], so a stream cut at a
//! chunk boundary or extended past its last chunk fails too. Every entry has
//! at least one chunk; an empty entry is a single empty final chunk.

use crate::container::frame::{
    CHUNK_SIZE, EntryHeader, read_chunk_body, read_chunk_len, write_chunk,
};
use crate::crypto::cipher::StreamingCipher;
use crate::crypto::file::check_salt;
use crate::crypto::nonce::{Nonce, chunk_nonce};
use crate::error::{GftError, Result};
use std::io::{self, Read, Write};
use zeroize::Zeroizing;

/// Associated data of every chunk except the last.
pub const MIDDLE_AAD: [u8; 1] = [0];
/// Associated data of the last chunk.
pub const FINAL_AAD: [u8; 1] = [1];

pub struct SealWriter<'k, W: Write> {
    inner: W,
    cipher: &'k dyn StreamingCipher,
    key: &'k [u8],
    nonce: Nonce,
    pending: Zeroizing<Vec<u8>>,
    chunks: u64,
}

impl<'k, W: Write> SealWriter<'k, W> {
    /// Writes the entry header immediately.
    pub fn new(
        mut inner: W,
        cipher: &'k dyn StreamingCipher,
        key: &'k [u8],
        nonce: Nonce,
        salt: &[u8],
    ) -> Result<Self> {
        EntryHeader {
            nonce,
            salt: salt.to_vec(),
        }
        .write_to(&mut inner)?;
        Ok(Self {
            inner,
            cipher,
            key,
            nonce,
            pending: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
            chunks: 0,
        })
    }

    fn seal_pending(&mut self, aad: &[u8]) -> Result<()> {
        let n = chunk_nonce(&self.nonce, self.chunks);
        let ct = self.cipher.seal(self.key, &n, aad, &self.pending)?;
        write_chunk(&mut self.inner, &ct)?;
        self.pending.clear();
        self.chunks += 1;
        Ok(())
    }

    /// Seal the held-back chunk as final and hand back the inner writer.
    pub fn finish(mut self) -> Result<(W, u64)> {
        self.seal_pending(&FINAL_AAD)?;
        self.inner.flush()?;
        Ok((self.inner, self.chunks))
    }
}

impl<W: Write> Write for SealWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // a full chunk is held until more input proves it is not the last
        if self.pending.len() == CHUNK_SIZE {
            self.seal_pending(&MIDDLE_AAD).map_err(GftError::into_io)?;
        }
        let take = (CHUNK_SIZE - self.pending.len()).min(buf.len());
        self.pending.extend_from_slice(&buf[..take]);
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        // pending plaintext is only sealed by write() or finish()
        self.inner.flush()
    }
}

pub struct OpenReader<'k, R: Read> {
    inner: R,
    cipher: &'k dyn StreamingCipher,
    key: &'k [u8],
    nonce: Nonce,
    plain: Zeroizing<Vec<u8>>,
    pos: usize,
    next_chunk: u64,
    lookahead: Option<u64>,
    started: bool,
    done: bool,
}

impl<'k, R: Read> OpenReader<'k, R> {
    /// Reads the header and, when `expected_salt` is given, rejects a
    /// different header salt before any chunk is touched.
    pub fn new(
        mut inner: R,
        cipher: &'k dyn StreamingCipher,
        key: &'k [u8],
        expected_salt: Option<&[u8]>,
    ) -> Result<Self> {
        let header = EntryHeader::read_from(&mut inner)?;
        check_salt(expected_salt, &header.salt)?;
        Ok(Self::resume(inner, header, cipher, key))
    }

    /// Continue after a header the caller already consumed (e.g. to pick the
    /// key from its salt).
    pub fn resume(
        inner: R,
        header: EntryHeader,
        cipher: &'k dyn StreamingCipher,
        key: &'k [u8],
    ) -> Self {
        Self {
            inner,
            cipher,
            key,
            nonce: header.nonce,
            plain: Zeroizing::new(Vec::new()),
            pos: 0,
            next_chunk: 0,
            lookahead: None,
            started: false,
            done: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let len = match self.lookahead.take() {
            Some(len) => Some(len),
            None if self.started => None,
            None => read_chunk_len(&mut self.inner)?,
        };
        self.started = true;
        // EOF before a chunk sealed as final: the tail was cut off
        let Some(len) = len else {
            return Err(GftError::AuthenticationFailed {
                chunk: self.next_chunk,
            });
        };
        let ct = read_chunk_body(&mut self.inner, len)?;
        let next = read_chunk_len(&mut self.inner)?;
        let aad = if next.is_none() { FINAL_AAD } else { MIDDLE_AAD };
        let n = chunk_nonce(&self.nonce, self.next_chunk);
        let pt = self.cipher.open(self.key, &n, &aad, &ct, self.next_chunk)?;
        self.plain = Zeroizing::new(pt);
        self.pos = 0;
        self.next_chunk += 1;
        self.lookahead = next;
        self.done = next.is_none();
        Ok(())
    }
}

impl<R: Read> Read for OpenReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.plain.len() {
            if self.done {
                return Ok(0);
            }
            self.fill().map_err(GftError::into_io)?;
        }
        let n = (self.plain.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
