use crc32fast::Hasher;
use std::io::{Result, Write};

/// Write adapter that folds every forwarded byte into a CRC-32.
pub struct CrcForward<W: Write> {
    inner: W,
    hasher: Hasher,
    pub counted: u64,
}

impl<W: Write> CrcForward<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            counted: 0,
        }
    }

    pub fn crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn into_parts(self) -> (W, u32, u64) {
        (self.inner, self.hasher.finalize(), self.counted)
    }
}

impl<W: Write> Write for CrcForward<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        // only hash what the inner writer accepted
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.counted += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
