use crate::crypto::kdf::random_bytes;
use crate::error::{GftError, Result};
use std::collections::HashSet;

pub const NONCE_LEN: usize = 12;
/// Bytes `0..PREFIX_LEN` are random per entry; the rest carry the chunk index.
pub const PREFIX_LEN: usize = 4;

pub type Nonce = [u8; NONCE_LEN];

/// Entry nonce with bytes 4..12 replaced by the big-endian chunk index.
pub fn chunk_nonce(base: &Nonce, index: u64) -> Nonce {
    let mut n = *base;
    n[PREFIX_LEN..].copy_from_slice(&index.to_be_bytes());
    n
}

/// Hands out entry nonces whose random prefixes never repeat within one
/// archive (one key).
#[derive(Debug, Default)]
pub struct NonceLedger {
    seen: HashSet<[u8; PREFIX_LEN]>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Result<Nonce> {
        // 2^32 prefixes; give up long before exhaustion is plausible
        for _ in 0..64 {
            let mut n = [0u8; NONCE_LEN];
            random_bytes(&mut n)?;
            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&n[..PREFIX_LEN]);
            if self.seen.insert(prefix) {
                return Ok(n);
            }
            tracing::debug!("nonce prefix collision, re-rolling");
        }
        Err(GftError::InvalidRequest(
            "could not allocate a unique entry nonce".into(),
        ))
    }

    pub fn issued(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_overwrites_tail() {
        let base = [0xAAu8; NONCE_LEN];
        let n = chunk_nonce(&base, 0x0102);
        assert_eq!(&n[..4], &[0xAA; 4]);
        assert_eq!(&n[4..], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn ledger_prefixes_are_unique() {
        let mut l = NonceLedger::new();
        let mut prefixes = HashSet::new();
        for _ in 0..500 {
            let n = l.fresh().unwrap();
            assert!(prefixes.insert([n[0], n[1], n[2], n[3]]));
        }
        assert_eq!(l.issued(), 500);
    }
}
