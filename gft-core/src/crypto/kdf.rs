//! Passphrase → key material (PBKDF2-HMAC-SHA256) and salt handling.

use crate::crypto::hex;
use crate::error::{GftError, Result};
use sha2::Sha256;
use std::collections::HashMap;
use zeroize::Zeroizing;

pub const PBKDF2_ROUNDS: u32 = 10_000;
pub const DEFAULT_SALT_LEN: usize = 16;

/// Derived key bytes, wiped on drop.
#[derive(Clone)]
pub struct DerivedKey(Zeroizing<Vec<u8>>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("len", &self.0.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Deterministic for a given (passphrase, salt, len).
pub fn derive_key(passphrase: &[u8], salt: &[u8], len: usize) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(GftError::InvalidRequest("passphrase must not be empty".into()));
    }
    if len == 0 {
        return Err(GftError::InvalidRequest("key length must be positive".into()));
    }
    let mut out = Zeroizing::new(vec![0u8; len]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut out);
    Ok(DerivedKey(out))
}

/// Derives lazily, once per distinct salt.
pub struct KeyCache<'p> {
    passphrase: &'p [u8],
    key_len: usize,
    keys: HashMap<Vec<u8>, DerivedKey>,
}

impl<'p> KeyCache<'p> {
    pub fn new(passphrase: &'p [u8], key_len: usize) -> Self {
        Self {
            passphrase,
            key_len,
            keys: HashMap::new(),
        }
    }

    pub fn get(&mut self, salt: &[u8]) -> Result<&DerivedKey> {
        if !self.keys.contains_key(salt) {
            let key = derive_key(self.passphrase, salt, self.key_len)?;
            self.keys.insert(salt.to_vec(), key);
        }
        self.keys
            .get(salt)
            .ok_or_else(|| GftError::InvalidRequest("key cache miss".into()))
    }
}

pub fn random_bytes(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf)
        .map_err(|e| GftError::Io(std::io::Error::other(format!("random source: {e}"))))
}

/// Fresh random salt rendered as lowercase hex.
pub fn generate_salt(len: usize) -> Result<String> {
    let mut salt = vec![0u8; len.max(1)];
    random_bytes(&mut salt)?;
    Ok(hex::encode(&salt))
}

pub fn parse_salt(salt_hex: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(salt_hex)?;
    if bytes.is_empty() {
        return Err(GftError::InvalidRequest("salt must not be empty".into()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_salt_sensitive() {
        let a = derive_key(b"pw", b"salt-one", 32).unwrap();
        let b = derive_key(b"pw", b"salt-one", 32).unwrap();
        let c = derive_key(b"pw", b"salt-two", 32).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_eq!(derive_key(b"pw", b"s", 24).unwrap().len(), 24);
    }

    #[test]
    fn uses_ten_thousand_rounds() {
        let k = derive_key(b"password", b"salt", 32).unwrap();
        let mut again = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(b"password", b"salt", 10_000, &mut again);
        assert_eq!(k.as_bytes(), &again);
    }

    #[test]
    fn empty_inputs_rejected() {
        assert!(derive_key(b"", b"s", 16).is_err());
        assert!(derive_key(b"pw", b"s", 0).is_err());
        assert!(parse_salt("").is_err());
    }

    #[test]
    fn generated_salt_round_trips() {
        let s = generate_salt(DEFAULT_SALT_LEN).unwrap();
        assert_eq!(s.len(), 32);
        assert_eq!(parse_salt(&s).unwrap().len(), 16);
        assert_ne!(s, generate_salt(DEFAULT_SALT_LEN).unwrap());
    }

    #[test]
    fn cache_derives_once_per_salt() {
        let mut cache = KeyCache::new(b"pw", 16);
        let a = cache.get(b"one").unwrap().as_bytes().to_vec();
        let b = cache.get(b"two").unwrap().as_bytes().to_vec();
        assert_ne!(a, b);
        assert_eq!(cache.get(b"one").unwrap().as_bytes(), &a[..]);
        assert_eq!(cache.keys.len(), 2);
    }

    #[test]
    fn debug_is_redacted() {
        let k = derive_key(b"pw", b"s", 16).unwrap();
        assert!(format!("{k:?}").contains("REDACTED"));
    }
}
