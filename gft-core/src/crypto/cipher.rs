//! Cipher capabilities and the name → capability registry.
//!
//! A streaming cipher seals bounded chunks independently (AEAD); a block
//! cipher transforms a whole buffer at once. Callers pick the framing that
//! matches the capability they get back from [`lookup`].

use crate::crypto::des::DesCbc;
use crate::crypto::nonce::{NONCE_LEN, Nonce};
use crate::error::{GftError, Result};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};

pub const TAG_LEN: usize = 16;
pub const DEFAULT_CIPHER: &str = "aes";

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

pub trait StreamingCipher: Send + Sync {
    fn name(&self) -> &'static str;
    fn key_lengths(&self) -> &'static [usize];
    fn seal(&self, key: &[u8], nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    /// `chunk` is only used to label an authentication failure.
    fn open(
        &self,
        key: &[u8],
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
        chunk: u64,
    ) -> Result<Vec<u8>>;
}

pub trait BlockCipher: Send + Sync {
    fn name(&self) -> &'static str;
    fn key_lengths(&self) -> &'static [usize];
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Clone, Copy)]
pub enum Capability {
    Streaming(&'static dyn StreamingCipher),
    Block(&'static dyn BlockCipher),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Streaming(c) => c.name(),
            Capability::Block(c) => c.name(),
        }
    }

    pub fn key_lengths(&self) -> &'static [usize] {
        match self {
            Capability::Streaming(c) => c.key_lengths(),
            Capability::Block(c) => c.key_lengths(),
        }
    }

    pub fn default_key_len(&self) -> usize {
        self.key_lengths().last().copied().unwrap_or(32)
    }

    pub fn check_key_len(&self, len: usize) -> Result<()> {
        if self.key_lengths().contains(&len) {
            Ok(())
        } else {
            Err(GftError::InvalidRequest(format!(
                "key length {len} not valid for {} (allowed: {:?})",
                self.name(),
                self.key_lengths()
            )))
        }
    }

    pub fn is_default(&self) -> bool {
        self.name() == DEFAULT_CIPHER
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Streaming(c) => write!(f, "Streaming({})", c.name()),
            Capability::Block(c) => write!(f, "Block({})", c.name()),
        }
    }
}

static AES_GCM: AesGcmCipher = AesGcmCipher;
static DES_CBC: DesCbc = DesCbc;

pub fn lookup(name: &str) -> Result<Capability> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "aes" | "aes-gcm" => Ok(Capability::Streaming(&AES_GCM)),
        "des" | "des-cbc" => Ok(Capability::Block(&DES_CBC)),
        other => Err(GftError::UnsupportedFeature(format!("cipher {other:?}"))),
    }
}

/// AES-GCM with a 128/192/256-bit key picked by key length.
pub struct AesGcmCipher;

fn seal_with<C>(key: &[u8], nonce: &Nonce, aad: &[u8], msg: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| GftError::InvalidRequest(format!("bad AES key length {}", key.len())))?;
    cipher
        .encrypt(aes_gcm::Nonce::<U12>::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| GftError::InvalidRequest("AES-GCM seal failed".into()))
}

fn open_with<C>(key: &[u8], nonce: &Nonce, aad: &[u8], msg: &[u8], chunk: u64) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| GftError::InvalidRequest(format!("bad AES key length {}", key.len())))?;
    cipher
        .decrypt(aes_gcm::Nonce::<U12>::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| GftError::AuthenticationFailed { chunk })
}

impl StreamingCipher for AesGcmCipher {
    fn name(&self) -> &'static str {
        "aes"
    }

    fn key_lengths(&self) -> &'static [usize] {
        &[16, 24, 32]
    }

    fn seal(&self, key: &[u8], nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        debug_assert_eq!(nonce.len(), NONCE_LEN);
        match key.len() {
            16 => seal_with::<Aes128Gcm>(key, nonce, aad, plaintext),
            24 => seal_with::<Aes192Gcm>(key, nonce, aad, plaintext),
            32 => seal_with::<Aes256Gcm>(key, nonce, aad, plaintext),
            n => Err(GftError::InvalidRequest(format!("bad AES key length {n}"))),
        }
    }

    fn open(
        &self,
        key: &[u8],
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
        chunk: u64,
    ) -> Result<Vec<u8>> {
        match key.len() {
            16 => open_with::<Aes128Gcm>(key, nonce, aad, ciphertext, chunk),
            24 => open_with::<Aes192Gcm>(key, nonce, aad, ciphertext, chunk),
            32 => open_with::<Aes256Gcm>(key, nonce, aad, ciphertext, chunk),
            n => Err(GftError::InvalidRequest(format!("bad AES key length {n}"))),
        }
    }
}
