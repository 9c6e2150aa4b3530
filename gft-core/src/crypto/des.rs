use crate::crypto::cipher::BlockCipher;
use crate::error::{GftError, Result};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

pub const DES_BLOCK: usize = 8;

type Enc = cbc::Encryptor<des::Des>;
type Dec = cbc::Decryptor<des::Des>;

/// DES in CBC mode with PKCS#7 padding. Legacy; unauthenticated.
pub struct DesCbc;

impl BlockCipher for DesCbc {
    fn name(&self) -> &'static str {
        "des"
    }

    fn key_lengths(&self) -> &'static [usize] {
        &[8]
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let enc = Enc::new_from_slices(key, iv)
            .map_err(|_| GftError::InvalidRequest("DES needs an 8-byte key and IV".into()))?;
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() % DES_BLOCK != 0 {
            return Err(GftError::CorruptContainer(format!(
                "DES ciphertext length {} is not a multiple of {DES_BLOCK}",
                ciphertext.len()
            )));
        }
        let dec = Dec::new_from_slices(key, iv)
            .map_err(|_| GftError::InvalidRequest("DES needs an 8-byte key and IV".into()))?;
        dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| GftError::CorruptContainer("bad PKCS#7 padding".into()))
    }
}
