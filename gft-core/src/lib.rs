#![forbid(unsafe_code)]

pub mod error;
pub mod session;

pub mod util {
    pub mod crc_forward;
    pub mod io;
    pub mod sanitize;
}

pub mod hash {
    pub mod crc32;
}

pub mod crypto {
    pub mod aead;
    pub mod cipher;
    pub mod des;
    pub mod file;
    pub mod hex;
    pub mod kdf;
    pub mod nonce;
}

pub mod container {
    pub mod comment;
    pub mod frame;
    pub mod split_manifest;
}

pub mod codec;
pub mod volume;

pub mod pack {
    pub mod walker;
    pub mod writer;
}

pub mod read {
    pub mod extract;
}

pub mod batch;

// Re-exports: stable API surface
pub use batch::{BatchReport, BatchRequest, decrypt_batch, encrypt_batch};
pub use codec::{Format, OpenParams, SourceEntry};
pub use error::{ErrorKind, GftError, Result};
pub use pack::writer::{CompressReport, CompressRequest, EncryptOptions, compress};
pub use read::extract::{DecompressReport, DecompressRequest, decompress};
pub use session::{Progress, Session, Silent, Tick, Verbosity};
pub use volume::merge::{ManifestCheck, MergeReport, merge_verified};
