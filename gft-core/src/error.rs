use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification every failure maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    UnsupportedFeature,
    NotFound,
    CorruptContainer,
    AuthenticationFailed,
    IoFailure,
    ChecksumMismatch,
}

#[derive(Error, Debug)]
pub enum GftError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no volumes found for {}", .0.display())]
    NoVolumesFound(PathBuf),

    #[error("volume sequence has a gap: {} is missing", .0.display())]
    VolumeGap(PathBuf),

    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    #[error("authentication failed at chunk {chunk} (wrong key/salt or tampered data)")]
    AuthenticationFailed { chunk: u64 },

    #[error("salt mismatch: expected {expected}, found {found}")]
    SaltMismatch { expected: String, found: String },

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl GftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GftError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            GftError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            GftError::NotFound(_) | GftError::NoVolumesFound(_) | GftError::VolumeGap(_) => {
                ErrorKind::NotFound
            }
            GftError::CorruptContainer(_) => ErrorKind::CorruptContainer,
            GftError::AuthenticationFailed { .. } | GftError::SaltMismatch { .. } => {
                ErrorKind::AuthenticationFailed
            }
            GftError::Io(_) => ErrorKind::IoFailure,
            GftError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
        }
    }

    /// Wrap into an `io::Error` so it can cross `Read`/`Write` adapters and be
    /// recovered intact by the `From<io::Error>` impl below.
    pub fn into_io(self) -> std::io::Error {
        match self {
            GftError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}

impl From<std::io::Error> for GftError {
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<GftError>()) {
            return match err.into_inner().map(|inner| inner.downcast::<GftError>()) {
                Some(Ok(inner)) => *inner,
                _ => GftError::CorruptContainer("unrecognised stream error".into()),
            };
        }
        GftError::Io(err)
    }
}

impl From<zip::result::ZipError> for GftError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => e.into(),
            zip::result::ZipError::FileNotFound => {
                GftError::CorruptContainer("zip entry not found".into())
            }
            other => GftError::CorruptContainer(format!("zip: {other}")),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, GftError>;
