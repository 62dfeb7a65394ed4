use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("utf8 conversion: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("found magic {found:?} instead of {expected:?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },

    #[error("file header is corrupt: {0}")]
    HeaderCorrupt(String),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("container is {actual}, reader expected {expected}")]
    ModeMismatch { expected: &'static str, actual: &'static str },

    #[error("index is encrypted and decryption failed: {0}")]
    IndexDecryptError(String),

    #[error("index is encrypted and no matching IndexCryptoHook was supplied")]
    IndexNotDecryptedError,

    #[error("no hook registered for algo_id {0}")]
    UnknownAlgoId(u16),

    #[error("duplicate path staged: {0}")]
    DuplicatePath(String),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {path}")]
    ChecksumMismatch { path: String },

    #[error("decompression failed for {path}: {detail}")]
    DecompressError { path: String, detail: String },

    #[error("local filesystem error at {path}: {source}")]
    LocalIoError { path: PathBuf, source: std::io::Error },

    #[error("batch operation aborted after {completed} of {total} files")]
    BatchAborted { completed: u64, total: u64 },

    #[error("two hooks registered the same algo_id {0}")]
    DuplicateAlgoId(u16),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable short name for the error, used when recording per-file batch failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "Io",
            Error::Utf8(_) => "Utf8",
            Error::BadMagic { .. } => "BadMagic",
            Error::HeaderCorrupt(_) => "HeaderCorrupt",
            Error::UnsupportedVersion(_) => "UnsupportedVersion",
            Error::ModeMismatch { .. } => "ModeMismatch",
            Error::IndexDecryptError(_) => "IndexDecryptError",
            Error::IndexNotDecryptedError => "IndexNotDecryptedError",
            Error::UnknownAlgoId(_) => "UnknownAlgoId",
            Error::DuplicatePath(_) => "DuplicatePath",
            Error::NotFound(_) => "NotFound",
            Error::ChecksumMismatch { .. } => "ChecksumMismatch",
            Error::DecompressError { .. } => "DecompressError",
            Error::LocalIoError { .. } => "LocalIoError",
            Error::BatchAborted { .. } => "BatchAborted",
            Error::DuplicateAlgoId(_) => "DuplicateAlgoId",
            Error::Other(_) => "Other",
        }
    }
}
