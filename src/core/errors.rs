use std::path::PathBuf;

/// All domain errors for Envault.
///
/// Each variant provides enough context to diagnose the issue
/// without needing a debugger.
#[derive(Debug, thiserror::Error)]
pub enum EnvaultError {
    #[error("Invalid input: {detail}")]
    InvalidInput { detail: String },

    #[error(
        "Unsupported key type: '{key_type}'\n\n  \
         Supported types:\n    \
         → AES (symmetric): 128 or 256 bits\n    \
         → RSA (asymmetric): 2048, 3072 or 4096 bits\n    \
         → EC (curve): any curve name, backed by a 2048-bit RSA pair"
    )]
    UnsupportedKeyType { key_type: String },

    #[error("Invalid key length {length} for {key_type}. Allowed: {allowed}")]
    InvalidKeyLength {
        key_type: String,
        length: String,
        allowed: String,
    },

    #[error(
        "Key '{name}' already exists\n\n  \
         Key names are immutable and cannot be recreated.\n  \
         Pick a different name or reuse the existing key: envault keys get {name}"
    )]
    KeyAlreadyExists { name: String },

    #[error(
        "Key '{name}' is being created by another request\n\n  \
         Retry once it finishes: the name may still be free if that creation fails."
    )]
    KeyCreationInProgress { name: String },

    #[error(
        "Key '{name}' not found\n\n  \
         The key is neither in the local registry nor in the remote vault.\n  \
         Run 'envault keys list' to see locally known keys."
    )]
    KeyNotFound { name: String },

    #[error("Key vault unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Invalid key format: {detail}")]
    InvalidKeyFormat { detail: String },

    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    #[error(
        "Malformed envelope: {detail}\n\n  \
         Expected a JSON envelope with at least 'encryptedData' and 'iv'.\n  \
         Envelopes are produced by 'envault encrypt'."
    )]
    EnvelopeMalformed { detail: String },

    #[error(
        "Decryption failed: {reason}\n\n  \
         The envelope was tampered with or the key does not match.\n\n  \
         Solutions:\n    \
         → Check that --key names the key the envelope was encrypted with\n    \
         → Inspect the envelope's 'keyName' field"
    )]
    DecryptionFailure { reason: String },

    #[error("Payload of {size} bytes exceeds the limit of {limit} bytes ({limit_mb}MB)")]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        limit_mb: usize,
    },

    #[error("Storage location '{location}' is not available: {reason}")]
    StorageUnavailable { location: String, reason: String },

    #[error("Object '{name}' not found in storage location '{location}'")]
    ObjectNotFound { name: String, location: String },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Key registry error at {}: {detail}", path.display())]
    RegistryError { path: PathBuf, detail: String },

    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("Audit log error: {detail}")]
    AuditError { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EnvaultError {
    /// Shorthand for the size-limit error, computing the MB figure once.
    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        Self::PayloadTooLarge {
            size,
            limit,
            limit_mb: limit / (1024 * 1024),
        }
    }
}

/// Failure reported by a remote key vault.
///
/// "Not found" is an answer, not an outage: callers stop retrying on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("not found in remote vault")]
    NotFound,

    #[error("remote vault unavailable: {reason}")]
    Unavailable { reason: String },
}

impl RemoteError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EnvaultError>;
