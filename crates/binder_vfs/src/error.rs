//! Error types for virtual filesystem operations.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses [`Error`]
//! as the error type. External error types (`std::io::Error`, `binrw::Error`,
//! TOML errors) are automatically converted via `From` impls.
//!
//! Conditions that never abort an operation (unresolved hashes, duplicate paths,
//! ambiguous fallback matches) are not errors; they are reported as
//! [`DiagnosticEvent`](crate::diagnostics::DiagnosticEvent)s instead.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mounting archives or accessing files.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (opening shards, reading data files, writing loose files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixed-layout record inside an archive index could not be decoded.
    #[error("Binary read error: {0}")]
    Binrw(#[from] binrw::Error),

    /// An archive index is malformed or still encrypted.
    ///
    /// Fatal to that shard only; mounting continues with the remaining shards.
    #[error("Invalid archive index '{shard}': {reason}")]
    InvalidArchiveIndex { shard: String, reason: String },

    /// A file's integrity digest did not match its contents (strict mode only).
    #[error("Integrity mismatch for {hash:016x} in shard '{shard}'")]
    IntegrityMismatch { shard: String, hash: u64 },

    /// A write or delete was issued against a read-only file or filesystem.
    #[error("Write not supported: {0}")]
    WriteNotSupported(String),

    /// A path could not be resolved after the fast path and the hash fallback.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A file carries encryption metadata but no decryptor was configured.
    #[error("File {0:016x} is encrypted but no decryptor is configured")]
    DecryptorMissing(u64),

    /// The external decryption or decompression primitive failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Catch-all for errors from other sources.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl Error {
    pub(crate) fn invalid_index(shard: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidArchiveIndex {
            shard: shard.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn read_only(what: impl std::fmt::Display) -> Self {
        Error::WriteNotSupported(what.to_string())
    }
}
