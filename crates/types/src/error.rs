// Path: crates/types/src/error.rs
//! Core error types for the trust database.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors surfaced by the trust database core.
///
/// `Corrupt` is terminal: once the record graph is known to be damaged no
/// further mutation is attempted, and the caller is expected to stop and
/// repair the database.
#[derive(Debug, Error)]
pub enum TrustError {
    /// A structural invariant of the record graph is violated, or the
    /// record store failed a read, write, or delete.
    #[error("trust database is corrupted ({0}); please run a trust database repair")]
    Corrupt(String),
    /// The requested key has no record in the trust database.
    #[error("key not found in trust database")]
    NotFound,
    /// The key's creation timestamp lies in the future.
    #[error("key created in future (time warp or clock problem)")]
    TimeConflict,
    /// A fingerprint had a length other than 16 or 20 bytes.
    #[error("invalid fingerprint length: {0}")]
    InvalidFingerprint(usize),
    /// An I/O error occurred while reading or writing an owner-trust file
    /// or a listing stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A recoverable trust-database failure.
    #[error("trust database error: {0}")]
    General(String),
}

impl ErrorCode for TrustError {
    fn code(&self) -> &'static str {
        match self {
            Self::Corrupt(_) => "TRUST_DB_CORRUPT",
            Self::NotFound => "TRUST_NOT_FOUND",
            Self::TimeConflict => "TRUST_TIME_CONFLICT",
            Self::InvalidFingerprint(_) => "TRUST_INVALID_FINGERPRINT",
            Self::Io(_) => "TRUST_IO_ERROR",
            Self::General(_) => "TRUST_GENERAL",
        }
    }
}

impl From<String> for TrustError {
    fn from(s: String) -> Self {
        TrustError::General(s)
    }
}
