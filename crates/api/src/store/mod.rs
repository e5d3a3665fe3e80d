// Path: crates/api/src/store/mod.rs

//! API for a durable, numbered record store.
//!
//! Records are addressed by positive record numbers; 0 is the null
//! reference. The store owns the binary layout and the search indexes; the
//! trust core only sees typed records. A single level of transaction wraps
//! multi-record mutations; nesting is not supported.

use thiserror::Error;
use wot_types::error::{ErrorCode, TrustError};
use wot_types::keyblock::{Fingerprint, KeyId};
use wot_types::records::{Lid, Recno, Record, RecordType};

/// Encodes a u64 into a big-endian byte array, suitable for ordered key
/// scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Represents errors that can occur within the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error originating from the underlying storage backend.
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing a record.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing a record.
    #[error("decode error: {0}")]
    Decode(String),
    /// The record number is not present in the store.
    #[error("record {0} not found")]
    NotFound(Recno),
    /// A typed read hit a record of a different kind.
    #[error("record {recno}: expected {expected} record, got {got}")]
    TypeMismatch {
        /// The record number that was read.
        recno: Recno,
        /// The record type the caller required.
        expected: RecordType,
        /// The record type actually stored.
        got: RecordType,
    },
    /// `begin_transaction` was called while a transaction was open.
    #[error("transaction already open")]
    NestedTransaction,
    /// A commit or cancel was requested with no open transaction.
    #[error("no open transaction")]
    NoTransaction,
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::NotFound(_) => "STORE_NOT_FOUND",
            Self::TypeMismatch { .. } => "STORE_TYPE_MISMATCH",
            Self::NestedTransaction => "STORE_NESTED_TRANSACTION",
            Self::NoTransaction => "STORE_NO_TRANSACTION",
        }
    }
}

impl From<StoreError> for TrustError {
    fn from(e: StoreError) -> Self {
        TrustError::Corrupt(e.to_string())
    }
}

/// The primary trait defining the record store the trust database core
/// persists into.
///
/// All mutating operations may be buffered; `sync` makes every buffered
/// mutation durable. A failure of any operation leaves the store in an
/// unspecified state and must be treated as database corruption by the
/// caller.
pub trait RecordStore {
    /// Reads a record, enforcing the expected type (`RecordType::Any`
    /// accepts everything).
    fn read(&self, recno: Recno, expect: RecordType) -> Result<Record, StoreError>;

    /// Writes a record at a record number, replacing whatever is there.
    fn write(&mut self, recno: Recno, rec: &Record) -> Result<(), StoreError>;

    /// Deletes a record.
    fn delete(&mut self, recno: Recno) -> Result<(), StoreError>;

    /// Allocates a fresh, never-used record number. Allocations survive a
    /// cancelled transaction; record numbers are never reused.
    fn new_recnum(&mut self) -> Result<Recno, StoreError>;

    /// Finds the directory owning a key record with this fingerprint.
    fn search_dir_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<Option<Lid>, StoreError>;

    /// Finds a shadow directory by key id and algorithm. An algorithm of 0
    /// on either side matches any.
    fn search_sdir(
        &self,
        keyid: &KeyId,
        pubkey_algo: u8,
    ) -> Result<Option<Lid>, StoreError>;

    /// Opens the single transaction level.
    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    /// Applies every mutation of the open transaction atomically.
    fn commit_transaction(&mut self) -> Result<(), StoreError>;

    /// Discards every mutation of the open transaction.
    fn cancel_transaction(&mut self) -> Result<(), StoreError>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Whether un-flushed mutations are pending.
    fn is_dirty(&self) -> bool;

    /// Makes all buffered mutations durable.
    fn sync(&mut self) -> Result<(), StoreError>;

    /// Every live record number, ascending. Includes records written in the
    /// open transaction and excludes ones it deleted.
    fn iter_recnums(&self) -> Result<Vec<Recno>, StoreError>;

    /// A human-readable name of the store (its path, usually), for listing
    /// headers.
    fn name(&self) -> String;
}
