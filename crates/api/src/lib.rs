// Path: crates/api/src/lib.rs

//! # wot API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure panic-free,
//! well-documented code. Panics are disallowed in non-test code to promote
//! robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
//! # wot API
//!
//! The interfaces the trust database core is written against: the numbered
//! record store it persists into, and the keyring service that resolves
//! public keys, enumerates the local secret keys, and verifies key
//! signatures. Both are consumed as traits so the core stays independent of
//! the storage backend and of the packet/crypto machinery.

/// The keyring and signature-verification interface.
pub mod keyring;
/// The numbered record store interface.
pub mod store;
/// In-memory test doubles for the consumed interfaces.
pub mod test_utils;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::keyring::{Keyring, KeyringError, SigCheck, SigVerify};
    pub use crate::store::{RecordStore, StoreError};
}
