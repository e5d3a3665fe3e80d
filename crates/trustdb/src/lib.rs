// Path: crates/trustdb/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! The trust database core.
//!
//! [`TrustDb`] maintains a persistent graph of certification records for
//! every known public key (who signed which user id, with what outcome)
//! and answers trust queries by walking that graph from a subject key
//! toward the ultimately-trusted keys of the local user, applying owner
//! trust and a completes-needed / marginals-needed quorum rule.
//!
//! The core sits between two consumed interfaces: a numbered
//! [`RecordStore`](wot_api::store::RecordStore) it persists into, and a
//! [`Keyring`](wot_api::keyring::Keyring) that resolves public keys and
//! verifies key signatures. Signatures by keys that are not yet in the ring
//! are parked behind *shadow directory* records and re-verified when the
//! signer's key finally arrives.

mod batch;
mod db;
mod eval;
mod insert;
mod lidtab;
mod listing;
mod ownertrust;
mod reconcile;
mod recnos;
mod shadow;
mod sigwalk;

#[cfg(test)]
mod tests;

pub use batch::BatchStats;
pub use db::TrustDb;
