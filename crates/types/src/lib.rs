// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # wot Types
//!
//! Foundational library for the wot trust database, containing the record
//! model, key identifiers, trust scales, configuration objects, and error
//! types.
//!
//! ## Architectural Role
//!
//! As the base crate, `wot-types` has minimal dependencies and is itself a
//! dependency for every other crate in the workspace. It defines the
//! canonical shape of the persistent record graph (directory, key, user-id,
//! preference, signature, shadow-directory, and hint-list records) without
//! prescribing how records are encoded or stored.

/// A crate-wide `Result` alias with the trust-database error as default.
pub type Result<T, E = crate::error::TrustError> = std::result::Result<T, E>;

/// Shared configuration structures (quorum parameters, depth bounds).
pub mod config;
/// Error types and the stable error-code trait.
pub mod error;
/// Key material as seen by the trust database: key ids, fingerprints,
/// parsed keyblocks.
pub mod keyblock;
/// A prelude containing useful extension traits like `OptionExt`.
pub mod prelude;
/// The persistent record model and its chain geometry.
pub mod records;
/// Owner-trust and computed-trust scales.
pub mod trust;
