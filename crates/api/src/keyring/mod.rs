// Path: crates/api/src/keyring/mod.rs

//! The keyring service the trust database consults.
//!
//! The trust core never touches key material: public keys, keyblocks, and
//! the local secret keys come from this interface, and so does the one
//! cryptographic capability the core needs, checking a key signature
//! inside a keyblock. Verification failures are data, not errors: the core
//! records them as signature flags.

use thiserror::Error;
use wot_types::error::ErrorCode;
use wot_types::keyblock::{Fingerprint, KeyId, Keyblock, PublicKey, SecretKey};

/// Errors from keyring lookups.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// The requested key or keyblock is not in the ring.
    #[error("public key not found")]
    NotFound,
    /// Any other keyring failure.
    #[error("keyring error: {0}")]
    General(String),
}

impl ErrorCode for KeyringError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "KEYRING_NOT_FOUND",
            Self::General(_) => "KEYRING_GENERAL",
        }
    }
}

/// The outcome of verifying one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigVerify {
    /// The signature verified.
    Good,
    /// The signer's public key is not available; verification is deferred.
    NoPubkey,
    /// The signature is present but did not verify.
    Bad(String),
}

/// The full answer of a signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigCheck {
    /// The verification outcome.
    pub verdict: SigVerify,
    /// Whether the signature was made by the keyblock's own primary key.
    pub is_selfsig: bool,
}

/// Public-key retrieval and signature verification, as consumed by the
/// trust database.
pub trait Keyring {
    /// Looks up a public key by its long key id.
    fn get_pubkey(&self, keyid: &KeyId) -> Result<PublicKey, KeyringError>;

    /// Looks up a public key by fingerprint.
    fn get_pubkey_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<PublicKey, KeyringError>;

    /// Looks up a public key by user name.
    fn get_pubkey_by_name(&self, name: &str) -> Result<PublicKey, KeyringError>;

    /// Fetches the whole keyblock owning the key with this fingerprint.
    fn get_keyblock_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<Keyblock, KeyringError>;

    /// Fetches the keyblock whose user id matches a name.
    fn find_keyblock_by_name(&self, name: &str) -> Result<Keyblock, KeyringError>;

    /// Enumerates every keyblock of the ring.
    fn enum_keyblocks(&self) -> Result<Vec<Keyblock>, KeyringError>;

    /// Enumerates the local secret keys.
    fn enum_secret_keys(&self) -> Result<Vec<SecretKey>, KeyringError>;

    /// Resolves the key id belonging to a fingerprint. For v3 fingerprints
    /// this requires the ring; v4 fingerprints encode it.
    fn keyid_from_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<KeyId, KeyringError>;

    /// The primary user-id string of a key, when the key is known.
    fn get_user_id(&self, keyid: &KeyId) -> Option<String>;

    /// Verifies the signature at node index `sig_index` of `keyblock`
    /// against the material in the block and the ring.
    fn check_key_signature(&self, keyblock: &Keyblock, sig_index: usize) -> SigCheck;
}
