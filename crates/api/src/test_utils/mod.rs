// Path: crates/api/src/test_utils/mod.rs

//! In-memory doubles for the consumed interfaces, used across the
//! workspace's tests.

use crate::keyring::{Keyring, KeyringError, SigCheck, SigVerify};
use std::collections::HashSet;
use wot_types::keyblock::{
    Fingerprint, KbNode, KeyId, Keyblock, PublicKey, SecretKey,
};

/// A programmable in-memory keyring.
///
/// Keyblocks and secret keys are registered up front; signature checking is
/// simulated from ring membership: a signature verifies when its signer's
/// public key is registered, is deferred when it is not, and fails when the
/// (signer, subject) pair has been marked bad.
#[derive(Default)]
pub struct MemoryKeyring {
    blocks: Vec<Keyblock>,
    secrets: Vec<SecretKey>,
    bad: HashSet<(KeyId, KeyId)>,
}

impl MemoryKeyring {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a keyblock.
    pub fn add_keyblock(&mut self, kb: Keyblock) {
        self.blocks.push(kb);
    }

    /// Registers a local secret key.
    pub fn add_secret(&mut self, sk: SecretKey) {
        self.secrets.push(sk);
    }

    /// Marks every signature by `signer` over `subject`'s keyblock as
    /// failing verification.
    pub fn fail_signature(&mut self, signer: KeyId, subject: KeyId) {
        self.bad.insert((signer, subject));
    }

    /// Removes the keyblock whose primary key has the given id, if present.
    pub fn remove_keyblock(&mut self, keyid: &KeyId) {
        self.blocks
            .retain(|kb| kb.primary().map(|pk| &pk.keyid) != Some(keyid));
    }

    fn pubkeys(&self) -> impl Iterator<Item = &PublicKey> {
        self.blocks.iter().flat_map(|kb| {
            kb.nodes.iter().filter_map(|n| match n {
                KbNode::Primary(pk) | KbNode::Subkey(pk) => Some(pk),
                _ => None,
            })
        })
    }
}

impl Keyring for MemoryKeyring {
    fn get_pubkey(&self, keyid: &KeyId) -> Result<PublicKey, KeyringError> {
        self.pubkeys()
            .find(|pk| &pk.keyid == keyid)
            .cloned()
            .ok_or(KeyringError::NotFound)
    }

    fn get_pubkey_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<PublicKey, KeyringError> {
        self.pubkeys()
            .find(|pk| &pk.fingerprint == fpr)
            .cloned()
            .ok_or(KeyringError::NotFound)
    }

    fn get_pubkey_by_name(&self, name: &str) -> Result<PublicKey, KeyringError> {
        let kb = self.find_keyblock_by_name(name)?;
        kb.primary().cloned().ok_or(KeyringError::NotFound)
    }

    fn get_keyblock_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<Keyblock, KeyringError> {
        self.blocks
            .iter()
            .find(|kb| {
                kb.nodes.iter().any(|n| match n {
                    KbNode::Primary(pk) | KbNode::Subkey(pk) => {
                        &pk.fingerprint == fpr
                    }
                    _ => false,
                })
            })
            .cloned()
            .ok_or(KeyringError::NotFound)
    }

    fn find_keyblock_by_name(&self, name: &str) -> Result<Keyblock, KeyringError> {
        self.blocks
            .iter()
            .find(|kb| {
                kb.nodes.iter().any(|n| match n {
                    KbNode::UserId(uid) => uid.name.contains(name),
                    _ => false,
                })
            })
            .cloned()
            .ok_or(KeyringError::NotFound)
    }

    fn enum_keyblocks(&self) -> Result<Vec<Keyblock>, KeyringError> {
        Ok(self.blocks.clone())
    }

    fn enum_secret_keys(&self) -> Result<Vec<SecretKey>, KeyringError> {
        Ok(self.secrets.clone())
    }

    fn keyid_from_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<KeyId, KeyringError> {
        if let Some(pk) = self.pubkeys().find(|pk| &pk.fingerprint == fpr) {
            return Ok(pk.keyid);
        }
        fpr.keyid().ok_or(KeyringError::NotFound)
    }

    fn get_user_id(&self, keyid: &KeyId) -> Option<String> {
        let kb = self.blocks.iter().find(|kb| {
            kb.primary().map(|pk| &pk.keyid) == Some(keyid)
        })?;
        kb.nodes.iter().find_map(|n| match n {
            KbNode::UserId(uid) => Some(uid.name.clone()),
            _ => None,
        })
    }

    fn check_key_signature(&self, keyblock: &Keyblock, sig_index: usize) -> SigCheck {
        let Some(KbNode::Signature(sig)) = keyblock.nodes.get(sig_index) else {
            return SigCheck {
                verdict: SigVerify::Bad("node is not a signature".into()),
                is_selfsig: false,
            };
        };
        let Some(primary) = keyblock.primary() else {
            return SigCheck {
                verdict: SigVerify::Bad("keyblock has no primary key".into()),
                is_selfsig: false,
            };
        };
        let is_selfsig = sig.keyid == primary.keyid;
        let verdict = if self.bad.contains(&(sig.keyid, primary.keyid)) {
            SigVerify::Bad("bad signature".into())
        } else if is_selfsig || self.pubkeys().any(|pk| pk.keyid == sig.keyid) {
            SigVerify::Good
        } else {
            SigVerify::NoPubkey
        };
        SigCheck { verdict, is_selfsig }
    }
}
