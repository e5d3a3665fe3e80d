// Path: crates/types/src/keyblock.rs

//! Key material as seen by the trust database.
//!
//! The trust database never parses OpenPGP packets itself; it consumes an
//! already-parsed keyblock. The types here are that parsed form: enough of
//! a public key, user id, and signature packet to reconcile the record
//! graph and to ask the verifier about a specific signature node.

use crate::error::TrustError;
use crate::records::Lid;
use ripemd::{Digest, Ripemd160};
use serde::{Deserialize, Serialize};

/// The 8-byte long key id of an OpenPGP key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// Builds a key id from its u64 big-endian value.
    pub fn from_u64(v: u64) -> Self {
        Self(v.to_be_bytes())
    }

    /// The low 32 bits, used for the conventional short display form.
    pub fn short(&self) -> u32 {
        u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self([0; 8])
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.short())
    }
}

impl std::fmt::Debug for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyId({})", hex::encode_upper(self.0))
    }
}

/// A key fingerprint of 16 (v3) or 20 (v4) bytes.
///
/// Mixed-length duplicates are deliberately distinct values; the store never
/// collapses a 16-byte fingerprint with a 20-byte one.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Validates the length and wraps the raw bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, TrustError> {
        match bytes.len() {
            16 | 20 => Ok(Self(bytes)),
            n => Err(TrustError::InvalidFingerprint(n)),
        }
    }

    /// Parses an upper- or lower-case hex fingerprint of 32 or 40 digits.
    pub fn from_hex(s: &str) -> Result<Self, TrustError> {
        let bytes =
            hex::decode(s).map_err(|_| TrustError::InvalidFingerprint(s.len()))?;
        Self::new(bytes)
    }

    /// The raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The key id derivable from a v4 fingerprint (its trailing 8 bytes).
    /// v3 fingerprints do not encode the key id; resolving those needs the
    /// keyring.
    pub fn keyid(&self) -> Option<KeyId> {
        if self.0.len() == 20 {
            let mut id = [0u8; 8];
            id.copy_from_slice(&self.0[12..20]);
            Some(KeyId(id))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", hex::encode_upper(&self.0))
    }
}

/// The RMD-160 hash of a user-id string; the stable identity of a user id
/// inside the record graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameHash(pub [u8; 20]);

impl NameHash {
    /// Hashes a user-id string.
    pub fn of(name: &str) -> Self {
        let mut h = Ripemd160::new();
        h.update(name.as_bytes());
        Self(h.finalize().into())
    }

    /// The conventional two-byte abbreviation used in diagnostics.
    pub fn abbrev(&self) -> String {
        format!("{:02X}{:02X}", self.0[18], self.0[19])
    }
}

impl std::fmt::Debug for NameHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NameHash({})", hex::encode_upper(self.0))
    }
}

/// A parsed public key or subkey packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// The long key id.
    pub keyid: KeyId,
    /// The key fingerprint.
    pub fingerprint: Fingerprint,
    /// The public-key algorithm number.
    pub pubkey_algo: u8,
    /// Creation time, seconds since the epoch.
    pub timestamp: u64,
    /// Expiry time, seconds since the epoch; 0 means no expiry.
    pub expiredate: u64,
    /// The local id of this key's directory record, 0 while unknown.
    pub local_id: Lid,
}

/// A parsed secret key packet, as far as the trust database cares.
#[derive(Debug, Clone)]
pub struct SecretKey {
    /// The long key id.
    pub keyid: KeyId,
    /// The fingerprint of the key.
    pub fingerprint: Fingerprint,
    /// The public-key algorithm number.
    pub pubkey_algo: u8,
    /// Whether the secret material is passphrase protected.
    pub protected: bool,
}

impl SecretKey {
    /// Whether `pk` is the public counterpart of this secret key.
    pub fn matches(&self, pk: &PublicKey) -> bool {
        self.keyid == pk.keyid
            && self.pubkey_algo == pk.pubkey_algo
            && self.fingerprint == pk.fingerprint
    }
}

/// A parsed user-id packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    /// The user-id string.
    pub name: String,
}

impl UserId {
    /// The RMD-160 identity of this user id.
    pub fn namehash(&self) -> NameHash {
        NameHash::of(&self.name)
    }
}

/// Preference categories carried by self-signature subpackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrefItemType {
    /// Preferred symmetric cipher algorithms.
    Sym = 1,
    /// Preferred hash algorithms.
    Hash = 2,
    /// Preferred compression algorithms.
    Compr = 3,
}

impl PrefItemType {
    /// All preference categories, in storage order.
    pub const ALL: [PrefItemType; 3] =
        [PrefItemType::Sym, PrefItemType::Hash, PrefItemType::Compr];
}

/// A parsed signature packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// The long key id of the signing key.
    pub keyid: KeyId,
    /// The public-key algorithm of the signing key.
    pub pubkey_algo: u8,
    /// The signature class byte (0x10..=0x13 certifications, 0x18 key
    /// binding, 0x20/0x28/0x30 revocations).
    pub sig_class: u8,
    /// The local id of the signer's directory record, 0 while unknown.
    pub local_id: Lid,
    /// Preferred symmetric algorithms from the subpackets, in order.
    pub sym_prefs: Vec<u8>,
    /// Preferred hash algorithms from the subpackets, in order.
    pub hash_prefs: Vec<u8>,
    /// Preferred compression algorithms from the subpackets, in order.
    pub compr_prefs: Vec<u8>,
}

impl Signature {
    /// Whether this is a certification signature (class 0x10 through 0x13).
    pub fn is_certification(&self) -> bool {
        (self.sig_class & !3) == 0x10
    }

    /// The preference subpacket data for one category.
    pub fn pref_data(&self, kind: PrefItemType) -> &[u8] {
        match kind {
            PrefItemType::Sym => &self.sym_prefs,
            PrefItemType::Hash => &self.hash_prefs,
            PrefItemType::Compr => &self.compr_prefs,
        }
    }
}

/// One node of a parsed keyblock, in packet order.
#[derive(Debug, Clone)]
pub enum KbNode {
    /// The primary public key; exactly one per keyblock, first.
    Primary(PublicKey),
    /// A public subkey.
    Subkey(PublicKey),
    /// A user id.
    UserId(UserId),
    /// A signature over the nearest preceding user id (or over the key
    /// itself for the binding/revocation classes).
    Signature(Signature),
}

/// A parsed keyblock: the primary key followed by its user ids, signatures,
/// and subkeys in packet order.
#[derive(Debug, Clone, Default)]
pub struct Keyblock {
    /// The keyblock's nodes in packet order.
    pub nodes: Vec<KbNode>,
}

impl Keyblock {
    /// The primary public key node.
    pub fn primary(&self) -> Option<&PublicKey> {
        self.nodes.iter().find_map(|n| match n {
            KbNode::Primary(pk) => Some(pk),
            _ => None,
        })
    }

    /// Mutable access to the primary public key node.
    pub fn primary_mut(&mut self) -> Option<&mut PublicKey> {
        self.nodes.iter_mut().find_map(|n| match n {
            KbNode::Primary(pk) => Some(pk),
            _ => None,
        })
    }

    /// Stamps `lid` into every key and signature node of the block.
    pub fn set_local_id(&mut self, lid: Lid) {
        for node in &mut self.nodes {
            match node {
                KbNode::Primary(pk) | KbNode::Subkey(pk) => pk.local_id = lid,
                KbNode::Signature(sig) => sig.local_id = lid,
                KbNode::UserId(_) => {}
            }
        }
    }
}
