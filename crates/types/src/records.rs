// Path: crates/types/src/records.rs

//! The persistent record model.
//!
//! Every entity of the trust database is a record addressed by a positive
//! integer record number. Record number 0 is the null reference. The local
//! id (LID) of a key is by convention the record number of its directory or
//! shadow-directory record, so chains can refer to their owner with a plain
//! integer and no in-memory pointer graph exists between records.

use crate::keyblock::{Fingerprint, KeyId, NameHash};
use crate::trust::Ownertrust;
use serde::{Deserialize, Serialize};

/// A record number. 0 is the null reference.
pub type Recno = u64;
/// A local identifier: the record number of a directory or shadow
/// directory record.
pub type Lid = Recno;

/// Signature slots packed into one signature record.
pub const SIGS_PER_RECORD: usize = 6;
/// Local ids packed into one hint-list record.
pub const ITEMS_PER_HLST_RECORD: usize = 7;
/// Preference bytes ((type, algo) pairs) packed into one preference record.
pub const ITEMS_PER_PREF_RECORD: usize = 30;
/// Hard cap on preference records chained under one user id.
pub const MAX_PREF_RECORDS_PER_UID: usize = 10;

/// Flag bits of a directory record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct DirFlags(u8);

impl DirFlags {
    const CHECKED: u8 = 0x01;
    const REVOKED: u8 = 0x02;

    /// Whether a cached trust verdict is valid for this directory.
    pub fn checked(self) -> bool {
        self.0 & Self::CHECKED != 0
    }
    /// Sets or clears the cached-verdict bit.
    pub fn set_checked(&mut self, on: bool) {
        if on {
            self.0 |= Self::CHECKED;
        } else {
            self.0 &= !Self::CHECKED;
        }
    }
    /// Whether the key has been revoked by its owner.
    pub fn revoked(self) -> bool {
        self.0 & Self::REVOKED != 0
    }
    /// Sets the revoked bit.
    pub fn set_revoked(&mut self, on: bool) {
        if on {
            self.0 |= Self::REVOKED;
        } else {
            self.0 &= !Self::REVOKED;
        }
    }
}

/// Flag bits of a user-id record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct UidFlags(u8);

impl UidFlags {
    const CHECKED: u8 = 0x01;
    const VALID: u8 = 0x02;

    /// Whether the self-signature of this user id has been examined.
    pub fn checked(self) -> bool {
        self.0 & Self::CHECKED != 0
    }
    /// Whether the self-signature verified successfully.
    pub fn valid(self) -> bool {
        self.0 & Self::VALID != 0
    }
    /// Marks the user id examined, with the given verification outcome.
    pub fn mark_checked(&mut self, valid: bool) {
        self.0 = Self::CHECKED | if valid { Self::VALID } else { 0 };
    }
}

/// Flag bits of a signature slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct SigFlags(u8);

impl SigFlags {
    const CHECKED: u8 = 0x01;
    const VALID: u8 = 0x02;
    const EXPIRED: u8 = 0x04;
    const REVOKED: u8 = 0x08;
    const NOPUBKEY: u8 = 0x10;

    /// A slot verified successfully: CHECKED and VALID.
    pub fn checked_valid() -> Self {
        Self(Self::CHECKED | Self::VALID)
    }
    /// A slot that was examined but did not verify.
    pub fn checked_invalid() -> Self {
        Self(Self::CHECKED)
    }
    /// A slot deferred because the signer's public key is unavailable.
    pub fn no_pubkey() -> Self {
        Self(Self::NOPUBKEY)
    }

    /// Whether the signature has been examined.
    pub fn checked(self) -> bool {
        self.0 & Self::CHECKED != 0
    }
    /// Whether the signature verified successfully.
    pub fn valid(self) -> bool {
        self.0 & Self::VALID != 0
    }
    /// Whether the signature has expired.
    pub fn expired(self) -> bool {
        self.0 & Self::EXPIRED != 0
    }
    /// Whether the signature was revoked.
    pub fn revoked(self) -> bool {
        self.0 & Self::REVOKED != 0
    }
    /// Whether verification is deferred for want of the signer's key.
    pub fn pubkey_missing(self) -> bool {
        self.0 & Self::NOPUBKEY != 0
    }

    /// Whether this signature counts toward trust: verified good and
    /// neither expired nor revoked.
    pub fn usable(self) -> bool {
        self.checked() && self.valid() && !self.expired() && !self.revoked()
    }

    /// The three-character listing form: `V/E/R` positions when checked,
    /// `?--` when deferred, `---` otherwise.
    pub fn triplet(self) -> String {
        if self.checked() {
            format!(
                "{}{}{}",
                if self.valid() { 'V' } else { '-' },
                if self.expired() { 'E' } else { '-' },
                if self.revoked() { 'R' } else { '-' },
            )
        } else if self.pubkey_missing() {
            "?--".to_string()
        } else {
            "---".to_string()
        }
    }
}

/// The root record of a known public key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirRecord {
    /// The local id; equals this record's own record number.
    pub lid: Lid,
    /// The owner-assigned trust in this keyholder as an introducer.
    pub ownertrust: Ownertrust,
    /// Directory flag bits.
    pub flags: DirFlags,
    /// Head of the key-record chain (primary key first).
    pub keylist: Recno,
    /// Head of the user-id record chain.
    pub uidlist: Recno,
}

/// One (sub)key under a directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// The owning directory's record number.
    pub lid: Lid,
    /// The public-key algorithm number.
    pub pubkey_algo: u8,
    /// The key fingerprint (16 or 20 bytes).
    pub fingerprint: Fingerprint,
    /// The next key record in the chain, 0 at the end.
    pub next: Recno,
}

/// One user id under a directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidRecord {
    /// The owning directory's record number.
    pub lid: Lid,
    /// RMD-160 hash of the user-id string.
    pub namehash: NameHash,
    /// User-id flag bits.
    pub flags: UidFlags,
    /// Head of the preference-record chain, 0 when none.
    pub prefrec: Recno,
    /// Head of the signature-record chain, 0 when none.
    pub siglist: Recno,
    /// The next user-id record in the chain, 0 at the end.
    pub next: Recno,
}

/// Preference items of a user id, packed as (type, algo) byte pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefRecord {
    /// The owning directory's record number.
    pub lid: Lid,
    /// Up to [`ITEMS_PER_PREF_RECORD`] bytes of (type, algo) pairs.
    pub data: Vec<u8>,
    /// The next preference record in the chain, 0 at the end.
    pub next: Recno,
}

/// One signature slot: the signer's local id and the verification state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct SigSlot {
    /// The signer's local id (directory or shadow directory); 0 marks a
    /// free slot.
    pub signer: Lid,
    /// Verification flags of this signature.
    pub flags: SigFlags,
}

impl SigSlot {
    /// Whether the slot is free (deleted or never used).
    pub fn is_free(&self) -> bool {
        self.signer == 0
    }

    /// Empties the slot.
    pub fn clear(&mut self) {
        *self = SigSlot::default();
    }
}

/// A packed array of signature slots belonging to one user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigRecord {
    /// The owning directory's record number.
    pub lid: Lid,
    /// The packed signature slots.
    pub slots: [SigSlot; SIGS_PER_RECORD],
    /// The next signature record in the chain, 0 at the end.
    pub next: Recno,
}

/// Placeholder directory for a signer whose public key has not been seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdirRecord {
    /// The local id; equals this record's own record number and is
    /// preserved when the shadow is promoted to a real directory.
    pub lid: Lid,
    /// The signer's long key id.
    pub keyid: KeyId,
    /// The signer's public-key algorithm, 0 when unknown.
    pub pubkey_algo: u8,
    /// Head of the hint-list chain of dependents, 0 when none.
    pub hintlist: Recno,
}

/// A packed list of local ids whose signature records hold deferred
/// references to one shadow directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlstRecord {
    /// The dependent local ids; 0 marks a free slot.
    pub rnums: [Lid; ITEMS_PER_HLST_RECORD],
    /// The next hint-list record in the chain, 0 at the end.
    pub next: Recno,
}

/// The discriminant of a record, used for typed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Accept any record type.
    Any,
    /// A directory record.
    Dir,
    /// A key record.
    Key,
    /// A user-id record.
    Uid,
    /// A preference record.
    Pref,
    /// A signature record.
    Sig,
    /// A shadow-directory record.
    Sdir,
    /// A hint-list record.
    Hlst,
}

/// A typed record of the trust database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// A directory record.
    Dir(DirRecord),
    /// A key record.
    Key(KeyRecord),
    /// A user-id record.
    Uid(UidRecord),
    /// A preference record.
    Pref(PrefRecord),
    /// A signature record.
    Sig(SigRecord),
    /// A shadow-directory record.
    Sdir(SdirRecord),
    /// A hint-list record.
    Hlst(HlstRecord),
}

impl Record {
    /// The discriminant of this record.
    pub fn rectype(&self) -> RecordType {
        match self {
            Record::Dir(_) => RecordType::Dir,
            Record::Key(_) => RecordType::Key,
            Record::Uid(_) => RecordType::Uid,
            Record::Pref(_) => RecordType::Pref,
            Record::Sig(_) => RecordType::Sig,
            Record::Sdir(_) => RecordType::Sdir,
            Record::Hlst(_) => RecordType::Hlst,
        }
    }

    /// Whether this record satisfies a typed-read expectation.
    pub fn matches(&self, expect: RecordType) -> bool {
        expect == RecordType::Any || self.rectype() == expect
    }

    /// The directory payload, if this is a directory record.
    pub fn into_dir(self) -> Option<DirRecord> {
        match self {
            Record::Dir(r) => Some(r),
            _ => None,
        }
    }

    /// The key payload, if this is a key record.
    pub fn into_key(self) -> Option<KeyRecord> {
        match self {
            Record::Key(r) => Some(r),
            _ => None,
        }
    }

    /// The user-id payload, if this is a user-id record.
    pub fn into_uid(self) -> Option<UidRecord> {
        match self {
            Record::Uid(r) => Some(r),
            _ => None,
        }
    }

    /// The preference payload, if this is a preference record.
    pub fn into_pref(self) -> Option<PrefRecord> {
        match self {
            Record::Pref(r) => Some(r),
            _ => None,
        }
    }

    /// The signature payload, if this is a signature record.
    pub fn into_sig(self) -> Option<SigRecord> {
        match self {
            Record::Sig(r) => Some(r),
            _ => None,
        }
    }

    /// The shadow-directory payload, if this is a shadow directory.
    pub fn into_sdir(self) -> Option<SdirRecord> {
        match self {
            Record::Sdir(r) => Some(r),
            _ => None,
        }
    }

    /// The hint-list payload, if this is a hint-list record.
    pub fn into_hlst(self) -> Option<HlstRecord> {
        match self {
            Record::Hlst(r) => Some(r),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::Any => "any",
            RecordType::Dir => "dir",
            RecordType::Key => "key",
            RecordType::Uid => "uid",
            RecordType::Pref => "pref",
            RecordType::Sig => "sig",
            RecordType::Sdir => "sdir",
            RecordType::Hlst => "hlst",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Dir(r) => write!(
                f,
                "dir {}, keys={} uids={} ot={:02x}{}{}",
                r.lid,
                r.keylist,
                r.uidlist,
                r.ownertrust.0,
                if r.flags.checked() { " checked" } else { "" },
                if r.flags.revoked() { " revoked" } else { "" },
            ),
            Record::Key(r) => write!(
                f,
                "key {}, next={} algo={} fpr={}",
                r.lid, r.next, r.pubkey_algo, r.fingerprint
            ),
            Record::Uid(r) => write!(
                f,
                "uid {}, next={} prefs={} sigs={} hash={}{}{}",
                r.lid,
                r.next,
                r.prefrec,
                r.siglist,
                r.namehash.abbrev(),
                if r.flags.checked() { " checked" } else { "" },
                if r.flags.valid() { " valid" } else { "" },
            ),
            Record::Pref(r) => write!(
                f,
                "pref {}, next={} data={}",
                r.lid,
                r.next,
                hex::encode_upper(&r.data)
            ),
            Record::Sig(r) => {
                write!(f, "sig {}, next={}", r.lid, r.next)?;
                for slot in r.slots.iter().filter(|s| !s.is_free()) {
                    write!(f, " {}:{}", slot.signer, slot.flags.triplet())?;
                }
                Ok(())
            }
            Record::Sdir(r) => write!(
                f,
                "sdir {}, keyid={} algo={} hint={}",
                r.lid, r.keyid, r.pubkey_algo, r.hintlist
            ),
            Record::Hlst(r) => {
                write!(f, "hlst, next={}", r.next)?;
                for rnum in r.rnums.iter().filter(|&&n| n != 0) {
                    write!(f, " {rnum}")?;
                }
                Ok(())
            }
        }
    }
}
