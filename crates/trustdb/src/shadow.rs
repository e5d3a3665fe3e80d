// Path: crates/trustdb/src/shadow.rs

//! Shadow directories and hint lists.
//!
//! A signature by a key we have never seen cannot be verified yet, but it
//! must not be lost either. The signer gets a *shadow directory* record
//! (same id space as real directories), and every key depending on that
//! signer is noted in the shadow's hint list. When the signer's key is
//! finally inserted, the shadow becomes the real directory under the same
//! record number and the hint list is drained by re-verifying each deferred
//! signature.

use crate::db::TrustDb;
use tracing::{error, info};
use wot_api::keyring::{Keyring, SigVerify};
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::keyblock::{KbNode, KeyId, Keyblock, NameHash, Signature};
use wot_types::records::{
    HlstRecord, Lid, Record, Recno, SdirRecord, SigFlags,
};

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Finds or creates the shadow directory for a signature's signer and
    /// makes sure `referrer` is on its hint list. Returns the shadow's
    /// local id.
    pub(crate) fn create_shadow_dir(
        &mut self,
        sig: &Signature,
        referrer: Lid,
    ) -> Result<Lid, TrustError> {
        let sdir = match self
            .store
            .search_sdir(&sig.keyid, sig.pubkey_algo)
            .map_err(|e| {
                error!(target: "trustdb", "shadow dir search failed: {e}");
                TrustError::Corrupt(e.to_string())
            })? {
            Some(recno) => self.read_sdir(recno)?,
            None => {
                let recno = self.new_recnum()?;
                let sdir = SdirRecord {
                    lid: recno,
                    keyid: sig.keyid,
                    pubkey_algo: sig.pubkey_algo,
                    hintlist: 0,
                };
                self.write_rec(recno, &Record::Sdir(sdir.clone()))?;
                sdir
            }
        };
        let newlid = sdir.lid;

        // Register the referrer, reusing the first free slot of the
        // existing chain.
        let mut free_slot: Option<(Recno, usize)> = None;
        let mut recno = sdir.hintlist;
        while recno != 0 {
            let hrec = self.read_hlst(recno)?;
            for (idx, rnum) in hrec.rnums.iter().enumerate() {
                if *rnum == 0 {
                    if free_slot.is_none() {
                        free_slot = Some((recno, idx));
                    }
                } else if *rnum == referrer {
                    return Ok(newlid);
                }
            }
            recno = hrec.next;
        }

        if let Some((recno, idx)) = free_slot {
            let mut hrec = self.read_hlst(recno)?;
            if let Some(slot) = hrec.rnums.get_mut(idx) {
                *slot = referrer;
            }
            self.write_rec(recno, &Record::Hlst(hrec))?;
        } else {
            // No room anywhere: prepend a fresh hint record.
            let newrecno = self.new_recnum()?;
            let mut hrec = HlstRecord { rnums: Default::default(), next: sdir.hintlist };
            if let Some(slot) = hrec.rnums.first_mut() {
                *slot = referrer;
            }
            self.write_rec(newrecno, &Record::Hlst(hrec))?;
            let mut sdir = sdir;
            sdir.hintlist = newrecno;
            self.write_rec(sdir.lid, &Record::Sdir(sdir))?;
        }

        Ok(newlid)
    }

    /// Drains a hint list after its shadow directory was promoted to the
    /// real directory `hint_owner`: every deferred signature by the new
    /// key is re-verified, and each hint record is deleted once processed.
    pub(crate) fn process_hintlist(
        &mut self,
        hintlist: Recno,
        hint_owner: Lid,
    ) -> Result<(), TrustError> {
        let owner_keyid = self.keyid_from_lid(hint_owner)?;

        let mut hlst_rn = hintlist;
        while hlst_rn != 0 {
            let hrec = self.read_hlst(hlst_rn)?;

            for subj in hrec.rnums.iter().copied().filter(|&n| n != 0) {
                if let Err(e) = self.check_hint_entry(subj, hint_owner, &owner_keyid)
                {
                    // A broken entry only loses its own deferred checks.
                    match e {
                        TrustError::Corrupt(_) => return Err(e),
                        _ => continue,
                    }
                }
            }

            let next = hrec.next;
            self.delete_rec(hlst_rn)?;
            hlst_rn = next;
        }
        Ok(())
    }

    /// Re-verifies every signature of `subj` that points at `hint_owner`.
    fn check_hint_entry(
        &mut self,
        subj: Lid,
        hint_owner: Lid,
        owner_keyid: &KeyId,
    ) -> Result<(), TrustError> {
        let rec = self.read_rec(subj, wot_types::records::RecordType::Any)?;
        let Record::Dir(dirrec) = rec else {
            error!(
                target: "trustdb",
                "hintlist of {hint_owner}: entry {subj} does not point to a dir record"
            );
            return Ok(());
        };
        if dirrec.keylist == 0 {
            error!(target: "trustdb", "lid {subj} does not have a key");
            return Ok(());
        }

        let krec = self.read_key(dirrec.keylist)?;
        let keyblock = match self.keyring.get_keyblock_by_fingerprint(&krec.fingerprint)
        {
            Ok(kb) => kb,
            Err(e) => {
                error!(target: "trustdb", "lid {subj}: can't get keyblock: {e}");
                return Ok(());
            }
        };

        let mut uidrn = dirrec.uidlist;
        while uidrn != 0 {
            let urec = self.read_uid(uidrn)?;
            uidrn = urec.next;

            let mut sigrn = urec.siglist;
            while sigrn != 0 {
                let mut srec = self.read_sig(sigrn)?;
                let mut dirty = false;
                for idx in 0..srec.slots.len() {
                    let Some(slot) = srec.slots.get(idx).copied() else {
                        continue;
                    };
                    if slot.is_free() || slot.signer != hint_owner {
                        continue;
                    }
                    if slot.flags.checked() {
                        info!(
                            target: "trustdb",
                            "note: sig rec {sigrn}[{idx}] in hintlist of \
                             {hint_owner} but marked as checked"
                        );
                    }
                    if !slot.flags.pubkey_missing() {
                        info!(
                            target: "trustdb",
                            "note: sig rec {sigrn}[{idx}] in hintlist of \
                             {hint_owner} but not marked"
                        );
                    }
                    if let Some(flags) = self.check_hint_sig(
                        subj,
                        &keyblock,
                        owner_keyid,
                        &urec.namehash,
                    ) {
                        if let Some(s) = srec.slots.get_mut(idx) {
                            s.flags = flags;
                        }
                        dirty = true;
                    }
                }
                if dirty {
                    self.write_rec(sigrn, &Record::Sig(srec.clone()))?;
                }
                sigrn = srec.next;
            }
        }
        Ok(())
    }

    /// Locates the deferred signature (the certification by `owner_keyid`
    /// over the user id with `uidhash`) inside `keyblock` and verifies it.
    /// Returns the new slot flags, or `None` when nothing can be decided.
    fn check_hint_sig(
        &mut self,
        lid: Lid,
        keyblock: &Keyblock,
        owner_keyid: &KeyId,
        uidhash: &NameHash,
    ) -> Option<SigFlags> {
        let mut in_uid = false;
        let mut uid_seen = false;
        let mut sig_index = None;
        for (idx, node) in keyblock.nodes.iter().enumerate() {
            match node {
                KbNode::UserId(uid) => {
                    if in_uid {
                        break;
                    }
                    if uid.namehash() == *uidhash {
                        in_uid = true;
                        uid_seen = true;
                    }
                }
                KbNode::Signature(sig) if in_uid => {
                    if &sig.keyid == owner_keyid && sig.is_certification() {
                        sig_index = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(sig_index) = sig_index else {
            if uid_seen {
                info!(target: "trustdb", "lid {lid}: user id without signature");
            } else {
                info!(target: "trustdb", "lid {lid}: user id not found in keyblock");
            }
            return None;
        };

        let check = self.keyring.check_key_signature(keyblock, sig_index);
        if check.is_selfsig {
            error!(target: "trustdb", "lid {lid}: self-signature in hintlist");
            return None;
        }
        match check.verdict {
            SigVerify::Good => {
                if self.options.verbose > 0 {
                    info!(
                        target: "trustdb",
                        "lid {lid}, uid {}, sig {owner_keyid}: good signature",
                        uidhash.abbrev()
                    );
                }
                Some(SigFlags::checked_valid())
            }
            SigVerify::NoPubkey => {
                info!(
                    target: "trustdb",
                    "lid {lid}, uid {}, sig {owner_keyid}: \
                     very strange: no public key",
                    uidhash.abbrev()
                );
                Some(SigFlags::no_pubkey())
            }
            SigVerify::Bad(reason) => {
                info!(
                    target: "trustdb",
                    "lid {lid}, uid {}, sig {owner_keyid}: {reason}",
                    uidhash.abbrev()
                );
                Some(SigFlags::checked_invalid())
            }
        }
    }
}
