// Path: crates/trustdb/src/reconcile.rs

//! The keyblock reconciler.
//!
//! Given a parsed keyblock whose primary key already has a directory
//! record, this pass makes the record graph agree with the keyblock:
//! upserts key records by fingerprint and user-id records by name hash,
//! routes every signature to the self-sig or non-self-sig handler, and
//! finally deletes chain members that no longer correspond to anything in
//! the block (cascading a user id's preference and signature chains).
//!
//! Verification failures never abort a pass; they become slot flags. A
//! record that is not what its chain says it must be aborts the pass as
//! database corruption.

use crate::db::{ring_err, TrustDb};
use crate::recnos::RecnoList;
use tracing::{error, info};
use wot_api::keyring::{Keyring, KeyringError, SigVerify};
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::keyblock::{
    KbNode, KeyId, Keyblock, NameHash, PrefItemType, PublicKey, Signature,
    UserId,
};
use wot_types::records::{
    DirRecord, KeyRecord, Lid, PrefRecord, Record, RecordType, Recno,
    SigFlags, SigRecord, SigSlot, UidRecord, ITEMS_PER_PREF_RECORD,
    MAX_PREF_RECORDS_PER_UID,
};

/// Cursor state threaded through one reconciliation pass.
struct Pass {
    /// The primary key's id, for self-signature dispatch and diagnostics.
    keyid: KeyId,
    /// Records that correspond to keyblock content and must survive.
    retained: RecnoList,
    /// The user-id record the walk is currently under, 0 before the first.
    uidrec: Recno,
    /// Name hash of the current user id.
    namehash: Option<NameHash>,
}

/// The directory record held in memory during a pass, with write-back
/// bookkeeping.
struct DirState {
    rec: DirRecord,
    dirty: bool,
    touched: bool,
}

impl DirState {
    fn new(rec: DirRecord) -> Self {
        Self { rec, dirty: false, touched: false }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.touched = true;
    }
}

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Reconciles the record graph with `kb`. The primary key must already
    /// have a directory record (`TrustError::NotFound` otherwise). Returns
    /// whether anything changed.
    pub fn update_trust_record(
        &mut self,
        kb: &mut Keyblock,
    ) -> Result<bool, TrustError> {
        let drec = {
            let primary = kb.primary_mut().ok_or_else(|| {
                TrustError::General("keyblock without primary key".into())
            })?;
            self.get_dir_record(primary)?
        };

        let modified = self.with_transaction(|db| {
            db.reconcile_keyblock(kb, drec)?;
            Ok(db.store.is_dirty())
        })?;
        self.do_sync()?;
        Ok(modified)
    }

    /// One reconciliation pass, without transaction wrapping; insertion
    /// composes this with shadow-dir promotion under a single transaction.
    pub(crate) fn reconcile_keyblock(
        &mut self,
        kb: &Keyblock,
        drec: DirRecord,
    ) -> Result<(), TrustError> {
        let keyid = kb
            .primary()
            .map(|pk| pk.keyid)
            .ok_or_else(|| {
                TrustError::General("keyblock without primary key".into())
            })?;

        let mut dir = DirState::new(drec);
        let mut pass = Pass {
            keyid,
            retained: RecnoList::new(),
            uidrec: 0,
            namehash: None,
        };

        for (idx, node) in kb.nodes.iter().enumerate() {
            match node {
                KbNode::Primary(pk) | KbNode::Subkey(pk) => {
                    pass.uidrec = 0;
                    pass.namehash = None;
                    self.upd_key_record(pk, &mut dir, &mut pass)?;
                }
                KbNode::UserId(uid) => {
                    // Downstream handlers may re-read the directory record.
                    self.flush_dir(&mut dir)?;
                    self.upd_uid_record(uid, &mut dir, &mut pass)?;
                }
                KbNode::Signature(sig) => {
                    self.flush_dir(&mut dir)?;
                    self.upd_sig_record(kb, idx, sig, &mut dir, &mut pass)?;
                }
            }
        }

        self.delete_dropped_keys(&mut dir, &pass.retained)?;
        self.delete_dropped_uids(&mut dir, &pass.retained)?;

        if dir.touched {
            // Whatever verdict was cached no longer describes this graph.
            dir.rec.flags.set_checked(false);
            dir.dirty = true;
            self.flush_dir(&mut dir)?;
        }
        Ok(())
    }

    fn flush_dir(&mut self, dir: &mut DirState) -> Result<(), TrustError> {
        if dir.dirty {
            self.write_rec(dir.rec.lid, &Record::Dir(dir.rec.clone()))?;
            dir.dirty = false;
        }
        Ok(())
    }

    /// Upserts the key record for one (sub)key by fingerprint, appending
    /// new records at the end of the chain.
    fn upd_key_record(
        &mut self,
        pk: &PublicKey,
        dir: &mut DirState,
        pass: &mut Pass,
    ) -> Result<(), TrustError> {
        let mut recno = dir.rec.keylist;
        let mut last = 0;
        while recno != 0 {
            let krec = self.read_key(recno)?;
            if krec.fingerprint == pk.fingerprint {
                pass.retained.insert(recno, RecordType::Key);
                return Ok(());
            }
            last = recno;
            recno = krec.next;
        }

        let newrecno = self.new_recnum()?;
        let krec = KeyRecord {
            lid: dir.rec.lid,
            pubkey_algo: pk.pubkey_algo,
            fingerprint: pk.fingerprint.clone(),
            next: 0,
        };
        self.write_rec(newrecno, &Record::Key(krec))?;
        pass.retained.insert(newrecno, RecordType::Key);

        if last == 0 {
            dir.rec.keylist = newrecno;
            dir.mark_dirty();
        } else {
            let mut prev = self.read_key(last)?;
            prev.next = newrecno;
            self.write_rec(last, &Record::Key(prev))?;
        }
        Ok(())
    }

    /// Upserts the user-id record for one user id by name hash, appending
    /// new records at the end of the chain.
    fn upd_uid_record(
        &mut self,
        uid: &UserId,
        dir: &mut DirState,
        pass: &mut Pass,
    ) -> Result<(), TrustError> {
        let namehash = uid.namehash();
        pass.namehash = Some(namehash);

        let mut recno = dir.rec.uidlist;
        let mut last = 0;
        while recno != 0 {
            let urec = self.read_uid(recno)?;
            if urec.namehash == namehash {
                pass.retained.insert(recno, RecordType::Uid);
                pass.uidrec = recno;
                return Ok(());
            }
            last = recno;
            recno = urec.next;
        }

        let newrecno = self.new_recnum()?;
        let urec = UidRecord {
            lid: dir.rec.lid,
            namehash,
            flags: Default::default(),
            prefrec: 0,
            siglist: 0,
            next: 0,
        };
        self.write_rec(newrecno, &Record::Uid(urec))?;
        pass.retained.insert(newrecno, RecordType::Uid);

        if last == 0 {
            dir.rec.uidlist = newrecno;
            dir.mark_dirty();
        } else {
            let mut prev = self.read_uid(last)?;
            prev.next = newrecno;
            self.write_rec(last, &Record::Uid(prev))?;
        }
        pass.uidrec = newrecno;
        Ok(())
    }

    /// Routes one signature packet by class and by whether it was made by
    /// the subject key itself.
    ///
    /// A signature made with a secondary key is not a self-signature.
    fn upd_sig_record(
        &mut self,
        kb: &Keyblock,
        node_idx: usize,
        sig: &Signature,
        dir: &mut DirState,
        pass: &mut Pass,
    ) -> Result<(), TrustError> {
        if pass.uidrec == 0 {
            match sig.sig_class {
                // [sub]key revocations and key bindings carry no user id.
                0x18 | 0x20 | 0x28 => {}
                _ => {
                    error!(
                        target: "trustdb",
                        "key {}: signature (class {:02x}) without user id",
                        pass.keyid,
                        sig.sig_class
                    );
                    return Ok(());
                }
            }
        }

        if sig.keyid == pass.keyid {
            if sig.is_certification() {
                self.upd_self_sig(kb, node_idx, sig, dir.rec.lid, pass)?;
            } else if sig.sig_class == 0x20 {
                // Revocation of the key by its own holder.
                if !dir.rec.flags.revoked() {
                    info!(
                        target: "trustdb",
                        "key {}: revoked by its owner", pass.keyid
                    );
                    dir.rec.flags.set_revoked(true);
                    dir.mark_dirty();
                }
            } else if matches!(sig.sig_class, 0x18 | 0x28 | 0x30) {
                // Recognized, no record change derived from these yet.
                info!(
                    target: "trustdb",
                    "key {}: ignoring class {:02x} self signature",
                    pass.keyid,
                    sig.sig_class
                );
            }
        } else if sig.is_certification() {
            self.upd_nonself_sig(kb, node_idx, sig, dir.rec.lid, pass)?;
        } else {
            match sig.sig_class {
                0x18 => info!(
                    target: "trustdb",
                    "key {}: bogus key binding by {}", pass.keyid, sig.keyid
                ),
                0x20 => info!(
                    target: "trustdb",
                    "key {}: bogus key revocation by {}", pass.keyid, sig.keyid
                ),
                0x28 => info!(
                    target: "trustdb",
                    "key {}: bogus subkey revocation by {}", pass.keyid, sig.keyid
                ),
                0x30 => info!(
                    target: "trustdb",
                    "key {}: certification revocation by {} ignored",
                    pass.keyid,
                    sig.keyid
                ),
                _ => {}
            }
        }
        Ok(())
    }

    /// Handles a self-signature over the current user id (class
    /// 0x10..=0x13): verify once, then rebuild the preference chain and
    /// validate the user id on success.
    fn upd_self_sig(
        &mut self,
        kb: &Keyblock,
        node_idx: usize,
        sig: &Signature,
        lid: Lid,
        pass: &mut Pass,
    ) -> Result<(), TrustError> {
        let mut urec = self.read_uid(pass.uidrec)?;
        if urec.flags.checked() {
            return Ok(());
        }
        let abbrev = pass
            .namehash
            .as_ref()
            .map(|h| h.abbrev())
            .unwrap_or_default();

        match self.keyring.check_key_signature(kb, node_idx).verdict {
            SigVerify::Good => {
                if self.options.verbose > 0 {
                    info!(
                        target: "trustdb",
                        "key {}.{lid}, uid {abbrev}: good self-signature",
                        pass.keyid
                    );
                }
                self.upd_pref_record(sig, lid, &mut urec)?;
                urec.flags.mark_checked(true);
            }
            SigVerify::NoPubkey => {
                info!(
                    target: "trustdb",
                    "key {}, uid {abbrev}: self-signature but no public key",
                    pass.keyid
                );
                urec.flags.mark_checked(false);
            }
            SigVerify::Bad(reason) => {
                info!(
                    target: "trustdb",
                    "key {}, uid {abbrev}: invalid self-signature: {reason}",
                    pass.keyid
                );
                urec.flags.mark_checked(false);
            }
        }
        self.write_rec(pass.uidrec, &Record::Uid(urec))?;
        Ok(())
    }

    /// Rebuilds a user id's preference chain from a verified
    /// self-signature's subpackets.
    fn upd_pref_record(
        &mut self,
        sig: &Signature,
        lid: Lid,
        urec: &mut UidRecord,
    ) -> Result<(), TrustError> {
        // Dropping the whole chain first is simpler than diffing it.
        let mut recno = urec.prefrec;
        while recno != 0 {
            let prec = self.read_pref(recno)?;
            self.delete_rec(recno)?;
            recno = prec.next;
        }

        let mut data = Vec::new();
        for kind in PrefItemType::ALL {
            for algo in sig.pref_data(kind) {
                data.push(kind as u8);
                data.push(*algo);
            }
        }

        let mut chunks: Vec<&[u8]> = data.chunks(ITEMS_PER_PREF_RECORD).collect();
        if chunks.len() > MAX_PREF_RECORDS_PER_UID {
            info!(target: "trustdb", "lid {lid}: too many preferences");
            chunks.truncate(MAX_PREF_RECORDS_PER_UID);
        }

        // Write back to front so each record already knows its successor.
        let mut next = 0;
        for chunk in chunks.iter().rev() {
            let recno = self.new_recnum()?;
            let prec = PrefRecord { lid, data: chunk.to_vec(), next };
            self.write_rec(recno, &Record::Pref(prec))?;
            next = recno;
        }
        urec.prefrec = next;
        Ok(())
    }

    /// Handles a certification by another key: resolve the signer to a
    /// local id (through the ring, the directory index, or a shadow
    /// directory), repair the existing slots for this signer, and append a
    /// new slot when none referenced the signer yet.
    fn upd_nonself_sig(
        &mut self,
        kb: &Keyblock,
        node_idx: usize,
        sig: &Signature,
        lid: Lid,
        pass: &mut Pass,
    ) -> Result<(), TrustError> {
        let abbrev = pass
            .namehash
            .as_ref()
            .map(|h| h.abbrev())
            .unwrap_or_default();
        let mut urec = self.read_uid(pass.uidrec)?;

        // Resolve the signer's lid: the ring key's directory when it has
        // one, otherwise an existing shadow directory. 0 when the signer
        // is nowhere to be found.
        let mut pk_lid: Lid = 0;
        match self.keyring.get_pubkey(&sig.keyid) {
            Ok(spk) => {
                if spk.local_id != 0 {
                    pk_lid = spk.local_id;
                } else if let Some(found) = self
                    .store
                    .search_dir_by_fingerprint(&spk.fingerprint)
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                {
                    pk_lid = found;
                } else if let Some(found) = self
                    .store
                    .search_sdir(&spk.keyid, spk.pubkey_algo)
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                {
                    pk_lid = found;
                }
            }
            Err(KeyringError::NotFound) => {
                if let Some(found) = self
                    .store
                    .search_sdir(&sig.keyid, sig.pubkey_algo)
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                {
                    pk_lid = found;
                }
            }
            Err(e) => return Err(ring_err(e)),
        }

        // Sweep the existing slots: drop duplicates of this signer, and
        // settle any slot still awaiting its first check.
        let mut found_sig = false;
        let mut free_slot: Option<(Recno, usize)> = None;
        let mut recno = urec.siglist;
        while recno != 0 {
            let mut srec = self.read_sig(recno)?;
            let mut dirty = false;

            for idx in 0..srec.slots.len() {
                let Some(slot) = srec.slots.get(idx).copied() else {
                    continue;
                };
                if slot.is_free() {
                    if free_slot.is_none() {
                        free_slot = Some((recno, idx));
                    }
                    continue;
                }
                if pk_lid != 0 && slot.signer == pk_lid {
                    if found_sig {
                        info!(
                            target: "trustdb",
                            "key {}.{lid}, uid {abbrev}, sig {}: \
                             duplicated signature - deleted",
                            pass.keyid,
                            sig.keyid
                        );
                        if let Some(s) = srec.slots.get_mut(idx) {
                            s.clear();
                        }
                        dirty = true;
                        continue;
                    }
                    found_sig = true;
                }
                if slot.flags.checked() || slot.flags.pubkey_missing() {
                    continue;
                }

                let new_flags =
                    self.settle_unchecked_slot(kb, node_idx, sig, lid, &abbrev, slot)?;
                if let Some(flags) = new_flags {
                    if let Some(s) = srec.slots.get_mut(idx) {
                        s.flags = flags;
                    }
                    dirty = true;
                }
            }

            if dirty {
                self.write_rec(recno, &Record::Sig(srec.clone()))?;
            }
            recno = srec.next;
        }

        if found_sig {
            return Ok(());
        }

        // The signature is not recorded yet: verify it now and place the
        // outcome into a reused free slot or a fresh record at the chain
        // head.
        let (newlid, newflags) = if pk_lid == 0 {
            if self.options.verbose > 1 {
                info!(
                    target: "trustdb",
                    "key {}.{lid}, uid {abbrev}, sig {}: no public key",
                    pass.keyid,
                    sig.keyid
                );
            }
            (self.create_shadow_dir(sig, lid)?, SigFlags::no_pubkey())
        } else {
            match self.keyring.check_key_signature(kb, node_idx).verdict {
                SigVerify::Good => {
                    if self.options.verbose > 0 {
                        info!(
                            target: "trustdb",
                            "key {}.{lid}, uid {abbrev}, sig {}: good signature",
                            pass.keyid,
                            sig.keyid
                        );
                    }
                    (pk_lid, SigFlags::checked_valid())
                }
                SigVerify::NoPubkey => {
                    info!(
                        target: "trustdb",
                        "key {}.{lid}, uid {abbrev}, sig {}: \
                         weird: no public key",
                        pass.keyid,
                        sig.keyid
                    );
                    (self.create_shadow_dir(sig, lid)?, SigFlags::no_pubkey())
                }
                SigVerify::Bad(reason) => {
                    info!(
                        target: "trustdb",
                        "key {}.{lid}, uid {abbrev}, sig {}: {reason}",
                        pass.keyid,
                        sig.keyid
                    );
                    (pk_lid, SigFlags::checked_invalid())
                }
            }
        };

        let new_slot = SigSlot { signer: newlid, flags: newflags };
        if let Some((recno, idx)) = free_slot {
            let mut srec = self.read_sig(recno)?;
            if let Some(s) = srec.slots.get_mut(idx) {
                *s = new_slot;
            }
            self.write_rec(recno, &Record::Sig(srec))?;
        } else {
            let newrecno = self.new_recnum()?;
            let mut srec = SigRecord {
                lid,
                slots: Default::default(),
                next: urec.siglist,
            };
            if let Some(s) = srec.slots.first_mut() {
                *s = new_slot;
            }
            self.write_rec(newrecno, &Record::Sig(srec))?;
            urec.siglist = newrecno;
            self.write_rec(pass.uidrec, &Record::Uid(urec))?;
        }
        Ok(())
    }

    /// Decides an unchecked slot encountered during the sweep. A slot
    /// pointing at a real directory gets the verifier's verdict on this
    /// signature; one pointing at the right shadow directory is marked
    /// deferred; anything else is corruption.
    fn settle_unchecked_slot(
        &mut self,
        kb: &Keyblock,
        node_idx: usize,
        sig: &Signature,
        lid: Lid,
        abbrev: &str,
        slot: SigSlot,
    ) -> Result<Option<SigFlags>, TrustError> {
        let target = self.read_rec(slot.signer, RecordType::Any)?;
        match target {
            Record::Dir(_) => {
                let flags = match self.keyring.check_key_signature(kb, node_idx).verdict
                {
                    SigVerify::Good => {
                        if self.options.verbose > 0 {
                            info!(
                                target: "trustdb",
                                "lid {lid}, uid {abbrev}, sig {}: good signature",
                                sig.keyid
                            );
                        }
                        SigFlags::checked_valid()
                    }
                    SigVerify::NoPubkey => {
                        info!(
                            target: "trustdb",
                            "lid {lid}, uid {abbrev}, sig {}: \
                             weird: no public key",
                            sig.keyid
                        );
                        SigFlags::no_pubkey()
                    }
                    SigVerify::Bad(reason) => {
                        info!(
                            target: "trustdb",
                            "lid {lid}, uid {abbrev}, sig {}: {reason}",
                            sig.keyid
                        );
                        SigFlags::checked_invalid()
                    }
                };
                Ok(Some(flags))
            }
            Record::Sdir(sdir) => {
                if sdir.keyid == sig.keyid
                    && (sdir.pubkey_algo == 0
                        || sdir.pubkey_algo == sig.pubkey_algo)
                {
                    info!(
                        target: "trustdb",
                        "lid {lid}, uid {abbrev}: has shadow dir {} \
                         but not yet marked",
                        sdir.lid
                    );
                    Ok(Some(SigFlags::no_pubkey()))
                } else {
                    Ok(None)
                }
            }
            other => {
                error!(
                    target: "trustdb",
                    "sig slot points at {} record {}",
                    other.rectype(),
                    slot.signer
                );
                Err(TrustError::Corrupt(format!(
                    "signature slot references a {} record",
                    other.rectype()
                )))
            }
        }
    }

    /// Deletes key records that no longer correspond to a keyblock key.
    fn delete_dropped_keys(
        &mut self,
        dir: &mut DirState,
        retained: &RecnoList,
    ) -> Result<(), TrustError> {
        let mut last = 0;
        let mut recno = dir.rec.keylist;
        while recno != 0 {
            let krec = self.read_key(recno)?;
            let next = krec.next;
            if retained.contains(recno, RecordType::Key) {
                last = recno;
            } else {
                if last == 0 {
                    dir.rec.keylist = next;
                    dir.mark_dirty();
                } else {
                    let mut prev = self.read_key(last)?;
                    prev.next = next;
                    self.write_rec(last, &Record::Key(prev))?;
                }
                self.delete_rec(recno)?;
                dir.touched = true;
            }
            recno = next;
        }
        Ok(())
    }

    /// Deletes user-id records that no longer correspond to a keyblock
    /// user id, cascading to their preference and signature chains.
    fn delete_dropped_uids(
        &mut self,
        dir: &mut DirState,
        retained: &RecnoList,
    ) -> Result<(), TrustError> {
        let mut last = 0;
        let mut recno = dir.rec.uidlist;
        while recno != 0 {
            let urec = self.read_uid(recno)?;
            let next = urec.next;
            if retained.contains(recno, RecordType::Uid) {
                last = recno;
            } else {
                if last == 0 {
                    dir.rec.uidlist = next;
                    dir.mark_dirty();
                } else {
                    let mut prev = self.read_uid(last)?;
                    prev.next = next;
                    self.write_rec(last, &Record::Uid(prev))?;
                }
                let mut prefrn = urec.prefrec;
                while prefrn != 0 {
                    let prec = self.read_pref(prefrn)?;
                    self.delete_rec(prefrn)?;
                    prefrn = prec.next;
                }
                let mut sigrn = urec.siglist;
                while sigrn != 0 {
                    let srec = self.read_sig(sigrn)?;
                    self.delete_rec(sigrn)?;
                    sigrn = srec.next;
                }
                self.delete_rec(recno)?;
                dir.touched = true;
            }
            recno = next;
        }
        Ok(())
    }
}
