// Path: crates/trustdb/src/db.rs

//! The trust database handle: store and keyring ownership, startup
//! seeding of the ultimately-trusted set, and the small query surface.

use crate::lidtab::LidTable;
use tracing::{debug, error, info};
use wot_api::keyring::{Keyring, KeyringError};
use wot_api::store::RecordStore;
use wot_types::config::TrustOptions;
use wot_types::error::TrustError;
use wot_types::keyblock::{KeyId, Keyblock, NameHash, PrefItemType, PublicKey};
use wot_types::prelude::OptionExt;
use wot_types::records::{
    DirRecord, HlstRecord, KeyRecord, Lid, PrefRecord, Recno, Record,
    RecordType, SdirRecord, SigRecord, UidRecord,
};
use wot_types::trust::Ownertrust;

/// Seconds since the epoch, for creation/expiry comparisons.
pub(crate) fn make_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Maps a keyring failure onto the trust-database error space, keeping the
/// not-found sentinel distinguishable.
pub(crate) fn ring_err(e: KeyringError) -> TrustError {
    match e {
        KeyringError::NotFound => TrustError::NotFound,
        other => TrustError::General(other.to_string()),
    }
}

/// The trust database core.
///
/// Owns the record store, the keyring service, the evaluation options, and
/// the process-wide set of ultimately-trusted local ids (rebuilt from the
/// secret keyring at [`TrustDb::init`] level 1).
pub struct TrustDb<S, K> {
    pub(crate) store: S,
    pub(crate) keyring: K,
    pub(crate) options: TrustOptions,
    pub(crate) ultikeys: LidTable,
}

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Wraps an opened record store and a keyring service.
    pub fn new(store: S, keyring: K, options: TrustOptions) -> Self {
        Self { store, keyring, options, ultikeys: LidTable::new() }
    }

    /// Startup entry point. Level 0 performs no work beyond having opened
    /// the store; level 1 additionally seeds the ultimately-trusted set
    /// from the local secret keys, inserting missing trust records.
    pub fn init(&mut self, level: u8) -> Result<(), TrustError> {
        match level {
            0 => Ok(()),
            1 => self.verify_own_keys(),
            n => Err(TrustError::General(format!("invalid init level {n}"))),
        }
    }

    /// The evaluation options in use.
    pub fn options(&self) -> &TrustOptions {
        &self.options
    }

    /// Mutable access to the evaluation options.
    pub fn options_mut(&mut self) -> &mut TrustOptions {
        &mut self.options
    }

    /// Whether `lid` belongs to one of the local user's own keys.
    pub fn is_ultimately_trusted(&self, lid: Lid) -> bool {
        self.ultikeys.contains(lid)
    }

    // ---- record access helpers -------------------------------------

    // Store failures below are unconditionally database corruption: a
    // partially updated record graph is unsafe to keep working on.

    pub(crate) fn read_rec(
        &self,
        recno: Recno,
        expect: RecordType,
    ) -> Result<Record, TrustError> {
        self.store.read(recno, expect).map_err(|e| {
            error!(
                target: "trustdb",
                "trust record {recno}, req type {expect}: read failed: {e}"
            );
            TrustError::Corrupt(e.to_string())
        })
    }

    pub(crate) fn write_rec(
        &mut self,
        recno: Recno,
        rec: &Record,
    ) -> Result<(), TrustError> {
        self.store.write(recno, rec).map_err(|e| {
            error!(
                target: "trustdb",
                "trust record {recno}, type {}: write failed: {e}",
                rec.rectype()
            );
            TrustError::Corrupt(e.to_string())
        })
    }

    pub(crate) fn delete_rec(&mut self, recno: Recno) -> Result<(), TrustError> {
        self.store.delete(recno).map_err(|e| {
            error!(target: "trustdb", "trust record {recno}: delete failed: {e}");
            TrustError::Corrupt(e.to_string())
        })
    }

    pub(crate) fn new_recnum(&mut self) -> Result<Recno, TrustError> {
        self.store
            .new_recnum()
            .map_err(|e| TrustError::Corrupt(e.to_string()))
    }

    pub(crate) fn do_sync(&mut self) -> Result<(), TrustError> {
        self.store.sync().map_err(|e| {
            error!(target: "trustdb", "trust db: sync failed: {e}");
            TrustError::Corrupt(e.to_string())
        })
    }

    pub(crate) fn read_dir(&self, recno: Recno) -> Result<DirRecord, TrustError> {
        self.read_rec(recno, RecordType::Dir)?
            .into_dir()
            .required(TrustError::Corrupt("dir record expected".into()))
    }

    pub(crate) fn read_key(&self, recno: Recno) -> Result<KeyRecord, TrustError> {
        self.read_rec(recno, RecordType::Key)?
            .into_key()
            .required(TrustError::Corrupt("key record expected".into()))
    }

    pub(crate) fn read_uid(&self, recno: Recno) -> Result<UidRecord, TrustError> {
        self.read_rec(recno, RecordType::Uid)?
            .into_uid()
            .required(TrustError::Corrupt("uid record expected".into()))
    }

    pub(crate) fn read_pref(&self, recno: Recno) -> Result<PrefRecord, TrustError> {
        self.read_rec(recno, RecordType::Pref)?
            .into_pref()
            .required(TrustError::Corrupt("pref record expected".into()))
    }

    pub(crate) fn read_sig(&self, recno: Recno) -> Result<SigRecord, TrustError> {
        self.read_rec(recno, RecordType::Sig)?
            .into_sig()
            .required(TrustError::Corrupt("sig record expected".into()))
    }

    pub(crate) fn read_sdir(&self, recno: Recno) -> Result<SdirRecord, TrustError> {
        self.read_rec(recno, RecordType::Sdir)?
            .into_sdir()
            .required(TrustError::Corrupt("sdir record expected".into()))
    }

    pub(crate) fn read_hlst(&self, recno: Recno) -> Result<HlstRecord, TrustError> {
        self.read_rec(recno, RecordType::Hlst)?
            .into_hlst()
            .required(TrustError::Corrupt("hlst record expected".into()))
    }

    /// Runs `f` inside the store's single transaction level, committing on
    /// success and cancelling on any error path.
    pub(crate) fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrustError>,
    ) -> Result<T, TrustError> {
        self.store
            .begin_transaction()
            .map_err(|e| TrustError::Corrupt(e.to_string()))?;
        match f(self) {
            Ok(v) => {
                self.store
                    .commit_transaction()
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?;
                Ok(v)
            }
            Err(e) => {
                if let Err(c) = self.store.cancel_transaction() {
                    error!(target: "trustdb", "cancelling transaction failed: {c}");
                }
                Err(e)
            }
        }
    }

    // ---- directory lookup ------------------------------------------

    /// Finds the directory record of `pk`, setting `pk.local_id` on
    /// success. `TrustError::NotFound` when the key has no record yet.
    pub(crate) fn get_dir_record(
        &self,
        pk: &mut PublicKey,
    ) -> Result<DirRecord, TrustError> {
        let rec = if pk.local_id != 0 {
            self.read_dir(pk.local_id)?
        } else {
            let lid = self
                .store
                .search_dir_by_fingerprint(&pk.fingerprint)
                .map_err(|e| {
                    error!(
                        target: "trustdb",
                        "search dir record failed: {e}"
                    );
                    TrustError::Corrupt(e.to_string())
                })?
                .required(TrustError::NotFound)?;
            self.read_dir(lid)?
        };
        pk.local_id = rec.lid;
        Ok(rec)
    }

    /// Looks the key up in the trust database, ensuring `pk.local_id` is
    /// set. `TrustError::NotFound` when absent.
    pub fn query_trust_record(&self, pk: &mut PublicKey) -> Result<Lid, TrustError> {
        self.get_dir_record(pk).map(|rec| rec.lid)
    }

    /// The key id of the primary key named by `lid` (the stored key id for
    /// a shadow directory).
    pub fn keyid_from_lid(&self, lid: Lid) -> Result<KeyId, TrustError> {
        let rec = self.store.read(lid, RecordType::Any).map_err(|e| {
            error!(
                target: "trustdb",
                "error reading dir record for LID {lid}: {e}"
            );
            TrustError::Corrupt(e.to_string())
        })?;
        match rec {
            Record::Sdir(sdir) => Ok(sdir.keyid),
            Record::Dir(dir) => {
                if dir.keylist == 0 {
                    error!(target: "trustdb", "no primary key for LID {lid}");
                    return Err(TrustError::General(format!(
                        "no primary key for LID {lid}"
                    )));
                }
                let krec = self.read_key(dir.keylist)?;
                self.keyring
                    .keyid_from_fingerprint(&krec.fingerprint)
                    .map_err(ring_err)
            }
            other => {
                error!(
                    target: "trustdb",
                    "lid {lid}: expected dir record, got {}",
                    other.rectype()
                );
                Err(TrustError::General(format!(
                    "lid {lid} does not name a directory record"
                )))
            }
        }
    }

    /// The local id of a keyblock's primary key, resolving through the
    /// database when the block has not been stamped yet.
    pub fn lid_from_keyblock(&self, kb: &mut Keyblock) -> Result<Lid, TrustError> {
        let pk = kb
            .primary_mut()
            .required(TrustError::General("keyblock without primary key".into()))?;
        if pk.local_id == 0 {
            self.get_dir_record(pk)?;
        }
        Ok(pk.local_id)
    }

    // ---- owner trust ------------------------------------------------

    /// The assigned owner trust of `lid`.
    pub fn get_ownertrust(&self, lid: Lid) -> Result<Ownertrust, TrustError> {
        Ok(self.read_dir(lid)?.ownertrust)
    }

    /// Letter code of the assigned owner trust (`-` when unset).
    pub fn get_ownertrust_info(&self, lid: Lid) -> Result<char, TrustError> {
        Ok(self.get_ownertrust(lid)?.letter())
    }

    /// Assigns a new owner trust value and makes it durable.
    pub fn update_ownertrust(
        &mut self,
        lid: Lid,
        new_trust: Ownertrust,
    ) -> Result<(), TrustError> {
        let mut rec = self.read_dir(lid)?;
        rec.ownertrust = new_trust;
        self.write_rec(lid, &Record::Dir(rec))?;
        self.do_sync()
    }

    /// Drops the cached trust verdict of a key, forcing re-evaluation.
    pub fn clear_trust_checked_flag(
        &mut self,
        pk: &mut PublicKey,
    ) -> Result<(), TrustError> {
        let mut rec = self.get_dir_record(pk)?;
        if !rec.flags.checked() {
            return Ok(());
        }
        rec.flags.set_checked(false);
        self.write_rec(rec.lid, &Record::Dir(rec))?;
        self.do_sync()
    }

    // ---- preferences ------------------------------------------------

    /// The preference data of a user id of `lid`: the first user id when
    /// `namehash` is `None`, otherwise the one with that name hash.
    pub fn get_pref_data(
        &self,
        lid: Lid,
        namehash: Option<&NameHash>,
    ) -> Result<Option<Vec<u8>>, TrustError> {
        let dir = self.read_dir(lid)?;
        let mut recno = dir.uidlist;
        while recno != 0 {
            let urec = self.read_uid(recno)?;
            recno = urec.next;
            if urec.prefrec == 0 {
                continue;
            }
            if let Some(wanted) = namehash {
                if *wanted != urec.namehash {
                    continue;
                }
            }
            let prec = self.read_pref(urec.prefrec)?;
            if prec.next != 0 {
                info!(
                    target: "trustdb",
                    "lid {lid}: only the first preference record is returned"
                );
            }
            return Ok(Some(prec.data));
        }
        Ok(None)
    }

    /// Whether `(preftype, algo)` appears in any preference record of any
    /// user id of `lid`.
    pub fn is_algo_in_prefs(
        &self,
        lid: Lid,
        preftype: PrefItemType,
        algo: u8,
    ) -> Result<bool, TrustError> {
        let dir = self.read_dir(lid)?;
        let mut uidrn = dir.uidlist;
        while uidrn != 0 {
            let urec = self.read_uid(uidrn)?;
            uidrn = urec.next;
            let mut prefrn = urec.prefrec;
            while prefrn != 0 {
                let prec = self.read_pref(prefrn)?;
                prefrn = prec.next;
                for pair in prec.data.chunks_exact(2) {
                    if pair.first() == Some(&(preftype as u8))
                        && pair.get(1) == Some(&algo)
                    {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    // ---- startup seeding --------------------------------------------

    /// Makes sure every local secret key has a trust record and is in the
    /// ultimately-trusted set. Individual broken keys are skipped with a
    /// log, not a failure.
    fn verify_own_keys(&mut self) -> Result<(), TrustError> {
        let secrets = self.keyring.enum_secret_keys().map_err(|e| {
            error!(target: "trustdb", "enumerating secret keys failed: {e}");
            TrustError::General(e.to_string())
        })?;

        for sk in secrets {
            debug!(target: "trustdb", "key {}: checking secret key", sk.keyid);
            if !sk.protected {
                info!(
                    target: "trustdb",
                    "note: secret key {} is NOT protected", sk.keyid
                );
            }

            let mut pk = match self.keyring.get_pubkey(&sk.keyid) {
                Ok(pk) => pk,
                Err(KeyringError::NotFound) => {
                    info!(
                        target: "trustdb",
                        "key {}: secret key without public key - skipped",
                        sk.keyid
                    );
                    continue;
                }
                Err(e) => return Err(TrustError::General(e.to_string())),
            };

            if !sk.matches(&pk) {
                info!(
                    target: "trustdb",
                    "key {}: secret and public key don't match", sk.keyid
                );
                continue;
            }

            match self.query_trust_record(&mut pk) {
                Ok(_) => {}
                Err(TrustError::NotFound) => {
                    if let Err(e) = self.insert_trust_record(&mut pk) {
                        error!(
                            target: "trustdb",
                            "key {}: can't put it into the trustdb: {e}",
                            sk.keyid
                        );
                        continue;
                    }
                }
                Err(e) => {
                    error!(
                        target: "trustdb",
                        "key {}: query record failed: {e}", sk.keyid
                    );
                    continue;
                }
            }

            debug!(
                target: "trustdb",
                "key {}.{}: stored into ultikey table", sk.keyid, pk.local_id
            );
            if self.ultikeys.insert(pk.local_id, 0) {
                error!(
                    target: "trustdb",
                    "key {}: already in secret key table", sk.keyid
                );
            } else if self.options.verbose > 0 {
                info!(
                    target: "trustdb",
                    "key {}: accepted as secret key", sk.keyid
                );
            }
        }
        Ok(())
    }
}
