// Path: crates/trustdb/src/insert.rs

//! First insertion of a public key into the trust database.
//!
//! If signatures by this key were ingested earlier, a shadow directory
//! exists and its record number is reused for the new directory, so every
//! deferred signature slot keeps pointing at the right place. Promotion,
//! reconciliation, and hint-list draining run under one transaction: a
//! failure rolls all three back and the hint list stays anchored to the
//! shadow.

use crate::db::TrustDb;
use tracing::{debug, error};
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::keyblock::PublicKey;
use wot_types::records::{DirRecord, Record};

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Inserts a trust record for a key that has none yet, setting
    /// `pk.local_id` to the new directory's record number.
    pub fn insert_trust_record(
        &mut self,
        pk: &mut PublicKey,
    ) -> Result<(), TrustError> {
        if pk.local_id != 0 {
            return Err(TrustError::General(format!(
                "insert_trust_record called with local id {}",
                pk.local_id
            )));
        }

        let mut keyblock = self
            .keyring
            .get_keyblock_by_fingerprint(&pk.fingerprint)
            .map_err(|e| {
                error!(
                    target: "trustdb",
                    "insert_trust_record: keyblock not found: {e}"
                );
                TrustError::General(e.to_string())
            })?;

        // Paranoia: the fingerprint must have led us to the primary key.
        {
            let primary = keyblock.primary().ok_or_else(|| {
                TrustError::General("keyblock without primary key".into())
            })?;
            if primary.keyid != pk.keyid {
                error!(
                    target: "trustdb",
                    "did not use primary key for insert_trust_record"
                );
                return Err(TrustError::General(
                    "insertion requires the primary key".into(),
                ));
            }
        }

        let result = self.with_transaction(|db| {
            // A shadow left behind by earlier signatures is promoted in
            // place; its record number becomes the key's lid.
            let shadow = db
                .store
                .search_sdir(&pk.keyid, pk.pubkey_algo)
                .map_err(|e| TrustError::Corrupt(e.to_string()))?;
            let (recnum, hintlist) = match shadow {
                Some(recno) => {
                    let sdir = db.read_sdir(recno)?;
                    debug!(
                        target: "trustdb",
                        "key {}: promoting shadow dir {recno}", pk.keyid
                    );
                    (recno, sdir.hintlist)
                }
                None => (db.new_recnum()?, 0),
            };

            let dirrec = DirRecord { lid: recnum, ..DirRecord::default() };
            db.write_rec(recnum, &Record::Dir(dirrec.clone()))?;

            pk.local_id = recnum;
            keyblock.set_local_id(recnum);

            db.reconcile_keyblock(&keyblock, dirrec)?;

            if hintlist != 0 {
                db.process_hintlist(hintlist, recnum)?;
            }
            Ok(())
        });

        self.do_sync()?;
        result
    }
}
