// Path: crates/trustdb/src/batch.rs

//! Whole-database maintenance drivers.
//!
//! Both drivers are resilient: one broken key is counted and logged, the
//! batch keeps going. Progress is reported every 100 keys.

use crate::db::TrustDb;
use tracing::{error, info};
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::prelude::OptionExt;
use wot_types::records::{Record, RecordType};

/// Counters of one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Keys examined.
    pub processed: u64,
    /// Keys whose records changed.
    pub updated: u64,
    /// Keys newly inserted.
    pub inserted: u64,
    /// Keys that failed.
    pub errors: u64,
    /// Keys skipped (no key record, keyblock unavailable).
    pub skipped: u64,
}

impl BatchStats {
    fn log_summary(&self) {
        info!(target: "trustdb", "{} keys processed", self.processed);
        if self.skipped > 0 {
            info!(target: "trustdb", "\t{} keys skipped", self.skipped);
        }
        if self.errors > 0 {
            info!(target: "trustdb", "\t{} keys with errors", self.errors);
        }
        if self.updated > 0 {
            info!(target: "trustdb", "\t{} keys updated", self.updated);
        }
        if self.inserted > 0 {
            info!(target: "trustdb", "\t{} keys inserted", self.inserted);
        }
    }
}

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Re-checks the records of every key in the database (or of one named
    /// key) against the current keyring content.
    pub fn check_trustdb(
        &mut self,
        username: Option<&str>,
    ) -> Result<BatchStats, TrustError> {
        let mut stats = BatchStats::default();

        if let Some(name) = username {
            let mut keyblock =
                self.keyring.find_keyblock_by_name(name).map_err(|e| {
                    error!(
                        target: "trustdb",
                        "{name}: keyblock read problem: {e}"
                    );
                    TrustError::General(e.to_string())
                })?;
            stats.processed = 1;
            match self.update_trust_record(&mut keyblock) {
                Err(TrustError::NotFound) => {
                    let mut pk = keyblock.primary().cloned().required(
                        TrustError::General("keyblock without primary key".into()),
                    )?;
                    self.insert_trust_record(&mut pk)?;
                    info!(target: "trustdb", "{name}: inserted");
                    stats.inserted = 1;
                }
                Ok(true) => {
                    info!(target: "trustdb", "{name}: updated");
                    stats.updated = 1;
                }
                Ok(false) => {
                    info!(target: "trustdb", "{name}: okay");
                }
                Err(e) => {
                    error!(target: "trustdb", "{name}: update failed: {e}");
                    stats.errors = 1;
                }
            }
            return Ok(stats);
        }

        for recno in self
            .store
            .iter_recnums()
            .map_err(|e| TrustError::Corrupt(e.to_string()))?
        {
            let rec = self.read_rec(recno, RecordType::Any)?;
            let Record::Dir(dir) = rec else { continue };

            stats.processed += 1;
            if dir.keylist == 0 {
                info!(
                    target: "trustdb",
                    "lid {recno}: dir record w/o key - skipped"
                );
                stats.skipped += 1;
                continue;
            }
            let krec = self.read_key(dir.keylist)?;
            let mut keyblock = match self
                .keyring
                .get_keyblock_by_fingerprint(&krec.fingerprint)
            {
                Ok(kb) => kb,
                Err(e) => {
                    error!(
                        target: "trustdb",
                        "lid {recno}: keyblock not found: {e}"
                    );
                    stats.skipped += 1;
                    continue;
                }
            };
            match self.update_trust_record(&mut keyblock) {
                Ok(true) => {
                    if self.options.verbose > 0 {
                        info!(target: "trustdb", "lid {recno}: updated");
                    }
                    stats.updated += 1;
                }
                Ok(false) => {
                    if self.options.verbose > 1 {
                        info!(target: "trustdb", "lid {recno}: okay");
                    }
                }
                Err(e) => {
                    error!(target: "trustdb", "lid {recno}: update failed: {e}");
                    stats.errors += 1;
                }
            }
            if stats.processed % 100 == 0 {
                info!(
                    target: "trustdb",
                    "{} keys so far processed", stats.processed
                );
            }
        }
        stats.log_summary();
        Ok(stats)
    }

    /// Walks the whole keyring, updating existing trust records and
    /// inserting records for keys the database has never seen.
    pub fn update_trustdb(&mut self) -> Result<BatchStats, TrustError> {
        let mut stats = BatchStats::default();

        let keyblocks = self.keyring.enum_keyblocks().map_err(|e| {
            error!(target: "trustdb", "enum_keyblocks failed: {e}");
            TrustError::General(e.to_string())
        })?;

        for mut keyblock in keyblocks {
            stats.processed += 1;
            match self.update_trust_record(&mut keyblock) {
                Err(TrustError::NotFound) => {
                    let Some(mut pk) = keyblock.primary().cloned() else {
                        error!(
                            target: "trustdb",
                            "keyblock without primary key - skipped"
                        );
                        stats.errors += 1;
                        continue;
                    };
                    match self.insert_trust_record(&mut pk) {
                        Ok(()) => {
                            if self.options.verbose > 0 {
                                info!(
                                    target: "trustdb",
                                    "lid {}: inserted", pk.local_id
                                );
                            }
                            stats.inserted += 1;
                        }
                        Err(e) => {
                            error!(
                                target: "trustdb",
                                "lid {}: insert failed: {e}", pk.local_id
                            );
                            stats.errors += 1;
                        }
                    }
                }
                Ok(true) => {
                    if self.options.verbose > 0 {
                        let lid = keyblock
                            .primary()
                            .map(|pk| pk.local_id)
                            .unwrap_or_default();
                        info!(target: "trustdb", "lid {lid}: updated");
                    }
                    stats.updated += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(target: "trustdb", "update failed: {e}");
                    stats.errors += 1;
                }
            }
            if stats.processed % 100 == 0 {
                info!(
                    target: "trustdb",
                    "{} keys so far processed", stats.processed
                );
            }
        }
        stats.log_summary();
        Ok(stats)
    }
}
