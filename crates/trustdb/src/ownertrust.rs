// Path: crates/trustdb/src/ownertrust.rs

//! Bulk export and import of assigned owner-trust values.
//!
//! The wire format is line-oriented UTF-8: `#` comment lines, then one
//! `<fingerprint hex>:<value>:` line per key. Fingerprints are 32 or 40
//! hex digits. A zero value carries no information and is skipped on
//! import; unknown fingerprints are resolved through the keyring and
//! inserted before the value is applied.

use crate::db::TrustDb;
use chrono::Utc;
use std::io::{BufRead, Write};
use tracing::{error, info};
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::keyblock::Fingerprint;
use wot_types::records::Record;
use wot_types::trust::Ownertrust;

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Writes every assigned owner-trust value, one line per key, behind a
    /// timestamped comment header.
    pub fn export_ownertrust<W: Write>(&self, out: &mut W) -> Result<(), TrustError> {
        writeln!(
            out,
            "# List of assigned trustvalues, created {}",
            Utc::now().format("%a, %d %b %Y %H:%M:%S %z")
        )?;
        writeln!(out, "# (Use \"import-ownertrust\" to restore them)")?;

        for recno in self
            .store
            .iter_recnums()
            .map_err(|e| TrustError::Corrupt(e.to_string()))?
        {
            let rec = self.read_rec(recno, wot_types::records::RecordType::Any)?;
            let Record::Dir(dir) = rec else { continue };
            if dir.keylist == 0 {
                error!(
                    target: "trustdb",
                    "lid {recno}: directory record without primary key"
                );
                continue;
            }
            if !dir.ownertrust.is_set() {
                continue;
            }
            let krec = match self.read_key(dir.keylist) {
                Ok(k) => k,
                Err(e) => {
                    error!(target: "trustdb", "error reading key record: {e}");
                    continue;
                }
            };
            writeln!(out, "{}:{}:", krec.fingerprint, dir.ownertrust.0)?;
        }
        Ok(())
    }

    /// Reads owner-trust lines, updating directory records and inserting
    /// trust records for keys that are in the ring but not yet in the
    /// database. Malformed lines are logged and skipped.
    pub fn import_ownertrust<R: BufRead>(
        &mut self,
        input: R,
    ) -> Result<(), TrustError> {
        for line in input.lines() {
            let line = line?;
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(':');
            let fprhex = fields.next().unwrap_or_default();
            if !(fprhex.len() == 32 || fprhex.len() == 40)
                || !fprhex.chars().all(|c| c.is_ascii_hexdigit())
            {
                error!(target: "trustdb", "import: invalid fingerprint");
                continue;
            }
            let Some(value) = fields.next() else {
                error!(target: "trustdb", "import: missing colon");
                continue;
            };
            // The value must be colon-terminated.
            let (Ok(otrust), Some(_)) = (value.parse::<u8>(), fields.next()) else {
                error!(target: "trustdb", "import: no otrust value");
                continue;
            };
            if otrust == 0 {
                continue;
            }
            let fpr = match Fingerprint::from_hex(fprhex) {
                Ok(f) => f,
                Err(_) => {
                    error!(target: "trustdb", "import: invalid fingerprint");
                    continue;
                }
            };

            let mut inserted = false;
            loop {
                match self
                    .store
                    .search_dir_by_fingerprint(&fpr)
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                {
                    Some(lid) => {
                        let mut dir = self.read_dir(lid)?;
                        if dir.ownertrust.is_set() {
                            info!(
                                target: "trustdb",
                                "LID {lid}: changing trust from {} to {otrust}",
                                dir.ownertrust.0
                            );
                        } else {
                            info!(
                                target: "trustdb",
                                "LID {lid}: setting trust to {otrust}"
                            );
                        }
                        dir.ownertrust = Ownertrust(otrust);
                        self.write_rec(lid, &Record::Dir(dir))?;
                        break;
                    }
                    None if inserted => {
                        error!(
                            target: "trustdb",
                            "key {fpr} missing after insertion"
                        );
                        break;
                    }
                    None => {
                        info!(
                            target: "trustdb",
                            "key not in trustdb, searching ring"
                        );
                        let mut pk = match self.keyring.get_pubkey_by_fingerprint(&fpr)
                        {
                            Ok(pk) => pk,
                            Err(e) => {
                                info!(target: "trustdb", "key not in ring: {e}");
                                break;
                            }
                        };
                        if let Err(e) = self.insert_trust_record(&mut pk) {
                            error!(
                                target: "trustdb",
                                "insert trust record failed: {e}"
                            );
                            break;
                        }
                        inserted = true;
                    }
                }
            }
        }
        self.do_sync()
    }
}
