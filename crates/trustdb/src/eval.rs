// Path: crates/trustdb/src/eval.rs

//! The trust evaluator: a depth-bounded walk of the certification graph
//! from a subject key toward the ultimately-trusted keys.
//!
//! The graph is arbitrarily cyclic; termination comes from the depth bound
//! alone, and the ultimate short-circuit keeps paths through the user's own
//! keys cheap. No memoization is attempted across walks.

use crate::db::{make_timestamp, TrustDb};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::keyblock::PublicKey;
use wot_types::records::DirRecord;
use wot_types::trust::{TrustLevel, TrustVerdict};

fn format_timestamp(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.to_rfc2822())
        .unwrap_or_else(|| secs.to_string())
}

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Walks all certifications of `drec`, recursing into each usable
    /// signer, and condenses the quorum into a single level.
    pub(crate) fn verify_key(
        &self,
        depth: u32,
        max_depth: u32,
        drec: &DirRecord,
    ) -> Result<TrustLevel, TrustError> {
        debug!(
            target: "trustdb",
            "verify_key: depth={depth} lid={} ot={}",
            drec.lid,
            drec.ownertrust.letter()
        );
        if depth >= max_depth {
            debug!(target: "trustdb", "lid {}: undefined (too deep)", drec.lid);
            return Ok(TrustLevel::Undefined);
        }
        if self.ultikeys.contains(drec.lid) {
            // end of a path
            debug!(target: "trustdb", "lid {}: ultimate", drec.lid);
            return Ok(TrustLevel::Ultimate);
        }

        let mut marginal_count = 0u32;
        let mut fully_count = 0u32;

        let mut uidrn = drec.uidlist;
        while uidrn != 0 {
            let urec = self.read_uid(uidrn)?;
            uidrn = urec.next;

            let mut sigrn = urec.siglist;
            while sigrn != 0 {
                let srec = self.read_sig(sigrn)?;
                sigrn = srec.next;

                for slot in srec.slots.iter().filter(|s| !s.is_free()) {
                    if !slot.flags.usable() {
                        continue;
                    }

                    let signer = self.read_dir(slot.signer)?;
                    let mut ot = signer.ownertrust.level();
                    if ot >= TrustLevel::Fully {
                        ot = TrustLevel::Fully;
                    }

                    let nt = self.verify_key(depth + 1, max_depth, &signer)?;
                    if nt < TrustLevel::Marginal {
                        continue;
                    }

                    if nt == TrustLevel::Ultimate {
                        // The local user signed this key personally, which
                        // collapses both quorums to one: the owner trust of
                        // the signer is the verdict.
                        debug!(
                            target: "trustdb",
                            "lid {}: {} (1st level)", drec.lid, ot.letter()
                        );
                        return Ok(ot);
                    }

                    if nt >= TrustLevel::Fully {
                        fully_count += 1;
                    }
                    if nt >= TrustLevel::Marginal {
                        marginal_count += 1;
                    }

                    if fully_count >= self.options.completes_needed
                        || marginal_count >= self.options.marginals_needed
                    {
                        debug!(target: "trustdb", "lid {}: fully", drec.lid);
                        return Ok(TrustLevel::Fully);
                    }
                }
            }
        }

        Ok(if marginal_count > 0 {
            debug!(target: "trustdb", "lid {}: marginal", drec.lid);
            TrustLevel::Marginal
        } else {
            debug!(target: "trustdb", "lid {}: undefined", drec.lid);
            TrustLevel::Undefined
        })
    }

    /// Evaluates a directory record whose key and user-id chains are
    /// already reconciled.
    pub(crate) fn do_check(
        &self,
        drec: &DirRecord,
    ) -> Result<TrustVerdict, TrustError> {
        if drec.keylist == 0 {
            error!(target: "trustdb", "lid {}: directory record has no keys", drec.lid);
            return Err(TrustError::General("directory record has no keys".into()));
        }
        if drec.uidlist == 0 {
            error!(
                target: "trustdb",
                "lid {}: directory record has no user ids", drec.lid
            );
            return Err(TrustError::General(
                "directory record has no user ids".into(),
            ));
        }

        let level = self.verify_key(1, self.options.max_cert_depth, drec)?;
        Ok(TrustVerdict { level, revoked: drec.flags.revoked() })
    }

    /// Computes the trust level of a public key, inserting a trust record
    /// first when the key has none yet.
    pub fn check_trust(
        &mut self,
        pk: &mut PublicKey,
    ) -> Result<TrustVerdict, TrustError> {
        let drec = if pk.local_id != 0 {
            self.read_dir(pk.local_id)?
        } else {
            match self.get_dir_record(pk) {
                Ok(rec) => rec,
                Err(TrustError::NotFound) => {
                    self.insert_trust_record(pk).map_err(|e| {
                        error!(
                            target: "trustdb",
                            "key {}: insert trust record failed: {e}", pk.keyid
                        );
                        e
                    })?;
                    info!(
                        target: "trustdb",
                        "key {}.{}: inserted into trustdb", pk.keyid, pk.local_id
                    );
                    self.read_dir(pk.local_id)?
                }
                Err(e) => return Err(e),
            }
        };

        let cur_time = make_timestamp();
        if pk.timestamp > cur_time {
            info!(
                target: "trustdb",
                "key {}.{}: created in future (time warp or clock problem)",
                pk.keyid,
                pk.local_id
            );
            return Err(TrustError::TimeConflict);
        }

        let verdict = if pk.expiredate != 0 && pk.expiredate <= cur_time {
            info!(
                target: "trustdb",
                "key {}.{}: expired at {}",
                pk.keyid,
                pk.local_id,
                format_timestamp(pk.expiredate)
            );
            TrustVerdict::clean(TrustLevel::Expired)
        } else {
            self.do_check(&drec).map_err(|e| {
                error!(
                    target: "trustdb",
                    "key {}.{}: trust check failed: {e}", pk.keyid, pk.local_id
                );
                e
            })?
        };

        debug!(target: "trustdb", "check_trust() returns {:?}", verdict);
        Ok(verdict)
    }

    /// The one-character answer of [`TrustDb::check_trust`], `?` on any
    /// error.
    pub fn query_trust_info(&mut self, pk: &mut PublicKey) -> char {
        match self.check_trust(pk) {
            Ok(verdict) => verdict.letter(),
            Err(_) => '?',
        }
    }
}
