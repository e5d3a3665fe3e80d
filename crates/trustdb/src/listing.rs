// Path: crates/trustdb/src/listing.rs

//! Human-readable listings: raw records, signature trees, and trust paths.
//!
//! All listing functions write to a caller-supplied stream; the trust
//! letters and the three-character signature-flag triplets are the stable
//! vocabulary shared with the batch tools.

use crate::db::TrustDb;
use crate::lidtab::LidTable;
use crate::sigwalk::SigWalk;
use std::io::Write;
use tracing::{error, info};
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_types::error::TrustError;
use wot_types::records::{DirRecord, Lid, Record, RecordType};
use wot_types::trust::TrustLevel;

/// Nesting cap of the recursive signature-tree listing.
const MAX_LIST_SIGS_DEPTH: u32 = 15;

impl<S: RecordStore, K: Keyring> TrustDb<S, K> {
    /// Lists the whole database, or one key. A name starting with `#`
    /// addresses a local id directly; any other name is resolved through
    /// the keyring.
    pub fn list_trustdb<W: Write>(
        &mut self,
        out: &mut W,
        username: Option<&str>,
    ) -> Result<(), TrustError> {
        match username {
            Some(arg) if arg.starts_with('#') => {
                let lid: Lid = arg
                    .trim_start_matches('#')
                    .parse()
                    .map_err(|_| {
                        TrustError::General(format!("bad lid argument '{arg}'"))
                    })?;
                self.list_records(out, lid)?;
                self.list_sigs(out, lid)
            }
            Some(name) => {
                let mut pk =
                    self.keyring.get_pubkey_by_name(name).map_err(|e| {
                        error!(target: "trustdb", "user '{name}' not found: {e}");
                        TrustError::NotFound
                    })?;
                let lid = self.query_trust_record(&mut pk).map_err(|e| {
                    error!(target: "trustdb", "user '{name}' not in trustdb");
                    e
                })?;
                self.list_records(out, lid)?;
                self.list_sigs(out, lid)
            }
            None => {
                let name = self.store.name();
                writeln!(out, "TrustDB: {name}")?;
                writeln!(out, "{}", "-".repeat(name.len() + 9))?;
                for recno in self
                    .store
                    .iter_recnums()
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                {
                    let rec = self.read_rec(recno, RecordType::Any)?;
                    writeln!(out, "rec {recno:5}: {rec}")?;
                }
                Ok(())
            }
        }
    }

    /// Dumps every record reachable from one directory: the directory
    /// itself, its keys, and each user id with its preference and
    /// signature records.
    pub fn list_records<W: Write>(
        &self,
        out: &mut W,
        lid: Lid,
    ) -> Result<(), TrustError> {
        let dir = self.read_dir(lid)?;
        writeln!(out, "rec {:5}: {}", lid, Record::Dir(dir.clone()))?;

        let mut recno = dir.keylist;
        while recno != 0 {
            let krec = self.read_key(recno)?;
            writeln!(out, "rec {:5}: {}", recno, Record::Key(krec.clone()))?;
            recno = krec.next;
        }

        let mut uidrn = dir.uidlist;
        while uidrn != 0 {
            let urec = self.read_uid(uidrn)?;
            writeln!(out, "rec {:5}: {}", uidrn, Record::Uid(urec.clone()))?;
            let mut prefrn = urec.prefrec;
            while prefrn != 0 {
                let prec = self.read_pref(prefrn)?;
                writeln!(out, "rec {:5}: {}", prefrn, Record::Pref(prec.clone()))?;
                prefrn = prec.next;
            }
            let mut sigrn = urec.siglist;
            while sigrn != 0 {
                let srec = self.read_sig(sigrn)?;
                writeln!(out, "rec {:5}: {}", sigrn, Record::Sig(srec.clone()))?;
                sigrn = srec.next;
            }
            uidrn = urec.next;
        }
        Ok(())
    }

    /// Prints the signature tree of a key, recursing into signers.
    /// Re-visited keys print a back-reference to the line that already
    /// expanded them.
    pub fn list_sigs<W: Write>(&self, out: &mut W, lid: Lid) -> Result<(), TrustError> {
        let keyid = self.keyid_from_lid(lid)?;
        writeln!(
            out,
            "Signatures of {keyid}.{lid} \"{}\"",
            self.user_id_string(lid)
        )?;
        writeln!(out, "----------------------")?;

        let mut lids = LidTable::new();
        let mut lineno: u32 = 1;
        self.do_list_sigs(out, lid, lid, 0, &mut lids, &mut lineno)?;
        writeln!(out)?;
        Ok(())
    }

    fn user_id_string(&self, lid: Lid) -> String {
        self.keyid_from_lid(lid)
            .ok()
            .and_then(|keyid| self.keyring.get_user_id(&keyid))
            .unwrap_or_else(|| "[?]".into())
    }

    fn do_list_sigs<W: Write>(
        &self,
        out: &mut W,
        root: Lid,
        pk_lid: Lid,
        depth: u32,
        lids: &mut LidTable,
        lineno: &mut u32,
    ) -> Result<(), TrustError> {
        let indent = (depth * 4) as usize;
        let mut walk = SigWalk::new(pk_lid);
        while let Some((sig_lid, flags)) = walk.next(&self.store)? {
            let line = *lineno;
            *lineno += 1;
            let Ok(keyid) = self.keyid_from_lid(sig_lid) else {
                writeln!(
                    out,
                    "{line:6}: {:indent$}????????.{sig_lid}:{}",
                    "",
                    flags.triplet()
                )?;
                continue;
            };
            write!(
                out,
                "{line:6}: {:indent$}{keyid}.{sig_lid}:{} ",
                "",
                flags.triplet()
            )?;
            if self.ultikeys.contains(sig_lid) {
                writeln!(
                    out,
                    "[ultimately trusted] \"{}\"",
                    self.user_id_string(sig_lid)
                )?;
            } else if sig_lid == pk_lid {
                writeln!(out, "[self-signature]")?;
            } else if sig_lid == root {
                writeln!(out, "[closed]")?;
            } else if lids.insert(sig_lid, line) {
                let refline = lids.lookup(sig_lid).unwrap_or(0);
                writeln!(out, "[see line {refline}]")?;
            } else if depth + 1 >= MAX_LIST_SIGS_DEPTH {
                writeln!(
                    out,
                    "[too deeply nested] \"{}\"",
                    self.user_id_string(sig_lid)
                )?;
            } else {
                writeln!(out, "\"{}\"", self.user_id_string(sig_lid))?;
                self.do_list_sigs(out, root, sig_lid, depth + 1, lids, lineno)?;
            }
        }
        Ok(())
    }

    /// Prints every certification path from the named key to an
    /// ultimately-trusted key, up to `max_depth` hops. The key is inserted
    /// into the database first when it is missing.
    pub fn list_trust_path<W: Write>(
        &mut self,
        out: &mut W,
        max_depth: i32,
        name: &str,
    ) -> Result<(), TrustError> {
        let max_depth = std::cmp::max(1, max_depth.unsigned_abs());

        let mut pk = self.keyring.get_pubkey_by_name(name).map_err(|e| {
            error!(target: "trustdb", "user '{name}' not found: {e}");
            TrustError::NotFound
        })?;
        match self.query_trust_record(&mut pk) {
            Ok(_) => {}
            Err(TrustError::NotFound) => {
                info!(
                    target: "trustdb",
                    "user '{name}' not in trustdb - inserting"
                );
                self.insert_trust_record(&mut pk)?;
            }
            Err(e) => return Err(e),
        }

        let drec = self.read_dir(pk.local_id)?;
        let mut path = Vec::new();
        let mut found = 0usize;
        self.walk_trust_paths(out, &drec, 0, max_depth, &mut path, &mut found)?;
        if found == 0 {
            writeln!(out, "No trust path found for '{name}'.")?;
        }
        Ok(())
    }

    fn walk_trust_paths<W: Write>(
        &self,
        out: &mut W,
        drec: &DirRecord,
        depth: u32,
        max_depth: u32,
        path: &mut Vec<(Lid, TrustLevel)>,
        found: &mut usize,
    ) -> Result<(), TrustError> {
        if self.ultikeys.contains(drec.lid) {
            *found += 1;
            writeln!(out, "path {}:", *found)?;
            for (hop, (lid, ot)) in path.iter().enumerate() {
                let keyid = self
                    .keyid_from_lid(*lid)
                    .map(|k| k.to_string())
                    .unwrap_or_else(|_| "????????".into());
                writeln!(
                    out,
                    "  {:hop$}{keyid}.{lid} ({}) \"{}\"",
                    "",
                    ot.letter(),
                    self.user_id_string(*lid),
                    hop = hop * 2
                )?;
            }
            let keyid = self
                .keyid_from_lid(drec.lid)
                .map(|k| k.to_string())
                .unwrap_or_else(|_| "????????".into());
            writeln!(
                out,
                "  {:hop$}{keyid}.{} [ultimately trusted]",
                "",
                drec.lid,
                hop = path.len() * 2
            )?;
            return Ok(());
        }
        if depth >= max_depth {
            return Ok(());
        }

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
                    // Cycles terminate through the depth bound; a signer
                    // already on this path is pointless to expand again.
                    if path.iter().any(|(lid, _)| *lid == slot.signer) {
                        continue;
                    }
                    let signer = self.read_dir(slot.signer)?;
                    path.push((drec.lid, drec.ownertrust.level()));
                    self.walk_trust_paths(
                        out, &signer, depth + 1, max_depth, path, found,
                    )?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}
