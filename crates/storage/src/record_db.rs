// Path: crates/storage/src/record_db.rs

//! The redb-backed record store.
//!
//! ---- Table layout (single DB) ----
//! RECORDS:    be64(recno)          -> bincode(Record)
//! META:       "next_recnum"        -> u64 allocator watermark
//! FPR_INDEX:  fingerprint bytes    -> be64(key record recno)
//! SDIR_INDEX: keyid(8) || algo(1)  -> be64(sdir recno)
//!
//! Mutations are journaled in memory (`pending`) and applied through one
//! redb write transaction on flush. Reads consult the journal first, so an
//! open transaction observes its own writes. The search indexes are
//! maintained at flush time from the before/after image of each record;
//! while a journal is open, searches additionally scan the journal itself.

use crate::codec::{decode, encode};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use wot_api::store::{be64, RecordStore, StoreError};
use wot_types::keyblock::{Fingerprint, KeyId};
use wot_types::records::{Lid, Recno, Record, RecordType};

const RECORDS: TableDefinition<&[u8; 8], &[u8]> = TableDefinition::new("RECORDS");
const META: TableDefinition<&str, u64> = TableDefinition::new("META");
const FPR_INDEX: TableDefinition<&[u8], &[u8; 8]> = TableDefinition::new("FPR_INDEX");
const SDIR_INDEX: TableDefinition<&[u8], &[u8; 8]> =
    TableDefinition::new("SDIR_INDEX");

const NEXT_RECNUM: &str = "next_recnum";

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn sdir_key(keyid: &KeyId, pubkey_algo: u8) -> [u8; 9] {
    let [a, b, c, d, e, f, g, h] = keyid.0;
    [a, b, c, d, e, f, g, h, pubkey_algo]
}

fn algo_matches(stored: u8, wanted: u8) -> bool {
    stored == 0 || wanted == 0 || stored == wanted
}

/// A durable record store over a single redb database file.
pub struct RecordDb {
    db: Database,
    path: PathBuf,
    /// Journal of unapplied mutations; `None` marks a deletion.
    pending: BTreeMap<Recno, Option<Record>>,
    in_txn: bool,
}

impl RecordDb {
    /// Opens a record database, creating the file when `create` is set.
    pub fn open<P: AsRef<Path>>(path: P, create: bool) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = if create {
            Database::create(&path).map_err(backend)?
        } else {
            Database::open(&path).map_err(backend)?
        };

        // Ensure all tables exist so later read transactions can open them.
        let wtx = db.begin_write().map_err(backend)?;
        {
            wtx.open_table(RECORDS).map_err(backend)?;
            wtx.open_table(META).map_err(backend)?;
            wtx.open_table(FPR_INDEX).map_err(backend)?;
            wtx.open_table(SDIR_INDEX).map_err(backend)?;
        }
        wtx.commit().map_err(backend)?;

        info!(target: "storage", "record db ready at {}", path.display());
        Ok(Self { db, path, pending: BTreeMap::new(), in_txn: false })
    }

    fn read_committed(&self, recno: Recno) -> Result<Option<Record>, StoreError> {
        let rtx = self.db.begin_read().map_err(backend)?;
        let table = rtx.open_table(RECORDS).map_err(backend)?;
        let bytes = match table.get(&be64(recno)).map_err(backend)? {
            Some(guard) => guard.value().to_vec(),
            None => return Ok(None),
        };
        decode(&bytes).map(Some)
    }

    /// Applies the journal through a single redb write transaction,
    /// maintaining the search indexes from each record's before/after image.
    fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let wtx = self.db.begin_write().map_err(backend)?;
        {
            let mut records = wtx.open_table(RECORDS).map_err(backend)?;
            let mut fpr_idx = wtx.open_table(FPR_INDEX).map_err(backend)?;
            let mut sdir_idx = wtx.open_table(SDIR_INDEX).map_err(backend)?;

            for (recno, op) in &self.pending {
                let key = be64(*recno);
                let old_bytes = records
                    .get(&key)
                    .map_err(backend)?
                    .map(|g| g.value().to_vec());
                if let Some(bytes) = old_bytes {
                    match decode(&bytes)? {
                        Record::Key(k) => {
                            fpr_idx
                                .remove(k.fingerprint.as_bytes())
                                .map_err(backend)?;
                        }
                        Record::Sdir(s) => {
                            sdir_idx
                                .remove(sdir_key(&s.keyid, s.pubkey_algo).as_slice())
                                .map_err(backend)?;
                        }
                        _ => {}
                    }
                }
                match op {
                    Some(rec) => {
                        let bytes = encode(rec)?;
                        records
                            .insert(&key, bytes.as_slice())
                            .map_err(backend)?;
                        match rec {
                            Record::Key(k) => {
                                fpr_idx
                                    .insert(k.fingerprint.as_bytes(), &key)
                                    .map_err(backend)?;
                            }
                            Record::Sdir(s) => {
                                sdir_idx
                                    .insert(
                                        sdir_key(&s.keyid, s.pubkey_algo).as_slice(),
                                        &key,
                                    )
                                    .map_err(backend)?;
                            }
                            _ => {}
                        }
                    }
                    None => {
                        records.remove(&key).map_err(backend)?;
                    }
                }
            }
        }
        wtx.commit().map_err(backend)?;
        debug!(target: "storage", "flushed {} journaled records", self.pending.len());
        self.pending.clear();
        Ok(())
    }
}

impl RecordStore for RecordDb {
    fn read(&self, recno: Recno, expect: RecordType) -> Result<Record, StoreError> {
        let rec = match self.pending.get(&recno) {
            Some(Some(rec)) => rec.clone(),
            Some(None) => return Err(StoreError::NotFound(recno)),
            None => self
                .read_committed(recno)?
                .ok_or(StoreError::NotFound(recno))?,
        };
        if !rec.matches(expect) {
            return Err(StoreError::TypeMismatch {
                recno,
                expected: expect,
                got: rec.rectype(),
            });
        }
        Ok(rec)
    }

    fn write(&mut self, recno: Recno, rec: &Record) -> Result<(), StoreError> {
        self.pending.insert(recno, Some(rec.clone()));
        Ok(())
    }

    fn delete(&mut self, recno: Recno) -> Result<(), StoreError> {
        self.pending.insert(recno, None);
        Ok(())
    }

    fn new_recnum(&mut self) -> Result<Recno, StoreError> {
        // Allocations are durable immediately and are not part of the
        // journal, so a cancelled transaction never frees a recnum for
        // reuse.
        let wtx = self.db.begin_write().map_err(backend)?;
        let next;
        {
            let mut meta = wtx.open_table(META).map_err(backend)?;
            next = meta
                .get(NEXT_RECNUM)
                .map_err(backend)?
                .map(|g| g.value())
                .unwrap_or(1);
            meta.insert(NEXT_RECNUM, next + 1).map_err(backend)?;
        }
        wtx.commit().map_err(backend)?;
        Ok(next)
    }

    fn search_dir_by_fingerprint(
        &self,
        fpr: &Fingerprint,
    ) -> Result<Option<Lid>, StoreError> {
        // Journal first: a key written in the open transaction wins, and a
        // journaled overwrite/delete masks the committed index entry.
        for op in self.pending.values() {
            if let Some(Record::Key(k)) = op {
                if &k.fingerprint == fpr {
                    return Ok(Some(k.lid));
                }
            }
        }
        let rtx = self.db.begin_read().map_err(backend)?;
        let idx = rtx.open_table(FPR_INDEX).map_err(backend)?;
        let key_recno = match idx.get(fpr.as_bytes()).map_err(backend)? {
            Some(g) => u64::from_be_bytes(*g.value()),
            None => return Ok(None),
        };
        if self.pending.contains_key(&key_recno) {
            // Masked by the journal and not matched above.
            return Ok(None);
        }
        match self.read_committed(key_recno)? {
            Some(Record::Key(k)) if &k.fingerprint == fpr => Ok(Some(k.lid)),
            _ => Ok(None),
        }
    }

    fn search_sdir(
        &self,
        keyid: &KeyId,
        pubkey_algo: u8,
    ) -> Result<Option<Lid>, StoreError> {
        for op in self.pending.values() {
            if let Some(Record::Sdir(s)) = op {
                if &s.keyid == keyid && algo_matches(s.pubkey_algo, pubkey_algo) {
                    return Ok(Some(s.lid));
                }
            }
        }
        let rtx = self.db.begin_read().map_err(backend)?;
        let idx = rtx.open_table(SDIR_INDEX).map_err(backend)?;
        let start = sdir_key(keyid, 0);
        let end = sdir_key(keyid, u8::MAX);
        let range = idx
            .range(start.as_slice()..=end.as_slice())
            .map_err(backend)?;
        for item in range {
            let (_, value) = item.map_err(backend)?;
            let recno = u64::from_be_bytes(*value.value());
            if self.pending.contains_key(&recno) {
                continue;
            }
            if let Some(Record::Sdir(s)) = self.read_committed(recno)? {
                if &s.keyid == keyid && algo_matches(s.pubkey_algo, pubkey_algo) {
                    return Ok(Some(s.lid));
                }
            }
        }
        Ok(None)
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.in_txn {
            return Err(StoreError::NestedTransaction);
        }
        // Mutations buffered outside any transaction must not be swept into
        // a later cancel.
        self.flush()?;
        self.in_txn = true;
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), StoreError> {
        if !self.in_txn {
            return Err(StoreError::NoTransaction);
        }
        self.flush()?;
        self.in_txn = false;
        Ok(())
    }

    fn cancel_transaction(&mut self) -> Result<(), StoreError> {
        if !self.in_txn {
            return Err(StoreError::NoTransaction);
        }
        debug!(target: "storage", "cancelling {} journaled records", self.pending.len());
        self.pending.clear();
        self.in_txn = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        if self.in_txn {
            // The open transaction decides the fate of the journal.
            return Ok(());
        }
        self.flush()
    }

    fn iter_recnums(&self) -> Result<Vec<Recno>, StoreError> {
        let mut live = BTreeSet::new();
        let rtx = self.db.begin_read().map_err(backend)?;
        let table = rtx.open_table(RECORDS).map_err(backend)?;
        for item in table.iter().map_err(backend)? {
            let (key, _) = item.map_err(backend)?;
            live.insert(u64::from_be_bytes(*key.value()));
        }
        for (recno, op) in &self.pending {
            match op {
                Some(_) => {
                    live.insert(*recno);
                }
                None => {
                    live.remove(recno);
                }
            }
        }
        Ok(live.into_iter().collect())
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wot_types::records::{DirRecord, KeyRecord, SdirRecord};
    use wot_types::trust::Ownertrust;

    fn open_db(dir: &tempfile::TempDir) -> RecordDb {
        RecordDb::open(dir.path().join("trust.db"), true).unwrap()
    }

    fn fpr(seed: u8) -> Fingerprint {
        Fingerprint::new(vec![seed; 20]).unwrap()
    }

    fn dir_at(lid: Lid) -> Record {
        Record::Dir(DirRecord { lid, ..DirRecord::default() })
    }

    #[test]
    fn write_read_delete_round_trip() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        let recno = db.new_recnum().unwrap();
        db.write(recno, &dir_at(recno)).unwrap();
        db.sync().unwrap();

        let rec = db.read(recno, RecordType::Dir).unwrap();
        assert_eq!(rec.into_dir().unwrap().lid, recno);

        db.delete(recno).unwrap();
        db.sync().unwrap();
        assert!(matches!(
            db.read(recno, RecordType::Any),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn typed_read_rejects_wrong_kind() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let recno = db.new_recnum().unwrap();
        db.write(recno, &dir_at(recno)).unwrap();

        let err = db.read(recno, RecordType::Uid).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn recnums_are_never_reused_after_cancel() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.begin_transaction().unwrap();
        let a = db.new_recnum().unwrap();
        db.write(a, &dir_at(a)).unwrap();
        db.cancel_transaction().unwrap();

        let b = db.new_recnum().unwrap();
        assert!(b > a);
        assert!(matches!(
            db.read(a, RecordType::Any),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn transaction_cancel_discards_and_commit_applies() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let recno = db.new_recnum().unwrap();

        db.begin_transaction().unwrap();
        db.write(recno, &dir_at(recno)).unwrap();
        assert!(db.is_dirty());
        // The open transaction sees its own write.
        assert!(db.read(recno, RecordType::Dir).is_ok());
        db.cancel_transaction().unwrap();
        assert!(!db.is_dirty());
        assert!(db.read(recno, RecordType::Any).is_err());

        db.begin_transaction().unwrap();
        db.write(recno, &dir_at(recno)).unwrap();
        db.commit_transaction().unwrap();
        assert!(db.read(recno, RecordType::Dir).is_ok());
    }

    #[test]
    fn nested_transactions_are_refused() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.begin_transaction().unwrap();
        assert!(matches!(
            db.begin_transaction(),
            Err(StoreError::NestedTransaction)
        ));
        db.cancel_transaction().unwrap();
        assert!(matches!(
            db.cancel_transaction(),
            Err(StoreError::NoTransaction)
        ));
    }

    #[test]
    fn fingerprint_search_sees_journal_and_committed_state() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let dirno = db.new_recnum().unwrap();
        let keyno = db.new_recnum().unwrap();
        let krec = Record::Key(KeyRecord {
            lid: dirno,
            pubkey_algo: 1,
            fingerprint: fpr(0xAA),
            next: 0,
        });

        db.begin_transaction().unwrap();
        db.write(keyno, &krec).unwrap();
        // Visible before commit via the journal scan.
        assert_eq!(db.search_dir_by_fingerprint(&fpr(0xAA)).unwrap(), Some(dirno));
        db.commit_transaction().unwrap();
        // Visible after commit via the index.
        assert_eq!(db.search_dir_by_fingerprint(&fpr(0xAA)).unwrap(), Some(dirno));
        assert_eq!(db.search_dir_by_fingerprint(&fpr(0xBB)).unwrap(), None);

        // A journaled deletion masks the committed index entry.
        db.begin_transaction().unwrap();
        db.delete(keyno).unwrap();
        assert_eq!(db.search_dir_by_fingerprint(&fpr(0xAA)).unwrap(), None);
        db.cancel_transaction().unwrap();
        assert_eq!(db.search_dir_by_fingerprint(&fpr(0xAA)).unwrap(), Some(dirno));
    }

    #[test]
    fn sdir_search_honors_algo_wildcards() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let recno = db.new_recnum().unwrap();
        let keyid = KeyId::from_u64(0x1122_3344_5566_7788);
        db.write(
            recno,
            &Record::Sdir(SdirRecord {
                lid: recno,
                keyid,
                pubkey_algo: 17,
                hintlist: 0,
            }),
        )
        .unwrap();
        db.sync().unwrap();

        assert_eq!(db.search_sdir(&keyid, 17).unwrap(), Some(recno));
        assert_eq!(db.search_sdir(&keyid, 0).unwrap(), Some(recno));
        assert_eq!(db.search_sdir(&keyid, 16).unwrap(), None);
        assert_eq!(db.search_sdir(&KeyId::from_u64(1), 17).unwrap(), None);
    }

    #[test]
    fn promoting_a_sdir_to_dir_drops_the_sdir_index_entry() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let recno = db.new_recnum().unwrap();
        let keyid = KeyId::from_u64(42);
        db.write(
            recno,
            &Record::Sdir(SdirRecord {
                lid: recno,
                keyid,
                pubkey_algo: 1,
                hintlist: 0,
            }),
        )
        .unwrap();
        db.sync().unwrap();
        assert_eq!(db.search_sdir(&keyid, 1).unwrap(), Some(recno));

        db.write(recno, &dir_at(recno)).unwrap();
        db.sync().unwrap();
        assert_eq!(db.search_sdir(&keyid, 1).unwrap(), None);
        assert!(db.read(recno, RecordType::Dir).is_ok());
    }

    #[test]
    fn iter_recnums_merges_journal_over_committed() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        let a = db.new_recnum().unwrap();
        let b = db.new_recnum().unwrap();
        db.write(a, &dir_at(a)).unwrap();
        db.sync().unwrap();

        db.begin_transaction().unwrap();
        db.write(b, &dir_at(b)).unwrap();
        db.delete(a).unwrap();
        assert_eq!(db.iter_recnums().unwrap(), vec![b]);
        db.cancel_transaction().unwrap();
        assert_eq!(db.iter_recnums().unwrap(), vec![a]);
    }

    #[test]
    fn ownertrust_survives_reopen() {
        let dir = tempdir().unwrap();
        let recno;
        {
            let mut db = open_db(&dir);
            recno = db.new_recnum().unwrap();
            db.write(
                recno,
                &Record::Dir(DirRecord {
                    lid: recno,
                    ownertrust: Ownertrust::MARGINAL,
                    ..DirRecord::default()
                }),
            )
            .unwrap();
            db.sync().unwrap();
        }
        let db = RecordDb::open(dir.path().join("trust.db"), false).unwrap();
        let rec = db.read(recno, RecordType::Dir).unwrap();
        assert_eq!(rec.into_dir().unwrap().ownertrust, Ownertrust::MARGINAL);
    }
}
