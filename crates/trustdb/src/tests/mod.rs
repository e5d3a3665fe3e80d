// Path: crates/trustdb/src/tests/mod.rs

//! End-to-end tests over a real record database and an in-memory keyring.

use crate::sigwalk::SigWalk;
use crate::TrustDb;
use tempfile::TempDir;
use wot_api::keyring::Keyring;
use wot_api::store::RecordStore;
use wot_api::test_utils::MemoryKeyring;
use wot_storage::RecordDb;
use wot_types::config::TrustOptions;
use wot_types::error::TrustError;
use wot_types::keyblock::{
    Fingerprint, KbNode, KeyId, Keyblock, PrefItemType, PublicKey, SecretKey,
    Signature, UserId,
};
use wot_types::records::{Lid, Record, RecordType, SigFlags};
use wot_types::trust::{Ownertrust, TrustLevel};

const DAVE: u64 = 0xDEAD_BEEF_CAFE_BABE;

fn fpr20(id: u64) -> Fingerprint {
    let mut bytes = vec![0u8; 20];
    bytes[..8].copy_from_slice(&id.to_le_bytes());
    bytes[12..].copy_from_slice(&id.to_be_bytes());
    Fingerprint::new(bytes).unwrap()
}

fn pubkey(id: u64) -> PublicKey {
    PublicKey {
        keyid: KeyId::from_u64(id),
        fingerprint: fpr20(id),
        pubkey_algo: 1,
        timestamp: 1_000,
        expiredate: 0,
        local_id: 0,
    }
}

fn secret(id: u64) -> SecretKey {
    SecretKey {
        keyid: KeyId::from_u64(id),
        fingerprint: fpr20(id),
        pubkey_algo: 1,
        protected: true,
    }
}

fn selfsig(id: u64) -> Signature {
    Signature {
        keyid: KeyId::from_u64(id),
        pubkey_algo: 1,
        sig_class: 0x13,
        ..Signature::default()
    }
}

fn certsig(signer: u64) -> Signature {
    Signature {
        keyid: KeyId::from_u64(signer),
        pubkey_algo: 1,
        sig_class: 0x10,
        ..Signature::default()
    }
}

/// primary + one uid + self-signature + one certification per signer.
fn block(id: u64, name: &str, signers: &[u64]) -> Keyblock {
    let mut nodes = vec![
        KbNode::Primary(pubkey(id)),
        KbNode::UserId(UserId { name: name.into() }),
        KbNode::Signature(selfsig(id)),
    ];
    for s in signers {
        nodes.push(KbNode::Signature(certsig(*s)));
    }
    Keyblock { nodes }
}

fn setup(
    blocks: Vec<Keyblock>,
    secrets: Vec<u64>,
) -> (TempDir, TrustDb<RecordDb, MemoryKeyring>) {
    let dir = TempDir::new().unwrap();
    let store = RecordDb::open(dir.path().join("trust.db"), true).unwrap();
    let mut ring = MemoryKeyring::new();
    for kb in blocks {
        ring.add_keyblock(kb);
    }
    for id in secrets {
        ring.add_secret(secret(id));
    }
    let mut db = TrustDb::new(store, ring, TrustOptions::default());
    db.init(1).unwrap();
    (dir, db)
}

/// Checks the structural invariants of the whole record graph.
fn assert_invariants(db: &TrustDb<RecordDb, MemoryKeyring>) {
    for recno in db.store.iter_recnums().unwrap() {
        let rec = db.store.read(recno, RecordType::Any).unwrap();
        let Record::Dir(dir) = rec else { continue };
        assert_eq!(dir.lid, recno, "dir lid must equal its recnum");

        let mut keyrn = dir.keylist;
        while keyrn != 0 {
            let krec = db.read_key(keyrn).unwrap();
            assert_eq!(krec.lid, dir.lid, "key back-reference");
            keyrn = krec.next;
        }

        let mut uidrn = dir.uidlist;
        while uidrn != 0 {
            let urec = db.read_uid(uidrn).unwrap();
            assert_eq!(urec.lid, dir.lid, "uid back-reference");

            let mut prefrn = urec.prefrec;
            while prefrn != 0 {
                let prec = db.read_pref(prefrn).unwrap();
                assert_eq!(prec.lid, dir.lid, "pref back-reference");
                prefrn = prec.next;
            }

            let mut sigrn = urec.siglist;
            while sigrn != 0 {
                let srec = db.read_sig(sigrn).unwrap();
                assert_eq!(srec.lid, dir.lid, "sig back-reference");
                for slot in srec.slots.iter().filter(|s| !s.is_free()) {
                    let target =
                        db.store.read(slot.signer, RecordType::Any).unwrap();
                    assert!(
                        matches!(target, Record::Dir(_) | Record::Sdir(_)),
                        "sig slot must point at a dir or sdir"
                    );
                }
                sigrn = srec.next;
            }
            uidrn = urec.next;
        }
    }
}

/// All `(signer, flags)` pairs of a subject, via the lazy walker.
fn collect_sigs(
    db: &TrustDb<RecordDb, MemoryKeyring>,
    lid: Lid,
) -> Vec<(Lid, SigFlags)> {
    let mut walk = SigWalk::new(lid);
    let mut out = Vec::new();
    while let Some(item) = walk.next(&db.store).unwrap() {
        out.push(item);
    }
    out
}

// ---- startup ---------------------------------------------------------

#[test]
fn self_seeding_marks_own_key_ultimate() {
    let (_tmp, mut db) = setup(vec![block(1, "karl <karl@example.org>", &[])], vec![1]);

    let mut pk = pubkey(1);
    let lid = db.query_trust_record(&mut pk).unwrap();
    assert_eq!(lid, 1, "first inserted key gets the first recnum");
    assert!(db.is_ultimately_trusted(lid));

    let dir = db.read_dir(lid).unwrap();
    let krec = db.read_key(dir.keylist).unwrap();
    assert_eq!(krec.fingerprint, fpr20(1));

    assert_eq!(db.query_trust_info(&mut pk), 'u');
    assert_invariants(&db);
}

#[test]
fn init_rejects_unknown_levels() {
    let (_tmp, mut db) = setup(vec![], vec![]);
    assert!(db.init(0).is_ok());
    assert!(matches!(db.init(2), Err(TrustError::General(_))));
}

#[test]
fn seeding_skips_secret_without_public() {
    // Secret key 9 has no public counterpart in the ring.
    let (_tmp, db) = setup(vec![block(1, "karl", &[])], vec![1, 9]);
    assert!(db.is_ultimately_trusted(1));
    // The orphan secret key got no record at all.
    assert_eq!(db.store.iter_recnums().unwrap().len(), 3);
}

// ---- reconciliation --------------------------------------------------

#[test]
fn unknown_signer_parks_behind_shadow_dir() {
    let (_tmp, mut db) = setup(
        vec![block(1, "karl", &[]), block(2, "alice <alice@x>", &[DAVE])],
        vec![1],
    );

    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let alice_lid = alice.local_id;

    let sdir_lid = db
        .store
        .search_sdir(&KeyId::from_u64(DAVE), 1)
        .unwrap()
        .expect("shadow dir for the unknown signer");
    let sdir = db.read_sdir(sdir_lid).unwrap();
    assert_eq!(sdir.keyid, KeyId::from_u64(DAVE));
    assert_eq!(sdir.pubkey_algo, 1);
    assert_ne!(sdir.hintlist, 0);

    let hlst = db.read_hlst(sdir.hintlist).unwrap();
    assert!(hlst.rnums.contains(&alice_lid));

    let sigs = collect_sigs(&db, alice_lid);
    assert_eq!(sigs.len(), 1);
    let (signer, flags) = sigs[0];
    assert_eq!(signer, sdir_lid);
    assert!(flags.pubkey_missing() && !flags.checked());

    assert_invariants(&db);
}

#[test]
fn reconciling_twice_registers_one_hint() {
    let (_tmp, mut db) =
        setup(vec![block(2, "alice", &[DAVE])], vec![]);

    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let mut kb = db.keyring.find_keyblock_by_name("alice").unwrap();
    assert!(!db.update_trust_record(&mut kb).unwrap());

    let sdir_lid = db.store.search_sdir(&KeyId::from_u64(DAVE), 1).unwrap().unwrap();
    let sdir = db.read_sdir(sdir_lid).unwrap();
    let hlst = db.read_hlst(sdir.hintlist).unwrap();
    let hits =
        hlst.rnums.iter().filter(|&&n| n == alice.local_id).count();
    assert_eq!(hits, 1);
    assert_eq!(hlst.next, 0);
}

#[test]
fn promotion_drains_hints_and_reverifies() {
    let (_tmp, mut db) = setup(
        vec![block(1, "karl", &[]), block(2, "alice", &[DAVE])],
        vec![1],
    );
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let sdir_lid = db.store.search_sdir(&KeyId::from_u64(DAVE), 1).unwrap().unwrap();
    let hintlist = db.read_sdir(sdir_lid).unwrap().hintlist;

    // Dave's key arrives.
    db.keyring.add_keyblock(block(DAVE, "dave <dave@x>", &[]));
    let mut dave = pubkey(DAVE);
    db.insert_trust_record(&mut dave).unwrap();

    // The shadow is gone, its recnum now names the real directory.
    assert_eq!(dave.local_id, sdir_lid);
    assert!(db.store.search_sdir(&KeyId::from_u64(DAVE), 1).unwrap().is_none());
    assert!(db.read_dir(sdir_lid).is_ok());

    // The hint record is deleted and the deferred slot is settled.
    assert!(matches!(
        db.store.read(hintlist, RecordType::Any),
        Err(wot_api::store::StoreError::NotFound(_))
    ));
    let sigs = collect_sigs(&db, alice.local_id);
    assert_eq!(sigs.len(), 1);
    let (signer, flags) = sigs[0];
    assert_eq!(signer, sdir_lid);
    assert!(flags.checked() && flags.valid());

    assert_invariants(&db);
}

#[test]
fn failing_self_signature_leaves_uid_invalid() {
    let (mut tmp_ring, mut blocks) = (MemoryKeyring::new(), Vec::new());
    blocks.push(block(2, "alice", &[]));
    for kb in blocks {
        tmp_ring.add_keyblock(kb);
    }
    tmp_ring.fail_signature(KeyId::from_u64(2), KeyId::from_u64(2));

    let dir = TempDir::new().unwrap();
    let store = RecordDb::open(dir.path().join("trust.db"), true).unwrap();
    let mut db = TrustDb::new(store, tmp_ring, TrustOptions::default());

    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let drec = db.read_dir(alice.local_id).unwrap();
    let urec = db.read_uid(drec.uidlist).unwrap();
    assert!(urec.flags.checked());
    assert!(!urec.flags.valid());
    assert_eq!(urec.prefrec, 0);
}

#[test]
fn preferences_are_rebuilt_from_the_self_signature() {
    let mut kb = block(2, "alice", &[]);
    for node in &mut kb.nodes {
        if let KbNode::Signature(sig) = node {
            if sig.sig_class == 0x13 {
                sig.sym_prefs = vec![9, 8];
                sig.hash_prefs = vec![2];
                sig.compr_prefs = vec![1, 3];
            }
        }
    }
    let (_tmp, mut db) = setup(vec![kb], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let lid = alice.local_id;

    let data = db.get_pref_data(lid, None).unwrap().unwrap();
    assert_eq!(data, vec![1, 9, 1, 8, 2, 2, 3, 1, 3, 3]);

    assert!(db.is_algo_in_prefs(lid, PrefItemType::Sym, 9).unwrap());
    assert!(db.is_algo_in_prefs(lid, PrefItemType::Compr, 3).unwrap());
    assert!(!db.is_algo_in_prefs(lid, PrefItemType::Hash, 9).unwrap());

    // Matching by name hash works, and a wrong hash misses.
    let nh = UserId { name: "alice".into() }.namehash();
    assert!(db.get_pref_data(lid, Some(&nh)).unwrap().is_some());
    let other = UserId { name: "bob".into() }.namehash();
    assert!(db.get_pref_data(lid, Some(&other)).unwrap().is_none());
}

#[test]
fn oversized_preference_lists_are_capped() {
    let mut kb = block(2, "alice", &[]);
    for node in &mut kb.nodes {
        if let KbNode::Signature(sig) = node {
            if sig.sig_class == 0x13 {
                // 2 bytes per item: 200 pairs would need 14 records.
                sig.sym_prefs = (0..200).map(|i| (i % 250) as u8).collect();
            }
        }
    }
    let (_tmp, mut db) = setup(vec![kb], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let drec = db.read_dir(alice.local_id).unwrap();
    let urec = db.read_uid(drec.uidlist).unwrap();
    let mut count = 0;
    let mut prefrn = urec.prefrec;
    while prefrn != 0 {
        let prec = db.read_pref(prefrn).unwrap();
        assert!(prec.data.len() <= wot_types::records::ITEMS_PER_PREF_RECORD);
        count += 1;
        prefrn = prec.next;
    }
    assert_eq!(count, wot_types::records::MAX_PREF_RECORDS_PER_UID);
}

#[test]
fn unchanged_keyblock_reports_unmodified() {
    let (_tmp, mut db) =
        setup(vec![block(1, "karl", &[]), block(2, "alice", &[1])], vec![1]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let mut kb = db.keyring.find_keyblock_by_name("alice").unwrap();
    assert!(!db.update_trust_record(&mut kb).unwrap());
    assert_invariants(&db);
}

#[test]
fn update_of_unknown_key_is_a_notfound_sentinel() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut kb = db.keyring.find_keyblock_by_name("alice").unwrap();
    assert!(matches!(
        db.update_trust_record(&mut kb),
        Err(TrustError::NotFound)
    ));
}

#[test]
fn dropped_uid_cascades_to_pref_and_sig_chains() {
    let (_tmp, mut db) =
        setup(vec![block(1, "karl", &[]), block(2, "alice", &[1])], vec![1]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let lid = alice.local_id;

    let drec = db.read_dir(lid).unwrap();
    let old_uid = drec.uidlist;
    let old_sig = db.read_uid(old_uid).unwrap().siglist;
    assert_ne!(old_sig, 0);

    // The user id was replaced wholesale.
    let mut kb2 = block(2, "alice the second", &[1]);
    db.keyring.remove_keyblock(&KeyId::from_u64(2));
    db.keyring.add_keyblock(kb2.clone());
    assert!(db.update_trust_record(&mut kb2).unwrap());

    assert!(db.store.read(old_uid, RecordType::Any).is_err());
    assert!(db.store.read(old_sig, RecordType::Any).is_err());

    let drec = db.read_dir(lid).unwrap();
    let urec = db.read_uid(drec.uidlist).unwrap();
    assert_eq!(urec.namehash, UserId { name: "alice the second".into() }.namehash());
    assert_invariants(&db);
}

#[test]
fn vanished_signatures_keep_the_uid() {
    let (_tmp, mut db) =
        setup(vec![block(1, "karl", &[]), block(2, "alice", &[1])], vec![1]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let lid = alice.local_id;
    let uidrn = db.read_dir(lid).unwrap().uidlist;

    // The certification disappears from the keyblock; the uid record and
    // its recorded slots stay.
    let mut kb2 = block(2, "alice", &[]);
    db.keyring.remove_keyblock(&KeyId::from_u64(2));
    db.keyring.add_keyblock(kb2.clone());
    db.update_trust_record(&mut kb2).unwrap();

    let drec = db.read_dir(lid).unwrap();
    assert_eq!(drec.uidlist, uidrn);
    assert!(db.read_uid(uidrn).is_ok());
}

#[test]
fn self_revocation_sets_the_dir_flag() {
    let mut kb = block(2, "alice", &[]);
    kb.nodes.push(KbNode::Signature(Signature {
        keyid: KeyId::from_u64(2),
        pubkey_algo: 1,
        sig_class: 0x20,
        ..Signature::default()
    }));
    let (_tmp, mut db) = setup(vec![kb], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let drec = db.read_dir(alice.local_id).unwrap();
    assert!(drec.flags.revoked());
    assert_eq!(db.query_trust_info(&mut alice), 'r');
}

// ---- evaluation ------------------------------------------------------

#[test]
fn quorum_collapses_for_first_level_introductions() {
    let (_tmp, mut db) = setup(
        vec![
            block(1, "karl", &[]),
            block(2, "alice", &[1]),
            block(3, "bob", &[2]),
        ],
        vec![1],
    );
    db.options_mut().marginals_needed = 3;
    db.options_mut().completes_needed = 1;

    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let mut bob = pubkey(3);
    db.insert_trust_record(&mut bob).unwrap();

    db.update_ownertrust(1, Ownertrust::ULTIMATE).unwrap();
    db.update_ownertrust(alice.local_id, Ownertrust::FULLY).unwrap();

    let verdict = db.check_trust(&mut bob).unwrap();
    assert_eq!(verdict.level, TrustLevel::Fully);
    assert!(!verdict.revoked);
}

#[test]
fn certification_cycles_terminate_with_undefined() {
    let (_tmp, mut db) = setup(
        vec![block(2, "alice", &[3]), block(3, "bob", &[2])],
        vec![],
    );
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let mut bob = pubkey(3);
    db.insert_trust_record(&mut bob).unwrap();
    // Re-reconcile so the mutual signatures resolve to real directories.
    let mut kb = db.keyring.find_keyblock_by_name("alice").unwrap();
    db.update_trust_record(&mut kb).unwrap();

    let verdict = db.check_trust(&mut alice).unwrap();
    assert_eq!(verdict.level, TrustLevel::Undefined);
}

#[test]
fn zero_depth_always_answers_undefined() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    db.options_mut().max_cert_depth = 0;

    let verdict = db.check_trust(&mut alice).unwrap();
    assert_eq!(verdict.level, TrustLevel::Undefined);
}

#[test]
fn future_keys_are_a_time_conflict() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    alice.timestamp = crate::db::make_timestamp() + 86_400;
    assert!(matches!(
        db.check_trust(&mut alice),
        Err(TrustError::TimeConflict)
    ));
    assert_eq!(db.query_trust_info(&mut alice), '?');
}

#[test]
fn expired_keys_evaluate_to_expired() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    alice.expiredate = 1;
    let verdict = db.check_trust(&mut alice).unwrap();
    assert_eq!(verdict.level, TrustLevel::Expired);
    assert_eq!(db.query_trust_info(&mut alice), 'e');
}

#[test]
fn check_trust_inserts_missing_keys() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    let verdict = db.check_trust(&mut alice).unwrap();
    assert_ne!(alice.local_id, 0);
    assert_eq!(verdict.level, TrustLevel::Undefined);
}

// ---- owner trust -----------------------------------------------------

#[test]
fn ownertrust_round_trips_through_export_and_import() {
    let (_tmp, mut db) = setup(
        vec![
            block(2, "alice", &[]),
            block(3, "bob", &[]),
            block(4, "carol", &[]),
        ],
        vec![],
    );
    let mut lids = Vec::new();
    for id in [2, 3, 4] {
        let mut pk = pubkey(id);
        db.insert_trust_record(&mut pk).unwrap();
        lids.push(pk.local_id);
    }
    let values = [Ownertrust::MARGINAL, Ownertrust::FULLY, Ownertrust::ULTIMATE];
    for (lid, v) in lids.iter().zip(values) {
        db.update_ownertrust(*lid, v).unwrap();
    }

    let mut exported = Vec::new();
    db.export_ownertrust(&mut exported).unwrap();
    let text = String::from_utf8(exported.clone()).unwrap();
    assert!(text.starts_with('#'));
    assert!(text.contains(&format!("{}:4:", fpr20(2))));
    assert!(text.contains(&format!("{}:5:", fpr20(3))));
    assert!(text.contains(&format!("{}:6:", fpr20(4))));

    // Wipe and restore.
    for lid in &lids {
        db.update_ownertrust(*lid, Ownertrust::NONE).unwrap();
    }
    db.import_ownertrust(&exported[..]).unwrap();
    for (lid, v) in lids.iter().zip(values) {
        assert_eq!(db.get_ownertrust(*lid).unwrap(), v);
    }
}

#[test]
fn import_inserts_keys_known_only_to_the_ring() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let line = format!("{}:5:\n", fpr20(2));
    db.import_ownertrust(line.as_bytes()).unwrap();

    let mut alice = pubkey(2);
    let lid = db.query_trust_record(&mut alice).unwrap();
    assert_eq!(db.get_ownertrust(lid).unwrap(), Ownertrust::FULLY);
    assert_eq!(db.get_ownertrust_info(lid).unwrap(), 'f');
}

#[test]
fn import_skips_malformed_and_zero_lines() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let lid = alice.local_id;

    let input = format!(
        "# header\n\nnot-hex:5:\nABCD:5:\n{fpr}:0:\n{fpr}:bogus:\n{fpr}:4\n",
        fpr = fpr20(2)
    );
    db.import_ownertrust(input.as_bytes()).unwrap();
    // Nothing matched: bad fingerprints, zero value, missing colon.
    assert_eq!(db.get_ownertrust(lid).unwrap(), Ownertrust::NONE);
}

#[test]
fn clear_trust_checked_flag_is_idempotent() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    db.clear_trust_checked_flag(&mut alice).unwrap();
    db.clear_trust_checked_flag(&mut alice).unwrap();
}

// ---- batch drivers ---------------------------------------------------

#[test]
fn update_trustdb_inserts_every_ring_key() {
    let (_tmp, mut db) = setup(
        vec![block(2, "alice", &[3]), block(3, "bob", &[])],
        vec![],
    );
    let stats = db.update_trustdb().unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.errors, 0);

    // A second run settles into no-ops or silent updates, no inserts.
    let stats = db.update_trustdb().unwrap();
    assert_eq!(stats.inserted, 0);
    assert_invariants(&db);
}

#[test]
fn check_trustdb_counts_missing_keyblocks_as_skipped() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    db.keyring.remove_keyblock(&KeyId::from_u64(2));

    let stats = db.check_trustdb(None).unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn check_trustdb_by_name_inserts_unknown_keys() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let stats = db.check_trustdb(Some("alice")).unwrap();
    assert_eq!(stats.inserted, 1);
}

// ---- listings --------------------------------------------------------

#[test]
fn full_listing_covers_every_record() {
    let (_tmp, mut db) =
        setup(vec![block(1, "karl", &[]), block(2, "alice", &[1])], vec![1]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let mut out = Vec::new();
    db.list_trustdb(&mut out, None).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("TrustDB: "));
    for recno in db.store.iter_recnums().unwrap() {
        assert!(text.contains(&format!("rec {recno:5}: ")));
    }
}

#[test]
fn signature_tree_annotates_ultimately_trusted_signers() {
    let (_tmp, mut db) =
        setup(vec![block(1, "karl <karl@x>", &[]), block(2, "alice", &[1])], vec![1]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let mut out = Vec::new();
    let spec = format!("#{}", alice.local_id);
    db.list_trustdb(&mut out, Some(spec.as_str())).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Signatures of"));
    assert!(text.contains("[ultimately trusted]"));
    assert!(text.contains("V--"));
}

#[test]
fn trust_path_listing_reaches_the_ultimate_key() {
    let (_tmp, mut db) = setup(
        vec![
            block(1, "karl", &[]),
            block(2, "alice", &[1]),
            block(3, "bob", &[2]),
        ],
        vec![1],
    );
    db.update_trustdb().unwrap();
    db.update_ownertrust(1, Ownertrust::ULTIMATE).unwrap();

    let mut out = Vec::new();
    db.list_trust_path(&mut out, 5, "bob").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("path 1:"));
    assert!(text.contains("[ultimately trusted]"));
}

#[test]
fn trust_path_listing_reports_missing_paths() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[])], vec![]);
    let mut out = Vec::new();
    db.list_trust_path(&mut out, 5, "alice").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("No trust path found"));
}

// ---- the signature walker -------------------------------------------

#[test]
fn sig_walk_spans_multiple_uids() {
    let mut kb = block(2, "alice", &[1]);
    kb.nodes.push(KbNode::UserId(UserId { name: "alice at work".into() }));
    kb.nodes.push(KbNode::Signature(selfsig(2)));
    kb.nodes.push(KbNode::Signature(certsig(3)));

    let (_tmp, mut db) = setup(
        vec![kb, block(1, "karl", &[]), block(3, "bob", &[])],
        vec![],
    );
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();

    let sigs = collect_sigs(&db, alice.local_id);
    assert_eq!(sigs.len(), 2, "one certification per uid");
    assert_invariants(&db);
}

#[test]
fn sig_walk_of_a_non_dir_is_empty() {
    let (_tmp, mut db) = setup(vec![block(2, "alice", &[DAVE])], vec![]);
    let mut alice = pubkey(2);
    db.insert_trust_record(&mut alice).unwrap();
    let sdir_lid = db.store.search_sdir(&KeyId::from_u64(DAVE), 1).unwrap().unwrap();

    assert!(collect_sigs(&db, sdir_lid).is_empty());
}
