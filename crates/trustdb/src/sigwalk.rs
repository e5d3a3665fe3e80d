// Path: crates/trustdb/src/sigwalk.rs

//! A lazy walk over all signature slots of a key.
//!
//! Produces the `(signer lid, flags)` pairs spanning every occupied slot
//! across every signature record of every user id of the subject.
//! Single-pass and non-restartable: create a fresh walker per subject.

use tracing::error;
use wot_types::error::TrustError;
use wot_types::records::{
    Lid, Record, RecordType, Recno, SigFlags, SigSlot, SIGS_PER_RECORD,
};
use wot_api::store::RecordStore;

pub(crate) struct SigWalk {
    lid: Lid,
    init_done: bool,
    eof: bool,
    nextuid: Recno,
    next_sigrec: Recno,
    slots: [SigSlot; SIGS_PER_RECORD],
    index: usize,
}

impl SigWalk {
    pub fn new(lid: Lid) -> Self {
        Self {
            lid,
            init_done: false,
            eof: false,
            nextuid: 0,
            next_sigrec: 0,
            slots: Default::default(),
            index: SIGS_PER_RECORD,
        }
    }

    /// The next occupied slot, or `None` at the end of the walk. A subject
    /// that is not a directory record yields an empty walk; a signature
    /// record chained under the wrong owner is database corruption.
    pub fn next<S: RecordStore>(
        &mut self,
        store: &S,
    ) -> Result<Option<(Lid, SigFlags)>, TrustError> {
        if self.eof {
            return Ok(None);
        }
        if !self.init_done {
            self.init_done = true;
            match store.read(self.lid, RecordType::Any) {
                Ok(Record::Dir(dir)) => {
                    self.nextuid = dir.uidlist;
                }
                Ok(_) => {
                    self.eof = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.eof = true;
                    return Err(TrustError::Corrupt(e.to_string()));
                }
            }
        }

        loop {
            if self.index >= SIGS_PER_RECORD {
                let mut rnum = self.next_sigrec;
                // Move on to the next user id as long as signature chains
                // come up empty.
                while rnum == 0 && self.nextuid != 0 {
                    let urec = store
                        .read(self.nextuid, RecordType::Uid)
                        .map_err(|e| TrustError::Corrupt(e.to_string()))?
                        .into_uid()
                        .ok_or_else(|| {
                            TrustError::Corrupt("uid record expected".into())
                        })?;
                    self.nextuid = urec.next;
                    rnum = urec.siglist;
                }
                if rnum == 0 {
                    self.eof = true;
                    return Ok(None);
                }
                let srec = store
                    .read(rnum, RecordType::Sig)
                    .map_err(|e| TrustError::Corrupt(e.to_string()))?
                    .into_sig()
                    .ok_or_else(|| {
                        TrustError::Corrupt("sig record expected".into())
                    })?;
                if srec.lid != self.lid {
                    error!(
                        target: "trustdb",
                        "chained signature record {rnum} has a wrong owner"
                    );
                    self.eof = true;
                    return Err(TrustError::Corrupt(format!(
                        "signature record {rnum} owned by {} but chained under {}",
                        srec.lid, self.lid
                    )));
                }
                self.slots = srec.slots;
                self.next_sigrec = srec.next;
                self.index = 0;
            }
            let slot = self.slots.get(self.index).copied().unwrap_or_default();
            self.index += 1;
            if !slot.is_free() {
                return Ok(Some((slot.signer, slot.flags)));
            }
        }
    }
}
