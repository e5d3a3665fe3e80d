// Path: crates/trustdb/src/recnos.rs

//! The retained-record list used during reconciliation.
//!
//! While a keyblock pass runs, every record that corresponds to something in
//! the keyblock is marked here; afterwards, chain members that were not
//! marked are orphans and get deleted.

use wot_types::records::{Recno, RecordType};

#[derive(Default)]
pub(crate) struct RecnoList {
    items: Vec<(Recno, RecordType)>,
}

impl RecnoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, recno: Recno, rectype: RecordType) {
        self.items.push((recno, rectype));
    }

    /// Whether `recno` was retained; `RecordType::Any` matches any kind.
    pub fn contains(&self, recno: Recno, rectype: RecordType) -> bool {
        self.items.iter().any(|(r, t)| {
            *r == recno && (rectype == RecordType::Any || *t == rectype)
        })
    }
}
