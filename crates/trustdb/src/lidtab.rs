// Path: crates/trustdb/src/lidtab.rs

//! A small chained hash table over local ids.
//!
//! Used as a set (the ultimately-trusted keys) and as a map (line-number
//! memoization while listing signature trees). Sixteen buckets keyed by the
//! low bits are plenty for both populations.

use wot_types::records::Lid;

const BUCKETS: usize = 16;

pub(crate) struct LidTable {
    buckets: [Vec<(Lid, u32)>; BUCKETS],
}

impl LidTable {
    pub fn new() -> Self {
        Self { buckets: std::array::from_fn(|_| Vec::new()) }
    }

    /// Inserts `lid` with an associated flag value. Returns `true` when the
    /// lid was already present (the stored flag is kept).
    pub fn insert(&mut self, lid: Lid, flag: u32) -> bool {
        let Some(bucket) = self.buckets.get_mut((lid & 0xf) as usize) else {
            return false;
        };
        if bucket.iter().any(|(l, _)| *l == lid) {
            return true;
        }
        bucket.push((lid, flag));
        false
    }

    /// The flag stored for `lid`, when present.
    pub fn lookup(&self, lid: Lid) -> Option<u32> {
        self.buckets
            .get((lid & 0xf) as usize)
            .and_then(|bucket| bucket.iter().find(|(l, _)| *l == lid))
            .map(|(_, flag)| *flag)
    }

    pub fn contains(&self, lid: Lid) -> bool {
        self.lookup(lid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_duplicates() {
        let mut t = LidTable::new();
        assert!(!t.insert(1, 10));
        assert!(!t.insert(17, 20)); // same bucket as 1
        assert!(t.insert(1, 99));
        assert_eq!(t.lookup(1), Some(10));
        assert_eq!(t.lookup(17), Some(20));
    }

    #[test]
    fn lookup_misses_cleanly() {
        let mut t = LidTable::new();
        t.insert(5, 0);
        assert!(t.contains(5));
        assert!(!t.contains(21));
        assert_eq!(t.lookup(21), None);
    }
}
