//! Change tracking between backups.
//!
//! Every mutation stamps the touched keys with the next table sequence
//! number. A backup copies the marks, writes its file, and only then
//! acknowledges them; marks with a newer sequence than the capture survive
//! the acknowledgement, so a change made during the write is never lost,
//! and a failed backup leaves everything in place for the next attempt.

use std::collections::BTreeMap;

use cellardb_core::PrimaryKey;

/// What happened to a key since the last acknowledged backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    /// Inserted or updated; the key is live.
    Upsert,
    /// Deleted; the key is absent.
    Delete,
}

/// The latest change to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirtyMark {
    /// The table sequence number of the change.
    pub(crate) seq: u64,
    /// The kind of change.
    pub(crate) kind: ChangeKind,
}

/// Keys changed since the last acknowledged backup, with their latest change.
#[derive(Debug, Default)]
pub(crate) struct DirtyTracker {
    marks: BTreeMap<PrimaryKey, DirtyMark>,
    seq: u64,
}

impl DirtyTracker {
    /// Creates a tracker whose next change gets `seq + 1`.
    pub(crate) fn starting_at(seq: u64) -> Self {
        Self { marks: BTreeMap::new(), seq }
    }

    /// The sequence number of the latest change.
    pub(crate) const fn seq(&self) -> u64 {
        self.seq
    }

    /// Records a change to each key, all under one new sequence number.
    pub(crate) fn mark<'a>(&mut self, keys: impl IntoIterator<Item = &'a PrimaryKey>, kind: ChangeKind) {
        self.seq += 1;
        let mark = DirtyMark { seq: self.seq, kind };
        for key in keys {
            self.marks.insert(key.clone(), mark);
        }
    }

    /// Copies the current marks and the sequence they were taken at.
    pub(crate) fn capture(&self) -> (u64, Vec<(PrimaryKey, DirtyMark)>) {
        let marks = self.marks.iter().map(|(k, m)| (k.clone(), *m)).collect();
        (self.seq, marks)
    }

    /// Forgets marks made at or before `seq`.
    pub(crate) fn acknowledge(&mut self, seq: u64) {
        self.marks.retain(|_, mark| mark.seq > seq);
    }

    pub(crate) fn len(&self) -> usize {
        self.marks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
