// Baseline offset index.
//
// Maps each dense integer key `0..n` to the byte offset of that entry's
// record in the baseline file, plus a per-slot marker recording whether the
// entry has been seen during the current reconciliation pass or retired for
// good after a partial failure. The index is the only state that survives
// from one pass to the next.

use std::collections::BTreeSet;

use crate::record::ParseError;

/// State of one baseline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Not yet seen in the current pass.
    Unconsumed(u64),
    /// Seen and handled in the current pass; the offset is kept so the
    /// marker can be reverted.
    Consumed(u64),
    /// Handled in an earlier, partially failed pass. Never revisited.
    Retired,
}

impl Marker {
    /// The baseline offset, unless retired.
    pub fn offset(self) -> Option<u64> {
        match self {
            Self::Unconsumed(off) | Self::Consumed(off) => Some(off),
            Self::Retired => None,
        }
    }
}

/// Offsets of the baseline's numbered records, with their markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineIndex {
    markers: Vec<Marker>,
    /// Slots whose record was re-appended at the end of the baseline; their
    /// offsets are no longer in file order.
    relocated: BTreeSet<usize>,
}

impl BaselineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from offsets in key order.
    pub fn from_offsets(offsets: impl IntoIterator<Item = u64>) -> Self {
        Self {
            markers: offsets.into_iter().map(Marker::Unconsumed).collect(),
            relocated: BTreeSet::new(),
        }
    }

    /// Append the next key and return it.
    pub fn push(&mut self, offset: u64) -> usize {
        self.markers.push(Marker::Unconsumed(offset));
        self.markers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, n: usize) -> Option<Marker> {
        self.markers.get(n).copied()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Offset of `n` if it has not been consumed or retired.
    pub fn unconsumed(&self, n: usize) -> Option<u64> {
        match self.get(n)? {
            Marker::Unconsumed(off) => Some(off),
            _ => None,
        }
    }

    /// Look up `n` for processing: it must exist and be unconsumed.
    pub fn lookup(&self, n: usize) -> Result<u64, ParseError> {
        match self.get(n) {
            None => Err(ParseError::InvalidKey(n.to_string())),
            Some(Marker::Unconsumed(off)) => Ok(off),
            Some(_) => Err(ParseError::DuplicateKey(n)),
        }
    }

    /// Mark `n` as handled in this pass. Returns false if it was not
    /// unconsumed.
    pub fn mark_consumed(&mut self, n: usize) -> bool {
        let Some(m) = self.markers.get_mut(n) else {
            return false;
        };
        match *m {
            Marker::Unconsumed(off) => {
                *m = Marker::Consumed(off);
                true
            }
            _ => false,
        }
    }

    /// Revert every consumed marker to unconsumed, ending a pass that made
    /// no lasting changes.
    pub fn reset_pass(&mut self) {
        for m in &mut self.markers {
            if let Marker::Consumed(off) = *m {
                *m = Marker::Unconsumed(off);
            }
        }
    }

    /// Promote every consumed marker to retired. Returns how many were.
    pub fn retire_consumed(&mut self) -> usize {
        let mut count = 0;
        for m in &mut self.markers {
            if matches!(m, Marker::Consumed(_)) {
                *m = Marker::Retired;
                count += 1;
            }
        }
        count
    }

    /// Retire a single slot. Returns false if `n` is out of range.
    pub fn retire(&mut self, n: usize) -> bool {
        match self.markers.get_mut(n) {
            Some(m) => {
                *m = Marker::Retired;
                true
            }
            None => false,
        }
    }

    /// Point `n` at a new copy of its record, unconsumed.
    pub fn relocate(&mut self, n: usize, offset: u64) {
        if let Some(m) = self.markers.get_mut(n) {
            *m = Marker::Unconsumed(offset);
            self.relocated.insert(n);
        }
    }

    pub fn is_relocated(&self, n: usize) -> bool {
        self.relocated.contains(&n)
    }

    /// Keys still unconsumed, with their offsets, in key order.
    pub fn pending(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.markers.iter().enumerate().filter_map(|(n, m)| match m {
            Marker::Unconsumed(off) => Some((n, *off)),
            _ => None,
        })
    }

    pub fn count_pending(&self) -> usize {
        self.pending().count()
    }

    pub fn count_retired(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| matches!(m, Marker::Retired))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_lookup() {
        let mut index = BaselineIndex::new();
        assert_eq!(index.push(10), 0);
        assert_eq!(index.push(40), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(1).unwrap(), 40);
        assert!(matches!(index.lookup(2), Err(ParseError::InvalidKey(_))));
    }

    #[test]
    fn consumed_markers_revert() {
        let mut index = BaselineIndex::from_offsets([0, 20, 50]);
        assert!(index.mark_consumed(1));
        assert!(!index.mark_consumed(1));
        assert!(matches!(index.lookup(1), Err(ParseError::DuplicateKey(1))));
        assert_eq!(index.get(1).unwrap().offset(), Some(20));
        assert_eq!(index.pending().collect::<Vec<_>>(), vec![(0, 0), (2, 50)]);

        index.reset_pass();
        assert_eq!(index.get(1), Some(Marker::Unconsumed(20)));
    }

    #[test]
    fn retired_markers_stay_retired() {
        let mut index = BaselineIndex::from_offsets([0, 20, 50]);
        index.mark_consumed(0);
        index.mark_consumed(2);
        assert_eq!(index.retire_consumed(), 2);
        index.reset_pass();
        assert_eq!(index.get(0), Some(Marker::Retired));
        assert_eq!(index.get(0).unwrap().offset(), None);
        assert_eq!(index.count_pending(), 1);
        assert_eq!(index.count_retired(), 2);
        assert!(matches!(index.lookup(2), Err(ParseError::DuplicateKey(2))));
    }

    #[test]
    fn relocation() {
        let mut index = BaselineIndex::from_offsets([0, 20]);
        index.mark_consumed(0);
        index.relocate(0, 99);
        assert_eq!(index.unconsumed(0), Some(99));
        assert!(index.is_relocated(0));
        assert!(!index.is_relocated(1));
        assert!(index.retire(1));
        assert!(!index.retire(5));
    }
}
