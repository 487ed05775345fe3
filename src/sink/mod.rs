// Change sinks: consumers of the directives produced by reconciliation.
//
// The engine calls exactly one method per directive, in working-file order
// followed by deletions. A sink either accepts the directive or rejects it;
// a rejection ends the pass and leaves the baseline index marked so that
// the caller can resume after the last accepted directive.

mod apply;
mod render;

use std::collections::BTreeSet;
use std::fmt;

use crate::entry::{Entry, Modification};

pub use apply::{ApplyOptions, ApplySink};
pub use render::Renderer;

/// Why a sink refused a directive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The directive could not be applied; the pass must stop here.
    #[error("{0}")]
    Rejected(String),
    /// A delete failed because the entry still has children. The engine
    /// may retry it once other deletions have gone through.
    #[error("entry has children")]
    NonLeaf,
}

/// Receiver of reconciliation directives.
///
/// `key` is the baseline index of the entry a directive derives from, or
/// `None` for change-records typed into the working file. Every method
/// defaults to accepting and ignoring the directive.
pub trait ChangeSink {
    /// Create `entry`.
    fn on_add(&mut self, entry: &Entry) -> Result<(), SinkError> {
        let _ = entry;
        Ok(())
    }

    /// Delete the entry at `dn`.
    fn on_delete(&mut self, key: Option<usize>, dn: &str) -> Result<(), SinkError> {
        let _ = (key, dn);
        Ok(())
    }

    /// Rename `old_dn` to `new_dn`, removing the old RDN values from the
    /// entry if `delete_old_rdn` is set.
    fn on_rename(
        &mut self,
        key: Option<usize>,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> Result<(), SinkError> {
        let _ = (key, old_dn, new_dn, delete_old_rdn);
        Ok(())
    }

    /// Apply `mods` to the entry at `dn`. `label_dn` is the DN of the
    /// baseline copy the directives were computed against, after any
    /// rename in the same record.
    fn on_modify(
        &mut self,
        key: Option<usize>,
        label_dn: &str,
        dn: &str,
        mods: &[Modification],
    ) -> Result<(), SinkError> {
        let _ = (key, label_dn, dn, mods);
        Ok(())
    }
}

impl<S: ChangeSink + ?Sized> ChangeSink for &mut S {
    fn on_add(&mut self, entry: &Entry) -> Result<(), SinkError> {
        (**self).on_add(entry)
    }

    fn on_delete(&mut self, key: Option<usize>, dn: &str) -> Result<(), SinkError> {
        (**self).on_delete(key, dn)
    }

    fn on_rename(
        &mut self,
        key: Option<usize>,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> Result<(), SinkError> {
        (**self).on_rename(key, old_dn, new_dn, delete_old_rdn)
    }

    fn on_modify(
        &mut self,
        key: Option<usize>,
        label_dn: &str,
        dn: &str,
        mods: &[Modification],
    ) -> Result<(), SinkError> {
        (**self).on_modify(key, label_dn, dn, mods)
    }
}

// ---------------------------------------------------------------------------
// Trivial sinks
// ---------------------------------------------------------------------------

/// Accepts everything and does nothing. Useful for syntax checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChangeSink for NoopSink {}

/// Counts directives by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub adds: usize,
    pub deletes: usize,
    pub modifies: usize,
    pub renames: usize,
}

impl Statistics {
    pub fn total(&self) -> usize {
        self.adds + self.deletes + self.modifies + self.renames
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "add: {}, rename: {}, modify: {}, delete: {}",
            self.adds, self.renames, self.modifies, self.deletes
        )
    }
}

impl ChangeSink for Statistics {
    fn on_add(&mut self, _entry: &Entry) -> Result<(), SinkError> {
        self.adds += 1;
        Ok(())
    }

    fn on_delete(&mut self, _key: Option<usize>, _dn: &str) -> Result<(), SinkError> {
        self.deletes += 1;
        Ok(())
    }

    fn on_rename(
        &mut self,
        _key: Option<usize>,
        _old_dn: &str,
        _new_dn: &str,
        _delete_old_rdn: bool,
    ) -> Result<(), SinkError> {
        self.renames += 1;
        Ok(())
    }

    fn on_modify(
        &mut self,
        _key: Option<usize>,
        _label_dn: &str,
        _dn: &str,
        _mods: &[Modification],
    ) -> Result<(), SinkError> {
        self.modifies += 1;
        Ok(())
    }
}

/// Collects the baseline keys of entries that would be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionCollector {
    keys: BTreeSet<usize>,
}

impl DeletionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl ChangeSink for DeletionCollector {
    fn on_delete(&mut self, key: Option<usize>, _dn: &str) -> Result<(), SinkError> {
        if let Some(n) = key {
            self.keys.insert(n);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
