// Applies directives to a `Directory`.

use log::{debug, info, warn};

use super::{ChangeSink, SinkError};
use crate::directory::{Directory, DirectoryError};
use crate::dn;
use crate::entry::{Entry, Modification};

/// Behaviour switches for [`ApplySink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Log every applied directive at info level.
    pub verbose: bool,
    /// Log directory errors and carry on instead of rejecting.
    pub continuous: bool,
    /// Report non-leaf deletions as plain rejections rather than
    /// [`SinkError::NonLeaf`], leaving no room for a retry.
    pub no_questions: bool,
}

/// A sink that performs each directive against a directory.
pub struct ApplySink<'a, D: ?Sized> {
    directory: &'a mut D,
    options: ApplyOptions,
    applied: usize,
    ignored: usize,
}

impl<'a, D: Directory + ?Sized> ApplySink<'a, D> {
    pub fn new(directory: &'a mut D, options: ApplyOptions) -> Self {
        Self {
            directory,
            options,
            applied: 0,
            ignored: 0,
        }
    }

    /// Directives the directory accepted.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Directives that failed but were ignored in continuous mode.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    fn finish(
        &mut self,
        what: &str,
        dn: &str,
        result: Result<(), DirectoryError>,
    ) -> Result<(), SinkError> {
        match result {
            Ok(()) => {
                self.applied += 1;
                if self.options.verbose {
                    info!("({what}) {dn}");
                } else {
                    debug!("({what}) {dn}");
                }
                Ok(())
            }
            Err(e) if self.options.continuous => {
                self.ignored += 1;
                warn!("{what} {dn}: {e} (error ignored)");
                Ok(())
            }
            Err(e) => Err(SinkError::Rejected(format!("{what} {dn}: {e}"))),
        }
    }
}

impl<D: Directory + ?Sized> ChangeSink for ApplySink<'_, D> {
    fn on_add(&mut self, entry: &Entry) -> Result<(), SinkError> {
        let result = self.directory.add(entry);
        self.finish("add", entry.dn(), result)
    }

    fn on_delete(&mut self, _key: Option<usize>, dn: &str) -> Result<(), SinkError> {
        match self.directory.delete(dn) {
            Err(DirectoryError::NotAllowedOnNonLeaf(_)) if !self.options.no_questions => {
                warn!("cannot delete non-leaf entry: {dn}");
                Err(SinkError::NonLeaf)
            }
            result => self.finish("delete", dn, result),
        }
    }

    fn on_rename(
        &mut self,
        _key: Option<usize>,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> Result<(), SinkError> {
        let result = split_move(old_dn, new_dn).and_then(|(rdn, superior)| {
            self.directory
                .rename(old_dn, rdn, superior, delete_old_rdn)
        });
        self.finish("rename", old_dn, result)
    }

    fn on_modify(
        &mut self,
        _key: Option<usize>,
        _label_dn: &str,
        dn: &str,
        mods: &[Modification],
    ) -> Result<(), SinkError> {
        let result = self.directory.modify(dn, mods);
        self.finish("modify", dn, result)
    }
}

/// Split a move into the new RDN and, if the parent changes, the new
/// superior (`""` for the root).
fn split_move<'n>(
    old_dn: &str,
    new_dn: &'n str,
) -> Result<(&'n str, Option<&'n str>), DirectoryError> {
    let (rdn, new_parent) = dn::split_first(new_dn)?;
    let old_parent = dn::parent(old_dn);
    let same = match (old_parent, new_parent) {
        (None, None) => true,
        (Some(a), Some(b)) => dn::normalize(a)? == dn::normalize(b)?,
        _ => false,
    };
    Ok((rdn, if same { None } else { Some(new_parent.unwrap_or("")) }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
