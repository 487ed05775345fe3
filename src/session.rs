// Session layer: one baseline file, one working file, one index.
//
// Drives reconciliation passes over files on disk and takes care of the
// bookkeeping between passes: after a partially applied commit the working
// file is cut at the resume offset and the consumed keys are retired, so
// the next commit only sees what is left.

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::directory::Directory;
use crate::engine::{self, Outcome, ReconcileError, ReconcileOptions};
use crate::entry::Entry;
use crate::index::BaselineIndex;
use crate::io::{self as files, IoError, SnapshotFile};
use crate::record::{ParseError, RecordFormat, RecordKey};
use crate::sink::{ApplyOptions, ApplySink, ChangeSink, DeletionCollector, Renderer, Statistics};

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    File(#[from] IoError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("syntax error at byte {offset}: {error}")]
    Syntax { offset: u64, error: ParseError },
}

/// Result of [`Session::analyze`].
#[derive(Debug)]
pub enum Analysis {
    Changes(Statistics),
    NoChanges,
    SyntaxError { offset: u64, error: ParseError },
}

/// Result of [`Session::commit`].
#[derive(Debug)]
pub enum Committed {
    /// Every directive went through.
    Complete { applied: usize },
    /// A directive was rejected. The working file now starts at the
    /// rejected record and `retired` keys will not be offered again.
    Partial {
        applied: usize,
        retired: usize,
        resume_offset: u64,
    },
    /// Nothing was applied past the malformed record at `offset`.
    SyntaxError { offset: u64, error: ParseError },
}

/// What [`Session::skip_record`] dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    /// The first record of the working file.
    Record(RecordKey),
    /// The working file was empty; this pending deletion was dropped.
    Deletion(usize),
    Nothing,
}

/// A baseline/working file pair and the index of the baseline.
#[derive(Debug)]
pub struct Session<F> {
    format: F,
    baseline: PathBuf,
    working: PathBuf,
    index: BaselineIndex,
}

impl<F: RecordFormat> Session<F> {
    /// Open an existing pair, indexing the baseline.
    pub fn open(
        format: F,
        baseline: impl Into<PathBuf>,
        working: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        let baseline = baseline.into();
        let index = files::index_file(&format, &baseline)?;
        info!("{}: {} entries", baseline.display(), index.len());
        Ok(Self {
            format,
            baseline,
            working: working.into(),
            index,
        })
    }

    /// Write `entries` as a fresh baseline and copy it to the working file.
    pub fn create<'e>(
        format: F,
        entries: impl IntoIterator<Item = &'e Entry>,
        baseline: impl Into<PathBuf>,
        working: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        let baseline = baseline.into();
        let working = working.into();
        let mut out = BufWriter::new(File::create(&baseline)?);
        let index = files::write_snapshot(&format, &mut out, entries)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        std::fs::copy(&baseline, &working)?;
        info!("{}: wrote {} entries", baseline.display(), index.len());
        Ok(Self {
            format,
            baseline,
            working,
            index,
        })
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn baseline(&self) -> &Path {
        &self.baseline
    }

    pub fn working(&self) -> &Path {
        &self.working
    }

    pub fn index(&self) -> &BaselineIndex {
        &self.index
    }

    /// Run one pass. The baseline is only opened for writing when the sink
    /// has lasting effects, so that a rejected modify can relocate a renamed
    /// entry.
    fn pass<S: ChangeSink + ?Sized>(
        &mut self,
        sink: &mut S,
        options: &ReconcileOptions,
        writable: bool,
    ) -> Result<Outcome, ReconcileError> {
        let mut baseline = if writable {
            SnapshotFile::open(&self.baseline)?
        } else {
            SnapshotFile::open_read(&self.baseline)?
        };
        let mut working = SnapshotFile::open_read(&self.working)?;
        engine::reconcile(
            &self.format,
            sink,
            &mut self.index,
            &mut baseline,
            &mut working,
            options,
        )
    }

    /// A pass whose sink has no lasting effect: markers are always reverted
    /// and the baseline is never appended to.
    fn dry_pass<S: ChangeSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<Outcome, ReconcileError> {
        let result = self.pass(sink, &ReconcileOptions::default(), false);
        if !matches!(result, Ok(Outcome::Success | Outcome::SyntaxError { .. })) {
            self.index.reset_pass();
        }
        result
    }

    /// Count the pending changes without applying anything.
    pub fn analyze(&mut self) -> Result<Analysis, SessionError> {
        let mut stats = Statistics::default();
        Ok(match self.dry_pass(&mut stats)? {
            Outcome::SyntaxError { offset, error } => Analysis::SyntaxError { offset, error },
            _ if stats.is_empty() => Analysis::NoChanges,
            _ => Analysis::Changes(stats),
        })
    }

    /// Apply the pending changes to `directory`.
    pub fn commit<D: Directory + ?Sized>(
        &mut self,
        directory: &mut D,
        apply: ApplyOptions,
        options: &ReconcileOptions,
    ) -> Result<Committed, SessionError> {
        let mut sink = ApplySink::new(directory, apply);
        let outcome = self.pass(&mut sink, options, true)?;
        let applied = sink.applied();
        match outcome {
            Outcome::Success => {
                info!("{applied} directives applied");
                Ok(Committed::Complete { applied })
            }
            Outcome::SyntaxError { offset, error } => Ok(Committed::SyntaxError { offset, error }),
            Outcome::HandlerRejected { resume_offset } => {
                files::cut_working_file(&self.format, &self.working, resume_offset)?;
                let retired = self.index.retire_consumed();
                info!("{applied} directives applied, {retired} entries retired; resuming at byte {resume_offset}");
                Ok(Committed::Partial {
                    applied,
                    retired,
                    resume_offset,
                })
            }
        }
    }

    /// Write every pending change as change-records of `target` to `out`.
    pub fn render<T: RecordFormat, W: Write>(&mut self, target: T, out: W) -> Result<(), SessionError> {
        let mut renderer = Renderer::new(target, out);
        renderer.write_header()?;
        let result = self.dry_pass(&mut renderer);
        if let Some(e) = renderer.take_error() {
            return Err(e.into());
        }
        if let Outcome::SyntaxError { offset, error } = result? {
            return Err(SessionError::Syntax { offset, error });
        }
        renderer.flush()?;
        Ok(())
    }

    /// Retire every baseline entry the working file no longer mentions, so
    /// that their deletion is never offered. Returns how many there were.
    pub fn forget_deletions(&mut self) -> Result<usize, SessionError> {
        let mut collector = DeletionCollector::new();
        if let Outcome::SyntaxError { offset, error } = self.dry_pass(&mut collector)? {
            return Err(SessionError::Syntax { offset, error });
        }
        for n in collector.keys() {
            self.index.retire(n);
        }
        info!("forgot {} deletions", collector.len());
        Ok(collector.len())
    }

    /// Drop the first record of the working file. Once the working file
    /// has no records left, drop the first pending deletion instead.
    pub fn skip_record(&mut self) -> Result<Skipped, SessionError> {
        let mut working = SnapshotFile::open_read(&self.working)?;
        let here = working.stream_position()?;
        let key = match self.format.skip(&mut working, None) {
            Ok(key) => key,
            Err(ParseError::Io(e)) => return Err(e.into()),
            Err(error) => return Err(SessionError::Syntax { offset: here, error }),
        };
        let next = working.stream_position()?;
        drop(working);

        match key {
            Some(key) => {
                files::cut_working_file(&self.format, &self.working, next)?;
                if let Some(n) = key.index() {
                    self.index.retire(n);
                }
                info!("skipped record {key}");
                Ok(Skipped::Record(key))
            }
            None => {
                let first = self.index.pending().next();
                match first {
                    Some((n, _)) => {
                        self.index.retire(n);
                        info!("skipped deletion of entry {n}");
                        Ok(Skipped::Deletion(n))
                    }
                    None => Ok(Skipped::Nothing),
                }
            }
        }
    }
}

/// Reconcile `working` against `baseline` without a session and write the
/// changes as change-records of `target`.
pub fn offline_diff<F: RecordFormat, T: RecordFormat, W: Write>(
    format: &F,
    target: T,
    baseline: &Path,
    working: &Path,
    out: W,
) -> Result<Statistics, SessionError> {
    let mut index = files::index_file(format, baseline)?;
    let mut baseline = SnapshotFile::open_read(baseline)?;
    let mut working = SnapshotFile::open_read(working)?;

    let mut stats = Statistics::default();
    let mut renderer = Renderer::new(target, out);
    renderer.write_header()?;
    let result = {
        let mut both = Tee(&mut stats, &mut renderer);
        engine::reconcile(
            format,
            &mut both,
            &mut index,
            &mut baseline,
            &mut working,
            &ReconcileOptions::default(),
        )
    };
    // A write error rejects the directive; it takes precedence over any
    // failure that follows from the rejection.
    if let Some(e) = renderer.take_error() {
        return Err(e.into());
    }
    if let Outcome::SyntaxError { offset, error } = result? {
        return Err(SessionError::Syntax { offset, error });
    }
    renderer.flush()?;
    Ok(stats)
}

/// Forwards each directive to two sinks.
struct Tee<A, B>(A, B);

impl<A: ChangeSink, B: ChangeSink> ChangeSink for Tee<A, B> {
    fn on_add(&mut self, entry: &Entry) -> Result<(), crate::sink::SinkError> {
        self.0.on_add(entry)?;
        self.1.on_add(entry)
    }

    fn on_delete(&mut self, key: Option<usize>, dn: &str) -> Result<(), crate::sink::SinkError> {
        self.0.on_delete(key, dn)?;
        self.1.on_delete(key, dn)
    }

    fn on_rename(
        &mut self,
        key: Option<usize>,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> Result<(), crate::sink::SinkError> {
        self.0.on_rename(key, old_dn, new_dn, delete_old_rdn)?;
        self.1.on_rename(key, old_dn, new_dn, delete_old_rdn)
    }

    fn on_modify(
        &mut self,
        key: Option<usize>,
        label_dn: &str,
        dn: &str,
        mods: &[crate::entry::Modification],
    ) -> Result<(), crate::sink::SinkError> {
        self.0.on_modify(key, label_dn, dn, mods)?;
        self.1.on_modify(key, label_dn, dn, mods)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
