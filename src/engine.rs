// Reconciliation engine: turns an edited working file back into directives.
//
// One pass streams through the working file record by record:
//   - change-records (`add`, `delete`, `rename`, `modify`) go straight to
//     the sink
//   - numbered records are matched against the baseline entry with the same
//     key, first by a raw byte comparison and, if that differs, by parsing
//     both entries and diffing them (rename detection included)
//   - baseline entries never referenced by the working file are deletions,
//     swept at the end
//
// The `BaselineIndex` markers track which keys the pass has handled. A pass
// that fails on a sink rejection leaves the markers in place so the caller
// can retire them and resume on the remainder of the working file.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};

use log::{debug, info, warn};

use crate::dn::{self, DnError, Rdn};
use crate::entry::{self, Entry};
use crate::index::BaselineIndex;
use crate::record::{ParseError, RecordFormat, RecordKey};
use crate::sink::{ChangeSink, SinkError};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// What to do when the sink refuses to delete an entry that has children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonLeafPolicy {
    /// Stop the pass at the first non-leaf entry.
    #[default]
    Abort,
    /// Keep sweeping; the pass is rejected if any remain.
    Skip,
    /// Sweep again while the previous sweep deleted at least one entry.
    Retry,
}

/// Configuration for a reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub non_leaf: NonLeafPolicy,
}

/// How a pass ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every record and deletion was handled.
    Success,
    /// The sink rejected a directive. Everything before `resume_offset` in
    /// the working file has been applied.
    HandlerRejected { resume_offset: u64 },
    /// The working file is malformed. The record at `offset` is the first
    /// one that could not be processed.
    SyntaxError { offset: u64, error: ParseError },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that are neither syntax errors nor sink rejections.
#[derive(Debug)]
pub enum ReconcileError {
    /// I/O error on either stream.
    Io(io::Error),
    /// The baseline does not contain a readable record where the index
    /// says one starts.
    CorruptBaseline { offset: u64, source: ParseError },
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::CorruptBaseline { offset, source } => {
                write!(f, "baseline corrupt at byte {offset}: {source}")
            }
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::CorruptBaseline { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for ReconcileError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Early exit from a pass.
enum Stop {
    Outcome(Outcome),
    Error(ReconcileError),
}

impl From<io::Error> for Stop {
    fn from(e: io::Error) -> Self {
        Self::Error(ReconcileError::Io(e))
    }
}

fn syntax(offset: u64, error: ParseError) -> Stop {
    match error {
        ParseError::Io(e) => Stop::Error(ReconcileError::Io(e)),
        error => Stop::Outcome(Outcome::SyntaxError { offset, error }),
    }
}

fn rejected(offset: u64, error: SinkError) -> Stop {
    info!("directive rejected, resume at byte {offset}: {error}");
    Stop::Outcome(Outcome::HandlerRejected {
        resume_offset: offset,
    })
}

fn corrupt(offset: u64, error: ParseError) -> Stop {
    match error {
        ParseError::Io(e) => Stop::Error(ReconcileError::Io(e)),
        source => Stop::Error(ReconcileError::CorruptBaseline { offset, source }),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one reconciliation pass of `working` against `baseline`.
///
/// `baseline` must be writable: when a modify is rejected right after its
/// rename went through, the renamed entry is appended to the baseline and
/// the index relocated to it, so a retry does not rename again.
///
/// On `Success` and `SyntaxError` all markers consumed by this pass are
/// reverted. On `HandlerRejected` they are left for the caller to retire.
pub fn reconcile<F, S, B, W>(
    format: &F,
    sink: &mut S,
    index: &mut BaselineIndex,
    baseline: &mut B,
    working: &mut W,
    options: &ReconcileOptions,
) -> Result<Outcome, ReconcileError>
where
    F: RecordFormat,
    S: ChangeSink + ?Sized,
    B: BufRead + Seek + Write,
    W: BufRead + Seek,
{
    let mut pass = Pass {
        format,
        sink,
        index: &mut *index,
        baseline,
        working,
    };
    let outcome = match pass.run(options.non_leaf) {
        Ok(()) => Outcome::Success,
        Err(Stop::Outcome(outcome)) => outcome,
        Err(Stop::Error(e)) => return Err(e),
    };
    if !matches!(outcome, Outcome::HandlerRejected { .. }) {
        index.reset_pass();
    }
    Ok(outcome)
}

struct Pass<'a, F, S: ?Sized, B, W> {
    format: &'a F,
    sink: &'a mut S,
    index: &'a mut BaselineIndex,
    baseline: &'a mut B,
    working: &'a mut W,
}

impl<F, S, B, W> Pass<'_, F, S, B, W>
where
    F: RecordFormat,
    S: ChangeSink + ?Sized,
    B: BufRead + Seek + Write,
    W: BufRead + Seek,
{
    fn run(&mut self, policy: NonLeafPolicy) -> Result<(), Stop> {
        loop {
            let here = self.working.stream_position()?;
            let peeked = match self.format.peek(self.working, None) {
                Ok(Some(peeked)) => peeked,
                Ok(None) => break,
                Err(e) => return Err(syntax(here, e)),
            };
            let at = peeked.offset;
            match peeked.key {
                RecordKey::Add => self.add(at)?,
                RecordKey::Delete => self.delete(at)?,
                RecordKey::Rename => self.rename(at)?,
                RecordKey::Modify => self.modify(at)?,
                key @ RecordKey::Label(_) => self.numbered(&key, at)?,
            }
        }
        let end = self.working.seek(SeekFrom::End(0))?;
        self.sweep_deletions(end, policy)
    }

    // -- change-records ----------------------------------------------------

    fn add(&mut self, at: u64) -> Result<(), Stop> {
        let entry = self.working_entry(at)?;
        debug!("add {}", entry.dn());
        self.sink.on_add(&entry).map_err(|e| rejected(at, e))
    }

    fn delete(&mut self, at: u64) -> Result<(), Stop> {
        let dn = self
            .format
            .read_delete(self.working, Some(at))
            .map_err(|e| syntax(at, e))?;
        debug!("delete {dn}");
        self.sink.on_delete(None, &dn).map_err(|e| rejected(at, e))
    }

    fn rename(&mut self, at: u64) -> Result<(), Stop> {
        let r = self
            .format
            .read_rename(self.working, Some(at))
            .map_err(|e| syntax(at, e))?;
        debug!("rename {} -> {}", r.old_dn, r.new_dn);
        self.sink
            .on_rename(None, &r.old_dn, &r.new_dn, r.delete_old_rdn)
            .map_err(|e| rejected(at, e))
    }

    fn modify(&mut self, at: u64) -> Result<(), Stop> {
        let (dn, mods) = self
            .format
            .read_modify(self.working, Some(at))
            .map_err(|e| syntax(at, e))?;
        debug!("modify {dn} ({} directives)", mods.len());
        self.sink
            .on_modify(None, &dn, &dn, &mods)
            .map_err(|e| rejected(at, e))
    }

    // -- numbered records --------------------------------------------------

    fn numbered(&mut self, key: &RecordKey, at: u64) -> Result<(), Stop> {
        let n = key.require_index().map_err(|e| syntax(at, e))?;
        let offset = self.index.lookup(n).map_err(|e| syntax(at, e))?;
        let start = self.baseline_start(offset)?;

        if let Some(span) = self.fast_span(n, start)
            && self.same_bytes(start, at, span)?
        {
            debug!("entry {n} unchanged");
            self.working.seek(SeekFrom::Start(at + span))?;
            self.index.mark_consumed(n);
            return Ok(());
        }

        let new = self.working_entry(at)?;
        let mut old = self.baseline_entry(start)?;

        let renamed = old.dn() != new.dn();
        if renamed {
            let delete_old_rdn = validate_rename(&old, &new).map_err(|e| syntax(at, e))?;
            debug!("entry {n}: rename {} -> {}", old.dn(), new.dn());
            self.sink
                .on_rename(Some(n), old.dn(), new.dn(), delete_old_rdn)
                .map_err(|e| rejected(at, e))?;
            rename_entry(&mut old, new.dn(), delete_old_rdn)
                .map_err(|e| syntax(at, e.into()))?;
        }

        let mods = entry::compare_entries(&old, &new);
        if !mods.is_empty() {
            debug!("entry {n}: modify {} ({} directives)", new.dn(), mods.len());
            if let Err(e) = self.sink.on_modify(Some(n), old.dn(), new.dn(), &mods) {
                if renamed {
                    self.relocate(n, &old)?;
                }
                return Err(rejected(at, e));
            }
        }

        self.index.mark_consumed(n);
        Ok(())
    }

    /// Length of the byte range that must match for record `n` to be
    /// unchanged: from its first line up to the start of record `n + 1`.
    fn fast_span(&self, n: usize, start: u64) -> Option<u64> {
        if self.index.is_relocated(n) || self.index.is_relocated(n + 1) {
            return None;
        }
        let next = self.index.unconsumed(n + 1)?;
        next.checked_sub(start).filter(|&span| span > 0)
    }

    /// Compare `len` bytes at `a` in the baseline with `len` bytes at `b` in
    /// the working file. Both stream positions are restored.
    fn same_bytes(&mut self, a: u64, b: u64, len: u64) -> Result<bool, Stop> {
        let saved_a = self.baseline.stream_position()?;
        let saved_b = self.working.stream_position()?;
        self.baseline.seek(SeekFrom::Start(a))?;
        self.working.seek(SeekFrom::Start(b))?;
        let equal = streams_equal(&mut *self.baseline, &mut *self.working, len)?;
        self.baseline.seek(SeekFrom::Start(saved_a))?;
        self.working.seek(SeekFrom::Start(saved_b))?;
        Ok(equal)
    }

    /// Append the rename-adjusted `entry` to the baseline and point `n` at it.
    fn relocate(&mut self, n: usize, entry: &Entry) -> Result<(), Stop> {
        let end = self.baseline.seek(SeekFrom::End(0))?;
        self.format
            .write_entry(self.baseline, entry, &n.to_string())?;
        self.baseline.flush()?;
        let start = self.baseline_start(end)?;
        self.index.relocate(n, start);
        info!("entry {n} renamed to {}; baseline copy at byte {start}", entry.dn());
        Ok(())
    }

    // -- deletions ---------------------------------------------------------

    fn sweep_deletions(&mut self, end: u64, policy: NonLeafPolicy) -> Result<(), Stop> {
        loop {
            let mut leaves = 0usize;
            let mut non_leaves = 0usize;
            let pending: Vec<(usize, u64)> = self.index.pending().collect();
            for (n, offset) in pending {
                let old = self.baseline_entry(offset)?;
                debug!("entry {n}: delete {}", old.dn());
                match self.sink.on_delete(Some(n), old.dn()) {
                    Ok(()) => {
                        leaves += 1;
                        self.index.mark_consumed(n);
                    }
                    Err(SinkError::NonLeaf) if policy != NonLeafPolicy::Abort => {
                        warn!("skipping non-leaf entry: {}", old.dn());
                        non_leaves += 1;
                    }
                    Err(e) => return Err(rejected(end, e)),
                }
            }
            if policy == NonLeafPolicy::Retry && non_leaves > 0 && leaves > 0 {
                info!(
                    "retrying {non_leaves} failed deletion{}",
                    if non_leaves == 1 { "" } else { "s" }
                );
                continue;
            }
            if non_leaves > 0 {
                return Err(rejected(end, SinkError::NonLeaf));
            }
            return Ok(());
        }
    }

    // -- reading -----------------------------------------------------------

    fn working_entry(&mut self, at: u64) -> Result<Entry, Stop> {
        match self.format.read_entry(self.working, Some(at)) {
            Ok(Some((_, entry, _))) => Ok(entry),
            Ok(None) => Err(syntax(at, ParseError::UnexpectedEof)),
            Err(e) => Err(syntax(at, e)),
        }
    }

    fn baseline_entry(&mut self, offset: u64) -> Result<Entry, Stop> {
        match self.format.read_entry(self.baseline, Some(offset)) {
            Ok(Some((_, entry, _))) => Ok(entry),
            Ok(None) => Err(corrupt(offset, ParseError::UnexpectedEof)),
            Err(e) => Err(corrupt(offset, e)),
        }
    }

    /// Exact position of the record at or after `offset` in the baseline.
    fn baseline_start(&mut self, offset: u64) -> Result<u64, Stop> {
        match self.format.peek(self.baseline, Some(offset)) {
            Ok(Some(peeked)) => Ok(peeked.offset),
            Ok(None) => Err(corrupt(offset, ParseError::UnexpectedEof)),
            Err(e) => Err(corrupt(offset, e)),
        }
    }
}

fn streams_equal<A: Read, B: Read>(a: &mut A, b: &mut B, len: u64) -> io::Result<bool> {
    const CHUNK: usize = 8 * 1024;
    let mut buf_a = [0u8; CHUNK];
    let mut buf_b = [0u8; CHUNK];
    let mut left = len;
    while left > 0 {
        let n = left.min(CHUNK as u64) as usize;
        if !read_full(a, &mut buf_a[..n])? || !read_full(b, &mut buf_b[..n])? {
            return Ok(false);
        }
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
        left -= n as u64;
    }
    Ok(true)
}

fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Renames
// ---------------------------------------------------------------------------

fn rdn_present(entry: &Entry, rdn: &Rdn) -> bool {
    rdn.iter().all(|ava| entry.has_value(&ava.attr, &ava.value))
}

/// Check that a DN change between `old` and `new` is a well-formed rename
/// and decide whether the old RDN values are dropped.
///
/// Both entries must carry the values of their own leading RDN. If all of
/// the old RDN values survive in `new` the old RDN is kept (`false`); if
/// none do it is deleted (`true`); anything in between is an error.
pub fn validate_rename(old: &Entry, new: &Entry) -> Result<bool, ParseError> {
    if old.dn().trim().is_empty() {
        return Err(ParseError::RenameRoot);
    }
    if new.dn().trim().is_empty() {
        return Err(ParseError::RenameToRoot);
    }
    let old_rdn = dn::leading_rdn(old.dn())?;
    let new_rdn = dn::leading_rdn(new.dn())?;
    if !rdn_present(old, &old_rdn) {
        return Err(ParseError::OldRdnMissing);
    }
    if !rdn_present(new, &new_rdn) {
        return Err(ParseError::NewRdnMissing);
    }
    let kept = old_rdn
        .iter()
        .filter(|ava| new.has_value(&ava.attr, &ava.value))
        .count();
    if kept == old_rdn.len() {
        Ok(false)
    } else if kept == 0 {
        Ok(true)
    } else {
        Err(ParseError::IncompleteRdnChange)
    }
}

/// Apply a rename to an in-memory entry: drop the old RDN values if asked,
/// add the new RDN values, and set the new DN.
pub fn rename_entry(entry: &mut Entry, new_dn: &str, delete_old_rdn: bool) -> Result<(), DnError> {
    let new_rdn = dn::leading_rdn(new_dn)?;
    if delete_old_rdn {
        for ava in dn::leading_rdn(entry.dn())? {
            entry.remove_value(&ava.attr, &ava.value);
        }
    }
    for ava in new_rdn {
        if !entry.has_value(&ava.attr, &ava.value) {
            entry.add_value(&ava.attr, ava.value);
        }
    }
    entry.set_dn(new_dn);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Modification;
    use crate::index::Marker;
    use crate::record::NativeFormat;
    use crate::sink::Statistics;
    use std::io::Cursor;

    /// Records every directive as a line of text.
    #[derive(Default)]
    struct Log {
        lines: Vec<String>,
        reject_modify: bool,
    }

    impl ChangeSink for Log {
        fn on_add(&mut self, entry: &Entry) -> Result<(), SinkError> {
            self.lines.push(format!("add {}", entry.dn()));
            Ok(())
        }
        fn on_delete(&mut self, key: Option<usize>, dn: &str) -> Result<(), SinkError> {
            self.lines.push(format!("delete {key:?} {dn}"));
            Ok(())
        }
        fn on_rename(
            &mut self,
            key: Option<usize>,
            old_dn: &str,
            new_dn: &str,
            delete_old_rdn: bool,
        ) -> Result<(), SinkError> {
            self.lines
                .push(format!("rename {key:?} {old_dn} {new_dn} {delete_old_rdn}"));
            Ok(())
        }
        fn on_modify(
            &mut self,
            key: Option<usize>,
            label_dn: &str,
            dn: &str,
            mods: &[Modification],
        ) -> Result<(), SinkError> {
            if self.reject_modify {
                return Err(SinkError::Rejected("no".into()));
            }
            let ops: Vec<String> = mods
                .iter()
                .map(|m| format!("{}:{}", m.op, m.attr))
                .collect();
            self.lines
                .push(format!("modify {key:?} {label_dn} {dn} {}", ops.join(",")));
            Ok(())
        }
    }

    const BASELINE: &str = "version: ldapvi\n\
                            \n0 cn=a,dc=x\ncn: a\nsn: one\n\
                            \n1 cn=b,dc=x\ncn: b\n\
                            \n2 cn=c,dc=x\ncn: c\n";

    fn index_of(text: &str) -> BaselineIndex {
        let mut r = Cursor::new(text.as_bytes());
        let mut index = BaselineIndex::new();
        while let Some((_, _, off)) = NativeFormat.read_entry(&mut r, None).unwrap() {
            index.push(off);
        }
        index
    }

    fn run(sink: &mut Log, working: &str) -> (Outcome, BaselineIndex, Vec<u8>) {
        let mut index = index_of(BASELINE);
        let mut baseline = Cursor::new(BASELINE.as_bytes().to_vec());
        let mut working = Cursor::new(working.as_bytes());
        let outcome = reconcile(
            &NativeFormat,
            sink,
            &mut index,
            &mut baseline,
            &mut working,
            &ReconcileOptions::default(),
        )
        .unwrap();
        (outcome, index, baseline.into_inner())
    }

    #[test]
    fn identical_files_produce_nothing() {
        let mut log = Log::default();
        let (outcome, index, _) = run(&mut log, BASELINE);
        assert!(outcome.is_success());
        assert!(log.lines.is_empty());
        assert_eq!(index.count_pending(), 3);
    }

    #[test]
    fn missing_record_is_a_deletion() {
        let working = "\n0 cn=a,dc=x\ncn: a\nsn: one\n\n2 cn=c,dc=x\ncn: c\n";
        let mut log = Log::default();
        let (outcome, _, _) = run(&mut log, working);
        assert!(outcome.is_success());
        assert_eq!(log.lines, ["delete Some(1) cn=b,dc=x"]);
    }

    #[test]
    fn changed_attribute_is_a_modify() {
        let working = BASELINE.replace("sn: one", "sn: two");
        let mut log = Log::default();
        run(&mut log, &working);
        assert_eq!(log.lines, ["modify Some(0) cn=a,dc=x cn=a,dc=x replace:sn"]);
    }

    #[test]
    fn reordering_records_is_not_a_change() {
        let working = "\n2 cn=c,dc=x\ncn: c\n\n0 cn=a,dc=x\nsn: one\ncn: a\n\n1 cn=b,dc=x\ncn: b\n";
        let mut log = Log::default();
        let (outcome, _, _) = run(&mut log, working);
        assert!(outcome.is_success());
        assert!(log.lines.is_empty());
    }

    #[test]
    fn rename_then_modify() {
        let working = BASELINE.replace("1 cn=b,dc=x\ncn: b\n", "1 cn=z,dc=x\ncn: z\nmail: z@x\n");
        let mut log = Log::default();
        run(&mut log, &working);
        assert_eq!(
            log.lines,
            [
                "rename Some(1) cn=b,dc=x cn=z,dc=x true",
                "modify Some(1) cn=z,dc=x cn=z,dc=x add:mail",
            ]
        );
    }

    #[test]
    fn change_records_pass_through() {
        let working = format!(
            "{BASELINE}\nadd cn=n,dc=x\ncn: n\n\ndelete cn=q,dc=x\n\nrename cn=r,dc=x\nadd cn=s,dc=x\n\nmodify cn=t,dc=x\ndelete fax\n-\n"
        );
        let mut log = Log::default();
        let (outcome, _, _) = run(&mut log, &working);
        assert!(outcome.is_success());
        assert_eq!(
            log.lines,
            [
                "add cn=n,dc=x",
                "delete None cn=q,dc=x",
                "rename None cn=r,dc=x cn=s,dc=x false",
                "modify None cn=t,dc=x cn=t,dc=x delete:fax",
            ]
        );
    }

    #[test]
    fn syntax_errors_report_record_offset_and_reset_markers() {
        let working = "\n0 cn=a,dc=x\ncn: a\nsn: one\n\n1 cn=b,dc=x\ncn:bogus b\n";
        let mut log = Log::default();
        let (outcome, index, _) = run(&mut log, working);
        match outcome {
            Outcome::SyntaxError { offset, error } => {
                assert_eq!(offset, 28);
                assert!(matches!(error, ParseError::UnknownEncoding(_)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(index.count_pending(), 3);
    }

    #[test]
    fn duplicate_and_invalid_keys() {
        let mut log = Log::default();
        let dup = "\n1 cn=b,dc=x\ncn: b\n\n1 cn=b,dc=x\ncn: b\n";
        let (outcome, _, _) = run(&mut log, dup);
        assert!(matches!(
            outcome,
            Outcome::SyntaxError { error: ParseError::DuplicateKey(1), .. }
        ));

        let (outcome, _, _) = run(&mut log, "\n7 cn=b,dc=x\ncn: b\n");
        assert!(matches!(
            outcome,
            Outcome::SyntaxError { error: ParseError::InvalidKey(_), .. }
        ));
        let (outcome, _, _) = run(&mut log, "\nfrob cn=b,dc=x\ncn: b\n");
        assert!(matches!(
            outcome,
            Outcome::SyntaxError { error: ParseError::InvalidKey(_), .. }
        ));
    }

    #[test]
    fn rejected_modify_after_rename_relocates_baseline_copy() {
        let working = BASELINE.replace("1 cn=b,dc=x\ncn: b\n", "1 cn=z,dc=x\ncn: z\nmail: z@x\n");
        let mut log = Log {
            reject_modify: true,
            ..Default::default()
        };
        let (outcome, index, baseline) = run(&mut log, &working);
        let resume = match outcome {
            Outcome::HandlerRejected { resume_offset } => resume_offset,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(&working[resume as usize..][..13], "1 cn=z,dc=x\nc");
        assert_eq!(log.lines, ["rename Some(1) cn=b,dc=x cn=z,dc=x true"]);

        // Entry 0 was consumed, entry 1 now points at the renamed copy.
        assert!(matches!(index.get(0), Some(Marker::Consumed(_))));
        assert_eq!(index.count_pending(), 2);
        assert!(index.is_relocated(1));
        let off = index.unconsumed(1).unwrap() as usize;
        let tail = std::str::from_utf8(&baseline[off..]).unwrap();
        assert_eq!(tail, "1 cn=z,dc=x\ncn: z\n");
    }

    #[test]
    fn statistics_over_a_pass() {
        let working = BASELINE.replace("sn: one", "sn: two").replace("\n2 cn=c,dc=x\ncn: c\n", "");
        let mut stats = Statistics::default();
        let mut index = index_of(BASELINE);
        let outcome = reconcile(
            &NativeFormat,
            &mut stats,
            &mut index,
            &mut Cursor::new(BASELINE.as_bytes().to_vec()),
            &mut Cursor::new(working.as_bytes()),
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert!(outcome.is_success());
        assert_eq!((stats.modifies, stats.deletes), (1, 1));
    }

    fn entry(dn: &str, cns: &[&str]) -> Entry {
        cns.iter().fold(Entry::new(dn), |e, cn| e.with("cn", *cn))
    }

    #[test]
    fn rename_validation() {
        let old = entry("cn=alice,dc=x", &["alice"]);
        assert!(validate_rename(&old, &entry("cn=bob,dc=x", &["bob"])).unwrap());
        assert!(!validate_rename(&old, &entry("cn=bob,dc=x", &["bob", "alice"])).unwrap());
        let sn_only = Entry::new("cn=bob,dc=x").with("sn", "bob");
        assert!(matches!(
            validate_rename(&old, &sn_only),
            Err(ParseError::NewRdnMissing)
        ));
        assert!(matches!(
            validate_rename(&entry("cn=alice,dc=x", &[]), &entry("cn=bob,dc=x", &["bob"])),
            Err(ParseError::OldRdnMissing)
        ));
        assert!(matches!(
            validate_rename(&Entry::new(""), &entry("cn=bob", &["bob"])),
            Err(ParseError::RenameRoot)
        ));
        assert!(matches!(
            validate_rename(&old, &Entry::new("")),
            Err(ParseError::RenameToRoot)
        ));

        let old = Entry::new("cn=a+uid=1,dc=x").with("cn", "a").with("uid", "1");
        let new = Entry::new("cn=b,dc=x").with("cn", "b").with("uid", "1");
        assert!(matches!(
            validate_rename(&old, &new),
            Err(ParseError::IncompleteRdnChange)
        ));
    }

    #[test]
    fn rename_entry_adjusts_rdn_values() {
        let mut e = entry("cn=alice,dc=x", &["alice"]).with("sn", "s");
        rename_entry(&mut e, "cn=bob,dc=y", true).unwrap();
        assert_eq!(e.dn(), "cn=bob,dc=y");
        assert!(e.has_value("cn", b"bob"));
        assert!(!e.has_value("cn", b"alice"));

        let mut e = entry("cn=alice,dc=x", &["alice"]);
        rename_entry(&mut e, "cn=bob,dc=x", false).unwrap();
        assert!(e.has_value("cn", b"alice") && e.has_value("cn", b"bob"));
        assert_eq!(
            entry::compare_entries(&e, &entry("cn=bob,dc=x", &["alice", "bob"])),
            Vec::<Modification>::new()
        );
    }

    #[test]
    fn streams_compare_in_chunks() {
        let a = vec![7u8; 20_000];
        let mut b = a.clone();
        assert!(streams_equal(&mut &a[..], &mut &b[..], 20_000).unwrap());
        b[19_999] = 8;
        assert!(!streams_equal(&mut &a[..], &mut &b[..], 20_000).unwrap());
        assert!(!streams_equal(&mut &a[..100], &mut &b[..100], 200).unwrap());
    }
}
