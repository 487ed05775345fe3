// Command-line front end for dirvi.
//
// Explicit subcommands over the session layer: offline diff, change
// statistics, applying an edited snapshot to an LDIF file that stands in
// for the directory, index dumps and snapshot creation.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::directory::MemoryDirectory;
use crate::engine::{NonLeafPolicy, ReconcileOptions};
use crate::entry::Entry;
use crate::io::{self as files, IoError, SnapshotFile};
use crate::record::{LdifFormat, NativeFormat, RecordFormat, Syntax};
use crate::session::{self, Analysis, Committed, Session, SessionError, Skipped};
use crate::sink::{ApplyOptions, Statistics};

const BUF_SIZE: usize = 64 * 1024;

/// Bind `$f` to the record format selected by a [`Syntax`] and evaluate
/// `$body` with it.
macro_rules! with_format {
    ($syntax:expr, |$f:ident| $body:expr) => {
        match $syntax {
            Syntax::Native => {
                let $f = NativeFormat;
                $body
            }
            Syntax::Ldif => {
                let $f = LdifFormat;
                $body
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Reconcile edited directory snapshots into change records.
#[derive(Parser, Debug)]
#[command(
    name = "dirvi",
    version,
    about = "Reconcile edited directory snapshots",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the changes between a baseline and its edited copy.
    Diff(DiffArgs),
    /// Count the changes between a baseline and its edited copy.
    Stat(PairArgs),
    /// Apply the changes to an LDIF file standing in for the directory.
    Apply(ApplyArgs),
    /// Print the record offsets of a baseline.
    Index(IndexArgs),
    /// Turn plain LDIF entries into a numbered baseline.
    Snapshot(SnapshotArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyntaxArg {
    Native,
    Ldif,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NonLeafArg {
    Abort,
    Skip,
    Retry,
}

#[derive(Args, Debug)]
struct PairArgs {
    /// Baseline snapshot.
    #[arg(value_hint = ValueHint::FilePath)]
    baseline: PathBuf,

    /// Edited copy of the baseline.
    #[arg(value_hint = ValueHint::FilePath)]
    working: PathBuf,

    /// Record syntax of both files.
    #[arg(long, value_enum, default_value_t = SyntaxArg::Native)]
    format: SyntaxArg,
}

#[derive(Args, Debug)]
struct DiffArgs {
    #[command(flatten)]
    files: PairArgs,

    /// Syntax of the printed change records.
    #[arg(long, value_enum, default_value_t = SyntaxArg::Ldif)]
    render: SyntaxArg,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[command(flatten)]
    files: PairArgs,

    /// LDIF file holding the directory entries; rewritten in place.
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    directory: PathBuf,

    /// What to do when an entry with children cannot be deleted.
    #[arg(long = "non-leaf", value_enum, default_value_t = NonLeafArg::Abort)]
    non_leaf: NonLeafArg,

    /// Log failed directives and carry on.
    #[arg(long)]
    continuous: bool,

    /// Drop a rejected record and retry with the rest.
    #[arg(long = "skip-failed")]
    skip_failed: bool,

    /// Never delete entries missing from the edited copy.
    #[arg(long = "forget-deletions")]
    forget_deletions: bool,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Baseline snapshot.
    #[arg(value_hint = ValueHint::FilePath)]
    baseline: PathBuf,

    /// Record syntax of the baseline.
    #[arg(long, value_enum, default_value_t = SyntaxArg::Native)]
    format: SyntaxArg,
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    /// Plain LDIF entries.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Baseline snapshot to write.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Record syntax of the snapshot.
    #[arg(long, value_enum, default_value_t = SyntaxArg::Native)]
    format: SyntaxArg,

    /// Also write an editable copy here.
    #[arg(long, value_hint = ValueHint::FilePath)]
    working: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Diff,
    Stat,
    Apply,
    Index,
    Snapshot,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    syntax: Syntax,
    render: Syntax,
    /// Baseline to read, or for `snapshot` the baseline to write.
    baseline: PathBuf,
    working: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    directory: Option<PathBuf>,
    non_leaf: NonLeafPolicy,
    continuous: bool,
    skip_failed: bool,
    forget_deletions: bool,
}

fn syntax(arg: SyntaxArg) -> Syntax {
    match arg {
        SyntaxArg::Native => Syntax::Native,
        SyntaxArg::Ldif => Syntax::Ldif,
    }
}

fn non_leaf_policy(arg: NonLeafArg) -> NonLeafPolicy {
    match arg {
        NonLeafArg::Abort => NonLeafPolicy::Abort,
        NonLeafArg::Skip => NonLeafPolicy::Skip,
        NonLeafArg::Retry => NonLeafPolicy::Retry,
    }
}

fn resolve_options(cli: Cli) -> Options {
    let base = |command, baseline, syntax_arg| Options {
        command,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        syntax: syntax(syntax_arg),
        render: Syntax::Ldif,
        baseline,
        working: None,
        input: None,
        output: None,
        directory: None,
        non_leaf: NonLeafPolicy::Abort,
        continuous: false,
        skip_failed: false,
        forget_deletions: false,
    };

    match cli.command {
        Cmd::Diff(args) => Options {
            render: syntax(args.render),
            working: Some(args.files.working),
            output: args.output,
            ..base(Command::Diff, args.files.baseline, args.files.format)
        },
        Cmd::Stat(args) => Options {
            working: Some(args.working),
            ..base(Command::Stat, args.baseline, args.format)
        },
        Cmd::Apply(args) => Options {
            working: Some(args.files.working),
            directory: Some(args.directory),
            non_leaf: non_leaf_policy(args.non_leaf),
            continuous: args.continuous,
            skip_failed: args.skip_failed,
            forget_deletions: args.forget_deletions,
            ..base(Command::Apply, args.files.baseline, args.files.format)
        },
        Cmd::Index(args) => base(Command::Index, args.baseline, args.format),
        Cmd::Snapshot(args) => Options {
            working: args.working,
            input: Some(args.input),
            ..base(Command::Snapshot, args.output, args.format)
        },
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("dirvi".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn report(path: &Path, e: SessionError) -> i32 {
    match e {
        SessionError::Syntax { offset, error } => {
            eprintln!("dirvi: {}: syntax error at byte {offset}: {error}", path.display());
        }
        SessionError::File(IoError::Parse { offset, source }) => {
            eprintln!("dirvi: {}: parse error at byte {offset}: {source}", path.display());
        }
        e => eprintln!("dirvi: {}: {e}", path.display()),
    }
    1
}

fn print_json(command: &str, stats: &Statistics) {
    let json = serde_json::json!({
        "command": command,
        "add": stats.adds,
        "delete": stats.deletes,
        "modify": stats.modifies,
        "rename": stats.renames,
    });
    match serde_json::to_string_pretty(&json) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => eprintln!("dirvi: json: {e}"),
    }
}

fn refuse_overwrite(path: &Path, force: bool) -> bool {
    if path.exists() && !force {
        eprintln!(
            "dirvi: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return true;
    }
    false
}

fn open_output(path: Option<&Path>, force: bool) -> Result<Box<dyn Write>, i32> {
    match path {
        None => Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout()))),
        Some(path) => {
            if refuse_overwrite(path, force) {
                return Err(1);
            }
            match File::create(path) {
                Ok(f) => Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, f))),
                Err(e) => {
                    eprintln!("dirvi: output file: {}: {e}", path.display());
                    Err(1)
                }
            }
        }
    }
}

fn load_ldif(path: &Path) -> Result<Vec<Entry>, i32> {
    let loaded = SnapshotFile::open_read(path)
        .map_err(IoError::from)
        .and_then(|mut file| files::read_entries(&LdifFormat, &mut file));
    loaded.map_err(|e| report(path, e.into()))
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn cmd_diff(opts: &Options, working: &Path) -> i32 {
    let mut out = match open_output(opts.output.as_deref(), opts.force) {
        Ok(out) => out,
        Err(code) => return code,
    };
    let result = with_format!(opts.syntax, |format| {
        with_format!(opts.render, |target| {
            session::offline_diff(&format, target, &opts.baseline, working, &mut out)
        })
    });
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => return report(working, e),
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("dirvi: {stats}");
    }
    if opts.json_output {
        print_json("diff", &stats);
    }
    0
}

// ---------------------------------------------------------------------------
// Stat command
// ---------------------------------------------------------------------------

fn cmd_stat<F: RecordFormat>(format: F, opts: &Options, working: &Path) -> i32 {
    let mut session = match Session::open(format, opts.baseline.clone(), working) {
        Ok(s) => s,
        Err(e) => return report(&opts.baseline, e),
    };
    let stats = match session.analyze() {
        Ok(Analysis::NoChanges) => Statistics::default(),
        Ok(Analysis::Changes(stats)) => stats,
        Ok(Analysis::SyntaxError { offset, error }) => {
            return report(working, SessionError::Syntax { offset, error });
        }
        Err(e) => return report(working, e),
    };

    if !opts.quiet {
        if stats.is_empty() {
            println!("no changes");
        } else {
            println!("{stats}");
        }
    }
    if opts.json_output {
        print_json("stat", &stats);
    }
    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply<F: RecordFormat>(format: F, opts: &Options, working: &Path, dir_path: &Path) -> i32 {
    let entries = match load_ldif(dir_path) {
        Ok(entries) => entries,
        Err(code) => return code,
    };
    let mut directory = match MemoryDirectory::from_entries(entries) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("dirvi: {}: {e}", dir_path.display());
            return 1;
        }
    };
    let mut session = match Session::open(format, opts.baseline.clone(), working) {
        Ok(s) => s,
        Err(e) => return report(&opts.baseline, e),
    };

    // Syntax errors are caught before anything is applied.
    let stats = match session.analyze() {
        Ok(Analysis::NoChanges) => {
            if !opts.quiet {
                eprintln!("dirvi: no changes");
            }
            return 0;
        }
        Ok(Analysis::Changes(stats)) => stats,
        Ok(Analysis::SyntaxError { offset, error }) => {
            return report(working, SessionError::Syntax { offset, error });
        }
        Err(e) => return report(working, e),
    };
    if opts.verbose > 0 && !opts.quiet {
        eprintln!("dirvi: {stats}");
    }

    if opts.forget_deletions {
        match session.forget_deletions() {
            Ok(n) if n > 0 && !opts.quiet => eprintln!("dirvi: ignoring {n} deletions"),
            Ok(_) => {}
            Err(e) => return report(working, e),
        }
    }

    let apply = ApplyOptions {
        verbose: opts.verbose > 0,
        continuous: opts.continuous,
        no_questions: false,
    };
    let reconcile = ReconcileOptions {
        non_leaf: opts.non_leaf,
    };
    let mut applied = 0;
    let exit_code = loop {
        match session.commit(&mut directory, apply, &reconcile) {
            Ok(Committed::Complete { applied: n }) => {
                applied += n;
                break 0;
            }
            Ok(Committed::Partial {
                applied: n,
                resume_offset,
                ..
            }) => {
                applied += n;
                if !opts.skip_failed {
                    eprintln!(
                        "dirvi: {}: stopped at byte {resume_offset}; remaining changes kept in {}",
                        dir_path.display(),
                        working.display()
                    );
                    break 2;
                }
                match session.skip_record() {
                    Ok(Skipped::Nothing) => break 2,
                    Ok(skipped) => {
                        if !opts.quiet {
                            eprintln!("dirvi: skipped {skipped:?}");
                        }
                    }
                    Err(e) => break report(working, e),
                }
            }
            Ok(Committed::SyntaxError { offset, error }) => {
                break report(working, SessionError::Syntax { offset, error });
            }
            Err(e) => break report(working, e),
        }
    };

    if applied > 0 {
        if let Err(e) = files::save_ldif(dir_path, directory.entries_top_down()) {
            return report(dir_path, e.into());
        }
    }
    if !opts.quiet {
        eprintln!("dirvi: {applied} changes applied");
    }
    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "applied": applied,
            "entries": directory.len(),
            "complete": exit_code == 0,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => eprintln!("{text}"),
            Err(e) => eprintln!("dirvi: json: {e}"),
        }
    }
    exit_code
}

// ---------------------------------------------------------------------------
// Index command
// ---------------------------------------------------------------------------

fn cmd_index<F: RecordFormat>(format: F, opts: &Options) -> i32 {
    let index = match files::index_file(&format, &opts.baseline) {
        Ok(index) => index,
        Err(e) => return report(&opts.baseline, e.into()),
    };
    let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout());
    for (n, offset) in index.pending() {
        if let Err(e) = writeln!(out, "{n} {offset}") {
            eprintln!("dirvi: write: {e}");
            return 1;
        }
    }
    if let Err(e) = out.flush() {
        eprintln!("dirvi: write: {e}");
        return 1;
    }
    if opts.json_output {
        let json = serde_json::json!({ "command": "index", "entries": index.len() });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => eprintln!("{text}"),
            Err(e) => eprintln!("dirvi: json: {e}"),
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Snapshot command
// ---------------------------------------------------------------------------

fn cmd_snapshot<F: RecordFormat>(format: F, opts: &Options, input: &Path) -> i32 {
    let entries = match load_ldif(input) {
        Ok(entries) => entries,
        Err(code) => return code,
    };
    if refuse_overwrite(&opts.baseline, opts.force) {
        return 1;
    }

    let written = match &opts.working {
        Some(working) => {
            if refuse_overwrite(working, opts.force) {
                return 1;
            }
            match Session::create(format, &entries, opts.baseline.clone(), working.clone()) {
                Ok(session) => session.index().len(),
                Err(e) => return report(&opts.baseline, e),
            }
        }
        None => {
            let result = File::create(&opts.baseline).and_then(|f| {
                let mut out = BufWriter::with_capacity(BUF_SIZE, f);
                let index = files::write_snapshot(&format, &mut out, &entries)?;
                out.flush()?;
                Ok(index.len())
            });
            match result {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("dirvi: {}: {e}", opts.baseline.display());
                    return 1;
                }
            }
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("dirvi: wrote {written} entries to {}", opts.baseline.display());
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn dispatch(opts: &Options) -> i32 {
    let working = opts.working.as_deref();
    match (opts.command, working) {
        (Command::Diff, Some(working)) => cmd_diff(opts, working),
        (Command::Stat, Some(working)) => {
            with_format!(opts.syntax, |format| cmd_stat(format, opts, working))
        }
        (Command::Apply, Some(working)) => match opts.directory.as_deref() {
            Some(dir) => with_format!(opts.syntax, |format| cmd_apply(format, opts, working, dir)),
            None => {
                eprintln!("dirvi: apply requires --directory");
                1
            }
        },
        (Command::Index, _) => with_format!(opts.syntax, |format| cmd_index(format, opts)),
        (Command::Snapshot, _) => match opts.input.as_deref() {
            Some(input) => with_format!(opts.syntax, |format| cmd_snapshot(format, opts, input)),
            None => {
                eprintln!("dirvi: snapshot requires an input file");
                1
            }
        },
        (_, None) => {
            eprintln!("dirvi: a working file is required");
            1
        }
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let level = if opts.quiet {
        "error"
    } else {
        match opts.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    process::exit(dispatch(&opts));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("dirvi".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    #[test]
    fn diff_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "diff",
            "--format",
            "ldif",
            "--render",
            "native",
            "-o",
            "out.txt",
            "base.ldif",
            "work.ldif",
        ]);
        assert_eq!(opts.command, Command::Diff);
        assert_eq!(opts.syntax, Syntax::Ldif);
        assert_eq!(opts.render, Syntax::Native);
        assert_eq!(opts.baseline, PathBuf::from("base.ldif"));
        assert_eq!(opts.working, Some(PathBuf::from("work.ldif")));
        assert_eq!(opts.output, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn diff_renders_ldif_by_default() {
        let opts = parse_opts(&["diff", "a", "b"]);
        assert_eq!(opts.syntax, Syntax::Native);
        assert_eq!(opts.render, Syntax::Ldif);
        assert_eq!(opts.output, None);
    }

    #[test]
    fn apply_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "apply",
            "--directory",
            "dir.ldif",
            "--non-leaf",
            "retry",
            "--continuous",
            "--skip-failed",
            "base",
            "work",
        ]);
        assert_eq!(opts.command, Command::Apply);
        assert_eq!(opts.directory, Some(PathBuf::from("dir.ldif")));
        assert_eq!(opts.non_leaf, NonLeafPolicy::Retry);
        assert!(opts.continuous);
        assert!(opts.skip_failed);
        assert!(!opts.forget_deletions);
    }

    #[test]
    fn apply_requires_directory() {
        let argv = ["dirvi", "apply", "base", "work"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn snapshot_subcommand_maps_correctly() {
        let opts = parse_opts(&["--force", "snapshot", "--working", "w", "in.ldif", "base"]);
        assert_eq!(opts.command, Command::Snapshot);
        assert_eq!(opts.input, Some(PathBuf::from("in.ldif")));
        assert_eq!(opts.baseline, PathBuf::from("base"));
        assert_eq!(opts.working, Some(PathBuf::from("w")));
        assert!(opts.force);
    }

    #[test]
    fn global_flags() {
        let opts = parse_opts(&["index", "--json", "-q", "base"]);
        assert_eq!(opts.command, Command::Index);
        assert!(opts.json_output);
        assert!(opts.quiet);

        let argv = ["dirvi", "-q", "-v", "index", "base"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn verbose_is_capped() {
        let verbose = parse_opts(&["-vvv", "stat", "a", "b"]);
        assert_eq!(verbose.verbose, 2);
    }

    #[test]
    fn fuzz_entry_point_tolerates_garbage() {
        fuzz_try_parse_args(&["--bogus".to_string()]);
        fuzz_try_parse_args(&["diff".to_string(), "\u{0}".to_string()]);
        fuzz_try_parse_args(&[]);
    }
}
