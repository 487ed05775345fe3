// File-level helpers for snapshot files.
//
// Provides the buffered read/write handle the engine reconciles against,
// index construction by a full baseline parse, snapshot writing that
// captures record offsets as it goes, and the atomic working-file cut used
// to resume after a partially applied pass.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::entry::Entry;
use crate::index::BaselineIndex;
use crate::record::{LdifFormat, ParseError, RecordFormat};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for snapshot file operations.
#[derive(Debug)]
pub enum IoError {
    /// I/O error (file open, read, write, rename).
    Io(io::Error),
    /// A record in the file could not be parsed.
    Parse { offset: u64, source: ParseError },
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse { offset, source } => write!(f, "parse error at byte {offset}: {source}"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

fn parse_error(offset: u64, error: ParseError) -> IoError {
    match error {
        ParseError::Io(e) => IoError::Io(e),
        source => IoError::Parse { offset, source },
    }
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// SnapshotFile
// ---------------------------------------------------------------------------

/// A buffered file handle that can be read, written and seeked.
///
/// Reads go through an internal buffer. A write first syncs the underlying
/// file position with the logical one (discarding the read buffer) and
/// then writes directly, so reads and appends can be interleaved freely.
#[derive(Debug)]
pub struct SnapshotFile {
    inner: BufReader<File>,
}

impl SnapshotFile {
    /// Open an existing file for reading and writing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            inner: BufReader::with_capacity(BUF_SIZE, file),
        })
    }

    /// Open an existing file read-only. Writes will fail.
    pub fn open_read(path: &Path) -> io::Result<Self> {
        Ok(Self {
            inner: BufReader::with_capacity(BUF_SIZE, File::open(path)?),
        })
    }
}

impl Read for SnapshotFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for SnapshotFile {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

impl Seek for SnapshotFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }
}

impl Write for SnapshotFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pos = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.get_mut().flush()
    }
}

// ---------------------------------------------------------------------------
// build_index
// ---------------------------------------------------------------------------

/// Parse every record of a baseline and record where each one starts.
///
/// Keys must be the consecutive integers `0, 1, 2, ...` in file order.
pub fn build_index<F: RecordFormat, R: BufRead + Seek>(
    format: &F,
    r: &mut R,
) -> Result<BaselineIndex, IoError> {
    let mut index = BaselineIndex::new();
    loop {
        let here = r.stream_position()?;
        let Some((key, _, offset)) = format
            .read_entry(r, None)
            .map_err(|e| parse_error(here, e))?
        else {
            break;
        };
        let expected = index.len();
        match key.index() {
            Some(n) if n == expected => {}
            Some(_) => {
                return Err(parse_error(
                    offset,
                    ParseError::UnexpectedKey {
                        expected,
                        found: key.to_string(),
                    },
                ));
            }
            None => {
                return Err(parse_error(offset, ParseError::InvalidKey(key.to_string())));
            }
        }
        index.push(offset);
    }
    debug!("indexed {} {} records", index.len(), format.name());
    Ok(index)
}

/// Open `path` and build its index.
pub fn index_file<F: RecordFormat>(format: &F, path: &Path) -> Result<BaselineIndex, IoError> {
    let mut file = SnapshotFile::open_read(path)?;
    build_index(format, &mut file)
}

// ---------------------------------------------------------------------------
// write_snapshot
// ---------------------------------------------------------------------------

/// Write a snapshot: the format header, then every entry as a numbered
/// record keyed `0..n`. `w` must be at the start of its file.
///
/// Returns the index of the written file.
pub fn write_snapshot<'e, F, W>(
    format: &F,
    w: &mut W,
    entries: impl IntoIterator<Item = &'e Entry>,
) -> io::Result<BaselineIndex>
where
    F: RecordFormat,
    W: Write,
{
    let mut out = CountingWriter { inner: w, count: 0 };
    format.write_header(&mut out)?;
    let mut index = BaselineIndex::new();
    for (n, entry) in entries.into_iter().enumerate() {
        // write_entry leads with the blank separator line.
        let start = out.count + 1;
        format.write_entry(&mut out, entry, &n.to_string())?;
        index.push(start);
    }
    out.flush()?;
    Ok(index)
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Plain entry files
// ---------------------------------------------------------------------------

/// Read every record of `r` as a plain entry, whatever its key.
pub fn read_entries<F: RecordFormat, R: BufRead + Seek>(
    format: &F,
    r: &mut R,
) -> Result<Vec<Entry>, IoError> {
    let mut entries = Vec::new();
    loop {
        let here = r.stream_position()?;
        match format.read_entry(r, None) {
            Ok(Some((_, entry, _))) => entries.push(entry),
            Ok(None) => return Ok(entries),
            Err(e) => return Err(parse_error(here, e)),
        }
    }
}

/// Atomically replace `path` with `entries` as plain LDIF content records.
pub fn save_ldif<'e>(
    path: &Path,
    entries: impl IntoIterator<Item = &'e Entry>,
) -> Result<(), IoError> {
    replace_file(path, |out| {
        LdifFormat.write_header(out)?;
        let mut count = 0usize;
        for entry in entries {
            LdifFormat.write_plain(out, entry)?;
            count += 1;
        }
        debug!("saved {count} entries to {}", path.display());
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// cut_working_file
// ---------------------------------------------------------------------------

/// Replace the working file at `path` with the format header followed by
/// everything from `offset` on.
///
/// Open handles on the old file keep seeing the old content.
pub fn cut_working_file<F: RecordFormat>(
    format: &F,
    path: &Path,
    offset: u64,
) -> Result<(), IoError> {
    let mut src = File::open(path)?;
    src.seek(SeekFrom::Start(offset))?;
    replace_file(path, |out| {
        format.write_header(out)?;
        out.write_all(b"\n")?;
        let copied = io::copy(&mut src, out)?;
        debug!("kept {copied} bytes of {}", path.display());
        Ok(())
    })?;
    info!("cut {} at byte {offset}", path.display());
    Ok(())
}

/// Write new content for `path` to a temporary file in the same directory
/// and rename it over the original.
fn replace_file(
    path: &Path,
    fill: impl FnOnce(&mut BufWriter<&mut File>) -> io::Result<()>,
) -> Result<(), IoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::with_capacity(BUF_SIZE, tmp.as_file_mut());
        fill(&mut out)?;
        out.flush()?;
    }
    tmp.persist(path).map_err(|e| IoError::Io(e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
