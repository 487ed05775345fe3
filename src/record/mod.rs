// Record grammars.
//
// A snapshot file is a sequence of records separated by blank lines. Each
// record starts with a key and a DN: numeric keys refer back to an entry
// of the baseline snapshot, the reserved keys `add`, `delete`, `modify`
// and `rename` introduce change-records typed by the user. Two grammars
// share this model: the native text format and LDIF.
//
// Readers take an optional absolute offset to seek to first; all offsets
// reported back are exact byte positions of a record's first line, so
// they can be stored in a `BaselineIndex` and compared byte for byte.

pub mod ldif;
pub mod lexer;
pub mod native;
pub mod value;

use std::fmt;
use std::io::{self, BufRead, Seek, SeekFrom, Write};
use std::str::FromStr;

use crate::dn::DnError;
use crate::entry::{Entry, ModOp, Modification};

pub use ldif::LdifFormat;
pub use lexer::Line;
pub use native::NativeFormat;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading records.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("unexpected end of line")]
    UnexpectedEol,

    #[error("null byte in attribute name")]
    NullByte,

    #[error("space at beginning of line")]
    EmptyName,

    #[error("carriage return not followed by newline")]
    BareCarriageReturn,

    #[error("backslash at end of file")]
    MalformedEscape,

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid base64 value")]
    InvalidBase64,

    #[error("unknown URL scheme: {0}")]
    UnknownUrlScheme(String),

    #[error("cannot read {path}: {source}")]
    FileReference {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unknown value encoding: {0}")]
    UnknownEncoding(String),

    #[error("value truncated: expected {expected} bytes")]
    TruncatedValue { expected: usize },

    #[error("hash backend unavailable for {{{0}}}")]
    HashUnavailable(&'static str),

    #[error(transparent)]
    InvalidDn(#[from] DnError),

    #[error("invalid file format version: {0}")]
    InvalidFormatVersion(String),

    #[error("invalid changetype: {0}")]
    InvalidChangetype(String),

    #[error("controls are not supported")]
    ControlUnsupported,

    #[error("expected {0}")]
    Expected(&'static str),

    #[error("invalid value for deleteoldrdn: {0}")]
    InvalidDeleteOldRdn(String),

    #[error("garbage at end of record")]
    TrailingGarbage,

    #[error("invalid change marker: {0}")]
    InvalidChangeMarker(String),

    #[error("attribute name mismatch: expected {expected}, found {found}")]
    AttributeMismatch { expected: String, found: String },

    #[error("modification of {0} not terminated by '-'")]
    UnterminatedModification(String),

    #[error("'-' outside of a modify record")]
    UnexpectedSeparator,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unexpected key: expected {expected}, found {found}")]
    UnexpectedKey { expected: usize, found: String },

    #[error("duplicate entry {0}")]
    DuplicateKey(usize),

    #[error("cannot rename the root DSE")]
    RenameRoot,

    #[error("cannot rename to the root DSE")]
    RenameToRoot,

    #[error("old RDN not found in entry")]
    OldRdnMissing,

    #[error("new RDN not found in entry")]
    NewRdnMissing,

    #[error("incomplete RDN change")]
    IncompleteRdnChange,
}

// ---------------------------------------------------------------------------
// Record model
// ---------------------------------------------------------------------------

/// The key that opens a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Add,
    Delete,
    Modify,
    Rename,
    /// Any other key; a baseline reference when it parses as an index.
    Label(String),
}

impl RecordKey {
    pub fn parse(key: &str) -> Self {
        match key {
            "add" => Self::Add,
            "delete" => Self::Delete,
            "modify" => Self::Modify,
            "rename" => Self::Rename,
            other => Self::Label(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Rename => "rename",
            Self::Label(s) => s,
        }
    }

    /// The baseline index this key refers to, if it is one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Label(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Like [`index`](Self::index), but a non-numeric label is an error.
    pub fn require_index(&self) -> Result<usize, ParseError> {
        self.index()
            .ok_or_else(|| ParseError::InvalidKey(self.as_str().to_string()))
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Label(_))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of peeking at the next record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peeked {
    pub key: RecordKey,
    /// Exact offset of the record's first line.
    pub offset: u64,
}

/// A rename change-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub old_dn: String,
    pub new_dn: String,
    pub delete_old_rdn: bool,
}

/// A fully parsed record of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Numbered(usize, Entry),
    Add(Entry),
    Delete(String),
    Rename(Rename),
    Modify { dn: String, mods: Vec<Modification> },
}

// ---------------------------------------------------------------------------
// Format trait
// ---------------------------------------------------------------------------

/// A record grammar: reading records, writing entries and change-records.
///
/// Implementations are stateless; every method takes the stream it works
/// on. `offset`, when given, is an absolute position to seek to before
/// reading.
pub trait RecordFormat {
    /// Short name used in logs and on the command line.
    fn name(&self) -> &'static str;

    /// Read the next logical line of a record body.
    fn next_line<R: BufRead>(&self, r: &mut R) -> Result<Line, ParseError>;

    /// Read the next record's header, skipping blank lines and comments.
    ///
    /// Returns `None` at end of stream. The stream is left positioned after
    /// the header, ready for the body.
    fn peek<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<Peeked>, ParseError> {
        Ok(self.read_header(r, offset)?.map(|(peeked, _)| peeked))
    }

    /// Like [`peek`](Self::peek), also returning the record's DN.
    fn read_header<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<(Peeked, String)>, ParseError>;

    /// Read a record as a plain entry. Returns the key, the entry and the
    /// record's first-line offset.
    fn read_entry<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<(RecordKey, Entry, u64)>, ParseError> {
        let Some((peeked, dn)) = self.read_header(r, offset)? else {
            return Ok(None);
        };
        let mut entry = Entry::new(dn);
        loop {
            match self.next_line(r)? {
                Line::Eof | Line::Blank => break,
                Line::Dash => return Err(ParseError::UnexpectedSeparator),
                Line::Pair { name, value } => entry.add_value(&name, value),
            }
        }
        Ok(Some((peeked.key, entry, peeked.offset)))
    }

    /// Skip over one record of any kind, returning its key.
    fn skip<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<RecordKey>, ParseError> {
        let Some(peeked) = self.peek(r, offset)? else {
            return Ok(None);
        };
        loop {
            match self.next_line(r)? {
                Line::Eof | Line::Blank => return Ok(Some(peeked.key)),
                Line::Dash | Line::Pair { .. } => {}
            }
        }
    }

    /// Read a rename change-record.
    fn read_rename<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Rename, ParseError>;

    /// Read a delete change-record, returning the DN.
    fn read_delete<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<String, ParseError> {
        let (_, dn) = self
            .read_header(r, offset)?
            .ok_or(ParseError::UnexpectedEof)?;
        expect_end(self, r)?;
        Ok(dn)
    }

    /// Read a modify change-record, returning the DN and its directives.
    ///
    /// The body is a sequence of groups: an `add`, `delete` or `replace`
    /// line naming the attribute, its value lines, then a `-` line.
    fn read_modify<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<(String, Vec<Modification>), ParseError> {
        let (_, dn) = self
            .read_header(r, offset)?
            .ok_or(ParseError::UnexpectedEof)?;
        let mut mods = Vec::new();
        loop {
            let (marker, attr) = match self.next_line(r)? {
                Line::Eof | Line::Blank => break,
                Line::Dash => return Err(ParseError::UnexpectedSeparator),
                Line::Pair { name, value } => (name, value),
            };
            let op: ModOp = marker
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| ParseError::InvalidChangeMarker(marker))?;
            let attr = lexer::utf8(attr, "attribute name")?.trim().to_string();
            let mut values = Vec::new();
            loop {
                match self.next_line(r)? {
                    Line::Dash => break,
                    Line::Pair { name, value } if name.eq_ignore_ascii_case(&attr) => {
                        values.push(value)
                    }
                    Line::Pair { name, .. } => {
                        return Err(ParseError::AttributeMismatch {
                            expected: attr,
                            found: name,
                        });
                    }
                    Line::Eof | Line::Blank => {
                        return Err(ParseError::UnterminatedModification(attr));
                    }
                }
            }
            mods.push(Modification::new(attr, op, values));
        }
        Ok((dn, mods))
    }

    /// Read whichever record comes next.
    fn read_record<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<(u64, Record)>, ParseError> {
        let Some(peeked) = self.peek(r, offset)? else {
            return Ok(None);
        };
        let at = Some(peeked.offset);
        let record = match peeked.key {
            RecordKey::Rename => Record::Rename(self.read_rename(r, at)?),
            RecordKey::Delete => Record::Delete(self.read_delete(r, at)?),
            RecordKey::Modify => {
                let (dn, mods) = self.read_modify(r, at)?;
                Record::Modify { dn, mods }
            }
            RecordKey::Add => match self.read_entry(r, at)? {
                Some((_, entry, _)) => Record::Add(entry),
                None => return Err(ParseError::UnexpectedEof),
            },
            key @ RecordKey::Label(_) => {
                let n = key.require_index()?;
                match self.read_entry(r, at)? {
                    Some((_, entry, _)) => Record::Numbered(n, entry),
                    None => return Err(ParseError::UnexpectedEof),
                }
            }
        };
        Ok(Some((peeked.offset, record)))
    }

    /// Write the header placed at the top of a snapshot file.
    fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()>;

    /// Write `entry` as a record with the given key.
    ///
    /// Output starts with a blank separator line, so the record itself
    /// begins one byte after the writer's starting position.
    fn write_entry<W: Write>(&self, w: &mut W, entry: &Entry, key: &str) -> io::Result<()>;

    /// Write an add change-record.
    fn write_add<W: Write>(&self, w: &mut W, entry: &Entry) -> io::Result<()>;

    /// Write a delete change-record.
    fn write_delete<W: Write>(&self, w: &mut W, dn: &str) -> io::Result<()>;

    /// Write a rename change-record.
    fn write_rename<W: Write>(
        &self,
        w: &mut W,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> io::Result<()>;

    /// Write a modify change-record.
    fn write_modify<W: Write>(&self, w: &mut W, dn: &str, mods: &[Modification])
    -> io::Result<()>;
}

/// Require that the current record has no further body lines.
pub(crate) fn expect_end<F: RecordFormat + ?Sized, R: BufRead>(
    format: &F,
    r: &mut R,
) -> Result<(), ParseError> {
    match format.next_line(r)? {
        Line::Eof | Line::Blank => Ok(()),
        _ => Err(ParseError::TrailingGarbage),
    }
}

/// Seek to `offset` if one was given.
pub(crate) fn seek_to<R: Seek>(r: &mut R, offset: Option<u64>) -> io::Result<()> {
    if let Some(off) = offset {
        r.seek(SeekFrom::Start(off))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Syntax selector
// ---------------------------------------------------------------------------

/// Which grammar a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Native,
    Ldif,
}

impl Syntax {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => NativeFormat.name(),
            Self::Ldif => LdifFormat.name(),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "ldif" => Ok(Self::Ldif),
            other => Err(format!("unknown record syntax: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
