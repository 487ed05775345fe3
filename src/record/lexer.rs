// Byte-level line tokenizer shared by both record grammars.
//
// Works directly on a `BufRead` so that stream positions reported by the
// grammars are exact byte offsets: nothing is read ahead beyond what
// `fill_buf` exposes, and peeking never consumes.

use std::io::BufRead;

use super::ParseError;

/// One logical line of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// End of stream.
    Eof,
    /// An empty line: terminates the current record.
    Blank,
    /// A line consisting of `-` only.
    Dash,
    /// `name` plus its decoded value.
    Pair { name: String, value: Vec<u8> },
}

/// Line-ending convention accepted by a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    /// `\n` only; a `\r` is an ordinary byte.
    Lf,
    /// `\n` or `\r\n`; a lone `\r` is an error.
    CrLf,
}

// ---------------------------------------------------------------------------
// Byte primitives
// ---------------------------------------------------------------------------

pub fn peek_byte<R: BufRead>(r: &mut R) -> Result<Option<u8>, ParseError> {
    Ok(r.fill_buf()?.first().copied())
}

pub fn next_byte<R: BufRead>(r: &mut R) -> Result<Option<u8>, ParseError> {
    let b = peek_byte(r)?;
    if b.is_some() {
        r.consume(1);
    }
    Ok(b)
}

/// Consume a line terminator whose first byte (`\n` or `\r`) was already read.
fn finish_eol<R: BufRead>(r: &mut R, first: u8, eol: Eol) -> Result<(), ParseError> {
    if first == b'\r' && eol == Eol::CrLf {
        match next_byte(r)? {
            Some(b'\n') => {}
            _ => return Err(ParseError::BareCarriageReturn),
        }
    }
    Ok(())
}

fn is_eol(c: u8, eol: Eol) -> bool {
    c == b'\n' || (c == b'\r' && eol == Eol::CrLf)
}

/// After a line terminator: if the next line starts with a space it
/// continues the current one, and the space is consumed.
fn continues<R: BufRead>(r: &mut R) -> Result<bool, ParseError> {
    if peek_byte(r)? == Some(b' ') {
        r.consume(1);
        Ok(true)
    } else {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Line starts
// ---------------------------------------------------------------------------

/// What sits at the start of the next line, after comments are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStart {
    Eof,
    Blank,
    Text,
}

/// Skip `#` comment lines (which may fold) and report what follows.
/// A blank line is consumed; text is left in the stream.
pub fn line_start<R: BufRead>(r: &mut R, eol: Eol) -> Result<LineStart, ParseError> {
    loop {
        match peek_byte(r)? {
            None => return Ok(LineStart::Eof),
            Some(c) if is_eol(c, eol) => {
                r.consume(1);
                finish_eol(r, c, eol)?;
                return Ok(LineStart::Blank);
            }
            Some(b'#') => skip_folded(r, eol)?,
            Some(_) => return Ok(LineStart::Text),
        }
    }
}

fn skip_folded<R: BufRead>(r: &mut R, eol: Eol) -> Result<(), ParseError> {
    loop {
        match next_byte(r)? {
            None => return Ok(()),
            Some(c) if is_eol(c, eol) => {
                finish_eol(r, c, eol)?;
                if !continues(r)? {
                    return Ok(());
                }
            }
            Some(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Value bodies
// ---------------------------------------------------------------------------

/// Read to the end of the logical line, unfolding continuation lines.
/// End of stream terminates the line.
pub fn read_folded<R: BufRead>(r: &mut R, eol: Eol) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    loop {
        match next_byte(r)? {
            None => return Ok(out),
            Some(c) if is_eol(c, eol) => {
                finish_eol(r, c, eol)?;
                if !continues(r)? {
                    return Ok(out);
                }
            }
            Some(c) => out.push(c),
        }
    }
}

/// Read to the end of the line with `\` escaping the following byte.
/// No folding: an escaped newline is part of the value.
pub fn read_backslashed<R: BufRead>(r: &mut R) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    loop {
        match next_byte(r)? {
            None | Some(b'\n') => return Ok(out),
            Some(b'\\') => match next_byte(r)? {
                Some(c) => out.push(c),
                None => return Err(ParseError::MalformedEscape),
            },
            Some(c) => out.push(c),
        }
    }
}

const COUNTED_PREALLOC: usize = 64 * 1024;

/// Read exactly `len` raw bytes followed by a line terminator.
pub fn read_counted<R: BufRead>(r: &mut R, len: usize) -> Result<Vec<u8>, ParseError> {
    // `len` comes from the file; only grow as bytes arrive.
    let mut out = Vec::with_capacity(len.min(COUNTED_PREALLOC));
    while out.len() < len {
        let buf = r.fill_buf()?;
        if buf.is_empty() {
            return Err(ParseError::TruncatedValue { expected: len });
        }
        let n = buf.len().min(len - out.len());
        out.extend_from_slice(&buf[..n]);
        r.consume(n);
    }
    match next_byte(r)? {
        None | Some(b'\n') => Ok(out),
        Some(_) => Err(ParseError::Expected("newline after length-prefixed value")),
    }
}

/// Read a name up to (not including) `stop`.
///
/// Returns `Ok(None)` if the line ends first and the text read so far is
/// exactly `-`, so callers can recognise group separators.
pub fn read_name<R: BufRead>(
    r: &mut R,
    stop: u8,
    eol: Eol,
) -> Result<Option<Vec<u8>>, ParseError> {
    let mut name = Vec::new();
    loop {
        match next_byte(r)? {
            Some(c) if c == stop => return Ok(Some(name)),
            Some(0) => return Err(ParseError::NullByte),
            Some(c) if is_eol(c, eol) => {
                finish_eol(r, c, eol)?;
                if name == b"-" {
                    return Ok(None);
                }
                return Err(ParseError::UnexpectedEol);
            }
            None if name == b"-" => return Ok(None),
            None => return Err(ParseError::UnexpectedEof),
            Some(c) => name.push(c),
        }
    }
}

/// Skip spaces within the current line.
pub fn skip_spaces<R: BufRead>(r: &mut R) -> Result<(), ParseError> {
    while peek_byte(r)? == Some(b' ') {
        r.consume(1);
    }
    Ok(())
}

pub fn utf8(bytes: Vec<u8>, what: &'static str) -> Result<String, ParseError> {
    String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8(what))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
