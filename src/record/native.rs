// Native text format.
//
// Each line is `name value`, where the part of `name` after a colon picks
// the value encoding:
//
//   name value        rest of line, `\` escapes the next byte
//   name: value       raw, folded continuation lines allowed
//   name:: base64     base64
//   name:< file://p   contents of a local file
//   name:N bytes      exactly N raw bytes, then a newline
//   name:ssha secret  clear text, stored as a salted hash
//
// Record headers use the same line shape with the key as name and the DN
// as value, e.g. `12 cn=foo,dc=example`.

use std::io::{self, BufRead, Seek, Write};

use super::lexer::{self, Eol, LineStart};
use super::value::{self, HashScheme};
use super::{Line, ParseError, Peeked, RecordFormat, RecordKey, Rename};
use crate::dn;
use crate::entry::{Entry, Modification};

/// Version tag accepted (and written) at the top of a native file.
pub const VERSION: &[u8] = b"ldapvi";

/// The native record grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeFormat;

impl RecordFormat for NativeFormat {
    fn name(&self) -> &'static str {
        "native"
    }

    fn next_line<R: BufRead>(&self, r: &mut R) -> Result<Line, ParseError> {
        match lexer::line_start(r, Eol::Lf)? {
            LineStart::Eof => return Ok(Line::Eof),
            LineStart::Blank => return Ok(Line::Blank),
            LineStart::Text => {}
        }
        if lexer::peek_byte(r)? == Some(b' ') {
            return Err(ParseError::EmptyName);
        }
        let Some(lhs) = lexer::read_name(r, b' ', Eol::Lf)? else {
            return Ok(Line::Dash);
        };
        let lhs = lexer::utf8(lhs, "attribute name")?;
        let (name, encoding) = match lhs.split_once(':') {
            Some((name, encoding)) => (name, Some(encoding)),
            None => (lhs.as_str(), None),
        };
        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        let value = match encoding {
            None => lexer::read_backslashed(r)?,
            Some("") => lexer::read_folded(r, Eol::Lf)?,
            Some(":") => value::decode_base64(&lexer::read_folded(r, Eol::Lf)?)?,
            Some("<") => value::read_url(&lexer::read_folded(r, Eol::Lf)?)?,
            Some(n) if n.bytes().all(|c| c.is_ascii_digit()) => {
                let len = n
                    .parse()
                    .map_err(|_| ParseError::UnknownEncoding(n.to_string()))?;
                lexer::read_counted(r, len)?
            }
            Some(other) => match HashScheme::from_name(other) {
                Some(scheme) => value::hash_secret(scheme, &lexer::read_folded(r, Eol::Lf)?)?,
                None => return Err(ParseError::UnknownEncoding(other.to_string())),
            },
        };
        Ok(Line::Pair {
            name: name.to_string(),
            value,
        })
    }

    fn read_header<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<(Peeked, String)>, ParseError> {
        super::seek_to(r, offset)?;
        loop {
            match lexer::line_start(r, Eol::Lf)? {
                LineStart::Eof => return Ok(None),
                LineStart::Blank => continue,
                LineStart::Text => {}
            }
            let pos = r.stream_position()?;
            let (key, value) = match self.next_line(r)? {
                Line::Pair { name, value } => (name, value),
                Line::Dash => return Err(ParseError::UnexpectedSeparator),
                Line::Eof | Line::Blank => continue,
            };
            if key == "version" {
                if value != VERSION {
                    return Err(ParseError::InvalidFormatVersion(
                        String::from_utf8_lossy(&value).into_owned(),
                    ));
                }
                continue;
            }
            let dn = lexer::utf8(value, "DN")?;
            dn::validate(&dn)?;
            let peeked = Peeked {
                key: RecordKey::parse(&key),
                offset: pos,
            };
            return Ok(Some((peeked, dn)));
        }
    }

    fn read_rename<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Rename, ParseError> {
        const EXPECTED: &str = "'add' or 'replace' followed by the new DN";
        let (_, old_dn) = self
            .read_header(r, offset)?
            .ok_or(ParseError::UnexpectedEof)?;
        let Line::Pair { name, value } = self.next_line(r)? else {
            return Err(ParseError::Expected(EXPECTED));
        };
        let delete_old_rdn = match name.as_str() {
            "add" => false,
            "replace" => true,
            _ => return Err(ParseError::Expected(EXPECTED)),
        };
        let new_dn = lexer::utf8(value, "DN")?;
        dn::validate(&new_dn)?;
        super::expect_end(self, r)?;
        Ok(Rename {
            old_dn,
            new_dn,
            delete_old_rdn,
        })
    }

    fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(b"version: ")?;
        w.write_all(VERSION)?;
        w.write_all(b"\n")
    }

    fn write_entry<W: Write>(&self, w: &mut W, entry: &Entry, key: &str) -> io::Result<()> {
        write_record_header(w, key, entry.dn())?;
        write_attributes(w, entry)
    }

    fn write_add<W: Write>(&self, w: &mut W, entry: &Entry) -> io::Result<()> {
        self.write_entry(w, entry, "add")
    }

    fn write_delete<W: Write>(&self, w: &mut W, dn: &str) -> io::Result<()> {
        write_record_header(w, "delete", dn)
    }

    fn write_rename<W: Write>(
        &self,
        w: &mut W,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> io::Result<()> {
        write_record_header(w, "rename", old_dn)?;
        let marker = if delete_old_rdn { "replace" } else { "add" };
        write!(w, "{marker} ")?;
        write_backslashed(w, new_dn.as_bytes())?;
        w.write_all(b"\n")
    }

    fn write_modify<W: Write>(
        &self,
        w: &mut W,
        dn: &str,
        mods: &[Modification],
    ) -> io::Result<()> {
        write_record_header(w, "modify", dn)?;
        for m in mods {
            write!(w, "{} ", m.op)?;
            write_backslashed(w, m.attr.as_bytes())?;
            w.write_all(b"\n")?;
            for v in &m.values {
                write_value(w, &m.attr, v)?;
            }
            w.write_all(b"-\n")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer helpers
// ---------------------------------------------------------------------------

fn write_record_header<W: Write>(w: &mut W, key: &str, dn: &str) -> io::Result<()> {
    write!(w, "\n{key} ")?;
    write_backslashed(w, dn.as_bytes())?;
    w.write_all(b"\n")
}

fn write_attributes<W: Write>(w: &mut W, entry: &Entry) -> io::Result<()> {
    for attr in entry.attributes() {
        for v in attr.values() {
            write_value(w, attr.name(), v)?;
        }
    }
    Ok(())
}

fn write_backslashed<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    let mut start = 0;
    for (i, &c) in bytes.iter().enumerate() {
        if c == b'\\' || c == b'\n' {
            w.write_all(&bytes[start..i])?;
            w.write_all(&[b'\\', c])?;
            start = i + 1;
        }
    }
    w.write_all(&bytes[start..])
}

/// Text an editor can show: valid UTF-8 without control bytes other than
/// tab and newline.
pub fn is_readable(value: &[u8]) -> bool {
    std::str::from_utf8(value).is_ok()
        && value
            .iter()
            .all(|&c| c == b'\n' || c == b'\t' || (c >= 0x20 && c != 0x7f))
}

/// Readable text that survives the raw `name: value` form unchanged.
pub fn is_safe(value: &[u8]) -> bool {
    if let Some(&first) = value.first()
        && matches!(first, b' ' | b':' | b'<')
    {
        return false;
    }
    !value.iter().any(|&c| matches!(c, 0 | b'\r' | b'\n'))
}

/// Write one attribute line in the most readable encoding that round-trips.
pub fn write_value<W: Write>(w: &mut W, name: &str, value: &[u8]) -> io::Result<()> {
    if !is_readable(value) {
        writeln!(w, "{name}:: {}", value::encode_base64(value))
    } else if !is_safe(value) {
        write!(w, "{name} ")?;
        write_backslashed(w, value)?;
        w.write_all(b"\n")
    } else {
        write!(w, "{name}: ")?;
        w.write_all(value)?;
        w.write_all(b"\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
