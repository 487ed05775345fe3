// LDIF (RFC 2849) record grammar, with the `ldapvi-key` extension that
// ties a record to its baseline index.
//
// The second line of a record decides its kind: `ldapvi-key: N` for a
// numbered entry, `changetype: ...` for a change-record. Anything else
// makes the record a plain entry to add.

use std::io::{self, BufRead, Seek, SeekFrom, Write};

use super::lexer::{self, Eol, LineStart};
use super::value;
use super::{Line, ParseError, Peeked, RecordFormat, RecordKey, Rename};
use crate::dn;
use crate::entry::{Entry, Modification};

/// Attribute carrying the baseline index of a numbered record.
pub const KEY_ATTRIBUTE: &str = "ldapvi-key";

/// The LDIF record grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LdifFormat;

impl LdifFormat {
    /// Write an entry as a plain LDIF content record (no key, no changetype).
    pub fn write_plain<W: Write>(&self, w: &mut W, entry: &Entry) -> io::Result<()> {
        w.write_all(b"\n")?;
        write_value(w, "dn", entry.dn().as_bytes())?;
        write_attributes(w, entry)
    }

    fn expect_pair<R: BufRead>(
        &self,
        r: &mut R,
        name: &str,
        expected: &'static str,
    ) -> Result<Vec<u8>, ParseError> {
        match self.next_line(r)? {
            Line::Pair { name: found, value } if found.eq_ignore_ascii_case(name) => Ok(value),
            _ => Err(ParseError::Expected(expected)),
        }
    }
}

impl RecordFormat for LdifFormat {
    fn name(&self) -> &'static str {
        "ldif"
    }

    fn next_line<R: BufRead>(&self, r: &mut R) -> Result<Line, ParseError> {
        match lexer::line_start(r, Eol::CrLf)? {
            LineStart::Eof => return Ok(Line::Eof),
            LineStart::Blank => return Ok(Line::Blank),
            LineStart::Text => {}
        }
        if lexer::peek_byte(r)? == Some(b' ') {
            return Err(ParseError::EmptyName);
        }
        let Some(name) = lexer::read_name(r, b':', Eol::CrLf)? else {
            return Ok(Line::Dash);
        };
        let name = lexer::utf8(name, "attribute name")?;
        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        let value = match lexer::peek_byte(r)? {
            Some(b':') => {
                r.consume(1);
                value::decode_base64(&lexer::read_folded(r, Eol::CrLf)?)?
            }
            Some(b'<') => {
                r.consume(1);
                value::read_url(&lexer::read_folded(r, Eol::CrLf)?)?
            }
            _ => {
                lexer::skip_spaces(r)?;
                lexer::read_folded(r, Eol::CrLf)?
            }
        };
        Ok(Line::Pair { name, value })
    }

    fn read_header<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Option<(Peeked, String)>, ParseError> {
        super::seek_to(r, offset)?;
        let (pos, dn) = loop {
            match lexer::line_start(r, Eol::CrLf)? {
                LineStart::Eof => return Ok(None),
                LineStart::Blank => continue,
                LineStart::Text => {}
            }
            let pos = r.stream_position()?;
            match self.next_line(r)? {
                Line::Pair { name, value } if name.eq_ignore_ascii_case("version") => {
                    if value != b"1" {
                        return Err(ParseError::InvalidFormatVersion(
                            String::from_utf8_lossy(&value).into_owned(),
                        ));
                    }
                }
                Line::Pair { name, value } if name.eq_ignore_ascii_case("dn") => {
                    break (pos, lexer::utf8(value, "DN")?);
                }
                Line::Pair { .. } => return Err(ParseError::Expected("'dn:'")),
                Line::Dash => return Err(ParseError::UnexpectedSeparator),
                Line::Eof | Line::Blank => {}
            }
        };
        dn::validate(&dn)?;

        let body = r.stream_position()?;
        let key = match self.next_line(r)? {
            Line::Pair { name, value } if name.eq_ignore_ascii_case(KEY_ATTRIBUTE) => {
                RecordKey::Label(lexer::utf8(value, "key")?)
            }
            Line::Pair { name, value } if name.eq_ignore_ascii_case("changetype") => {
                let kind = lexer::utf8(value, "changetype")?;
                match kind.to_ascii_lowercase().as_str() {
                    "add" => RecordKey::Add,
                    "delete" => RecordKey::Delete,
                    "modify" => RecordKey::Modify,
                    "modrdn" | "moddn" => RecordKey::Rename,
                    _ => return Err(ParseError::InvalidChangetype(kind)),
                }
            }
            Line::Pair { name, .. } if name.eq_ignore_ascii_case("control") => {
                return Err(ParseError::ControlUnsupported);
            }
            _ => {
                r.seek(SeekFrom::Start(body))?;
                RecordKey::Add
            }
        };
        Ok(Some((Peeked { key, offset: pos }, dn)))
    }

    fn read_rename<R: BufRead + Seek>(
        &self,
        r: &mut R,
        offset: Option<u64>,
    ) -> Result<Rename, ParseError> {
        let (_, old_dn) = self
            .read_header(r, offset)?
            .ok_or(ParseError::UnexpectedEof)?;
        let new_rdn = lexer::utf8(self.expect_pair(r, "newrdn", "'newrdn:'")?, "RDN")?;
        let delete_old_rdn = match self
            .expect_pair(r, "deleteoldrdn", "'deleteoldrdn:'")?
            .as_slice()
        {
            b"0" => false,
            b"1" => true,
            other => {
                return Err(ParseError::InvalidDeleteOldRdn(
                    String::from_utf8_lossy(other).into_owned(),
                ));
            }
        };
        let new_dn = match self.next_line(r)? {
            Line::Eof | Line::Blank => dn::join(&new_rdn, dn::parent(&old_dn)),
            Line::Pair { name, value } if name.eq_ignore_ascii_case("newsuperior") => {
                let superior = lexer::utf8(value, "DN")?;
                super::expect_end(self, r)?;
                dn::join(&new_rdn, Some(&superior))
            }
            _ => return Err(ParseError::TrailingGarbage),
        };
        dn::validate(&new_dn)?;
        Ok(Rename {
            old_dn,
            new_dn,
            delete_old_rdn,
        })
    }

    fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(b"version: 1\n")
    }

    fn write_entry<W: Write>(&self, w: &mut W, entry: &Entry, key: &str) -> io::Result<()> {
        w.write_all(b"\n")?;
        write_value(w, "dn", entry.dn().as_bytes())?;
        write_value(w, KEY_ATTRIBUTE, key.as_bytes())?;
        write_attributes(w, entry)
    }

    fn write_add<W: Write>(&self, w: &mut W, entry: &Entry) -> io::Result<()> {
        write_change_header(w, entry.dn(), "add")?;
        write_attributes(w, entry)
    }

    fn write_delete<W: Write>(&self, w: &mut W, dn: &str) -> io::Result<()> {
        write_change_header(w, dn, "delete")
    }

    fn write_rename<W: Write>(
        &self,
        w: &mut W,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> io::Result<()> {
        write_change_header(w, old_dn, "modrdn")?;
        let (rdn, superior) = dn::split_first(new_dn).unwrap_or((new_dn, None));
        write_value(w, "newrdn", rdn.as_bytes())?;
        writeln!(w, "deleteoldrdn: {}", u8::from(delete_old_rdn))?;
        write_value(w, "newsuperior", superior.unwrap_or("").as_bytes())
    }

    fn write_modify<W: Write>(
        &self,
        w: &mut W,
        dn: &str,
        mods: &[Modification],
    ) -> io::Result<()> {
        write_change_header(w, dn, "modify")?;
        for m in mods {
            write_value(w, m.op.as_str(), m.attr.as_bytes())?;
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

fn write_change_header<W: Write>(w: &mut W, dn: &str, kind: &str) -> io::Result<()> {
    w.write_all(b"\n")?;
    write_value(w, "dn", dn.as_bytes())?;
    writeln!(w, "changetype: {kind}")
}

fn write_attributes<W: Write>(w: &mut W, entry: &Entry) -> io::Result<()> {
    for attr in entry.attributes() {
        for v in attr.values() {
            write_value(w, attr.name(), v)?;
        }
    }
    Ok(())
}

/// RFC 2849 SAFE-STRING, further restricted to ASCII and no trailing space.
pub fn is_safe_string(value: &[u8]) -> bool {
    let (Some(&first), Some(&last)) = (value.first(), value.last()) else {
        return true;
    };
    if matches!(first, b' ' | b':' | b'<') || last == b' ' {
        return false;
    }
    value
        .iter()
        .all(|&c| c.is_ascii() && !matches!(c, 0 | b'\r' | b'\n'))
}

/// Write `name: value`, or `name:: base64` when the value is not safe.
pub fn write_value<W: Write>(w: &mut W, name: &str, value: &[u8]) -> io::Result<()> {
    if is_safe_string(value) {
        write!(w, "{name}: ")?;
        w.write_all(value)?;
        w.write_all(b"\n")
    } else {
        writeln!(w, "{name}:: {}", value::encode_base64(value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
