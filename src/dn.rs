// Distinguished-name parsing.
//
// Just enough of the LDAPv3 string representation to validate DNs, pull
// the attribute-value assertions out of the leading RDN, and split a DN
// into its first RDN and parent. Separators (`,` `;` `+` `=`) only count
// when unescaped and outside double quotes.

use std::fmt::Write as _;

/// Errors from DN parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnError {
    #[error("invalid distinguished name: {0}")]
    Invalid(String),
}

/// One `attr=value` assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attr: String,
    pub value: Vec<u8>,
}

/// A relative distinguished name: one or more assertions joined by `+`.
pub type Rdn = Vec<Ava>;

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Byte offsets of every unescaped, unquoted occurrence of a separator.
fn separators(s: &str, is_sep: impl Fn(u8) -> bool) -> Result<Vec<usize>, DnError> {
    let b = s.as_bytes();
    let mut out = Vec::new();
    let mut quoted = false;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => {
                if i + 1 >= b.len() {
                    return Err(DnError::Invalid(s.to_string()));
                }
                i += if is_hex_pair(&b[i + 1..]) { 3 } else { 2 };
                continue;
            }
            b'"' => quoted = !quoted,
            c if !quoted && is_sep(c) => out.push(i),
            _ => {}
        }
        i += 1;
    }
    if quoted {
        return Err(DnError::Invalid(s.to_string()));
    }
    Ok(out)
}

fn is_hex_pair(b: &[u8]) -> bool {
    b.len() >= 2 && b[0].is_ascii_hexdigit() && b[1].is_ascii_hexdigit()
}

fn split_at_offsets<'a>(s: &'a str, offsets: &[usize]) -> Vec<&'a str> {
    let mut parts = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for &off in offsets {
        parts.push(&s[start..off]);
        start = off + 1;
    }
    parts.push(&s[start..]);
    parts
}

fn hex_val(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'A' + 10,
    }
}

fn trim_value(raw: &str) -> &str {
    let raw = raw.trim_start_matches(' ');
    let b = raw.as_bytes();
    let mut end = b.len();
    while end > 0 && b[end - 1] == b' ' && !(end >= 2 && b[end - 2] == b'\\') {
        end -= 1;
    }
    &raw[..end]
}

fn unescape(raw: &str) -> Vec<u8> {
    let raw = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    let b = raw.as_bytes();
    let mut out = Vec::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        if b[i] == b'\\' && i + 1 < b.len() {
            if is_hex_pair(&b[i + 1..]) {
                out.push((hex_val(b[i + 1]) << 4) | hex_val(b[i + 2]));
                i += 3;
            } else {
                out.push(b[i + 1]);
                i += 2;
            }
        } else {
            out.push(b[i]);
            i += 1;
        }
    }
    out
}

fn parse_ava(dn: &str, raw: &str) -> Result<Ava, DnError> {
    let eq = separators(raw, |c| c == b'=')?;
    let Some(&pos) = eq.first() else {
        return Err(DnError::Invalid(dn.to_string()));
    };
    let attr = raw[..pos].trim();
    if attr.is_empty() || attr.bytes().any(|c| c == b' ' || c == b'"') {
        return Err(DnError::Invalid(dn.to_string()));
    }
    Ok(Ava {
        attr: attr.to_string(),
        value: unescape(trim_value(&raw[pos + 1..])),
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split a DN into its RDNs, leading RDN first. The empty DN has none.
pub fn explode(dn: &str) -> Result<Vec<Rdn>, DnError> {
    let trimmed = dn.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let commas = separators(trimmed, |c| c == b',' || c == b';')?;
    let mut rdns = Vec::with_capacity(commas.len() + 1);
    for component in split_at_offsets(trimmed, &commas) {
        if component.trim().is_empty() {
            return Err(DnError::Invalid(dn.to_string()));
        }
        let pluses = separators(component, |c| c == b'+')?;
        let rdn = split_at_offsets(component, &pluses)
            .into_iter()
            .map(|raw| parse_ava(dn, raw))
            .collect::<Result<Rdn, _>>()?;
        rdns.push(rdn);
    }
    Ok(rdns)
}

/// Validate a DN without keeping the result.
pub fn validate(dn: &str) -> Result<(), DnError> {
    explode(dn).map(|_| ())
}

/// The assertions of the leading RDN (empty for the root DN).
pub fn leading_rdn(dn: &str) -> Result<Rdn, DnError> {
    Ok(explode(dn)?.into_iter().next().unwrap_or_default())
}

/// Split a DN into its leading RDN and parent, both as written.
///
/// `"cn=a,ou=b,dc=c"` gives `("cn=a", Some("ou=b,dc=c"))`; a single-RDN
/// DN has no parent.
pub fn split_first(dn: &str) -> Result<(&str, Option<&str>), DnError> {
    let trimmed = dn.trim();
    validate(trimmed)?;
    let commas = separators(trimmed, |c| c == b',' || c == b';')?;
    Ok(match commas.first() {
        Some(&pos) => (trimmed[..pos].trim(), Some(trimmed[pos + 1..].trim())),
        None => (trimmed, None),
    })
}

/// The parent DN as written, if any.
pub fn parent(dn: &str) -> Option<&str> {
    split_first(dn).ok().and_then(|(_, parent)| parent)
}

/// A canonical spelling for comparisons: attribute types and values are
/// ASCII-lowercased, escapes are resolved and re-applied uniformly.
pub fn normalize(dn: &str) -> Result<String, DnError> {
    let mut out = String::with_capacity(dn.len());
    for (i, rdn) in explode(dn)?.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let mut avas: Vec<String> = rdn
            .iter()
            .map(|ava| {
                let mut s = ava.attr.to_ascii_lowercase();
                s.push('=');
                for &c in &ava.value {
                    let c = c.to_ascii_lowercase();
                    if c.is_ascii_alphanumeric() || c == b' ' || c == b'-' || c == b'.' {
                        s.push(c as char);
                    } else {
                        let _ = write!(s, "\\{c:02x}");
                    }
                }
                s
            })
            .collect();
        avas.sort();
        out.push_str(&avas.join("+"));
    }
    Ok(out)
}

/// Join a leading RDN and an optional parent into a DN.
pub fn join(rdn: &str, parent: Option<&str>) -> String {
    match parent {
        Some(p) if !p.is_empty() => format!("{rdn},{p}"),
        _ => rdn.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
