// Value encodings beyond plain text: base64, `file://` references and
// one-way password hashes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::ParseError;

/// Decode a base64 value, ignoring surrounding whitespace.
pub fn decode_base64(text: &[u8]) -> Result<Vec<u8>, ParseError> {
    STANDARD
        .decode(text.trim_ascii())
        .map_err(|_| ParseError::InvalidBase64)
}

pub fn encode_base64(value: &[u8]) -> String {
    STANDARD.encode(value)
}

/// Resolve a `file://` URL to the referenced file's contents.
pub fn read_url(text: &[u8]) -> Result<Vec<u8>, ParseError> {
    let url = std::str::from_utf8(text.trim_ascii())
        .map_err(|_| ParseError::InvalidUtf8("URL"))?;
    let Some(path) = url.strip_prefix("file://") else {
        return Err(ParseError::UnknownUrlScheme(url.to_string()));
    };
    std::fs::read(path).map_err(|source| ParseError::FileReference {
        path: path.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Password hashes
// ---------------------------------------------------------------------------

/// A `{SCHEME}` password hash recognised after `name:` in the native format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Sha,
    Ssha,
    Sha256,
    Ssha256,
    Sha512,
    Ssha512,
    Md5,
    Smd5,
    /// Recognised, but there is no portable crypt(3) to call.
    Crypt,
}

/// Salt length for the salted schemes.
pub const SALT_LEN: usize = 8;

impl HashScheme {
    /// Look up a scheme by its encoding name, ASCII case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [HashScheme; 9] = [
            HashScheme::Sha,
            HashScheme::Ssha,
            HashScheme::Sha256,
            HashScheme::Ssha256,
            HashScheme::Sha512,
            HashScheme::Ssha512,
            HashScheme::Md5,
            HashScheme::Smd5,
            HashScheme::Crypt,
        ];
        ALL.into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(name))
    }

    /// The scheme tag written between braces.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sha => "SHA",
            Self::Ssha => "SSHA",
            Self::Sha256 => "SHA256",
            Self::Ssha256 => "SSHA256",
            Self::Sha512 => "SHA512",
            Self::Ssha512 => "SSHA512",
            Self::Md5 => "MD5",
            Self::Smd5 => "SMD5",
            Self::Crypt => "CRYPT",
        }
    }

    pub fn is_salted(self) -> bool {
        matches!(self, Self::Ssha | Self::Ssha256 | Self::Ssha512 | Self::Smd5)
    }
}

/// Hash a clear-text secret into `{SCHEME}base64(digest[+salt])`.
pub fn hash_secret(scheme: HashScheme, secret: &[u8]) -> Result<Vec<u8>, ParseError> {
    let salt = if scheme.is_salted() {
        random_salt()?
    } else {
        Vec::new()
    };
    hash_with_salt(scheme, secret, &salt)
}

/// Hash with a caller-supplied salt (empty for unsalted schemes).
pub fn hash_with_salt(
    scheme: HashScheme,
    secret: &[u8],
    salt: &[u8],
) -> Result<Vec<u8>, ParseError> {
    let raw = digest(scheme, secret, salt)?;
    Ok(format!("{{{}}}{}", scheme.label(), encode_base64(&raw)).into_bytes())
}

#[cfg(feature = "password-hash")]
fn random_salt() -> Result<Vec<u8>, ParseError> {
    use rand::RngCore;
    let mut salt = vec![0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    Ok(salt)
}

#[cfg(not(feature = "password-hash"))]
fn random_salt() -> Result<Vec<u8>, ParseError> {
    Ok(Vec::new())
}

#[cfg(feature = "password-hash")]
fn digest(scheme: HashScheme, secret: &[u8], salt: &[u8]) -> Result<Vec<u8>, ParseError> {
    use sha2::Digest;

    fn salted<D: Digest>(secret: &[u8], salt: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(secret);
        hasher.update(salt);
        let mut out = hasher.finalize().to_vec();
        out.extend_from_slice(salt);
        out
    }

    Ok(match scheme {
        HashScheme::Sha | HashScheme::Ssha => salted::<sha1::Sha1>(secret, salt),
        HashScheme::Sha256 | HashScheme::Ssha256 => salted::<sha2::Sha256>(secret, salt),
        HashScheme::Sha512 | HashScheme::Ssha512 => salted::<sha2::Sha512>(secret, salt),
        HashScheme::Md5 | HashScheme::Smd5 => salted::<md5::Md5>(secret, salt),
        HashScheme::Crypt => return Err(ParseError::HashUnavailable(scheme.label())),
    })
}

#[cfg(not(feature = "password-hash"))]
fn digest(scheme: HashScheme, _secret: &[u8], _salt: &[u8]) -> Result<Vec<u8>, ParseError> {
    Err(ParseError::HashUnavailable(scheme.label()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip_and_errors() {
        assert_eq!(decode_base64(b" aGVsbG8= ").unwrap(), b"hello");
        assert_eq!(encode_base64(b"hello"), "aGVsbG8=");
        assert!(matches!(
            decode_base64(b"not base64!"),
            Err(ParseError::InvalidBase64)
        ));
    }

    #[test]
    fn file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.bin");
        std::fs::write(&path, b"\x00\x01binary").unwrap();
        let url = format!("file://{}", path.display());
        assert_eq!(read_url(url.as_bytes()).unwrap(), b"\x00\x01binary");

        assert!(matches!(
            read_url(b"http://example.com/x"),
            Err(ParseError::UnknownUrlScheme(_))
        ));
        let missing = format!("file://{}", dir.path().join("nope").display());
        assert!(matches!(
            read_url(missing.as_bytes()),
            Err(ParseError::FileReference { .. })
        ));
    }

    #[test]
    fn scheme_names_are_case_insensitive() {
        assert_eq!(HashScheme::from_name("SSHA"), Some(HashScheme::Ssha));
        assert_eq!(HashScheme::from_name("sha256"), Some(HashScheme::Sha256));
        assert_eq!(HashScheme::from_name("Md5"), Some(HashScheme::Md5));
        assert_eq!(HashScheme::from_name("blowfish"), None);
        assert!(HashScheme::Smd5.is_salted());
        assert!(!HashScheme::Sha.is_salted());
    }

    #[cfg(feature = "password-hash")]
    #[test]
    fn known_digests() {
        // sha1("secret")
        assert_eq!(
            hash_with_salt(HashScheme::Sha, b"secret", b"").unwrap(),
            b"{SHA}5en6G6MezRroT3XKqkdPOmY/BfQ="
        );
        // md5("secret")
        assert_eq!(
            hash_with_salt(HashScheme::Md5, b"secret", b"").unwrap(),
            b"{MD5}Xr4ilOzQ4PCOq3aQ0qbuaQ=="
        );
    }

    #[cfg(feature = "password-hash")]
    #[test]
    fn salted_digest_carries_salt() {
        let value = hash_secret(HashScheme::Ssha256, b"secret").unwrap();
        let text = String::from_utf8(value).unwrap();
        let b64 = text.strip_prefix("{SSHA256}").unwrap();
        let raw = decode_base64(b64.as_bytes()).unwrap();
        assert_eq!(raw.len(), 32 + SALT_LEN);
    }

    #[test]
    fn crypt_is_unavailable() {
        assert!(matches!(
            hash_secret(HashScheme::Crypt, b"secret"),
            Err(ParseError::HashUnavailable("CRYPT"))
        ));
    }
}
