//! Inline data-URI detection and decoding
//!
//! Only the base64 form is recognized:
//!
//! ```text
//! data:<type>/<subtype>[;param=value]*;base64,<payload>
//! ```

use crate::error::InvalidEncoding;
use crate::hash::ContentHash;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Prefix that marks a value as legacy inline data
pub const SCHEME_MARKER: &str = "data:";

const BASE64_MARKER: &str = "base64";

/// Result of [`detect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection<'a> {
    /// Value carries the scheme marker and should be decoded
    Legacy(LegacyPayload<'a>),
    /// Value is empty, canonical, or in a format this codec does not own
    NotLegacy,
}

/// A value classified as legacy, not yet decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyPayload<'a> {
    raw: &'a str,
}

impl<'a> LegacyPayload<'a> {
    /// Everything after the scheme marker
    #[inline]
    fn body(&self) -> &'a str {
        // detect() guarantees the ASCII marker is present
        &self.raw[SCHEME_MARKER.len()..]
    }
}

/// Raw bytes recovered from a legacy value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    bytes: Vec<u8>,
    content_type: String,
}

impl DecodedPayload {
    /// Decoded bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lower-cased `type/subtype`
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Byte length of the decoded payload
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; [`decode`] rejects empty payloads
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Blake3 digest of the decoded bytes
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        ContentHash::compute(&self.bytes)
    }

    /// Split into bytes and content type (consumes self)
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, String) {
        (self.bytes, self.content_type)
    }
}

/// Classify a raw field value by its prefix alone.
///
/// The marker comparison is ASCII case-insensitive. Nothing past the
/// marker is inspected.
#[must_use]
pub fn detect(value: &str) -> Detection<'_> {
    let marked = value
        .as_bytes()
        .get(..SCHEME_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SCHEME_MARKER.as_bytes()));

    if marked {
        Detection::Legacy(LegacyPayload { raw: value })
    } else {
        Detection::NotLegacy
    }
}

/// Decode a legacy value into bytes and content type.
///
/// # Errors
/// Returns [`InvalidEncoding`] when the header or payload is malformed.
pub fn decode(payload: &LegacyPayload<'_>) -> Result<DecodedPayload, InvalidEncoding> {
    let (header, data) = payload
        .body()
        .split_once(',')
        .ok_or(InvalidEncoding::MissingSeparator)?;

    let (media, encoding) = header.rsplit_once(';').ok_or(InvalidEncoding::NotBase64)?;
    if !encoding.trim().eq_ignore_ascii_case(BASE64_MARKER) {
        return Err(InvalidEncoding::NotBase64);
    }

    // Parameters such as `;name=photo.jpg` sit between the type and `;base64`
    let content_type = parse_content_type(media.split(';').next().unwrap_or_default())?;

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(InvalidEncoding::EmptyPayload);
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| InvalidEncoding::Payload(e.to_string()))?;
    if bytes.is_empty() {
        return Err(InvalidEncoding::EmptyPayload);
    }

    Ok(DecodedPayload {
        bytes,
        content_type,
    })
}

fn parse_content_type(raw: &str) -> Result<String, InvalidEncoding> {
    let trimmed = raw.trim();
    let malformed = || InvalidEncoding::MalformedContentType(trimmed.to_string());

    let (kind, subtype) = trimmed.split_once('/').ok_or_else(malformed)?;
    if !is_token(kind) || !is_token(subtype) {
        return Err(malformed());
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// RFC 7230 `token`
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
