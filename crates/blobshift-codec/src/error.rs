//! Codec error types

/// A value carried the legacy scheme marker but could not be decoded.
///
/// This is a data-quality condition: callers skip the field and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEncoding {
    /// No `,` separating the header from the payload
    #[error("missing payload separator")]
    MissingSeparator,

    /// Header does not carry the `;base64` marker
    #[error("payload is not base64-encoded")]
    NotBase64,

    /// Content type is absent or not a `type/subtype` token pair
    #[error("malformed content type: {0:?}")]
    MalformedContentType(String),

    /// Payload is not valid base64
    #[error("invalid base64 payload: {0}")]
    Payload(String),

    /// Payload decoded to zero bytes
    #[error("empty payload")]
    EmptyPayload,
}

impl InvalidEncoding {
    /// Short machine-readable reason, used in logs and summaries
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingSeparator => "missing_separator",
            Self::NotBase64 => "not_base64",
            Self::MalformedContentType(_) => "malformed_content_type",
            Self::Payload(_) => "invalid_payload",
            Self::EmptyPayload => "empty_payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_encoding_display() {
        let err = InvalidEncoding::MalformedContentType("image".to_string());
        assert!(err.to_string().contains("malformed content type"));
    }

    #[test]
    fn invalid_encoding_reason() {
        assert_eq!(InvalidEncoding::NotBase64.reason(), "not_base64");
        assert_eq!(
            InvalidEncoding::Payload("bad".to_string()).reason(),
            "invalid_payload"
        );
    }
}
