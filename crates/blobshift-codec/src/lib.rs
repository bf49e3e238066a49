//! blobshift codec
//!
//! Recognizes and decodes the legacy inline attachment format
//! (`data:<content-type>;base64,<payload>`).
//!
//! # Core Concepts
//!
//! - [`detect`]: cheap prefix check, classifies a raw value as legacy or not
//! - [`decode`]: parses a [`LegacyPayload`] into raw bytes plus content type
//! - [`InvalidEncoding`]: data-quality condition for malformed legacy values
//! - [`ContentHash`]: Blake3 digest of decoded bytes, used for logging and keys
//!
//! # Example
//!
//! ```rust
//! use blobshift_codec::{decode, detect, Detection};
//!
//! let raw = "data:text/plain;base64,aGVsbG8=";
//! let Detection::Legacy(payload) = detect(raw) else {
//!     panic!("expected legacy value");
//! };
//! let decoded = decode(&payload).unwrap();
//! assert_eq!(decoded.content_type(), "text/plain");
//! assert_eq!(decoded.bytes(), b"hello");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod data_uri;
mod error;
mod hash;

pub use data_uri::{decode, detect, DecodedPayload, Detection, LegacyPayload, SCHEME_MARKER};
pub use error::InvalidEncoding;
pub use hash::ContentHash;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
