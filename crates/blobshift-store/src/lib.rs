//! blobshift store interfaces
//!
//! The two external collaborators of a migration run:
//! - [`RecordStore`]: scan records carrying candidate fields, apply partial updates
//! - [`BlobStore`]: durably store bytes under a key, issue canonical references
//!
//! Backends:
//! - [`memory`]: in-process stores with failure injection
//! - [`http`]: REST record store and object-storage API

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod blob;
mod error;
mod record;

pub mod http;
pub mod memory;

pub use blob::{BlobKey, BlobStore, Reference};
pub use error::{BlobStoreError, StoreError};
pub use record::{FieldName, FieldValue, Record, RecordId, RecordPatch, RecordStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
