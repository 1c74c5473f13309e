//! Foundation types for blobview.
//!
//! Every other blobview crate depends on `blobview-types`.
//!
//! # Key Types
//!
//! - [`Digest`] -- content digest in `algorithm:hex` form (SHA-256 canonical)
//! - [`DigestAlgorithm`] -- the hash functions a [`Digest`] may carry
//! - [`mime`] -- MIME type constants and compression-suffix helpers
//!
//! Unknown digests and sizes are represented as `None`; the
//! [`BLOB_UNKNOWN_DIGEST`] and [`BLOB_UNKNOWN_SIZE`] constants name them.

pub mod digest;
pub mod error;
pub mod mime;

pub use digest::{Digest, DigestAlgorithm, BLOB_UNKNOWN_DIGEST, BLOB_UNKNOWN_SIZE};
pub use error::TypeError;
