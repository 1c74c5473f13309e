//! Streaming digest computation for blobview.
//!
//! Blob content is usually consumed as a stream, so digests and sizes are
//! computed while reading rather than over a materialized buffer. All hashing
//! wraps established libraries (`sha2`, `blake3`).

pub mod digester;
pub mod reader;

pub use digester::Digester;
pub use reader::{digest_reader, CountingReader, DigestReader};
