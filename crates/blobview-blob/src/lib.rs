//! Content-addressable blob access for blobview.
//!
//! A blob is content plus a MIME type, a digest, and a size. Consumers hold
//! [`Blob`] views: every view can be closed on its own, further views come
//! from [`BlobAccess::dup`], and the resource behind a blob (an open file, a
//! temporary file, a cache entry) is released exactly once, when the last
//! view is closed or dropped.
//!
//! # Backings
//!
//! - [`for_data`], [`for_string`] -- in-memory content, digest computed eagerly
//! - [`for_file`], [`for_file_with_options`], [`for_file_with_closer`] --
//!   files opened on demand, on any [`FileSystem`]
//! - [`for_temporary_file_path`], [`for_temporary_file`],
//!   [`TempFile::as_blob`] -- files deleted with the blob
//! - [`with_compression`], [`with_decompression`] -- zstd transforms streamed
//!   by a background thread
//! - [`for_data_access`], [`with_mime_type`], [`non_closable`] --
//!   pass-through wrappers
//!
//! [`BlobCache`] stores blobs by digest and hands out views that keep the
//! cache alive. A [`BlobProvider`] produces fresh views on demand;
//! [`blob_reader`] turns a blob into a stream that closes it.

pub mod cache;
pub mod compression;
pub mod config;
pub mod data;
pub mod error;
pub mod file;
pub mod fs;
pub mod pipe;
pub mod provider;
pub mod standard;
pub mod traits;
pub mod wrappers;

pub use cache::{BlobCache, BlobSink, BlobSource};
pub use compression::{
    with_compression, with_compression_config, with_decompression, with_decompression_config,
    TransformReader,
};
pub use config::BlobConfig;
pub use data::{digest_of, for_reader_fn, BytesAccess, FileDataAccess, ReaderFnAccess};
pub use error::{BlobError, BlobResult};
pub use file::{
    for_file, for_file_with_closer, for_file_with_options, for_temporary_file,
    for_temporary_file_path, for_temporary_file_with_options, FileOptions, TempFile,
};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use provider::{for_blob_access, BlobAccessProvider, BlobProvider};
pub use standard::{
    blob_data, blob_reader, for_access, for_base, for_data, for_string, BlobView, StandardBlob,
};
pub use traits::{Blob, BlobAccess, BlobAccessBase, BlobReader, DataAccess, FileLocation, ReadCloser};
pub use wrappers::{for_data_access, non_closable, with_mime_type, AnnotatedBlob};
