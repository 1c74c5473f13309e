use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use blobview_refmgmt::Closer;
use blobview_types::Digest;

use crate::error::{BlobError, BlobResult};
use crate::fs::FileSystem;

/// A readable stream with an explicit, fallible close.
///
/// Most streams have nothing to report on close. Transform streams use it to
/// join their background thread and surface its error.
pub trait ReadCloser: Read + Send {
    fn close(&mut self) -> BlobResult<()> {
        Ok(())
    }
}

/// Stream handed out by [`BlobAccess::reader`].
pub type BlobReader = Box<dyn ReadCloser>;

impl ReadCloser for File {}

impl<T: AsRef<[u8]> + Send> ReadCloser for Cursor<T> {}

impl ReadCloser for Box<dyn Read + Send> {}

/// Raw access to some content, without any metadata.
pub trait DataAccess: Send + Sync + 'static {
    /// The complete content.
    fn get(&self) -> BlobResult<Vec<u8>>;

    /// A fresh stream over the content.
    fn reader(&self) -> BlobResult<BlobReader>;

    /// Release whatever the access holds. Called once, by the blob that owns
    /// the access, when its last view goes away.
    fn close(&self) -> BlobResult<()> {
        Ok(())
    }

    /// Check that the access can still provide data.
    fn validate(&self) -> BlobResult<()> {
        Ok(())
    }

    /// Content length, if it can be learned without reading the content.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Human readable description of where the data comes from.
    fn origin(&self) -> Option<String> {
        None
    }
}

/// Where a file-backed blob keeps its content.
#[derive(Clone)]
pub struct FileLocation {
    pub fs: Arc<dyn FileSystem>,
    pub path: PathBuf,
}

impl fmt::Debug for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLocation")
            .field("fs", &self.fs)
            .field("path", &self.path)
            .finish()
    }
}

/// The shared object behind every blob view.
///
/// A base is created once per content instance and closed once, when the
/// last view on it goes away. It is never handed out directly; consumers
/// only see [`BlobAccess`] façades.
pub trait BlobAccessBase: Closer<Error = BlobError> {
    fn get(&self) -> BlobResult<Vec<u8>>;

    fn reader(&self) -> BlobResult<BlobReader>;

    fn mime_type(&self) -> String;

    /// Returns `true` if the digest is available without reading content.
    fn digest_known(&self) -> bool;

    /// Content digest, `None` when it cannot be known.
    fn digest(&self) -> BlobResult<Option<Digest>>;

    /// Content length, `None` when it cannot be known.
    fn size(&self) -> BlobResult<Option<u64>>;

    fn file_location(&self) -> Option<FileLocation> {
        None
    }

    fn validate(&self) -> BlobResult<()> {
        Ok(())
    }
}

/// A closable, dup-able view of some content-addressable blob.
///
/// Every accessor fails with [`BlobError::Closed`] once this particular view
/// has been closed; views obtained through [`dup`](Self::dup) stay usable
/// until they are closed themselves. Dropping a view releases it.
pub trait BlobAccess: Send + Sync + fmt::Debug {
    /// The complete content.
    fn get(&self) -> BlobResult<Vec<u8>>;

    /// A fresh stream over the content. Close it to learn about late errors.
    fn reader(&self) -> BlobResult<BlobReader>;

    fn mime_type(&self) -> BlobResult<String>;

    fn digest_known(&self) -> BlobResult<bool>;

    /// Content digest; `Ok(None)` means it is unknown for this blob.
    fn digest(&self) -> BlobResult<Option<Digest>>;

    /// Content length; `Ok(None)` means it is unknown for this blob.
    fn size(&self) -> BlobResult<Option<u64>>;

    /// File path and filesystem for file-backed blobs.
    fn file_location(&self) -> BlobResult<Option<FileLocation>>;

    fn validate(&self) -> BlobResult<()>;

    /// Another view on the same content, closed independently.
    fn dup(&self) -> BlobResult<Blob>;

    fn close(&self) -> BlobResult<()>;

    fn is_closed(&self) -> bool;
}

/// Owned, type-erased blob view.
pub type Blob = Box<dyn BlobAccess>;
