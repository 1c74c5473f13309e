use std::sync::Mutex;

use crate::error::{BlobError, BlobResult};
use crate::traits::{Blob, BlobAccess};

/// Factory for fresh blob views.
///
/// Every call hands out a new view the caller owns and must close. Closures
/// returning blobs are providers too.
pub trait BlobProvider: Send + Sync {
    fn blob_access(&self) -> BlobResult<Blob>;
}

impl<F> BlobProvider for F
where
    F: Fn() -> BlobResult<Blob> + Send + Sync,
{
    fn blob_access(&self) -> BlobResult<Blob> {
        self()
    }
}

/// Provider handing out dups of one blob.
///
/// The provider holds its own view on the blob. It keeps the content alive
/// until [`close`](Self::close) is called or the provider is dropped; views
/// already handed out stay valid after that.
#[derive(Debug)]
pub struct BlobAccessProvider {
    blob: Mutex<Option<Blob>>,
}

/// Provider for `blob`. The caller keeps its own view and may close it
/// right away.
pub fn for_blob_access(blob: &dyn BlobAccess) -> BlobResult<BlobAccessProvider> {
    Ok(BlobAccessProvider {
        blob: Mutex::new(Some(blob.dup()?)),
    })
}

impl BlobAccessProvider {
    /// Release the provider's own view.
    pub fn close(&self) -> BlobResult<()> {
        let blob = self.blob.lock().expect("lock poisoned").take();
        blob.ok_or(BlobError::Closed)?.close()
    }

    pub fn is_closed(&self) -> bool {
        self.blob.lock().expect("lock poisoned").is_none()
    }
}

impl BlobProvider for BlobAccessProvider {
    fn blob_access(&self) -> BlobResult<Blob> {
        match self.blob.lock().expect("lock poisoned").as_ref() {
            Some(blob) => blob.dup(),
            None => Err(BlobError::Closed),
        }
    }
}
