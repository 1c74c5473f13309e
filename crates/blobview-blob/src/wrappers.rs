use std::sync::Arc;

use blobview_types::Digest;

use crate::error::BlobResult;
use crate::standard::{BlobView, StandardBlob};
use crate::traits::{Blob, BlobAccess, BlobReader, DataAccess, FileLocation};

/// Pass-through that only changes the reported MIME type.
#[derive(Debug)]
struct MimeBlob {
    mime: String,
    blob: Blob,
}

/// Take over `blob` and report `mime` as its type. Closing the result closes
/// `blob`.
pub fn with_mime_type(mime: impl Into<String>, blob: Blob) -> Blob {
    Box::new(MimeBlob {
        mime: mime.into(),
        blob,
    })
}

impl BlobAccess for MimeBlob {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.blob.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.blob.reader()
    }

    fn mime_type(&self) -> BlobResult<String> {
        // still fail once closed
        self.blob.mime_type()?;
        Ok(self.mime.clone())
    }

    fn digest_known(&self) -> BlobResult<bool> {
        self.blob.digest_known()
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        self.blob.digest()
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        self.blob.size()
    }

    fn file_location(&self) -> BlobResult<Option<FileLocation>> {
        self.blob.file_location()
    }

    fn validate(&self) -> BlobResult<()> {
        self.blob.validate()
    }

    fn dup(&self) -> BlobResult<Blob> {
        Ok(Box::new(Self {
            mime: self.mime.clone(),
            blob: self.blob.dup()?,
        }))
    }

    fn close(&self) -> BlobResult<()> {
        self.blob.close()
    }

    fn is_closed(&self) -> bool {
        self.blob.is_closed()
    }
}

/// Blob that keeps a typed handle on the [`DataAccess`] it was built from.
pub struct AnnotatedBlob<T: DataAccess> {
    blob: BlobView,
    source: Arc<T>,
}

/// Blob over `access` with optionally known digest and size. The access is
/// closed when the last view on the blob is released.
pub fn for_data_access<T: DataAccess>(
    digest: Option<Digest>,
    size: Option<u64>,
    mime: impl Into<String>,
    access: Arc<T>,
) -> AnnotatedBlob<T> {
    let shared: Arc<dyn DataAccess> = access.clone();
    let base = StandardBlob::new(mime, shared, digest, size);
    AnnotatedBlob {
        blob: BlobView::new("annotated blob", Arc::new(base)),
        source: access,
    }
}

impl<T: DataAccess> AnnotatedBlob<T> {
    /// The access this blob was created from.
    pub fn source(&self) -> &Arc<T> {
        &self.source
    }

    /// Like [`BlobAccess::dup`], keeping the annotation.
    pub fn dup_annotated(&self) -> BlobResult<AnnotatedBlob<T>> {
        Ok(Self {
            blob: self.blob.dup_view()?,
            source: Arc::clone(&self.source),
        })
    }
}

impl<T: DataAccess> BlobAccess for AnnotatedBlob<T> {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.blob.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.blob.reader()
    }

    fn mime_type(&self) -> BlobResult<String> {
        self.blob.mime_type()
    }

    fn digest_known(&self) -> BlobResult<bool> {
        self.blob.digest_known()
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        self.blob.digest()
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        self.blob.size()
    }

    fn file_location(&self) -> BlobResult<Option<FileLocation>> {
        self.blob.file_location()
    }

    fn validate(&self) -> BlobResult<()> {
        self.blob.validate()
    }

    fn dup(&self) -> BlobResult<Blob> {
        Ok(Box::new(self.dup_annotated()?))
    }

    fn close(&self) -> BlobResult<()> {
        self.blob.close()
    }

    fn is_closed(&self) -> bool {
        self.blob.is_closed()
    }
}

impl<T: DataAccess> std::fmt::Debug for AnnotatedBlob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotatedBlob")
            .field("blob", &self.blob)
            .field("origin", &self.source.origin())
            .finish()
    }
}

/// View whose `close` does nothing.
///
/// Handed to consumers that must not end the lifetime of a blob they
/// borrow. The hidden reference is released when the value is dropped;
/// [`dup`](BlobAccess::dup) yields an ordinary, closable view.
#[derive(Debug)]
struct NonClosable {
    blob: Blob,
}

pub fn non_closable(blob: &dyn BlobAccess) -> BlobResult<Blob> {
    Ok(Box::new(NonClosable { blob: blob.dup()? }))
}

impl BlobAccess for NonClosable {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.blob.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.blob.reader()
    }

    fn mime_type(&self) -> BlobResult<String> {
        self.blob.mime_type()
    }

    fn digest_known(&self) -> BlobResult<bool> {
        self.blob.digest_known()
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        self.blob.digest()
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        self.blob.size()
    }

    fn file_location(&self) -> BlobResult<Option<FileLocation>> {
        self.blob.file_location()
    }

    fn validate(&self) -> BlobResult<()> {
        self.blob.validate()
    }

    fn dup(&self) -> BlobResult<Blob> {
        self.blob.dup()
    }

    fn close(&self) -> BlobResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}
