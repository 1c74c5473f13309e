use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use blobview_digest::DigestReader;
use blobview_refmgmt::{Closer, ResourceView};
use blobview_types::Digest;
use bytes::Bytes;
use tracing::trace;

use crate::data::BytesAccess;
use crate::error::{and_close, BlobError, BlobResult};
use crate::traits::{Blob, BlobAccess, BlobAccessBase, BlobReader, DataAccess, FileLocation, ReadCloser};

#[derive(Debug, Default)]
struct Meta {
    digest: Option<Digest>,
    size: Option<u64>,
}

/// Blob base over a [`DataAccess`], with lazily memoized digest and size.
///
/// Missing metadata is computed by streaming the content once through a
/// canonical digester. Values supplied at construction are never replaced.
pub struct StandardBlob {
    mime: String,
    access: Arc<dyn DataAccess>,
    meta: Mutex<Meta>,
    location: Option<FileLocation>,
}

impl StandardBlob {
    pub fn new(
        mime: impl Into<String>,
        access: Arc<dyn DataAccess>,
        digest: Option<Digest>,
        size: Option<u64>,
    ) -> Self {
        Self {
            mime: mime.into(),
            access,
            meta: Mutex::new(Meta { digest, size }),
            location: None,
        }
    }

    pub(crate) fn with_location(mut self, location: FileLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Fill in whatever metadata is still missing. The lock is held while
    /// streaming so concurrent callers compute it only once.
    fn update(&self) -> BlobResult<()> {
        let mut meta = self.meta.lock().expect("lock poisoned");
        if meta.digest.is_some() && meta.size.is_some() {
            return Ok(());
        }
        let mut reader = self.access.reader()?;
        let mut digesting = DigestReader::canonical(&mut reader);
        let copied = io::copy(&mut digesting, &mut io::sink()).map_err(BlobError::from);
        let (digest, size) = digesting.finish();
        and_close(copied, reader.close())?;

        trace!(digest = %digest, size, "computed blob metadata");
        meta.digest.get_or_insert(digest);
        meta.size.get_or_insert(size);
        Ok(())
    }
}

impl Closer for StandardBlob {
    type Error = BlobError;

    fn close(&self) -> BlobResult<()> {
        self.access.close()
    }
}

impl BlobAccessBase for StandardBlob {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.access.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.access.reader()
    }

    fn mime_type(&self) -> String {
        self.mime.clone()
    }

    fn digest_known(&self) -> bool {
        self.meta.lock().expect("lock poisoned").digest.is_some()
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        if let Some(digest) = &self.meta.lock().expect("lock poisoned").digest {
            return Ok(Some(digest.clone()));
        }
        self.update()?;
        Ok(self.meta.lock().expect("lock poisoned").digest.clone())
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        {
            let mut meta = self.meta.lock().expect("lock poisoned");
            if meta.size.is_some() {
                return Ok(meta.size);
            }
            if let Some(hint) = self.access.size_hint() {
                meta.size = Some(hint);
                return Ok(meta.size);
            }
        }
        self.update()?;
        Ok(self.meta.lock().expect("lock poisoned").size)
    }

    fn file_location(&self) -> Option<FileLocation> {
        self.location.clone()
    }

    fn validate(&self) -> BlobResult<()> {
        self.access.validate()
    }
}

/// The externally visible façade over any [`BlobAccessBase`].
///
/// Every accessor runs through the view guard, so it fails with
/// [`BlobError::Closed`] once this façade is closed.
pub struct BlobView {
    inner: ResourceView<dyn BlobAccessBase>,
}

impl BlobView {
    /// Wrap `base` behind a fresh reference count with one lazy view.
    pub fn new(name: impl Into<String>, base: Arc<dyn BlobAccessBase>) -> Self {
        Self {
            inner: ResourceView::from_arc(name, base, false),
        }
    }

    /// Another façade on the same base, as a concrete type.
    pub fn dup_view(&self) -> BlobResult<Self> {
        Ok(Self {
            inner: self.inner.dup()?,
        })
    }

    /// Number of open views sharing this blob's base.
    pub fn ref_count(&self) -> usize {
        self.inner.ref_count()
    }
}

impl BlobAccess for BlobView {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.inner.execute(|b| b.get())
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.inner.execute(|b| b.reader())
    }

    fn mime_type(&self) -> BlobResult<String> {
        self.inner.execute(|b| Ok(b.mime_type()))
    }

    fn digest_known(&self) -> BlobResult<bool> {
        self.inner.execute(|b| Ok(b.digest_known()))
    }

    fn digest(&self) -> BlobResult<Option<Digest>> {
        self.inner.execute(|b| b.digest())
    }

    fn size(&self) -> BlobResult<Option<u64>> {
        self.inner.execute(|b| b.size())
    }

    fn file_location(&self) -> BlobResult<Option<FileLocation>> {
        self.inner.execute(|b| Ok(b.file_location()))
    }

    fn validate(&self) -> BlobResult<()> {
        self.inner.execute(|b| b.validate())
    }

    fn dup(&self) -> BlobResult<Blob> {
        Ok(Box::new(self.dup_view()?))
    }

    fn close(&self) -> BlobResult<()> {
        Ok(self.inner.close()?)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl std::fmt::Debug for BlobView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobView")
            .field("view", self.inner.view())
            .finish()
    }
}

/// Turn any base into a blob façade.
pub fn for_base(name: impl Into<String>, base: impl BlobAccessBase) -> Blob {
    Box::new(BlobView::new(name, Arc::new(base)))
}

/// Blob over a [`DataAccess`] with optionally known digest and size.
pub fn for_access(
    mime: impl Into<String>,
    access: Arc<dyn DataAccess>,
    digest: Option<Digest>,
    size: Option<u64>,
) -> Blob {
    for_base("blob", StandardBlob::new(mime, access, digest, size))
}

/// In-memory blob. Digest and size are computed right away.
pub fn for_data(mime: impl Into<String>, data: impl Into<Bytes>) -> Blob {
    let data = data.into();
    let digest = Digest::from_bytes(&data);
    let size = data.len() as u64;
    for_base(
        "data blob",
        StandardBlob::new(mime, Arc::new(BytesAccess::new(data)), Some(digest), Some(size)),
    )
}

pub fn for_string(mime: impl Into<String>, data: impl Into<String>) -> Blob {
    for_data(mime, data.into().into_bytes())
}

/// Read the complete content of `blob` and close it.
pub fn blob_data(blob: Blob) -> BlobResult<Vec<u8>> {
    let data = blob.get();
    and_close(data, blob.close())
}

/// Stream that owns the blob it reads from.
struct OwningReader {
    reader: BlobReader,
    blob: Option<Blob>,
}

impl Read for OwningReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.blob.is_none() {
            return Err(io::Error::other(BlobError::Closed));
        }
        self.reader.read(buf)
    }
}

impl ReadCloser for OwningReader {
    fn close(&mut self) -> BlobResult<()> {
        let blob = self.blob.take().ok_or(BlobError::Closed)?;
        BlobError::join([self.reader.close(), blob.close()])
    }
}

/// A stream over `blob` that closes the blob together with the stream.
/// Dropping the stream unclosed releases the blob as well.
pub fn blob_reader(blob: Blob) -> BlobResult<BlobReader> {
    match blob.reader() {
        Ok(reader) => Ok(Box::new(OwningReader {
            reader,
            blob: Some(blob),
        })),
        Err(err) => and_close(Err(err), blob.close()),
    }
}
