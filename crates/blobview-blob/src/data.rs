use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobview_digest::digest_reader;
use blobview_types::{Digest, DigestAlgorithm};
use bytes::Bytes;

use crate::error::{and_close, BlobError, BlobResult};
use crate::fs::FileSystem;
use crate::traits::{BlobReader, DataAccess};

/// Content held in memory.
#[derive(Clone, Debug)]
pub struct BytesAccess(Bytes);

impl BytesAccess {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }
}

impl DataAccess for BytesAccess {
    fn get(&self) -> BlobResult<Vec<u8>> {
        Ok(self.0.to_vec())
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        Ok(Box::new(Cursor::new(self.0.clone())))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.0.len() as u64)
    }
}

/// Content of a file, opened on demand.
#[derive(Clone, Debug)]
pub struct FileDataAccess {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileDataAccess {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }
}

impl DataAccess for FileDataAccess {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.fs
            .read(&self.path)
            .map_err(|e| BlobError::file(&self.path, e))
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        let file = self
            .fs
            .open(&self.path)
            .map_err(|e| BlobError::file(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn validate(&self) -> BlobResult<()> {
        if self.fs.is_file(&self.path) {
            Ok(())
        } else {
            Err(BlobError::NotFound(self.path.clone()))
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.fs.file_size(&self.path).ok()
    }

    fn origin(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }
}

/// Content produced by a reader factory, called once per stream.
pub struct ReaderFnAccess<F> {
    open: F,
}

/// Wrap a function returning fresh readers into a [`DataAccess`].
pub fn for_reader_fn<F, R>(open: F) -> ReaderFnAccess<F>
where
    F: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Send + 'static,
{
    ReaderFnAccess { open }
}

impl<F, R> DataAccess for ReaderFnAccess<F>
where
    F: Fn() -> io::Result<R> + Send + Sync + 'static,
    R: Read + Send + 'static,
{
    fn get(&self) -> BlobResult<Vec<u8>> {
        let mut data = Vec::new();
        (self.open)()?.read_to_end(&mut data)?;
        Ok(data)
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        let reader: Box<dyn Read + Send> = Box::new((self.open)()?);
        Ok(Box::new(reader))
    }
}

impl<F> std::fmt::Debug for ReaderFnAccess<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderFnAccess").finish_non_exhaustive()
    }
}

/// Stream the content of `access` once, returning its digest and length.
pub fn digest_of(access: &dyn DataAccess, algorithm: DigestAlgorithm) -> BlobResult<(Digest, u64)> {
    let mut reader = access.reader()?;
    let result = digest_reader(algorithm, &mut reader).map_err(BlobError::from);
    and_close(result, reader.close())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn bytes_access() {
        let access = BytesAccess::new(&b"test"[..]);
        assert_eq!(access.get().unwrap(), b"test");
        assert_eq!(access.size_hint(), Some(4));

        let mut out = String::new();
        access.reader().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "test");
    }

    #[test]
    fn file_access_reads_on_demand() {
        let fs = MemoryFileSystem::new();
        let access = FileDataAccess::new(Arc::new(fs.clone()), "/a/blob");
        assert!(matches!(access.validate(), Err(BlobError::NotFound(_))));
        assert!(matches!(access.get(), Err(BlobError::NotFound(_))));
        assert_eq!(access.size_hint(), None);

        fs.write(Path::new("/a/blob"), b"content").unwrap();
        access.validate().unwrap();
        assert_eq!(access.get().unwrap(), b"content");
        assert_eq!(access.size_hint(), Some(7));
        assert_eq!(access.origin().as_deref(), Some("/a/blob"));

        let dir = FileDataAccess::new(Arc::new(fs), "/a");
        assert!(matches!(dir.validate(), Err(BlobError::NotFound(_))));
        assert!(matches!(dir.get(), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn reader_fn_access_opens_fresh_streams() {
        let access = for_reader_fn(|| Ok(Cursor::new(b"stream".to_vec())));
        assert_eq!(access.get().unwrap(), b"stream");
        assert_eq!(access.get().unwrap(), b"stream");
        assert_eq!(access.size_hint(), None);
    }

    #[test]
    fn reader_fn_failure_propagates() {
        let access = for_reader_fn(|| -> io::Result<Cursor<Vec<u8>>> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "offline"))
        });
        assert!(matches!(access.get(), Err(BlobError::Io(_))));
        assert!(access.reader().is_err());
    }

    #[test]
    fn digest_of_streams_content() {
        let access = BytesAccess::new(&b"test"[..]);
        let (digest, size) = digest_of(&access, DigestAlgorithm::Sha256).unwrap();
        assert_eq!(
            digest.to_string(),
            "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
        assert_eq!(size, 4);

        let (blake, _) = digest_of(&access, DigestAlgorithm::Blake3).unwrap();
        assert_eq!(blake.algorithm(), DigestAlgorithm::Blake3);
    }
}
