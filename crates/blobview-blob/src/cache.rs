use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use blobview_digest::DigestReader;
use blobview_refmgmt::{Closer, ResourceView};
use blobview_types::mime::MIME_OCTET;
use blobview_types::{Digest, DigestAlgorithm};
use tempfile::TempDir;
use tracing::debug;

use crate::config::BlobConfig;
use crate::error::{and_close, BlobError, BlobResult};
use crate::file::{for_file_with_closer, FileOptions};
use crate::fs::{FileSystem, MemoryFileSystem, OsFileSystem};
use crate::standard::for_access;
use crate::traits::{Blob, BlobAccess, DataAccess};

/// Something blobs can be looked up in by digest.
pub trait BlobSource: Send + Sync {
    /// A blob view on the stored content. Fails with
    /// [`BlobError::BlobNotFound`] for unknown digests.
    fn get_blob(&self, digest: &Digest) -> BlobResult<Blob>;

    fn contains(&self, digest: &Digest) -> BlobResult<bool>;
}

/// Something blobs can be stored into.
pub trait BlobSink: Send + Sync {
    /// Store the content of `blob`, returning its digest and size.
    fn add_blob(&self, blob: &dyn BlobAccess) -> BlobResult<(Digest, u64)>;
}

/// What happens to the cache directory when the cache is released.
#[derive(Debug)]
enum Storage {
    /// Directory outlives the cache.
    Keep,
    /// Directory is removed through the cache filesystem.
    Remove,
    /// Directory is a host temp dir owned by the cache.
    Temp(TempDir),
}

struct CacheBase {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    algorithm: DigestAlgorithm,
    // exclusive while a file is moved into place
    files: RwLock<()>,
    storage: Mutex<Option<Storage>>,
}

impl CacheBase {
    fn path_for(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.file_name())
    }

    fn add_blob(&self, blob: &dyn BlobAccess) -> BlobResult<(Digest, u64)> {
        let known = if blob.digest_known()? { blob.digest()? } else { None };
        if let Some(digest) = known.filter(|d| d.algorithm() == self.algorithm) {
            let path = self.path_for(&digest);
            let _files = self.files.read().expect("lock poisoned");
            if self.fs.is_file(&path) {
                let size = match blob.size()? {
                    Some(size) => size,
                    None => self.fs.file_size(&path).map_err(|e| BlobError::file(&path, e))?,
                };
                debug!(digest = %digest, "blob already cached");
                return Ok((digest, size));
            }
        }

        let tmp = self.root.join(format!("TMP{}", uuid::Uuid::now_v7().simple()));
        let stored = self.store(blob, &tmp);
        let (digest, size) = match stored {
            Ok(stored) => stored,
            Err(err) => {
                if let Err(e) = self.fs.remove(&tmp) {
                    if e.kind() != io::ErrorKind::NotFound {
                        debug!(path = %tmp.display(), error = %e, "leftover cache file");
                    }
                }
                return Err(err);
            }
        };

        let target = self.path_for(&digest);
        let _files = self.files.write().expect("lock poisoned");
        let placed = if self.fs.is_file(&target) {
            self.fs.remove(&tmp)
        } else {
            self.fs.rename(&tmp, &target)
        };
        placed.map_err(|e| BlobError::file(&target, e))?;
        debug!(digest = %digest, size, "cached blob");
        Ok((digest, size))
    }

    /// Stream `blob` into `path`, digesting on the way.
    fn store(&self, blob: &dyn BlobAccess, path: &Path) -> BlobResult<(Digest, u64)> {
        let mut reader = blob.reader()?;
        let copied = self.fs.create(path).and_then(|mut writer| {
            let mut digesting = DigestReader::new(self.algorithm, &mut reader);
            io::copy(&mut digesting, &mut writer)?;
            writer.flush()?;
            Ok(digesting.finish())
        });
        let copied = copied.map_err(|e| BlobError::file(path, e));
        and_close(copied, reader.close())
    }

    fn lookup(&self, digest: &Digest) -> BlobResult<(PathBuf, u64)> {
        let path = self.path_for(digest);
        let _files = self.files.read().expect("lock poisoned");
        match self.fs.file_size(&path) {
            Ok(size) => Ok((path, size)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::BlobNotFound(digest.clone())),
            Err(e) => Err(BlobError::file(&path, e)),
        }
    }
}

impl Closer for CacheBase {
    type Error = BlobError;

    fn close(&self) -> BlobResult<()> {
        let storage = self.storage.lock().expect("lock poisoned").take();
        let result = match storage {
            Some(Storage::Remove) => self.fs.remove_dir_all(&self.root),
            Some(Storage::Temp(dir)) => dir.close(),
            Some(Storage::Keep) | None => Ok(()),
        };
        debug!(root = %self.root.display(), "blob cache released");
        result.map_err(|e| BlobError::file(&self.root, e))
    }
}

/// Filesystem-backed blob store keyed by digest.
///
/// The cache itself is a reference-counted resource: [`dup`](Self::dup)
/// hands out further views, and every blob obtained from it keeps the cache
/// alive until that blob is released. Temporary and in-memory caches drop
/// their content once the last reference is gone.
#[derive(Debug)]
pub struct BlobCache {
    inner: ResourceView<CacheBase>,
}

impl BlobCache {
    /// Cache in `root` on `fs`. The directory is created if needed and kept
    /// after the cache is released.
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> BlobResult<Self> {
        Self::open(fs, root, &BlobConfig::default())
    }

    pub fn open(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, config: &BlobConfig) -> BlobResult<Self> {
        let root = root.into();
        fs.create_dir_all(&root).map_err(|e| BlobError::file(&root, e))?;
        Ok(Self::build(fs, root, config.cache_digest, Storage::Keep))
    }

    /// Cache in a fresh host temp directory, removed on release.
    pub fn temporary() -> BlobResult<Self> {
        Self::with_config(&BlobConfig::default())
    }

    pub fn with_config(config: &BlobConfig) -> BlobResult<Self> {
        let parent = config.temp_dir();
        std::fs::create_dir_all(&parent).map_err(|e| BlobError::file(&parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix("blobcache")
            .tempdir_in(&parent)
            .map_err(|e| BlobError::file(&parent, e))?;
        let root = dir.path().to_path_buf();
        Ok(Self::build(Arc::new(OsFileSystem), root, config.cache_digest, Storage::Temp(dir)))
    }

    /// Cache held entirely in memory.
    pub fn in_memory() -> Self {
        Self::build(
            Arc::new(MemoryFileSystem::new()),
            PathBuf::from("/blobcache"),
            DigestAlgorithm::CANONICAL,
            Storage::Remove,
        )
    }

    fn build(fs: Arc<dyn FileSystem>, root: PathBuf, algorithm: DigestAlgorithm, storage: Storage) -> Self {
        let name = format!("blob cache {}", root.display());
        let base = CacheBase {
            fs,
            root,
            algorithm,
            files: RwLock::new(()),
            storage: Mutex::new(Some(storage)),
        };
        Self {
            inner: ResourceView::new(name, base),
        }
    }

    /// Store the content of a raw data access.
    pub fn add_data(&self, data: Arc<dyn DataAccess>) -> BlobResult<(Digest, u64)> {
        let blob = for_access(MIME_OCTET, data, None, None);
        let added = self.add_blob(blob.as_ref());
        and_close(added, blob.close())
    }

    pub fn root(&self) -> BlobResult<PathBuf> {
        self.inner.execute(|c| Ok(c.root.clone()))
    }

    pub fn dup(&self) -> BlobResult<Self> {
        Ok(Self {
            inner: self.inner.dup()?,
        })
    }

    pub fn close(&self) -> BlobResult<()> {
        Ok(self.inner.close()?)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn ref_count(&self) -> usize {
        self.inner.ref_count()
    }
}

impl BlobSource for BlobCache {
    fn get_blob(&self, digest: &Digest) -> BlobResult<Blob> {
        let holder = self.dup()?;
        self.inner.execute(|c| {
            let (path, size) = c.lookup(digest)?;
            let opts = FileOptions {
                fs: Some(Arc::clone(&c.fs)),
                digest: Some(digest.clone()),
                size: Some(size),
            };
            Ok(for_file_with_closer(MIME_OCTET, path, opts, move || holder.close()))
        })
    }

    fn contains(&self, digest: &Digest) -> BlobResult<bool> {
        self.inner.execute(|c| Ok(c.fs.is_file(&c.path_for(digest))))
    }
}

impl BlobSink for BlobCache {
    fn add_blob(&self, blob: &dyn BlobAccess) -> BlobResult<(Digest, u64)> {
        self.inner.execute(|c| c.add_blob(blob))
    }
}
