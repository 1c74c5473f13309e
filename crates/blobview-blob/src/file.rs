use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use blobview_types::Digest;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::BlobConfig;
use crate::data::FileDataAccess;
use crate::error::{BlobError, BlobResult};
use crate::fs::{FileSystem, OsFileSystem};
use crate::standard::{for_base, StandardBlob};
use crate::traits::{Blob, BlobReader, DataAccess, FileLocation};

/// Optional settings for file-backed blobs.
#[derive(Clone, Debug, Default)]
pub struct FileOptions {
    /// Filesystem holding the file; the host filesystem when unset.
    pub fs: Option<Arc<dyn FileSystem>>,
    /// Digest already known for the file content.
    pub digest: Option<Digest>,
    /// Size already known for the file content.
    pub size: Option<u64>,
}

impl FileOptions {
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    fn filesystem(&self) -> Arc<dyn FileSystem> {
        self.fs.clone().unwrap_or_else(|| Arc::new(OsFileSystem))
    }
}

fn file_blob(mime: String, access: Arc<dyn DataAccess>, location: FileLocation, opts: FileOptions) -> Blob {
    let name = format!("file blob {}", location.path.display());
    let base = StandardBlob::new(mime, access, opts.digest, opts.size).with_location(location);
    for_base(name, base)
}

/// Blob over a file on the host filesystem. The file is never deleted.
pub fn for_file(mime: impl Into<String>, path: impl Into<PathBuf>) -> Blob {
    for_file_with_options(mime, path, FileOptions::default())
}

pub fn for_file_with_options(mime: impl Into<String>, path: impl Into<PathBuf>, opts: FileOptions) -> Blob {
    let fs = opts.filesystem();
    let path = path.into();
    let access = Arc::new(FileDataAccess::new(Arc::clone(&fs), path.clone()));
    file_blob(mime.into(), access, FileLocation { fs, path }, opts)
}

type OnClose = Box<dyn FnOnce() -> BlobResult<()> + Send>;

/// File access that runs an extra action once, when the blob is released.
struct ClosingFileAccess {
    file: FileDataAccess,
    on_close: Mutex<Option<OnClose>>,
}

impl DataAccess for ClosingFileAccess {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.file.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.file.reader()
    }

    fn close(&self) -> BlobResult<()> {
        let on_close = self.on_close.lock().expect("lock poisoned").take();
        match on_close {
            Some(f) => f(),
            None => Err(BlobError::Closed),
        }
    }

    fn validate(&self) -> BlobResult<()> {
        self.file.validate()
    }

    fn size_hint(&self) -> Option<u64> {
        self.file.size_hint()
    }

    fn origin(&self) -> Option<String> {
        self.file.origin()
    }
}

/// Blob over a file, running `on_close` exactly once when the last view on
/// the blob is gone. Used to tie the lifetime of some owner of the file to
/// the blob.
pub fn for_file_with_closer<F>(
    mime: impl Into<String>,
    path: impl Into<PathBuf>,
    opts: FileOptions,
    on_close: F,
) -> Blob
where
    F: FnOnce() -> BlobResult<()> + Send + 'static,
{
    let fs = opts.filesystem();
    let path = path.into();
    let access = Arc::new(ClosingFileAccess {
        file: FileDataAccess::new(Arc::clone(&fs), path.clone()),
        on_close: Mutex::new(Some(Box::new(on_close))),
    });
    file_blob(mime.into(), access, FileLocation { fs, path }, opts)
}

#[derive(Debug)]
struct TempState {
    removed: bool,
    // kept open until release when the blob was built from an open file
    file: Option<File>,
}

/// A file owned by its blob, deleted when the blob is released.
struct TemporaryFileAccess {
    file: FileDataAccess,
    state: Mutex<TempState>,
}

impl TemporaryFileAccess {
    fn new(fs: Arc<dyn FileSystem>, path: PathBuf, open: Option<File>) -> Self {
        Self {
            file: FileDataAccess::new(fs, path),
            state: Mutex::new(TempState {
                removed: false,
                file: open,
            }),
        }
    }

    fn check(&self) -> BlobResult<()> {
        if self.state.lock().expect("lock poisoned").removed {
            return Err(BlobError::Closed);
        }
        Ok(())
    }
}

impl DataAccess for TemporaryFileAccess {
    fn get(&self) -> BlobResult<Vec<u8>> {
        self.check()?;
        self.file.get()
    }

    fn reader(&self) -> BlobResult<BlobReader> {
        self.check()?;
        self.file.reader()
    }

    /// Close the held file, if any, and delete the path. A file that is
    /// already gone is reported as [`BlobError::NotFound`].
    fn close(&self) -> BlobResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.removed {
            return Err(BlobError::Closed);
        }
        state.removed = true;
        let path = self.file.path();
        let synced = match state.file.take() {
            Some(file) => file.sync_all().map_err(|e| BlobError::file(path, e)),
            None => Ok(()),
        };
        let removed = self.file.fs().remove(path).map_err(|e| BlobError::file(path, e));
        if removed.is_ok() {
            debug!(path = %path.display(), "removed temporary blob file");
        }
        BlobError::join([synced, removed])
    }

    fn validate(&self) -> BlobResult<()> {
        self.check()?;
        self.file.validate()
    }

    fn size_hint(&self) -> Option<u64> {
        self.file.size_hint()
    }

    fn origin(&self) -> Option<String> {
        self.file.origin()
    }
}

/// Blob taking ownership of a file on the host filesystem. The file is
/// deleted once, when the last view on the blob is closed or dropped.
pub fn for_temporary_file_path(mime: impl Into<String>, path: impl Into<PathBuf>) -> Blob {
    for_temporary_file_with_options(mime, path, FileOptions::default())
}

pub fn for_temporary_file_with_options(
    mime: impl Into<String>,
    path: impl Into<PathBuf>,
    opts: FileOptions,
) -> Blob {
    temporary_file_blob(mime.into(), path.into(), None, opts)
}

/// Blob taking ownership of an already open file at `path`.
///
/// The handle stays open for the lifetime of the blob. At release it is
/// synced and closed, then the file is deleted.
pub fn for_temporary_file(
    mime: impl Into<String>,
    file: File,
    path: impl Into<PathBuf>,
    opts: FileOptions,
) -> Blob {
    temporary_file_blob(mime.into(), path.into(), Some(file), opts)
}

fn temporary_file_blob(mime: String, path: PathBuf, open: Option<File>, opts: FileOptions) -> Blob {
    let fs = opts.filesystem();
    let access = Arc::new(TemporaryFileAccess::new(Arc::clone(&fs), path.clone(), open));
    file_blob(mime, access, FileLocation { fs, path }, opts)
}

/// A writable temporary file on the host filesystem.
///
/// The file is deleted when the `TempFile` is dropped or closed, unless it
/// has been handed over with [`release`](Self::release) or
/// [`as_blob`](Self::as_blob).
#[derive(Debug)]
pub struct TempFile {
    file: NamedTempFile,
}

impl TempFile {
    /// Create a temporary file in the system temp directory.
    pub fn new() -> BlobResult<Self> {
        Self::with_config(&BlobConfig::default())
    }

    /// Create a temporary file in the configured temp directory.
    pub fn with_config(config: &BlobConfig) -> BlobResult<Self> {
        Self::in_dir(config.temp_dir())
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> BlobResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| BlobError::file(dir, e))?;
        let file = NamedTempFile::new_in(dir).map_err(|e| BlobError::file(dir, e))?;
        debug!(path = %file.path().display(), "created temporary file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The open file, for writing or seeking.
    pub fn writer(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Keep the file beyond the lifetime of this value. The caller becomes
    /// responsible for deleting it.
    pub fn release(self) -> BlobResult<(File, PathBuf)> {
        self.file.keep().map_err(|e| BlobError::Io(e.error))
    }

    /// Hand the file over to a blob, which closes and deletes it once
    /// released.
    pub fn as_blob(mut self, mime: impl Into<String>) -> BlobResult<Blob> {
        self.file.as_file_mut().flush()?;
        let (file, path) = self.release()?;
        Ok(for_temporary_file(mime, file, path, FileOptions::default()))
    }

    /// Delete the file now, reporting any failure.
    pub fn close(self) -> BlobResult<()> {
        let path = self.file.path().to_path_buf();
        self.file.close().map_err(|e| BlobError::file(path, e))
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
