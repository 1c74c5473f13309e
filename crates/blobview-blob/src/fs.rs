use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Minimal filesystem used by file-backed blobs and the blob cache.
///
/// Errors are plain [`io::Error`]s so that missing files keep their
/// [`io::ErrorKind::NotFound`] kind regardless of the backend.
pub trait FileSystem: Send + Sync + std::fmt::Debug + 'static {
    /// Open a file for streaming reads.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open(path)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Create or truncate a file and return a writer for it.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Replace the content of a file.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut w = self.create(path)?;
        w.write_all(data)?;
        w.flush()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Returns `true` for files and directories.
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` only for regular files.
    fn is_file(&self, path: &Path) -> bool;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Move a file, replacing any existing target.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// The host filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(fs::File::create(path)?))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

type Files = Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>;

/// In-memory, HashMap-based filesystem.
///
/// Intended for tests and embedding. Directories are implicit: a directory
/// exists while some file lives below it. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryFileSystem {
    files: Files,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.files.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no file is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all file paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.read().expect("lock poisoned");
        let mut paths: Vec<PathBuf> = files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let data = self.read(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.read().expect("lock poisoned");
        files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        self.files
            .write()
            .expect("lock poisoned")
            .insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemoryFileWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .expect("lock poisoned")
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let files = self.files.read().expect("lock poisoned");
        files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.read().expect("lock poisoned");
        files.contains_key(path) || files.keys().any(|p| p.starts_with(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.read().expect("lock poisoned").contains_key(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.write().expect("lock poisoned");
        files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files.write().expect("lock poisoned");
        let data = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.files
            .write()
            .expect("lock poisoned")
            .retain(|p, _| !p.starts_with(path));
        Ok(())
    }
}

impl std::fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFileSystem")
            .field("file_count", &self.len())
            .finish()
    }
}

/// Appends straight into the shared map, so a file is visible while it is
/// still being written.
struct MemoryFileWriter {
    files: Files,
    path: PathBuf,
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.write().expect("lock poisoned");
        let file = files
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(fs: &dyn FileSystem, dir: &Path) {
        let file = dir.join("blob.bin");
        assert!(!fs.exists(&file));
        assert!(!fs.is_file(&file));
        fs.write(&file, b"hello").unwrap();
        assert!(fs.exists(&file));
        assert!(fs.is_file(&file));
        assert!(!fs.is_file(dir));
        assert_eq!(fs.read(&file).unwrap(), b"hello");
        assert_eq!(fs.file_size(&file).unwrap(), 5);

        let mut data = String::new();
        fs.open(&file).unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "hello");

        let moved = dir.join("moved.bin");
        fs.rename(&file, &moved).unwrap();
        assert!(!fs.exists(&file));
        assert_eq!(fs.read(&moved).unwrap(), b"hello");

        fs.remove(&moved).unwrap();
        assert_eq!(
            fs.remove(&moved).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(fs.read(&moved).unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn os_filesystem_basics() {
        let dir = tempfile::tempdir().unwrap();
        roundtrip(&OsFileSystem, dir.path());
    }

    #[test]
    fn memory_filesystem_basics() {
        roundtrip(&MemoryFileSystem::new(), Path::new("/mem"));
    }

    #[test]
    fn memory_writer_appends() {
        let fs = MemoryFileSystem::new();
        let path = Path::new("/data/out");
        let mut w = fs.create(path).unwrap();
        w.write_all(b"ab").unwrap();
        w.write_all(b"cd").unwrap();
        drop(w);
        assert_eq!(fs.read(path).unwrap(), b"abcd");
        assert!(fs.exists(Path::new("/data")));
        assert!(fs.is_file(path));
        assert!(!fs.is_file(Path::new("/data")));
    }

    #[test]
    fn memory_remove_dir_all() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/cache/a"), b"1").unwrap();
        fs.write(Path::new("/cache/b"), b"2").unwrap();
        fs.write(Path::new("/other/c"), b"3").unwrap();
        assert_eq!(fs.len(), 3);

        fs.remove_dir_all(Path::new("/cache")).unwrap();
        assert_eq!(fs.paths(), vec![PathBuf::from("/other/c")]);
    }

    #[test]
    fn clones_share_files() {
        let fs = MemoryFileSystem::new();
        let other = fs.clone();
        fs.write(Path::new("/x"), b"x").unwrap();
        assert!(other.exists(Path::new("/x")));
        assert!(!other.is_empty());
    }
}
