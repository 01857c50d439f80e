// files.rs — writable asset store
//
// Named byte-stream resources under a base directory. Reads report a missing
// resource as `None` rather than an error; writes create or replace the whole
// resource.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors raised by an [`AssetStore`].
#[derive(Debug, Error)]
pub enum FsError {
    #[error("couldn't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    pub fn path(&self) -> &Path {
        match self {
            FsError::Read { path, .. } | FsError::Write { path, .. } | FsError::Remove { path, .. } => path,
        }
    }
}

/// Storage layer the program cache reads and writes through.
pub trait AssetStore {
    /// Reads a whole resource. `Ok(None)` when it does not exist.
    fn load_file(&self, name: &Path) -> Result<Option<Vec<u8>>, FsError>;

    /// Creates or overwrites a resource with exactly `data`.
    fn write_file(&self, name: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Removes a resource. Returns whether anything was removed.
    fn remove_file(&self, name: &Path) -> Result<bool, FsError>;
}

/// An [`AssetStore`] rooted at a directory on disk.
///
/// Relative names resolve against `basedir`; absolute names are used as-is.
#[derive(Debug, Clone)]
pub struct DiskStore {
    basedir: PathBuf,
}

impl DiskStore {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    /// Full path of a named resource.
    pub fn resolve(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.basedir.join(name)
        }
    }
}

impl AssetStore for DiskStore {
    fn load_file(&self, name: &Path) -> Result<Option<Vec<u8>>, FsError> {
        let path = self.resolve(name);
        match fs::read(&path) {
            Ok(data) => {
                debug!(path = %path.display(), len = data.len(), "loaded file");
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FsError::Read { path, source }),
        }
    }

    fn write_file(&self, name: &Path, data: &[u8]) -> Result<(), FsError> {
        let path = self.resolve(name);

        // Each write stages into its own uniquely named sibling, so
        // concurrent writers never share a file before the rename.
        let write = || -> io::Result<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            fs::create_dir_all(dir)?;
            let mut staged = NamedTempFile::new_in(dir)?;
            staged.write_all(data)?;
            staged.as_file().sync_all()?;
            staged.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };

        write().map_err(|source| FsError::Write { path: path.clone(), source })?;

        debug!(path = %path.display(), len = data.len(), "wrote file");
        Ok(())
    }

    fn remove_file(&self, name: &Path) -> Result<bool, FsError> {
        let path = self.resolve(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FsError::Remove { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        assert!(store.load_file(Path::new("nope.bin")).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        store.write_file(Path::new("a.bin"), b"hello").unwrap();
        assert_eq!(store.load_file(Path::new("a.bin")).unwrap().unwrap(), b"hello");
        // nothing staged is left behind
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_open_staging_file_cannot_tear_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());

        // another writer still holds a half-written sibling of the target
        let mut other = fs::File::create(tmp.path().join("shader.bin.tmp")).unwrap();
        other.write_all(b"BBBB").unwrap();

        store.write_file(Path::new("shader.bin"), b"AAAAAAAA").unwrap();
        other.write_all(b"bbbb").unwrap();

        assert_eq!(fs::read(tmp.path().join("shader.bin")).unwrap(), b"AAAAAAAA");
    }

    #[test]
    fn test_concurrent_writers_publish_whole_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 4096]).collect();

        std::thread::scope(|s| {
            for data in &payloads {
                let store = store.clone();
                s.spawn(move || store.write_file(Path::new("shader.bin"), data).unwrap());
            }
        });

        let published = fs::read(tmp.path().join("shader.bin")).unwrap();
        assert!(payloads.contains(&published));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_overwrite_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        store.write_file(Path::new("a.bin"), b"a much longer payload").unwrap();
        store.write_file(Path::new("a.bin"), b"short").unwrap();
        let len = fs::metadata(tmp.path().join("a.bin")).unwrap().len();
        assert_eq!(len, 5);
    }

    #[test]
    fn test_write_creates_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        store.write_file(Path::new("cache/gl/a.bin"), &[1, 2, 3]).unwrap();
        assert!(tmp.path().join("cache/gl/a.bin").is_file());
    }

    #[test]
    fn test_write_failure_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("blocker"), b"file, not a dir").unwrap();
        let store = DiskStore::new(tmp.path());
        let err = store.write_file(Path::new("blocker/a.bin"), b"x").unwrap_err();
        assert!(matches!(err, FsError::Write { .. }));
        assert_eq!(err.path(), tmp.path().join("blocker/a.bin"));
    }

    #[test]
    fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path());
        store.write_file(Path::new("a.bin"), b"x").unwrap();
        assert!(store.remove_file(Path::new("a.bin")).unwrap());
        assert!(!store.remove_file(Path::new("a.bin")).unwrap());
    }

    #[test]
    fn test_absolute_names_bypass_basedir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new("/nonexistent-base");
        let abs = tmp.path().join("abs.bin");
        store.write_file(&abs, b"abs").unwrap();
        assert_eq!(fs::read(&abs).unwrap(), b"abs");
    }
}
