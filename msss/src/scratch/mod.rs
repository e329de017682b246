//! Scratch space on the processing node.
//!
//! All intermediate artifacts live under a single scratch root. Every path
//! handed out here has a globally unique name, so pool workers can allocate
//! concurrently without coordination.
//!
//! Resources clean up on drop. A resource that becomes a pipeline output is
//! converted with `keep()`, which disarms the cleanup and returns the path.

use msss_shared::errors::{MsssError, MsssResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, TempDir, TempPath};

const NAME_PREFIX: &str = "msss-";

/// What kind of scratch path to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchKind {
    File,
    Directory,
}

/// Process-wide scratch root, constructed once at startup and passed to
/// every component that writes intermediates.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScratchContext {
    root: Arc<PathBuf>,
}

impl ScratchContext {
    /// Use `root` as the scratch root. It must already exist.
    pub fn new(root: impl Into<PathBuf>) -> MsssResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MsssError::Path(format!(
                "scratch root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn acquire(&self, kind: ScratchKind) -> MsssResult<ScratchResource> {
        Ok(match kind {
            ScratchKind::File => ScratchResource::File(self.file()?),
            ScratchKind::Directory => ScratchResource::Directory(self.dir()?),
        })
    }

    /// Allocate an empty, closed scratch file.
    pub fn file(&self) -> MsssResult<ScratchFile> {
        let file = Builder::new()
            .prefix(NAME_PREFIX)
            .tempfile_in(self.root.as_path())
            .map_err(|e| self.storage_error("file", e))?;
        Ok(ScratchFile {
            inner: Some(file.into_temp_path()),
        })
    }

    /// Allocate an empty scratch directory.
    pub fn dir(&self) -> MsssResult<ScratchDir> {
        let dir = Builder::new()
            .prefix(NAME_PREFIX)
            .tempdir_in(self.root.as_path())
            .map_err(|e| self.storage_error("directory", e))?;
        Ok(ScratchDir { inner: Some(dir) })
    }

    /// Allocate a private directory and name a product inside it.
    ///
    /// External tools generally refuse to write into a path that already
    /// exists, so the product itself is left for the tool to create.
    pub fn product(&self, name: &str) -> MsssResult<ScratchProduct> {
        let dir = self.dir()?;
        let path = dir.path().join(name);
        Ok(ScratchProduct { dir, path })
    }

    fn storage_error(&self, what: &str, e: std::io::Error) -> MsssError {
        MsssError::Storage(format!(
            "failed to create scratch {} under {}: {}",
            what,
            self.root.display(),
            e
        ))
    }
}

/// A scratch path of either kind.
#[derive(Debug)]
pub enum ScratchResource {
    File(ScratchFile),
    Directory(ScratchDir),
}

impl ScratchResource {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(file) => file.path(),
            Self::Directory(dir) => dir.path(),
        }
    }

    /// Retain the resource as a pipeline output.
    pub fn keep(self) -> MsssResult<PathBuf> {
        match self {
            Self::File(file) => file.keep(),
            Self::Directory(dir) => dir.keep(),
        }
    }
}

/// Scratch file, deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    inner: Option<TempPath>,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        match &self.inner {
            Some(path) => &**path,
            None => unreachable!("ScratchFile used after keep"),
        }
    }

    pub fn keep(mut self) -> MsssResult<PathBuf> {
        let temp = self
            .inner
            .take()
            .ok_or_else(|| MsssError::Internal("scratch file already released".into()))?;
        temp.keep()
            .map_err(|e| MsssError::Storage(format!("failed to retain scratch file: {}", e)))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(temp) = self.inner.take() {
            let path = temp.to_path_buf();
            if let Err(e) = temp.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// Scratch directory, removed recursively on drop.
#[derive(Debug)]
pub struct ScratchDir {
    inner: Option<TempDir>,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        match &self.inner {
            Some(dir) => dir.path(),
            None => unreachable!("ScratchDir used after keep"),
        }
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path().join(name)
    }

    #[allow(deprecated)]
    pub fn keep(mut self) -> MsssResult<PathBuf> {
        self.inner
            .take()
            .map(TempDir::into_path)
            .ok_or_else(|| MsssError::Internal("scratch directory already released".into()))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.inner.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

/// A named product inside a private scratch directory.
///
/// Dropping the product removes the directory and whatever the producing
/// tool wrote there.
#[derive(Debug)]
pub struct ScratchProduct {
    dir: ScratchDir,
    path: PathBuf,
}

impl ScratchProduct {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_rejects_missing_root() {
        let result = ScratchContext::new("/nonexistent/msss/scratch");
        assert!(matches!(result, Err(MsssError::Path(_))));
    }

    #[test]
    fn test_file_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let file = scratch.file().unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(root.path()));

        drop(file);
        assert!(!path.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_dir_removed_recursively() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let dir = scratch.dir().unwrap();
        std::fs::create_dir_all(dir.join("nested/table")).unwrap();
        std::fs::write(dir.join("nested/table/data"), b"x").unwrap();
        drop(dir);

        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_names_are_unique() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let a = scratch.file().unwrap();
        let b = scratch.file().unwrap();
        let c = scratch.dir().unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.path(), c.path());
    }

    #[test]
    fn test_keep_retains_path() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let kept_file = scratch.acquire(ScratchKind::File).unwrap().keep().unwrap();
        let kept_dir = scratch
            .acquire(ScratchKind::Directory)
            .unwrap()
            .keep()
            .unwrap();

        assert!(kept_file.is_file());
        assert!(kept_dir.is_dir());
        assert_eq!(entries(root.path()), 2);
    }

    #[test]
    fn test_product_lives_in_private_dir() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let product = scratch.product("combined.MS").unwrap();
        assert!(!product.path().exists());
        assert_eq!(product.path().parent(), Some(product.dir()));

        std::fs::create_dir(product.path()).unwrap();
        drop(product);
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_released_on_error_path() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchContext::new(root.path()).unwrap();

        let failing = || -> MsssResult<()> {
            let _file = scratch.file()?;
            Err(MsssError::Internal("boom".into()))
        };
        assert!(failing().is_err());
        assert_eq!(entries(root.path()), 0);
    }
}
