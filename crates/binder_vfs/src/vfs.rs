//! Capability traits implemented by every store.
//!
//! Callers depend only on these traits. Concrete stores are
//! [`RealFileSystem`](crate::RealFileSystem),
//! [`ArchiveVirtualFileSystem`](crate::ArchiveVirtualFileSystem),
//! [`OverlayVirtualFileSystem`](crate::OverlayVirtualFileSystem) and
//! [`EmptyFileSystem`](crate::EmptyFileSystem). A filesystem handle is passed
//! explicitly to whoever needs it; there is no process-wide current filesystem.
//!
//! Write operations have default implementations that fail with
//! [`Error::WriteNotSupported`], so read-only stores only implement the read side.

use crate::error::{Error, Result};
use crate::path::PathKey;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

/// Shared handle to a file in any store.
pub type FileHandle = Arc<dyn VirtualFile>;

/// Shared handle to a directory in any store.
pub type DirectoryHandle = Arc<dyn VirtualDirectory>;

/// A single file. Bytes are fetched on demand; handles own no data.
pub trait VirtualFile: Send + Sync + Debug {
    /// Display name in its original case.
    ///
    /// Archive files whose hash could not be resolved report their hash in hex.
    fn name(&self) -> Cow<'_, str>;

    /// The key this file is reachable under, or `None` if it is reachable only
    /// through raw enumeration.
    fn path(&self) -> Option<&PathKey>;

    /// Read the file's full contents.
    fn read_bytes(&self) -> Result<Vec<u8>>;

    /// Size in bytes, when known without reading the file.
    fn len_hint(&self) -> Option<u64> {
        None
    }

    fn is_read_only(&self) -> bool;

    /// Replace the file's contents with `data` in a single atomic step.
    fn write_bytes(&self, _data: &[u8]) -> Result<()> {
        Err(Error::read_only(self.name()))
    }

    fn delete(&self) -> Result<()> {
        Err(Error::read_only(self.name()))
    }
}

/// A directory and its direct children.
pub trait VirtualDirectory: Send + Sync + Debug {
    /// Display name in its original case (empty for the root).
    fn name(&self) -> &str;

    fn path(&self) -> &PathKey;

    /// Files directly inside this directory.
    fn files(&self) -> Result<Vec<FileHandle>>;

    /// Subdirectories directly inside this directory.
    fn directories(&self) -> Result<Vec<DirectoryHandle>>;

    fn is_read_only(&self) -> bool;
}

/// A complete store, addressed by [`PathKey`].
///
/// All lookups are case-insensitive. Implementations must be safe to share
/// across threads.
pub trait VirtualFileSystem: Send + Sync + Debug {
    /// Whether every write operation on this store fails.
    fn is_read_only(&self) -> bool;

    /// Look up a file. A miss is an ordinary `None`, never an error.
    fn try_get_file(&self, path: &PathKey) -> Option<FileHandle>;

    /// Look up a directory.
    fn try_get_directory(&self, path: &PathKey) -> Option<DirectoryHandle>;

    fn file_exists(&self, path: &PathKey) -> bool {
        self.try_get_file(path).is_some()
    }

    fn directory_exists(&self, path: &PathKey) -> bool {
        self.try_get_directory(path).is_some()
    }

    /// Like [`try_get_file`](Self::try_get_file) but a miss is [`Error::FileNotFound`].
    fn get_file(&self, path: &PathKey) -> Result<FileHandle> {
        self.try_get_file(path)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))
    }

    /// Files directly inside `dir`. Missing directories enumerate as empty.
    fn enumerate_files(&self, dir: &PathKey) -> Result<Vec<FileHandle>> {
        match self.try_get_directory(dir) {
            Some(directory) => directory.files(),
            None => Ok(Vec::new()),
        }
    }

    /// Subdirectories directly inside `dir`. Missing directories enumerate as empty.
    fn enumerate_directories(&self, dir: &PathKey) -> Result<Vec<DirectoryHandle>> {
        match self.try_get_directory(dir) {
            Some(directory) => directory.directories(),
            None => Ok(Vec::new()),
        }
    }

    /// Write a whole file, creating parent directories as needed.
    ///
    /// The payload is written in one call so concurrent writers to the same
    /// path never interleave; the last complete write wins.
    fn write_file(&self, path: &PathKey, _data: &[u8]) -> Result<()> {
        Err(Error::read_only(path))
    }

    /// Delete a file or directory.
    fn delete(&self, path: &PathKey) -> Result<()> {
        Err(Error::read_only(path))
    }

    /// Return the file at `path`, creating an empty one if it does not exist.
    fn get_or_create_file(&self, path: &PathKey) -> Result<FileHandle> {
        Err(Error::read_only(path))
    }

    /// Return the directory at `path`, creating it (and its parents) if needed.
    fn get_or_create_directory(&self, path: &PathKey) -> Result<DirectoryHandle> {
        Err(Error::read_only(path))
    }
}

/// Collect every file under `dir`, depth-first, directories in enumeration order.
pub fn walk_files(fs: &dyn VirtualFileSystem, dir: &PathKey) -> Result<Vec<FileHandle>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.clone()];
    while let Some(current) = stack.pop() {
        out.extend(fs.enumerate_files(&current)?);
        let mut children: Vec<PathKey> = fs
            .enumerate_directories(&current)?
            .iter()
            .map(|d| d.path().clone())
            .collect();
        children.reverse();
        stack.extend(children);
    }
    Ok(out)
}
