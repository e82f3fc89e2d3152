use crate::path::PathKey;
use crate::vfs::{DirectoryHandle, FileHandle, VirtualDirectory, VirtualFileSystem};
use crate::Result;
use std::sync::Arc;

/// A filesystem with nothing in it.
///
/// Only the root directory exists, and every write fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFileSystem;

impl EmptyFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl VirtualFileSystem for EmptyFileSystem {
    fn is_read_only(&self) -> bool {
        true
    }

    fn try_get_file(&self, _path: &PathKey) -> Option<FileHandle> {
        None
    }

    fn try_get_directory(&self, path: &PathKey) -> Option<DirectoryHandle> {
        path.is_root()
            .then(|| Arc::new(EmptyDirectory(PathKey::root())) as DirectoryHandle)
    }
}

#[derive(Debug)]
struct EmptyDirectory(PathKey);

impl VirtualDirectory for EmptyDirectory {
    fn name(&self) -> &str {
        ""
    }

    fn path(&self) -> &PathKey {
        &self.0
    }

    fn files(&self) -> Result<Vec<FileHandle>> {
        Ok(Vec::new())
    }

    fn directories(&self) -> Result<Vec<DirectoryHandle>> {
        Ok(Vec::new())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_empty() {
        let fs = EmptyFileSystem::new();
        assert!(fs.is_read_only());
        assert!(fs.directory_exists(&PathKey::root()));
        assert!(!fs.directory_exists(&PathKey::parse("/chr")));
        assert!(!fs.file_exists(&PathKey::parse("/chr/c1234.bnd")));
        assert!(fs.enumerate_files(&PathKey::root()).unwrap().is_empty());
        assert!(fs.enumerate_directories(&PathKey::root()).unwrap().is_empty());
    }

    #[test]
    fn test_writes_fail() {
        let fs = EmptyFileSystem::new();
        let key = PathKey::parse("/a/b.dat");
        assert!(matches!(fs.write_file(&key, b"x"), Err(Error::WriteNotSupported(_))));
        assert!(matches!(fs.delete(&key), Err(Error::WriteNotSupported(_))));
        assert!(matches!(fs.get_or_create_file(&key), Err(Error::WriteNotSupported(_))));
        assert!(matches!(
            fs.get_or_create_directory(&PathKey::parse("/a")),
            Err(Error::WriteNotSupported(_))
        ));
    }
}
