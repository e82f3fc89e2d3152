//! Layered composition of filesystems.
//!
//! An [`OverlayVirtualFileSystem`] routes each request across an ordered list
//! of layers. Layer 0 has the highest precedence: lookups return the first
//! hit, directory listings merge all layers with earlier layers shadowing
//! same-named entries, and writes go to layer 0 only.
//!
//! A typical stack puts a writable project directory over the game archives:
//!
//! ```no_run
//! use binder_vfs::{
//!     EmptyFileSystem, OverlayVirtualFileSystem, PathKey, RealFileSystem, VirtualFileSystem,
//! };
//! use std::sync::Arc;
//!
//! let layers: Vec<Arc<dyn VirtualFileSystem>> = vec![
//!     Arc::new(RealFileSystem::new("project")),
//!     Arc::new(EmptyFileSystem::new()),
//! ];
//! let fs = OverlayVirtualFileSystem::new(layers);
//! fs.write_file(&PathKey::parse("/chr/c1234.bnd"), b"edited")?;
//! # Ok::<(), binder_vfs::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::path::PathKey;
use crate::vfs::{DirectoryHandle, FileHandle, VirtualDirectory, VirtualFileSystem};
use std::collections::HashSet;
use std::sync::Arc;

/// Shared, ordered layer list.
pub type Layers = Arc<[Arc<dyn VirtualFileSystem>]>;

/// Ordered stack of filesystems; index 0 shadows everything below it.
#[derive(Debug, Clone)]
pub struct OverlayVirtualFileSystem {
    layers: Layers,
}

impl OverlayVirtualFileSystem {
    /// Stack `layers`, highest precedence first.
    pub fn new(layers: Vec<Arc<dyn VirtualFileSystem>>) -> Self {
        Self {
            layers: layers.into(),
        }
    }

    /// The layers in precedence order.
    pub fn layers(&self) -> &[Arc<dyn VirtualFileSystem>] {
        &self.layers
    }

    /// The layer receiving writes, if it accepts them.
    fn write_layer(&self, path: &PathKey) -> Result<&Arc<dyn VirtualFileSystem>> {
        match self.layers.first() {
            Some(layer) if !layer.is_read_only() => Ok(layer),
            _ => Err(Error::read_only(path)),
        }
    }

    /// Index of the layer `path` would be read from.
    pub fn layer_of(&self, path: &PathKey) -> Option<usize> {
        self.layers.iter().position(|layer| layer.file_exists(path))
    }
}

impl VirtualFileSystem for OverlayVirtualFileSystem {
    fn is_read_only(&self) -> bool {
        self.layers.iter().all(|layer| layer.is_read_only())
    }

    fn try_get_file(&self, path: &PathKey) -> Option<FileHandle> {
        self.layers.iter().find_map(|layer| layer.try_get_file(path))
    }

    fn try_get_directory(&self, path: &PathKey) -> Option<DirectoryHandle> {
        let first = self
            .layers
            .iter()
            .find_map(|layer| layer.try_get_directory(path))?;
        Some(Arc::new(OverlayDirectory {
            name: first.name().to_string(),
            path: first.path().clone(),
            layers: self.layers.clone(),
        }) as DirectoryHandle)
    }

    fn file_exists(&self, path: &PathKey) -> bool {
        self.layers.iter().any(|layer| layer.file_exists(path))
    }

    fn directory_exists(&self, path: &PathKey) -> bool {
        self.layers.iter().any(|layer| layer.directory_exists(path))
    }

    fn write_file(&self, path: &PathKey, data: &[u8]) -> Result<()> {
        self.write_layer(path)?.write_file(path, data)
    }

    fn delete(&self, path: &PathKey) -> Result<()> {
        let layer = self.write_layer(path)?;
        if !layer.file_exists(path) && !layer.directory_exists(path) {
            return Err(Error::FileNotFound(path.to_string()));
        }
        layer.delete(path)
    }

    fn get_or_create_file(&self, path: &PathKey) -> Result<FileHandle> {
        self.write_layer(path)?.get_or_create_file(path)
    }

    fn get_or_create_directory(&self, path: &PathKey) -> Result<DirectoryHandle> {
        self.write_layer(path)?.get_or_create_directory(path)
    }
}

/// A directory merged across every layer that has it.
///
/// Listings are computed on each call, so they reflect writes made to the
/// top layer after the handle was obtained.
#[derive(Debug)]
pub struct OverlayDirectory {
    name: String,
    path: PathKey,
    layers: Layers,
}

impl VirtualDirectory for OverlayDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &PathKey {
        &self.path
    }

    fn files(&self) -> Result<Vec<FileHandle>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for layer in self.layers.iter() {
            for file in layer.enumerate_files(&self.path)? {
                if seen.insert(file.name().to_lowercase()) {
                    files.push(file);
                }
            }
        }
        files.sort_by_cached_key(|file| file.name().to_lowercase());
        Ok(files)
    }

    fn directories(&self) -> Result<Vec<DirectoryHandle>> {
        let mut seen = HashSet::new();
        let mut directories: Vec<DirectoryHandle> = Vec::new();
        for layer in self.layers.iter() {
            for dir in layer.enumerate_directories(&self.path)? {
                if seen.insert(dir.name().to_lowercase()) {
                    directories.push(Arc::new(OverlayDirectory {
                        name: dir.name().to_string(),
                        path: dir.path().clone(),
                        layers: self.layers.clone(),
                    }));
                }
            }
        }
        directories.sort_by_cached_key(|dir| dir.name().to_lowercase());
        Ok(directories)
    }

    fn is_read_only(&self) -> bool {
        self.layers.iter().all(|layer| layer.is_read_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmptyFileSystem, RealFileSystem};
    use camino::Utf8Path;
    use std::fs;
    use tempfile::TempDir;

    fn real(files: &[(&str, &str)], read_only: bool) -> (TempDir, Arc<dyn VirtualFileSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        for (path, content) in files {
            let target = root.join(path.trim_start_matches('/'));
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        let layer: Arc<dyn VirtualFileSystem> = if read_only {
            Arc::new(RealFileSystem::read_only(root))
        } else {
            Arc::new(RealFileSystem::new(root))
        };
        (dir, layer)
    }

    #[test]
    fn test_first_layer_wins() {
        let (_top_dir, top) = real(&[("chr/c1234.bnd", "project")], false);
        let (_base_dir, base) = real(&[("chr/c1234.bnd", "base"), ("chr/c5678.bnd", "other")], true);
        let fs = OverlayVirtualFileSystem::new(vec![top, base]);

        let key = PathKey::parse("/CHR/C1234.BND");
        assert_eq!(fs.get_file(&key).unwrap().read_bytes().unwrap(), b"project");
        assert_eq!(fs.layer_of(&key), Some(0));
        assert_eq!(fs.layer_of(&PathKey::parse("/chr/c5678.bnd")), Some(1));
        assert!(!fs.is_read_only());
    }

    #[test]
    fn test_enumeration_is_union() {
        let (_top_dir, top) = real(&[("chr/C1234.bnd", "project"), ("parts/a.partsbnd", "p")], false);
        let (_base_dir, base) = real(&[("chr/c1234.bnd", "base"), ("chr/c5678.bnd", "other")], true);
        let fs = OverlayVirtualFileSystem::new(vec![top, base]);

        let files = fs.enumerate_files(&PathKey::parse("/chr")).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["C1234.bnd", "c5678.bnd"]);
        assert_eq!(files[0].read_bytes().unwrap(), b"project");

        let dirs = fs.enumerate_directories(&PathKey::root()).unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["chr", "parts"]);
        // Nested directories keep merging.
        assert_eq!(dirs[0].files().unwrap().len(), 2);
    }

    #[test]
    fn test_writes_go_to_first_layer() {
        let (top_dir, top) = real(&[], false);
        let (base_dir, base) = real(&[("chr/c1234.bnd", "base")], true);
        let fs = OverlayVirtualFileSystem::new(vec![top, base]);

        let key = PathKey::parse("/chr/c1234.bnd");
        fs.write_file(&key, b"edited").unwrap();
        assert_eq!(fs.get_file(&key).unwrap().read_bytes().unwrap(), b"edited");
        assert!(top_dir.path().join("chr").join("c1234.bnd").is_file());
        assert_eq!(
            fs::read(base_dir.path().join("chr").join("c1234.bnd")).unwrap(),
            b"base"
        );

        fs.delete(&key).unwrap();
        assert_eq!(fs.get_file(&key).unwrap().read_bytes().unwrap(), b"base");
        assert!(matches!(fs.delete(&key), Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_read_only_top_layer() {
        let (_base_dir, base) = real(&[("chr/c1234.bnd", "base")], true);
        let empty: Arc<dyn VirtualFileSystem> = Arc::new(EmptyFileSystem::new());
        let fs = OverlayVirtualFileSystem::new(vec![empty, base]);

        assert!(fs.is_read_only());
        assert!(fs.file_exists(&PathKey::parse("/chr/c1234.bnd")));
        assert!(matches!(
            fs.write_file(&PathKey::parse("/chr/c1234.bnd"), b"x"),
            Err(Error::WriteNotSupported(_))
        ));
        assert!(matches!(
            fs.get_or_create_directory(&PathKey::parse("/new")),
            Err(Error::WriteNotSupported(_))
        ));
    }

    #[test]
    fn test_empty_overlay() {
        let fs = OverlayVirtualFileSystem::new(Vec::new());
        assert!(fs.is_read_only());
        assert!(fs.try_get_directory(&PathKey::root()).is_none());
        assert!(matches!(
            fs.write_file(&PathKey::parse("/a.txt"), b"x"),
            Err(Error::WriteNotSupported(_))
        ));
    }
}
