//! Directory tree of resolved archive files.
//!
//! The tree is assembled once with [`DirectoryBuilder`] while shards are
//! mounted, then frozen into shared [`DirectoryNode`]s. Children are keyed by
//! their lower-cased name so lookups ignore case while display names keep the
//! spelling of the first path that created them.

use super::fs::ArchiveFile;
use crate::path::PathKey;
use crate::vfs::{DirectoryHandle, FileHandle, VirtualDirectory};
use crate::Result;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct DirectoryBuilder {
    name: String,
    path: PathKey,
    directories: BTreeMap<String, DirectoryBuilder>,
    files: BTreeMap<String, Arc<ArchiveFile>>,
}

impl DirectoryBuilder {
    pub fn root() -> Self {
        Self {
            name: String::new(),
            path: PathKey::root(),
            directories: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Get or create the directory chain for `key`'s directory part.
    fn directory_mut(&mut self, key: &PathKey) -> &mut DirectoryBuilder {
        let mut current = self;
        for segment in key.directories() {
            let path = current.path.join_dir(segment);
            current = current
                .directories
                .entry(segment.to_lowercase())
                .or_insert_with(|| DirectoryBuilder {
                    name: segment.clone(),
                    path,
                    directories: BTreeMap::new(),
                    files: BTreeMap::new(),
                });
        }
        current
    }

    /// Attach a file under `key`. Returns `false` if the name is already taken.
    pub fn insert_file(&mut self, key: &PathKey, file: Arc<ArchiveFile>) -> bool {
        let Some(name) = key.file_name() else {
            return false;
        };
        match self.directory_mut(key).files.entry(name.to_lowercase()) {
            Entry::Vacant(slot) => {
                slot.insert(file);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn freeze(self) -> Arc<DirectoryNode> {
        Arc::new(DirectoryNode {
            name: self.name,
            path: self.path,
            directories: self
                .directories
                .into_iter()
                .map(|(key, dir)| (key, dir.freeze()))
                .collect(),
            files: self.files,
        })
    }
}

/// An immutable directory of an archive filesystem.
#[derive(Debug)]
pub struct DirectoryNode {
    name: String,
    path: PathKey,
    directories: BTreeMap<String, Arc<DirectoryNode>>,
    files: BTreeMap<String, Arc<ArchiveFile>>,
}

impl DirectoryNode {
    /// Find the directory addressed by `key`'s directory part.
    pub fn find_directory(self: &Arc<Self>, key: &PathKey) -> Option<Arc<DirectoryNode>> {
        let mut current = self;
        for segment in key.directories() {
            current = current.directories.get(&segment.to_lowercase())?;
        }
        Some(current.clone())
    }

    /// Find a file by path, ignoring case.
    pub fn find_file(self: &Arc<Self>, key: &PathKey) -> Option<Arc<ArchiveFile>> {
        let name = key.file_name()?;
        self.find_directory(key)?
            .files
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Files directly in this directory.
    pub fn archive_files(&self) -> impl Iterator<Item = &Arc<ArchiveFile>> {
        self.files.values()
    }

    /// Immediate child directories.
    pub fn subdirectories(&self) -> impl Iterator<Item = &Arc<DirectoryNode>> {
        self.directories.values()
    }
}

impl VirtualDirectory for DirectoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &PathKey {
        &self.path
    }

    fn files(&self) -> Result<Vec<FileHandle>> {
        Ok(self
            .files
            .values()
            .map(|file| file.clone() as FileHandle)
            .collect())
    }

    fn directories(&self) -> Result<Vec<DirectoryHandle>> {
        Ok(self
            .directories
            .values()
            .map(|dir| dir.clone() as DirectoryHandle)
            .collect())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
