//! Adapter exposing a native directory tree as a [`VirtualFileSystem`].

use crate::error::{Error, Result};
use crate::path::PathKey;
use crate::vfs::{DirectoryHandle, FileHandle, VirtualDirectory, VirtualFile, VirtualFileSystem};
use camino::{Utf8Path, Utf8PathBuf};
use std::borrow::Cow;
use std::fs;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// A directory on disk, addressed case-insensitively.
///
/// Lookups first try the path as spelled; if that misses, each segment is
/// matched against the directory's entries ignoring case (the first match in
/// sorted order wins). Writes replace whole files atomically.
///
/// Creating entries is serialised across clones, so two writers spelling a
/// missing directory with different case still end up sharing one directory.
#[derive(Debug, Clone)]
pub struct RealFileSystem {
    root: Utf8PathBuf,
    read_only: bool,
    create_lock: Arc<Mutex<()>>,
}

impl RealFileSystem {
    /// A writable filesystem rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
            create_lock: Arc::default(),
        }
    }

    /// A filesystem rooted at `root` that rejects every write.
    pub fn read_only(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
            create_lock: Arc::default(),
        }
    }

    /// The directory this filesystem is rooted at.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Resolve `key` to an existing path on disk.
    pub fn resolve(&self, key: &PathKey) -> Option<Utf8PathBuf> {
        let exact = key
            .segments()
            .fold(self.root.clone(), |path, segment| path.join(segment));
        if exact.symlink_metadata().is_ok() {
            return Some(exact);
        }

        let mut current = self.root.clone();
        for segment in key.segments() {
            current = match_entry(&current, segment)?;
        }
        Some(current)
    }

    /// Where `key` lives on disk: existing segments keep their on-disk
    /// spelling, missing ones are appended as given.
    fn resolve_for_write(&self, key: &PathKey) -> Utf8PathBuf {
        let mut current = self.root.clone();
        let mut exists = true;
        for segment in key.segments() {
            if exists {
                if let Some(found) = match_entry(&current, segment) {
                    current = found;
                    continue;
                }
                exists = false;
            }
            current.push(segment);
        }
        current
    }

    fn ensure_writable(&self, key: &PathKey) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only(key));
        }
        Ok(())
    }

    fn file(&self, key: &PathKey, path: Utf8PathBuf) -> Arc<RealFile> {
        Arc::new(RealFile {
            key: key.clone(),
            path,
            read_only: self.read_only,
        })
    }

    fn directory(&self, key: &PathKey, path: Utf8PathBuf) -> Arc<RealDirectory> {
        Arc::new(RealDirectory {
            key: key.as_directory(),
            path,
            read_only: self.read_only,
        })
    }
}

/// Entry of `dir` named `segment`, matched exactly first and then ignoring case.
fn match_entry(dir: &Utf8Path, segment: &str) -> Option<Utf8PathBuf> {
    let exact = dir.join(segment);
    if exact.symlink_metadata().is_ok() {
        return Some(exact);
    }

    let wanted = segment.to_lowercase();
    let mut matches: Vec<Utf8PathBuf> = dir
        .read_dir_utf8()
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_lowercase() == wanted)
        .map(|entry| entry.path().to_path_buf())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Replace `target` with `data` via a temporary file in the same directory.
fn write_atomic(target: &Utf8Path, data: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

impl VirtualFileSystem for RealFileSystem {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn try_get_file(&self, path: &PathKey) -> Option<FileHandle> {
        if path.is_root() {
            return None;
        }
        let resolved = self.resolve(path)?;
        resolved
            .is_file()
            .then(|| self.file(path, resolved) as FileHandle)
    }

    fn try_get_directory(&self, path: &PathKey) -> Option<DirectoryHandle> {
        let resolved = self.resolve(path)?;
        resolved
            .is_dir()
            .then(|| self.directory(path, resolved) as DirectoryHandle)
    }

    fn write_file(&self, path: &PathKey, data: &[u8]) -> Result<()> {
        self.ensure_writable(path)?;
        let _guard = self.create_lock.lock();
        let target = self.resolve_for_write(path);
        tracing::debug!("Writing {} bytes to {}", data.len(), target);
        write_atomic(&target, data)
    }

    fn delete(&self, path: &PathKey) -> Result<()> {
        self.ensure_writable(path)?;
        if path.is_root() {
            return Err(Error::Other("refusing to delete the filesystem root".to_string()));
        }
        let target = self
            .resolve(path)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;
        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        tracing::debug!("Deleted {}", target);
        Ok(())
    }

    fn get_or_create_file(&self, path: &PathKey) -> Result<FileHandle> {
        if let Some(file) = self.try_get_file(path) {
            return Ok(file);
        }
        self.ensure_writable(path)?;
        let _guard = self.create_lock.lock();
        let target = self.resolve_for_write(path);
        if !target.is_file() {
            write_atomic(&target, &[])?;
        }
        Ok(self.file(path, target))
    }

    fn get_or_create_directory(&self, path: &PathKey) -> Result<DirectoryHandle> {
        if let Some(dir) = self.try_get_directory(path) {
            return Ok(dir);
        }
        self.ensure_writable(path)?;
        let _guard = self.create_lock.lock();
        let target = self.resolve_for_write(path);
        fs::create_dir_all(&target)?;
        Ok(self.directory(path, target))
    }
}

/// A file on disk.
#[derive(Debug)]
pub struct RealFile {
    key: PathKey,
    path: Utf8PathBuf,
    read_only: bool,
}

impl RealFile {
    /// The file's location on disk.
    pub fn disk_path(&self) -> &Utf8Path {
        &self.path
    }
}

impl VirtualFile for RealFile {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.path.file_name().unwrap_or_default())
    }

    fn path(&self) -> Option<&PathKey> {
        Some(&self.key)
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    fn len_hint(&self) -> Option<u64> {
        self.path.metadata().ok().map(|m| m.len())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only(&self.key));
        }
        write_atomic(&self.path, data)
    }

    fn delete(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only(&self.key));
        }
        Ok(fs::remove_file(&self.path)?)
    }
}

/// A directory on disk.
#[derive(Debug)]
pub struct RealDirectory {
    key: PathKey,
    path: Utf8PathBuf,
    read_only: bool,
}

impl RealDirectory {
    fn entries(&self) -> Result<Vec<(String, Utf8PathBuf, fs::FileType)>> {
        let mut entries = Vec::new();
        for entry in self.path.read_dir_utf8()? {
            let Ok(entry) = entry else {
                continue;
            };
            let Ok(metadata) = fs::metadata(entry.path()) else {
                continue;
            };
            entries.push((
                entry.file_name().to_string(),
                entry.path().to_path_buf(),
                metadata.file_type(),
            ));
        }
        entries.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()).then(a.0.cmp(&b.0)));
        Ok(entries)
    }
}

impl VirtualDirectory for RealDirectory {
    fn name(&self) -> &str {
        self.key.name().unwrap_or_default()
    }

    fn path(&self) -> &PathKey {
        &self.key
    }

    fn files(&self) -> Result<Vec<FileHandle>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(_, _, file_type)| file_type.is_file())
            .map(|(name, path, _)| {
                Arc::new(RealFile {
                    key: self.key.join_file(&name),
                    path,
                    read_only: self.read_only,
                }) as FileHandle
            })
            .collect())
    }

    fn directories(&self) -> Result<Vec<DirectoryHandle>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(_, _, file_type)| file_type.is_dir())
            .map(|(name, path, _)| {
                Arc::new(RealDirectory {
                    key: self.key.join_dir(&name),
                    path,
                    read_only: self.read_only,
                }) as DirectoryHandle
            })
            .collect())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
