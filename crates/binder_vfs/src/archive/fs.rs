//! Read-only filesystem over one or more mounted archive shards.

use super::accessor::{ArchiveAccessor, ReadOptions};
use super::index::{ArchiveIndex, FileHeader};
use super::tree::{DirectoryBuilder, DirectoryNode};
use crate::config::VfsConfig;
use crate::diagnostics::{self, DiagnosticEvent, DiagnosticReport, DiagnosticSink, LogOnlySink, TeeSink};
use crate::dictionary::NameDictionary;
use crate::error::Result;
use crate::hash::{format_path_hash, PathHashAlgorithm};
use crate::path::PathKey;
use crate::vfs::{DirectoryHandle, FileHandle, VirtualFile, VirtualFileSystem};
use camino::{Utf8Path, Utf8PathBuf};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A file stored in an archive shard.
///
/// Holds only the header and a reference to the shard's accessor; bytes are
/// read on demand.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    path: Option<PathKey>,
    header: FileHeader,
    accessor: Arc<ArchiveAccessor>,
}

impl ArchiveFile {
    /// Wrap a header read from `accessor`'s index. `path` is `None` for
    /// hashes missing from the dictionary.
    pub fn new(path: Option<PathKey>, header: FileHeader, accessor: Arc<ArchiveAccessor>) -> Self {
        Self {
            path,
            header,
            accessor,
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Path hash as stored in the index.
    pub fn hash(&self) -> u64 {
        self.header.hash
    }

    /// Id of the shard this file is stored in.
    pub fn shard(&self) -> &str {
        self.accessor.shard()
    }

    pub fn accessor(&self) -> &Arc<ArchiveAccessor> {
        &self.accessor
    }

    /// Whether the file's hash was found in the name dictionary.
    pub fn is_resolved(&self) -> bool {
        self.path.is_some()
    }

    fn with_path(&self, path: PathKey) -> Self {
        Self {
            path: Some(path),
            ..self.clone()
        }
    }
}

impl VirtualFile for ArchiveFile {
    fn name(&self) -> Cow<'_, str> {
        match self.path.as_ref().and_then(PathKey::file_name) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format_path_hash(self.header.hash)),
        }
    }

    fn path(&self) -> Option<&PathKey> {
        self.path.as_ref()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        self.accessor.read_file(&self.header)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.header.logical_size())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

/// Mount-time options for [`ArchiveVirtualFileSystem`].
#[derive(Clone)]
pub struct ArchiveMountOptions {
    /// Scan all headers by hash when a path misses the resolved index.
    pub fallback_lookup: bool,
    /// Receives every diagnostic raised while mounting and looking up paths.
    pub sink: Arc<dyn DiagnosticSink>,
}

impl Default for ArchiveMountOptions {
    fn default() -> Self {
        Self {
            fallback_lookup: true,
            sink: Arc::new(LogOnlySink),
        }
    }
}

/// Immutable view over N archive shards, with files placed in a directory tree
/// by their dictionary-resolved paths.
///
/// Shards are visited in the order given; when two shards (or two records of
/// one shard) resolve to the same path the first one wins. Files whose hash is
/// not in the dictionary stay reachable through [`all_files`](Self::all_files)
/// and the hash fallback of [`try_get_file`](VirtualFileSystem::try_get_file).
pub struct ArchiveVirtualFileSystem {
    accessors: Vec<Arc<ArchiveAccessor>>,
    root: Arc<DirectoryNode>,
    index: HashMap<PathKey, Arc<ArchiveFile>>,
    files: Vec<Arc<ArchiveFile>>,
    algorithm: PathHashAlgorithm,
    fallback_lookup: bool,
    report: Arc<DiagnosticReport>,
    sink: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for ArchiveVirtualFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveVirtualFileSystem")
            .field("shards", &self.shards())
            .field("files", &self.files.len())
            .field("resolved", &self.index.len())
            .field("algorithm", &self.algorithm)
            .field("fallback_lookup", &self.fallback_lookup)
            .finish()
    }
}

impl ArchiveVirtualFileSystem {
    /// Build the filesystem from already opened shards, in the given order.
    pub fn new(
        accessors: Vec<Arc<ArchiveAccessor>>,
        dictionary: &NameDictionary,
        options: ArchiveMountOptions,
    ) -> Self {
        let report = Arc::new(DiagnosticReport::new());
        let sink: Arc<dyn DiagnosticSink> = Arc::new(TeeSink(report.clone(), options.sink));
        Self::build(accessors, dictionary, options.fallback_lookup, report, sink)
    }

    /// Discover and mount every shard in `dir`.
    ///
    /// Shards listed in `config.shards` are mounted in that order; otherwise
    /// every `*.bhd` in `dir` is mounted, ordered by name ignoring case. A shard
    /// whose index cannot be read is reported and skipped.
    pub fn mount_dir(
        dir: impl AsRef<Utf8Path>,
        config: &VfsConfig,
        dictionary: &NameDictionary,
        mut read: ReadOptions,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let report = Arc::new(DiagnosticReport::new());
        let sink: Arc<dyn DiagnosticSink> = Arc::new(TeeSink(report.clone(), read.sink.clone()));
        read.integrity = config.integrity;
        read.sink = sink.clone();

        let shards = match &config.shards {
            Some(names) => names
                .iter()
                .map(|name| (name.clone(), dir.join(format!("{}.bhd", name))))
                .collect(),
            None => discover_shards(dir)?,
        };

        let mut accessors = Vec::with_capacity(shards.len());
        for (shard, bhd_path) in shards {
            match open_shard(&shard, &bhd_path, config, &read) {
                Ok(accessor) => {
                    tracing::info!(
                        "Mounted shard '{}' ({} files in {} buckets)",
                        shard,
                        accessor.index().file_count(),
                        accessor.index().bucket_count()
                    );
                    accessors.push(Arc::new(accessor));
                }
                Err(err) => {
                    let reason = match err {
                        crate::Error::InvalidArchiveIndex { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    diagnostics::emit(
                        sink.as_ref(),
                        DiagnosticEvent::InvalidArchiveIndex { shard, reason },
                    );
                }
            }
        }

        Ok(Self::build(
            accessors,
            dictionary,
            config.fallback_lookup,
            report,
            sink,
        ))
    }

    fn build(
        accessors: Vec<Arc<ArchiveAccessor>>,
        dictionary: &NameDictionary,
        fallback_lookup: bool,
        report: Arc<DiagnosticReport>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let total: usize = accessors.iter().map(|a| a.index().file_count()).sum();
        let mut files = Vec::with_capacity(total);
        let mut index: HashMap<PathKey, Arc<ArchiveFile>> = HashMap::with_capacity(total);
        let mut root = DirectoryBuilder::root();
        let mut unresolved: HashMap<u64, String> = HashMap::new();

        for accessor in &accessors {
            for header in accessor.index().headers() {
                let path = dictionary
                    .resolve(header.hash)
                    .filter(|path| !path.is_directory())
                    .cloned();

                let Some(path) = path else {
                    let event = match unresolved.entry(header.hash) {
                        Entry::Vacant(slot) => {
                            slot.insert(accessor.shard().to_string());
                            DiagnosticEvent::MissingDictionaryEntry {
                                shard: accessor.shard().to_string(),
                                hash: header.hash,
                            }
                        }
                        Entry::Occupied(first) => DiagnosticEvent::SharedUnresolvedHash {
                            hash: header.hash,
                            first_shard: first.get().clone(),
                            shard: accessor.shard().to_string(),
                        },
                    };
                    diagnostics::emit(sink.as_ref(), event);
                    files.push(Arc::new(ArchiveFile::new(
                        None,
                        header.clone(),
                        accessor.clone(),
                    )));
                    continue;
                };

                match index.entry(path) {
                    Entry::Occupied(existing) => {
                        diagnostics::emit(
                            sink.as_ref(),
                            DiagnosticEvent::DuplicatePath {
                                path: existing.key().clone(),
                                kept_shard: existing.get().shard().to_string(),
                                dropped_shard: accessor.shard().to_string(),
                            },
                        );
                    }
                    Entry::Vacant(slot) => {
                        tracing::trace!("{:016x} -> {}", header.hash, slot.key());
                        let file = Arc::new(ArchiveFile::new(
                            Some(slot.key().clone()),
                            header.clone(),
                            accessor.clone(),
                        ));
                        root.insert_file(slot.key(), file.clone());
                        files.push(file.clone());
                        slot.insert(file);
                    }
                }
            }
        }

        tracing::info!(
            "Archive filesystem ready: {} shards, {} files ({} unresolved)",
            accessors.len(),
            files.len(),
            files.len() - index.len()
        );

        Self {
            accessors,
            root: root.freeze(),
            index,
            files,
            algorithm: dictionary.algorithm(),
            fallback_lookup,
            report,
            sink,
        }
    }

    /// Every mounted file, in shard, bucket, then header order. Paths dropped
    /// as duplicates are not included.
    pub fn all_files(&self) -> &[Arc<ArchiveFile>] {
        &self.files
    }

    /// Files whose hash is not in the name dictionary.
    pub fn unresolved_files(&self) -> impl Iterator<Item = &Arc<ArchiveFile>> {
        self.files.iter().filter(|file| !file.is_resolved())
    }

    /// Ids of the mounted shards, in mount order.
    pub fn shards(&self) -> Vec<&str> {
        self.accessors.iter().map(|a| a.shard()).collect()
    }

    /// Open shards, in mount order. Dropping the filesystem releases them
    /// once no file handles remain.
    pub fn accessors(&self) -> &[Arc<ArchiveAccessor>] {
        &self.accessors
    }

    /// Number of mounted files, resolved or not.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of files reachable by path.
    pub fn resolved_count(&self) -> usize {
        self.index.len()
    }

    /// Every event raised by this filesystem so far.
    pub fn diagnostics(&self) -> &DiagnosticReport {
        &self.report
    }

    /// Root of the resolved directory tree.
    pub fn root(&self) -> &Arc<DirectoryNode> {
        &self.root
    }

    pub fn hash_algorithm(&self) -> PathHashAlgorithm {
        self.algorithm
    }

    fn fallback(&self, path: &PathKey) -> Option<Arc<ArchiveFile>> {
        let hash = self.algorithm.hash_key(path);
        let matches: Vec<&Arc<ArchiveFile>> =
            self.files.iter().filter(|file| file.hash() == hash).collect();

        diagnostics::emit(
            self.sink.as_ref(),
            DiagnosticEvent::FallbackLookup {
                path: path.clone(),
                hash,
                matches: matches.len(),
            },
        );

        if matches.len() > 1 {
            diagnostics::emit(
                self.sink.as_ref(),
                DiagnosticEvent::HashCollisionAmbiguous {
                    path: path.clone(),
                    hash,
                    candidates: matches
                        .iter()
                        .map(|file| format!("{}:{}", file.shard(), file.name()))
                        .collect(),
                },
            );
        }

        matches
            .first()
            .map(|file| Arc::new(file.with_path(path.clone())))
    }
}

impl VirtualFileSystem for ArchiveVirtualFileSystem {
    fn is_read_only(&self) -> bool {
        true
    }

    fn try_get_file(&self, path: &PathKey) -> Option<FileHandle> {
        if path.is_directory() {
            return None;
        }
        if let Some(file) = self.index.get(path) {
            return Some(file.clone() as FileHandle);
        }
        if !self.fallback_lookup {
            return None;
        }
        self.fallback(path).map(|file| file as FileHandle)
    }

    fn try_get_directory(&self, path: &PathKey) -> Option<DirectoryHandle> {
        self.root
            .find_directory(&path.directory())
            .filter(|_| path.is_directory())
            .map(|dir| dir as DirectoryHandle)
    }
}

/// Every `*.bhd` in `dir` paired with its shard id, sorted by id ignoring case.
fn discover_shards(dir: &Utf8Path) -> Result<Vec<(String, Utf8PathBuf)>> {
    let mut shards = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();
        let is_index = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bhd"));
        if !is_index || !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            shards.push((stem.to_string(), path.to_path_buf()));
        }
    }
    shards.sort_by(|(a, _), (b, _)| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));
    Ok(shards)
}

/// The `.bdt` next to `bhd_path`, matching the extension's case when possible.
fn data_path_for(bhd_path: &Utf8Path) -> Utf8PathBuf {
    let upper = bhd_path.extension() == Some("BHD");
    let candidate = bhd_path.with_extension(if upper { "BDT" } else { "bdt" });
    if candidate.exists() {
        candidate
    } else {
        bhd_path.with_extension(if upper { "bdt" } else { "BDT" })
    }
}

fn open_shard(
    shard: &str,
    bhd_path: &Utf8Path,
    config: &VfsConfig,
    read: &ReadOptions,
) -> Result<ArchiveAccessor> {
    let index = ArchiveIndex::read_file(bhd_path, config.archive_format)?;
    ArchiveAccessor::open(shard, index, &data_path_for(bhd_path), read.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::builder::{ArchiveFileBuilder, ArchiveIndexBuilder};
    use crate::archive::index::ArchiveFormat;

    fn shard_dir(shards: &[(&str, Vec<(&str, &str)>)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        for (name, files) in shards {
            let mut builder = ArchiveIndexBuilder::new(ArchiveFormat::EldenRing).with_bucket_count(3);
            for (path, data) in files {
                builder = builder.with_file(
                    ArchiveFileBuilder::new()
                        .with_path(path)
                        .with_data(data.as_bytes()),
                );
            }
            builder.write_to_dir(root, name).unwrap();
        }
        dir
    }

    fn mount(dir: &tempfile::TempDir, dictionary: &NameDictionary) -> ArchiveVirtualFileSystem {
        ArchiveVirtualFileSystem::mount_dir(
            Utf8Path::from_path(dir.path()).unwrap(),
            &VfsConfig::default(),
            dictionary,
            ReadOptions::default(),
        )
        .unwrap()
    }

    fn dictionary(paths: &[&str]) -> NameDictionary {
        NameDictionary::from_paths(PathHashAlgorithm::Prime133, paths)
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let dir = shard_dir(&[("Data0", vec![("/chr/c1234.bnd", "chr")])]);
        let fs = mount(&dir, &dictionary(&["/chr/c1234.bnd"]));

        let file = fs.get_file(&PathKey::parse("CHR\\C1234.BND")).unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"chr");
        assert_eq!(file.name(), "c1234.bnd");
        assert!(fs.directory_exists(&PathKey::parse("/Chr")));
        assert!(fs.diagnostics().is_empty());
    }

    #[test]
    fn test_shards_sorted_and_first_wins() {
        let dir = shard_dir(&[
            ("data1", vec![("/a/b.dat", "from data1")]),
            ("Data0", vec![("/a/b.dat", "from data0"), ("/a/c.dat", "c")]),
        ]);
        let fs = mount(&dir, &dictionary(&["/a/b.dat", "/a/c.dat"]));

        assert_eq!(fs.shards(), vec!["Data0", "data1"]);
        assert_eq!(
            fs.get_file(&PathKey::parse("/a/b.dat")).unwrap().read_bytes().unwrap(),
            b"from data0"
        );
        assert_eq!(fs.diagnostics().summary().duplicate_paths, 1);
        assert_eq!(fs.enumerate_files(&PathKey::parse("/a")).unwrap().len(), 2);
    }

    #[test]
    fn test_explicit_shard_order() {
        let dir = shard_dir(&[
            ("Data0", vec![("/a/b.dat", "0")]),
            ("Data1", vec![("/a/b.dat", "1")]),
        ]);
        let config = VfsConfig {
            shards: Some(vec!["Data1".into(), "Data0".into()]),
            ..VfsConfig::default()
        };
        let fs = ArchiveVirtualFileSystem::mount_dir(
            Utf8Path::from_path(dir.path()).unwrap(),
            &config,
            &dictionary(&["/a/b.dat"]),
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(
            fs.get_file(&PathKey::parse("/a/b.dat")).unwrap().read_bytes().unwrap(),
            b"1"
        );
    }

    #[test]
    fn test_unresolved_files_and_fallback() {
        let dir = shard_dir(&[("Data0", vec![("/a/known.dat", "k"), ("/a/hidden.dat", "h")])]);
        let fs = mount(&dir, &dictionary(&["/a/known.dat"]));

        assert_eq!(fs.file_count(), 2);
        assert_eq!(fs.resolved_count(), 1);
        let unresolved: Vec<_> = fs.unresolved_files().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(
            unresolved[0].name(),
            format_path_hash(PathHashAlgorithm::Prime133.hash_str("/a/hidden.dat"))
        );
        assert_eq!(fs.diagnostics().summary().unresolved_hashes, 1);

        // Not in the tree, but found through the hash scan.
        assert_eq!(fs.enumerate_files(&PathKey::parse("/a")).unwrap().len(), 1);
        let file = fs.get_file(&PathKey::parse("/A/Hidden.dat")).unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"h");
        assert_eq!(file.name(), "Hidden.dat");
        assert_eq!(fs.diagnostics().summary().fallback_lookups, 1);

        assert!(fs.try_get_file(&PathKey::parse("/a/missing.dat")).is_none());
        assert_eq!(fs.diagnostics().summary().fallback_lookups, 2);
    }

    #[test]
    fn test_fallback_disabled() {
        let dir = shard_dir(&[("Data0", vec![("/a/hidden.dat", "h")])]);
        let config = VfsConfig {
            fallback_lookup: false,
            ..VfsConfig::default()
        };
        let fs = ArchiveVirtualFileSystem::mount_dir(
            Utf8Path::from_path(dir.path()).unwrap(),
            &config,
            &NameDictionary::new(PathHashAlgorithm::Prime133),
            ReadOptions::default(),
        )
        .unwrap();
        assert!(fs.try_get_file(&PathKey::parse("/a/hidden.dat")).is_none());
        assert!(matches!(
            fs.get_file(&PathKey::parse("/a/hidden.dat")),
            Err(crate::Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_ambiguous_fallback_uses_first() {
        let dir = shard_dir(&[
            ("Data0", vec![("/a/hidden.dat", "first")]),
            ("Data1", vec![("/a/hidden.dat", "second")]),
        ]);
        let fs = mount(&dir, &NameDictionary::new(PathHashAlgorithm::Prime133));

        let file = fs.get_file(&PathKey::parse("/a/hidden.dat")).unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"first");
        assert_eq!(fs.diagnostics().summary().ambiguous_lookups, 1);
    }

    #[test]
    fn test_shared_unresolved_hash_names_both_shards() {
        let dir = shard_dir(&[
            ("Data0", vec![("/a/hidden.dat", "first")]),
            ("Data1", vec![("/a/hidden.dat", "second")]),
        ]);
        let fs = mount(&dir, &NameDictionary::new(PathHashAlgorithm::Prime133));
        let hash = PathHashAlgorithm::Prime133.hash_str("/a/hidden.dat");

        assert_eq!(fs.unresolved_files().count(), 2);
        let summary = fs.diagnostics().summary();
        assert_eq!(summary.unresolved_hashes, 1);
        assert_eq!(summary.shared_unresolved_hashes, 1);
        assert!(fs.diagnostics().events().contains(&DiagnosticEvent::SharedUnresolvedHash {
            hash,
            first_shard: "Data0".to_string(),
            shard: "Data1".to_string(),
        }));
    }

    #[test]
    fn test_drop_releases_accessors() {
        let dir = shard_dir(&[("Data0", vec![("/a/b.dat", "ok")])]);
        let fs = mount(&dir, &dictionary(&["/a/b.dat"]));
        let accessor = Arc::downgrade(&fs.accessors()[0]);
        drop(fs);
        assert!(accessor.upgrade().is_none());

        // An outstanding handle keeps its shard open after the filesystem is gone.
        let fs = mount(&dir, &dictionary(&["/a/b.dat"]));
        let accessor = Arc::downgrade(&fs.accessors()[0]);
        let file = fs.get_file(&PathKey::parse("/a/b.dat")).unwrap();
        drop(fs);
        assert_eq!(file.read_bytes().unwrap(), b"ok");
        drop(file);
        assert!(accessor.upgrade().is_none());
    }

    #[test]
    fn test_invalid_shard_is_skipped() {
        let dir = shard_dir(&[("Data0", vec![("/a/b.dat", "ok")])]);
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(root.join("Data1.bhd"), "not an index").unwrap();
        std::fs::write(root.join("Data1.bdt"), "").unwrap();

        let fs = mount(&dir, &dictionary(&["/a/b.dat"]));
        assert_eq!(fs.shards(), vec!["Data0"]);
        assert_eq!(fs.diagnostics().summary().invalid_shards, 1);
        assert!(fs.file_exists(&PathKey::parse("/a/b.dat")));
    }

    #[test]
    fn test_directory_tree() {
        let dir = shard_dir(&[(
            "Data0",
            vec![
                ("/Map/MapStudio/m10_00_00_00.msb", "m"),
                ("/Map/MapStudio/m11_00_00_00.msb", "n"),
                ("/chr/c1234.bnd", "c"),
            ],
        )]);
        let fs = mount(
            &dir,
            &dictionary(&[
                "/Map/MapStudio/m10_00_00_00.msb",
                "/Map/MapStudio/m11_00_00_00.msb",
                "/chr/c1234.bnd",
            ]),
        );

        let top = fs.enumerate_directories(&PathKey::root()).unwrap();
        let names: Vec<_> = top.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["chr", "Map"]);

        let studio = fs
            .try_get_directory(&PathKey::parse("/MAP/mapstudio/"))
            .unwrap();
        assert_eq!(studio.name(), "MapStudio");
        assert_eq!(studio.files().unwrap().len(), 2);
        assert!(fs.try_get_directory(&PathKey::parse("/chr/c1234.bnd")).is_none());
    }

    #[test]
    fn test_writes_are_rejected() {
        let dir = shard_dir(&[("Data0", vec![("/a/b.dat", "ok")])]);
        let fs = mount(&dir, &dictionary(&["/a/b.dat"]));
        assert!(fs.is_read_only());
        assert!(matches!(
            fs.write_file(&PathKey::parse("/a/b.dat"), b"x"),
            Err(crate::Error::WriteNotSupported(_))
        ));
        let file = fs.get_file(&PathKey::parse("/a/b.dat")).unwrap();
        assert!(matches!(file.delete(), Err(crate::Error::WriteNotSupported(_))));
    }
}
