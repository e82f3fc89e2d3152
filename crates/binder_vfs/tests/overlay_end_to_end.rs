use binder_vfs::archive::ArchiveFileBuilder;
use binder_vfs::{
    ArchiveFormat, ArchiveIndexBuilder, ArchiveVirtualFileSystem, DiagnosticEvent, GameMount,
    NameDictionary, OverlayVirtualFileSystem, PathHashAlgorithm, PathKey, ReadOptions,
    RealFileSystem, VfsConfig, VirtualFile, VirtualFileSystem,
};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const PATHS: &[&str] = &[
    "/chr/c1234.bnd",
    "/Map/MapStudio/m10_00_00_00.msb",
    "/parts/wp_a_0100.partsbnd",
    "/msg/engus/item.msgbnd",
    "/sfx/sfxbnd_c1234.ffxbnd",
];

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8Path::from_path(dir.path()).unwrap().to_path_buf()
}

fn payload(path: &str) -> Vec<u8> {
    path.bytes().cycle().take(128).collect()
}

/// Write shard `name` containing `paths` (each with [`payload`] contents) into `dir`.
fn write_shard(dir: &Utf8Path, name: &str, paths: &[&str]) {
    let mut builder = ArchiveIndexBuilder::new(ArchiveFormat::EldenRing).with_bucket_count(7);
    for path in paths {
        builder = builder.with_file(
            ArchiveFileBuilder::new()
                .with_path(path)
                .with_data(payload(path))
                .with_computed_digest(),
        );
    }
    builder.write_to_dir(dir, name).unwrap();
}

fn mount(dir: &Utf8Path, dictionary: &NameDictionary) -> ArchiveVirtualFileSystem {
    ArchiveVirtualFileSystem::mount_dir(
        dir,
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
fn dictionary_paths_hash_to_their_stored_headers() {
    let game = tempfile::tempdir().unwrap();
    write_shard(&utf8(&game), "Data0", PATHS);
    let fs = mount(&utf8(&game), &dictionary(PATHS));

    for path in PATHS {
        let key = PathKey::parse(path);
        let file = fs.get_file(&key).unwrap();
        let stored = fs
            .all_files()
            .iter()
            .find(|f| f.path() == Some(&key))
            .unwrap()
            .hash();
        assert_eq!(PathHashAlgorithm::Prime133.hash_key(&key), stored);
        assert_eq!(file.read_bytes().unwrap(), payload(path));
    }
    assert!(fs.diagnostics().is_empty());
}

#[test]
fn repeated_reads_are_identical() {
    let game = tempfile::tempdir().unwrap();
    write_shard(&utf8(&game), "Data0", PATHS);
    let fs = mount(&utf8(&game), &dictionary(PATHS));

    let key = PathKey::parse("/parts/wp_a_0100.partsbnd");
    let first = fs.try_get_file(&key).unwrap().read_bytes().unwrap();
    let second = fs.try_get_file(&key).unwrap().read_bytes().unwrap();
    assert_eq!(first, second);
}

#[test]
fn lookups_ignore_case_and_separators() {
    let game = tempfile::tempdir().unwrap();
    write_shard(&utf8(&game), "Data0", PATHS);
    let fs = mount(&utf8(&game), &dictionary(PATHS));

    let a = fs
        .try_get_file(&PathKey::parse("Map/MapStudio/m10_00_00_00.msb"))
        .unwrap();
    let b = fs
        .try_get_file(&PathKey::parse("map\\mapstudio\\M10_00_00_00.MSB"))
        .unwrap();
    assert_eq!(a.path(), b.path());
    assert_eq!(a.read_bytes().unwrap(), b.read_bytes().unwrap());
}

#[test]
fn overlay_prefers_first_layer_and_writes_there() {
    let project = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(project.path().join("chr")).unwrap();
    std::fs::create_dir_all(base.path().join("chr")).unwrap();
    std::fs::write(project.path().join("chr").join("c1234.bnd"), b"project").unwrap();
    std::fs::write(base.path().join("chr").join("c1234.bnd"), b"base").unwrap();

    let layers: Vec<Arc<dyn VirtualFileSystem>> = vec![
        Arc::new(RealFileSystem::new(utf8(&project))),
        Arc::new(RealFileSystem::read_only(utf8(&base))),
    ];
    let fs = OverlayVirtualFileSystem::new(layers);
    let key = PathKey::parse("/chr/c1234.bnd");

    assert_eq!(fs.get_file(&key).unwrap().read_bytes().unwrap(), b"project");
    fs.write_file(&key, b"edited").unwrap();
    assert_eq!(fs.get_file(&key).unwrap().read_bytes().unwrap(), b"edited");
    assert_eq!(
        std::fs::read(base.path().join("chr").join("c1234.bnd")).unwrap(),
        b"base"
    );
}

#[test]
fn duplicate_path_across_shards_keeps_first() {
    let game = tempfile::tempdir().unwrap();
    let dir = utf8(&game);
    ArchiveIndexBuilder::new(ArchiveFormat::EldenRing)
        .with_file(ArchiveFileBuilder::new().with_path("/a/b.dat").with_data(b"first".to_vec()))
        .write_to_dir(&dir, "Data0")
        .unwrap();
    ArchiveIndexBuilder::new(ArchiveFormat::EldenRing)
        .with_file(ArchiveFileBuilder::new().with_path("/a/b.dat").with_data(b"second".to_vec()))
        .write_to_dir(&dir, "Data1")
        .unwrap();

    let fs = mount(&dir, &dictionary(&["/a/b.dat"]));
    let files = fs.enumerate_files(&PathKey::parse("/a")).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].read_bytes().unwrap(), b"first");

    let duplicates: Vec<_> = fs
        .diagnostics()
        .events()
        .into_iter()
        .filter(|event| matches!(event, DiagnosticEvent::DuplicatePath { .. }))
        .collect();
    assert_eq!(
        duplicates,
        vec![DiagnosticEvent::DuplicatePath {
            path: PathKey::parse("/a/b.dat"),
            kept_shard: "Data0".to_string(),
            dropped_shard: "Data1".to_string(),
        }]
    );
}

#[test]
fn fallback_finds_files_missing_from_dictionary() {
    let game = tempfile::tempdir().unwrap();
    write_shard(&utf8(&game), "Data0", PATHS);

    let full = mount(&utf8(&game), &dictionary(PATHS));
    let mut partial_dictionary = dictionary(PATHS);
    let key = PathKey::parse("/msg/engus/item.msgbnd");
    partial_dictionary.remove(partial_dictionary.hash(&key)).unwrap();
    let partial = mount(&utf8(&game), &partial_dictionary);

    let direct = full.get_file(&key).unwrap().read_bytes().unwrap();
    let fallback = partial.get_file(&key).unwrap().read_bytes().unwrap();
    assert_eq!(direct, fallback);
    assert_eq!(partial.diagnostics().summary().fallback_lookups, 1);
    assert_eq!(partial.diagnostics().summary().unresolved_hashes, 1);
    assert_eq!(full.diagnostics().summary().fallback_lookups, 0);
}

#[test]
fn concurrent_writes_never_interleave() {
    let project = tempfile::tempdir().unwrap();
    let fs = RealFileSystem::new(utf8(&project));
    let key = PathKey::parse("/chr/c1234.bnd");
    let payloads: Vec<Vec<u8>> = (0..16u8).map(|i| vec![i; 256 * 1024]).collect();

    payloads
        .par_iter()
        .for_each(|payload| fs.write_file(&key, payload).unwrap());

    let written = fs.get_file(&key).unwrap().read_bytes().unwrap();
    assert!(payloads.contains(&written));
    // Only the target remains; no temporary files are left behind.
    assert_eq!(fs.enumerate_files(&PathKey::parse("/chr")).unwrap().len(), 1);
}

#[test]
fn project_layer_shadows_archive_end_to_end() {
    let game = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let dictionary_dir = tempfile::tempdir().unwrap();
    write_shard(&utf8(&game), "Data0", &["/chr/c1234.bnd"]);
    let dictionary_path = utf8(&dictionary_dir).join("names.txt");
    std::fs::write(&dictionary_path, "chr/c1234.bnd\n").unwrap();

    // Archive alone.
    let mut config = VfsConfig {
        dictionary: Some(dictionary_path),
        ..VfsConfig::default()
    };
    let archive_only = GameMount::open(utf8(&game), &config, ReadOptions::default()).unwrap();
    let key = PathKey::parse("chr/c1234.bnd");
    let original = archive_only.overlay.get_file(&key).unwrap().read_bytes().unwrap();
    assert_eq!(original.len(), 128);
    assert_eq!(original, payload("/chr/c1234.bnd"));
    assert!(archive_only.overlay.is_read_only());

    // Empty writable project over the archive.
    config.project_dir = Some(utf8(&project));
    let mount = GameMount::open(utf8(&game), &config, ReadOptions::default()).unwrap();
    assert_eq!(
        mount.overlay.get_file(&key).unwrap().read_bytes().unwrap(),
        original
    );

    let edited = b"edited c1234".to_vec();
    mount
        .project
        .as_ref()
        .unwrap()
        .write_file(&key, &edited)
        .unwrap();
    assert_eq!(mount.overlay.get_file(&key).unwrap().read_bytes().unwrap(), edited);
    assert_eq!(
        mount.archives.get_file(&key).unwrap().read_bytes().unwrap(),
        original
    );
}
