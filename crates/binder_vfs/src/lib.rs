//! Virtual filesystem over loose game files and hashed binder archives.
//!
//! Game data ships as archive shards: a `.bhd` index mapping 64-bit path hashes
//! to offsets, sizes and crypto metadata, paired with a `.bdt` holding the
//! bytes. This crate mounts those shards, recovers their paths from a name
//! dictionary and exposes them, together with plain directories, through one
//! set of case-insensitive filesystem traits:
//!
//! - **[`PathKey`]**: canonical path used as the lookup key everywhere
//! - **[`VirtualFileSystem`]**: the capability trait every store implements
//! - **[`ArchiveVirtualFileSystem`]**: read-only tree built from N shards
//! - **[`RealFileSystem`]**: a directory on disk, optionally writable
//! - **[`OverlayVirtualFileSystem`]**: ordered layers where earlier ones shadow later ones
//! - **[`EmptyFileSystem`]**: a store with nothing in it
//!
//! Non-fatal conditions found while mounting (unreadable shards, unknown
//! hashes, duplicate paths) are reported as typed [`DiagnosticEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use binder_vfs::{GameMount, PathKey, ReadOptions, VfsConfig, VirtualFileSystem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = VfsConfig::default();
//! config.dictionary = Some("dictionary.txt".into());
//! config.project_dir = Some("my-project".into());
//!
//! let mount = GameMount::open("C:/Games/ELDEN RING/Game", &config, ReadOptions::default())?;
//! let bytes = mount.overlay.get_file(&PathKey::parse("/chr/c1234.bnd"))?.read_bytes()?;
//! mount.overlay.write_file(&PathKey::parse("/chr/c1234.bnd"), &bytes)?;
//!
//! println!(
//!     "{} files, {} unresolved",
//!     mount.archives.file_count(),
//!     mount.archives.unresolved_files().count()
//! );
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod dictionary;
pub mod empty;
pub mod error;
pub mod hash;
pub mod mount;
pub mod overlay;
pub mod path;
pub mod real;
pub mod vfs;

pub use archive::{
    ArchiveAccessor, ArchiveFile, ArchiveFormat, ArchiveIndex, ArchiveIndexBuilder,
    ArchiveMountOptions, ArchiveVirtualFileSystem, ReadOptions,
};
pub use codec::{Decompressor, Decryptor};
pub use config::{IntegrityPolicy, VfsConfig};
pub use diagnostics::{
    DiagnosticEvent, DiagnosticReport, DiagnosticSink, DiagnosticSummary, LogOnlySink,
};
pub use dictionary::NameDictionary;
pub use empty::EmptyFileSystem;
pub use error::{Error, Result};
pub use hash::{format_path_hash, PathHashAlgorithm};
pub use mount::GameMount;
pub use overlay::OverlayVirtualFileSystem;
pub use path::PathKey;
pub use real::RealFileSystem;
pub use vfs::{
    walk_files, DirectoryHandle, FileHandle, VirtualDirectory, VirtualFile, VirtualFileSystem,
};
