//! Hashed binder archives (`.bhd` index + `.bdt` data).
//!
//! - [`index`]: parsing the BHD5 header index
//! - [`builder`]: writing index and data files
//! - [`accessor`]: positioned reads from a shard's data file
//! - [`fs`]: the mounted, read-only [`ArchiveVirtualFileSystem`]

pub mod accessor;
pub mod builder;
pub mod fs;
pub mod index;
mod tree;

pub use accessor::{ArchiveAccessor, ReadOptions};
pub use builder::{ArchiveFileBuilder, ArchiveIndexBuilder};
pub use fs::{ArchiveFile, ArchiveMountOptions, ArchiveVirtualFileSystem};
pub use index::{
    AesKey, ArchiveFormat, ArchiveIndex, Bucket, ByteRange, FileDigest, FileHeader,
};
pub use tree::DirectoryNode;
