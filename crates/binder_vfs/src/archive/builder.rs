//! Writing binder archive shards.
//!
//! [`ArchiveIndexBuilder`] lays out a `.bhd` index and its paired `.bdt` data
//! file from a list of [`ArchiveFileBuilder`]s. Data is written exactly as given
//! (callers encrypt payloads themselves when attaching an [`AesKey`]); each file
//! starts on a 16-byte boundary and its padded size is rounded up accordingly.
//!
//! ```
//! use binder_vfs::archive::{ArchiveFileBuilder, ArchiveFormat, ArchiveIndexBuilder};
//!
//! let (bhd, bdt) = ArchiveIndexBuilder::new(ArchiveFormat::EldenRing)
//!     .with_file(
//!         ArchiveFileBuilder::new()
//!             .with_path("/chr/c1234.bnd")
//!             .with_data(vec![0u8; 128]),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(bdt.len(), 128);
//! # let _ = bhd;
//! ```

use super::index::{
    AesKey, AesKeyRecord, ArchiveFormat, Bhd5Header, Bhd5Prologue, BucketRecord, ByteRange,
    DarkSouls3Record, DigestRecord, EldenRingRecord, FileDigest, BUCKET_RECORD_SIZE,
    FILE_RECORD_SIZE,
};
use crate::error::{Error, Result};
use crate::hash::PathHashAlgorithm;
use binrw::{BinWrite, Endian};
use camino::Utf8Path;
use std::io::{Cursor, Seek, SeekFrom};

const DATA_ALIGNMENT: u64 = 16;

/// Identifies a file either by path (hashed at build time) or by a raw hash.
#[derive(Debug, Clone)]
enum FileKey {
    Path(String),
    Hash(u64),
}

/// One file to be written into a shard.
#[derive(Debug, Clone)]
pub struct ArchiveFileBuilder {
    key: FileKey,
    data: Vec<u8>,
    aes_key: Option<AesKey>,
    digest: DigestMode,
}

#[derive(Debug, Clone)]
enum DigestMode {
    None,
    Computed,
    Explicit(FileDigest),
}

impl Default for ArchiveFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFileBuilder {
    pub fn new() -> Self {
        Self {
            key: FileKey::Hash(0),
            data: Vec::new(),
            aes_key: None,
            digest: DigestMode::None,
        }
    }

    /// Key the file by path; the hash is computed with the builder's algorithm.
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        self.key = FileKey::Path(path.as_ref().to_string());
        self
    }

    /// Key the file by a precomputed hash.
    pub fn with_hash(mut self, hash: u64) -> Self {
        self.key = FileKey::Hash(hash);
        self
    }

    /// The bytes stored in the data file.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Attach encryption metadata. The data must already be encrypted.
    pub fn with_aes_key(mut self, key: [u8; 16], ranges: Vec<ByteRange>) -> Self {
        self.aes_key = Some(AesKey {
            key,
            iv: None,
            ranges,
        });
        self
    }

    /// Attach a digest computed over the whole stored data.
    pub fn with_computed_digest(mut self) -> Self {
        self.digest = DigestMode::Computed;
        self
    }

    /// Attach an explicit digest (e.g. one computed over the plaintext).
    pub fn with_digest(mut self, digest: FileDigest) -> Self {
        self.digest = DigestMode::Explicit(digest);
        self
    }

    fn hash(&self, algorithm: PathHashAlgorithm) -> u64 {
        match &self.key {
            FileKey::Path(path) => algorithm.hash_str(path),
            FileKey::Hash(hash) => *hash,
        }
    }

    fn digest(&self) -> Option<FileDigest> {
        match &self.digest {
            DigestMode::None => None,
            DigestMode::Computed => Some(FileDigest::compute(&self.data, Vec::new())),
            DigestMode::Explicit(digest) => Some(digest.clone()),
        }
    }
}

/// Lays out a `.bhd` / `.bdt` pair.
#[derive(Debug, Clone)]
pub struct ArchiveIndexBuilder {
    format: ArchiveFormat,
    hash_algorithm: PathHashAlgorithm,
    bucket_count: usize,
    big_endian: bool,
    salt: String,
    files: Vec<ArchiveFileBuilder>,
}

/// A file's placement, computed before anything is written.
struct Placement {
    hash: u64,
    offset: u64,
    size: u64,
    padded_size: u64,
    digest: Option<FileDigest>,
    digest_offset: u64,
    aes_key_offset: u64,
}

impl ArchiveIndexBuilder {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            hash_algorithm: format.default_hash_algorithm(),
            bucket_count: 1,
            big_endian: false,
            salt: String::new(),
            files: Vec::new(),
        }
    }

    pub fn with_hash_algorithm(mut self, algorithm: PathHashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count.max(1);
        self
    }

    pub fn with_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn with_file(mut self, file: ArchiveFileBuilder) -> Self {
        self.files.push(file);
        self
    }

    /// Build the index and data file in memory, returning `(bhd, bdt)`.
    pub fn build(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let endian = if self.big_endian {
            Endian::Big
        } else {
            Endian::Little
        };

        // Data file: sequential, 16-byte aligned.
        let mut bdt = Vec::new();
        let mut placements = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let offset = bdt.len() as u64;
            let size = file.data.len() as u64;
            let padded_size = size.div_ceil(DATA_ALIGNMENT) * DATA_ALIGNMENT;
            bdt.extend_from_slice(&file.data);
            bdt.resize((offset + padded_size) as usize, 0);
            placements.push(Placement {
                hash: file.hash(self.hash_algorithm),
                offset,
                size,
                padded_size,
                digest: file.digest(),
                digest_offset: 0,
                aes_key_offset: 0,
            });
        }

        // Group into buckets, preserving insertion order inside each bucket.
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.bucket_count];
        for (i, placement) in placements.iter().enumerate() {
            buckets[(placement.hash % self.bucket_count as u64) as usize].push(i);
        }

        let header_size = 4 + 4 + 4 * 5 + self.salt.len() as u64;
        let buckets_offset = header_size;
        let records_offset = buckets_offset + (self.bucket_count * BUCKET_RECORD_SIZE) as u64;
        let mut extras_offset = records_offset + (self.files.len() * FILE_RECORD_SIZE) as u64;

        for (i, file) in self.files.iter().enumerate() {
            if let Some(range_count) = placements[i].digest.as_ref().map(|d| d.ranges.len()) {
                placements[i].digest_offset = extras_offset;
                extras_offset += 32 + 4 + 16 * range_count as u64;
            }
            if let Some(key) = &file.aes_key {
                placements[i].aes_key_offset = extras_offset;
                extras_offset += 16 + 4 + 16 * key.ranges.len() as u64;
            }
        }
        let total_size = extras_offset;

        let mut writer = Cursor::new(Vec::with_capacity(total_size as usize));
        Bhd5Prologue {
            endian_marker: if self.big_endian { 0 } else { -1 },
            padding: [0; 3],
        }
        .write_le(&mut writer)?;
        Bhd5Header {
            version: 1,
            file_size: to_i32(total_size)?,
            bucket_count: to_i32(self.bucket_count as u64)?,
            buckets_offset: to_i32(buckets_offset)?,
            salt: self.salt.as_bytes().to_vec(),
        }
        .write_options(&mut writer, endian, ())?;

        let mut next_record = records_offset;
        for bucket in &buckets {
            BucketRecord {
                header_count: to_i32(bucket.len() as u64)?,
                headers_offset: to_i32(next_record)?,
            }
            .write_options(&mut writer, endian, ())?;
            next_record += (bucket.len() * FILE_RECORD_SIZE) as u64;
        }

        for bucket in &buckets {
            for &i in bucket {
                self.write_record(&mut writer, endian, &placements[i])?;
            }
        }

        for (i, file) in self.files.iter().enumerate() {
            if let Some(digest) = &placements[i].digest {
                writer.seek(SeekFrom::Start(placements[i].digest_offset))?;
                DigestRecord {
                    sha256: digest.sha256,
                    ranges: digest.ranges.clone(),
                }
                .write_options(&mut writer, endian, ())?;
            }
            if let Some(key) = &file.aes_key {
                writer.seek(SeekFrom::Start(placements[i].aes_key_offset))?;
                AesKeyRecord {
                    key: key.key,
                    ranges: key.ranges.clone(),
                }
                .write_options(&mut writer, endian, ())?;
            }
        }

        Ok((writer.into_inner(), bdt))
    }

    /// Build and write `<dir>/<name>.bhd` and `<dir>/<name>.bdt`.
    pub fn write_to_dir(&self, dir: &Utf8Path, name: &str) -> Result<()> {
        let (bhd, bdt) = self.build()?;
        std::fs::create_dir_all(dir.as_std_path())?;
        std::fs::write(dir.join(format!("{}.bhd", name)).as_std_path(), bhd)?;
        std::fs::write(dir.join(format!("{}.bdt", name)).as_std_path(), bdt)?;
        Ok(())
    }

    fn write_record(
        &self,
        writer: &mut Cursor<Vec<u8>>,
        endian: Endian,
        placement: &Placement,
    ) -> Result<()> {
        match self.format {
            ArchiveFormat::EldenRing => EldenRingRecord {
                hash: placement.hash,
                padded_size: to_i32(placement.padded_size)?,
                size: to_i32(placement.size)?,
                offset: placement.offset as i64,
                digest_offset: placement.digest_offset as i64,
                aes_key_offset: placement.aes_key_offset as i64,
            }
            .write_options(writer, endian, ())?,
            ArchiveFormat::DarkSouls3 => DarkSouls3Record {
                hash: u32::try_from(placement.hash).map_err(|_| {
                    Error::Other(format!(
                        "hash {:016x} does not fit a 32-bit record",
                        placement.hash
                    ))
                })?,
                padded_size: to_i32(placement.padded_size)?,
                offset: placement.offset as i64,
                digest_offset: placement.digest_offset as i64,
                aes_key_offset: placement.aes_key_offset as i64,
                size: placement.size as i64,
            }
            .write_options(writer, endian, ())?,
        }
        Ok(())
    }
}

fn to_i32(value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::Other(format!("value {} exceeds i32 range", value)))
}
