//! Binder archive header index (BHD5).
//!
//! A shard's `.bhd` file is a hash table: a fixed header, a bucket table, and
//! per-file records carrying the path hash, location inside the paired `.bdt`
//! data file and optional encryption / digest metadata. Records are assigned to
//! bucket `hash % bucket_count`.
//!
//! Parsing is strict: any structural problem, including a header that is still
//! encrypted, fails with [`Error::InvalidArchiveIndex`]. Once parsed the index is
//! immutable, and headers inside each bucket are sorted by hash so lookups are a
//! binary search.

use crate::error::{Error, Result};
use crate::hash::PathHashAlgorithm;
use binrw::{binrw, BinRead, Endian};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Seek, SeekFrom};

/// Size in bytes of one file record (both layouts).
pub const FILE_RECORD_SIZE: usize = 40;

/// Size in bytes of one bucket record.
pub const BUCKET_RECORD_SIZE: usize = 8;

/// Record layout of a shard's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// 32-bit hashes, unpadded size stored last.
    DarkSouls3,
    /// 64-bit hashes, unpadded size stored next to the padded size.
    #[default]
    EldenRing,
}

impl ArchiveFormat {
    /// The hash scheme this layout's records are keyed with.
    pub fn default_hash_algorithm(self) -> PathHashAlgorithm {
        match self {
            ArchiveFormat::DarkSouls3 => PathHashAlgorithm::Prime37,
            ArchiveFormat::EldenRing => PathHashAlgorithm::Prime133,
        }
    }
}

#[binrw]
#[brw(magic = b"BHD5")]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bhd5Prologue {
    /// `-1` for little-endian, `0` for big-endian.
    pub endian_marker: i8,
    pub padding: [u8; 3],
}

#[binrw]
#[derive(Debug, Clone)]
pub(crate) struct Bhd5Header {
    pub version: i32,
    pub file_size: i32,
    pub bucket_count: i32,
    pub buckets_offset: i32,
    #[br(temp, assert(salt_len >= 0 && salt_len <= 0x1000))]
    #[bw(calc = salt.len() as i32)]
    salt_len: i32,
    #[br(count = salt_len as usize)]
    pub salt: Vec<u8>,
}

#[binrw]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BucketRecord {
    pub header_count: i32,
    pub headers_offset: i32,
}

#[binrw]
#[derive(Debug, Clone, Copy)]
pub(crate) struct EldenRingRecord {
    pub hash: u64,
    pub padded_size: i32,
    pub size: i32,
    pub offset: i64,
    pub digest_offset: i64,
    pub aes_key_offset: i64,
}

#[binrw]
#[derive(Debug, Clone, Copy)]
pub(crate) struct DarkSouls3Record {
    pub hash: u32,
    pub padded_size: i32,
    pub offset: i64,
    pub digest_offset: i64,
    pub aes_key_offset: i64,
    pub size: i64,
}

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

impl ByteRange {
    /// Half-open range `start..end` of file offsets.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Unused ranges are stored as `(-1, -1)`.
    pub fn is_used(&self) -> bool {
        self.start >= 0 && self.end > self.start
    }

    /// Clamp this range to a buffer of `len` bytes.
    pub(crate) fn clamp(&self, len: usize) -> Option<std::ops::Range<usize>> {
        if !self.is_used() {
            return None;
        }
        let start = usize::try_from(self.start).ok()?.min(len);
        let end = usize::try_from(self.end).ok()?.min(len);
        (start < end).then_some(start..end)
    }
}

#[binrw]
#[derive(Debug, Clone)]
pub(crate) struct DigestRecord {
    pub sha256: [u8; 32],
    #[br(temp, assert(range_count >= 0 && range_count <= 0x1000))]
    #[bw(calc = ranges.len() as i32)]
    range_count: i32,
    #[br(count = range_count as usize)]
    pub ranges: Vec<ByteRange>,
}

#[binrw]
#[derive(Debug, Clone)]
pub(crate) struct AesKeyRecord {
    pub key: [u8; 16],
    #[br(temp, assert(range_count >= 0 && range_count <= 0x1000))]
    #[bw(calc = ranges.len() as i32)]
    range_count: i32,
    #[br(count = range_count as usize)]
    pub ranges: Vec<ByteRange>,
}

/// Per-file AES key and the ranges of the file it covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AesKey {
    pub key: [u8; 16],
    /// Only present for chained cipher modes; BHD5 stores ECB keys.
    pub iv: Option<[u8; 16]>,
    pub ranges: Vec<ByteRange>,
}

/// SHA-256 digest over selected ranges of a file's decrypted contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDigest {
    pub sha256: [u8; 32],
    pub ranges: Vec<ByteRange>,
}

impl FileDigest {
    /// Compute the digest of `data` over `ranges`.
    ///
    /// With no used ranges the digest covers the whole buffer.
    pub fn compute(data: &[u8], ranges: Vec<ByteRange>) -> Self {
        let sha256 = digest_ranges(data, &ranges);
        Self { sha256, ranges }
    }

    /// Whether `data` hashes to the recorded digest over the same ranges.
    pub fn verify(&self, data: &[u8]) -> bool {
        digest_ranges(data, &self.ranges) == self.sha256
    }
}

fn digest_ranges(data: &[u8], ranges: &[ByteRange]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    if ranges.iter().any(ByteRange::is_used) {
        for range in ranges.iter().filter_map(|r| r.clamp(data.len())) {
            hasher.update(&data[range]);
        }
    } else {
        hasher.update(data);
    }
    hasher.finalize().into()
}

/// Location and crypto metadata of one archived file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHeader {
    pub hash: u64,
    pub offset: u64,
    /// Unpadded size; `0` when the layout does not record it.
    pub size: u64,
    /// Size on disk including cipher padding.
    pub padded_size: u64,
    pub aes_key: Option<AesKey>,
    pub digest: Option<FileDigest>,
}

impl FileHeader {
    /// Number of bytes to read from the data file.
    pub fn stored_size(&self) -> u64 {
        if self.padded_size > 0 {
            self.padded_size
        } else {
            self.size
        }
    }

    /// Logical file size after decryption.
    pub fn logical_size(&self) -> u64 {
        if self.size > 0 {
            self.size
        } else {
            self.padded_size
        }
    }

    /// Whether the stored bytes need decrypting before use.
    pub fn is_encrypted(&self) -> bool {
        self.aes_key.is_some()
    }
}

/// Headers sharing `hash % bucket_count`, sorted by hash.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    headers: Vec<FileHeader>,
}

impl Bucket {
    /// Headers in this bucket, sorted by hash.
    pub fn headers(&self) -> &[FileHeader] {
        &self.headers
    }

    /// All headers with `hash`, in stored order.
    pub fn find(&self, hash: u64) -> &[FileHeader] {
        let start = self.headers.partition_point(|h| h.hash < hash);
        let end = self.headers.partition_point(|h| h.hash <= hash);
        &self.headers[start..end]
    }
}

/// Parsed, immutable header index of one archive shard.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    format: ArchiveFormat,
    endian: Endian,
    salt: String,
    buckets: Vec<Bucket>,
    file_count: usize,
}

impl ArchiveIndex {
    /// Parse a decrypted `.bhd` file.
    pub fn parse(bytes: &[u8], format: ArchiveFormat) -> Result<Self> {
        parse_index(bytes, format).map_err(|err| match err {
            Error::InvalidArchiveIndex { .. } => err,
            other => Error::invalid_index("<memory>", other.to_string()),
        })
    }

    /// Read and parse a `.bhd` file from disk.
    pub fn read_file(path: &camino::Utf8Path, format: ArchiveFormat) -> Result<Self> {
        let bytes = std::fs::read(path.as_std_path())?;
        Self::parse(&bytes, format).map_err(|err| err.with_shard(path.as_str()))
    }

    /// Record layout the index was parsed with.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Whether the index was stored big-endian.
    pub fn is_big_endian(&self) -> bool {
        self.endian == Endian::Big
    }

    /// Salt string from the header, empty when absent.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Number of hash buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Buckets in stored order.
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Total number of file records across all buckets.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Index of the bucket owning `hash`.
    pub fn bucket_for(&self, hash: u64) -> Option<usize> {
        let count = self.buckets.len() as u64;
        (count > 0).then(|| (hash % count) as usize)
    }

    /// Find the header for `hash`. When several records share the hash the
    /// first stored one is returned; see [`lookup_all`](Self::lookup_all).
    pub fn lookup(&self, hash: u64) -> Option<&FileHeader> {
        self.lookup_all(hash).first()
    }

    /// All headers recorded under `hash`.
    pub fn lookup_all(&self, hash: u64) -> &[FileHeader] {
        match self.bucket_for(hash) {
            Some(bucket) => self.buckets[bucket].find(hash),
            None => &[],
        }
    }

    /// Every header, in bucket order then hash order.
    pub fn headers(&self) -> impl Iterator<Item = &FileHeader> {
        self.buckets.iter().flat_map(|b| b.headers.iter())
    }
}

impl Error {
    /// Attach a shard name to an [`Error::InvalidArchiveIndex`].
    pub(crate) fn with_shard(self, name: &str) -> Self {
        match self {
            Error::InvalidArchiveIndex { reason, .. } => Error::InvalidArchiveIndex {
                shard: name.to_string(),
                reason,
            },
            other => other,
        }
    }
}

fn parse_index(bytes: &[u8], format: ArchiveFormat) -> Result<ArchiveIndex> {
    let mut reader = Cursor::new(bytes);

    let prologue = match Bhd5Prologue::read_le(&mut reader) {
        Ok(p) => p,
        Err(binrw::Error::BadMagic { .. }) => {
            return Err(Error::invalid_index(
                "<memory>",
                "missing BHD5 magic (header may still be encrypted)",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let endian = match prologue.endian_marker {
        -1 => Endian::Little,
        0 => Endian::Big,
        other => {
            return Err(Error::invalid_index(
                "<memory>",
                format!("unknown endianness marker {}", other),
            ))
        }
    };

    let header = Bhd5Header::read_options(&mut reader, endian, ())?;
    if header.version != 1 {
        return Err(Error::invalid_index(
            "<memory>",
            format!("unsupported version {}", header.version),
        ));
    }
    if header.bucket_count < 0 || header.buckets_offset < 0 {
        return Err(Error::invalid_index("<memory>", "negative bucket table"));
    }

    let bucket_count = header.bucket_count as usize;
    check_table_fits(
        bytes.len(),
        header.buckets_offset as u64,
        bucket_count,
        BUCKET_RECORD_SIZE,
    )?;

    reader.seek(SeekFrom::Start(header.buckets_offset as u64))?;
    let mut bucket_records = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        bucket_records.push(BucketRecord::read_options(&mut reader, endian, ())?);
    }

    let mut buckets = Vec::with_capacity(bucket_count);
    let mut file_count = 0usize;
    for (bucket_index, record) in bucket_records.iter().enumerate() {
        if record.header_count < 0 || record.headers_offset < 0 {
            return Err(Error::invalid_index(
                "<memory>",
                format!("bucket {} has a negative count or offset", bucket_index),
            ));
        }
        let count = record.header_count as usize;
        check_table_fits(
            bytes.len(),
            record.headers_offset as u64,
            count,
            FILE_RECORD_SIZE,
        )?;

        let mut headers = Vec::with_capacity(count);
        for i in 0..count {
            reader.seek(SeekFrom::Start(
                record.headers_offset as u64 + (i * FILE_RECORD_SIZE) as u64,
            ))?;
            let header = read_file_header(&mut reader, endian, format)?;
            if bucket_count > 0 && (header.hash % bucket_count as u64) as usize != bucket_index {
                tracing::trace!(
                    "Header {:016x} stored in bucket {} instead of {}",
                    header.hash,
                    bucket_index,
                    header.hash % bucket_count as u64
                );
            }
            headers.push(header);
        }
        // Stable: records sharing a hash keep their stored order.
        headers.sort_by_key(|h| h.hash);
        file_count += headers.len();
        buckets.push(Bucket { headers });
    }

    Ok(ArchiveIndex {
        format,
        endian,
        salt: String::from_utf8_lossy(&header.salt).into_owned(),
        buckets,
        file_count,
    })
}

fn check_table_fits(len: usize, offset: u64, count: usize, record_size: usize) -> Result<()> {
    let end = (count as u64)
        .checked_mul(record_size as u64)
        .and_then(|size| size.checked_add(offset));
    match end {
        Some(end) if end <= len as u64 => Ok(()),
        _ => Err(Error::invalid_index(
            "<memory>",
            format!(
                "table of {} records at offset {:#x} exceeds index size {:#x}",
                count, offset, len
            ),
        )),
    }
}

fn read_file_header(
    reader: &mut Cursor<&[u8]>,
    endian: Endian,
    format: ArchiveFormat,
) -> Result<FileHeader> {
    let (hash, padded_size, size, offset, digest_offset, aes_key_offset) = match format {
        ArchiveFormat::EldenRing => {
            let r = EldenRingRecord::read_options(reader, endian, ())?;
            (
                r.hash,
                i64::from(r.padded_size),
                i64::from(r.size),
                r.offset,
                r.digest_offset,
                r.aes_key_offset,
            )
        }
        ArchiveFormat::DarkSouls3 => {
            let r = DarkSouls3Record::read_options(reader, endian, ())?;
            (
                u64::from(r.hash),
                i64::from(r.padded_size),
                r.size,
                r.offset,
                r.digest_offset,
                r.aes_key_offset,
            )
        }
    };

    if padded_size < 0 || size < 0 || offset < 0 || digest_offset < 0 || aes_key_offset < 0 {
        return Err(Error::invalid_index(
            "<memory>",
            format!("record {:016x} has a negative size or offset", hash),
        ));
    }

    let digest = if digest_offset > 0 {
        reader.seek(SeekFrom::Start(digest_offset as u64))?;
        let record = DigestRecord::read_options(reader, endian, ())?;
        Some(FileDigest {
            sha256: record.sha256,
            ranges: record.ranges,
        })
    } else {
        None
    };

    let aes_key = if aes_key_offset > 0 {
        reader.seek(SeekFrom::Start(aes_key_offset as u64))?;
        let record = AesKeyRecord::read_options(reader, endian, ())?;
        Some(AesKey {
            key: record.key,
            iv: None,
            ranges: record.ranges,
        })
    } else {
        None
    };

    Ok(FileHeader {
        hash,
        offset: offset as u64,
        size: size as u64,
        padded_size: padded_size as u64,
        aes_key,
        digest,
    })
}
