//! Reading file contents out of a shard's bulk data file.
//!
//! An [`ArchiveAccessor`] couples a parsed [`ArchiveIndex`] with the one open
//! handle to its `.bdt` file. Reads are positioned (offset-based) and never
//! touch a shared cursor, so one accessor can serve many threads at once. The
//! handle is closed when the last reference to the accessor is dropped.

use super::index::{AesKey, ArchiveIndex, FileHeader};
use crate::codec::{Decompressor, Decryptor};
use crate::config::IntegrityPolicy;
use crate::diagnostics::{self, DiagnosticEvent, DiagnosticSink, LogOnlySink};
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::File;
use std::sync::Arc;

/// How file contents are post-processed after the raw read.
#[derive(Clone)]
pub struct ReadOptions {
    pub integrity: IntegrityPolicy,
    pub decryptor: Option<Arc<dyn Decryptor>>,
    pub decompressor: Option<Arc<dyn Decompressor>>,
    pub sink: Arc<dyn DiagnosticSink>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::default(),
            decryptor: None,
            decompressor: None,
            sink: Arc::new(LogOnlySink),
        }
    }
}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("integrity", &self.integrity)
            .field("decryptor", &self.decryptor.is_some())
            .field("decompressor", &self.decompressor.is_some())
            .finish()
    }
}

/// A file handle supporting concurrent positioned reads.
#[derive(Debug)]
struct PositionedFile {
    #[cfg(any(unix, windows))]
    file: File,
    #[cfg(not(any(unix, windows)))]
    file: parking_lot::Mutex<File>,
    len: u64,
}

impl PositionedFile {
    fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        #[cfg(not(any(unix, windows)))]
        let file = parking_lot::Mutex::new(file);
        Ok(Self { file, len })
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// One mounted shard: its index plus the open data file.
#[derive(Debug)]
pub struct ArchiveAccessor {
    shard: String,
    index: ArchiveIndex,
    data: PositionedFile,
    data_path: Option<Utf8PathBuf>,
    options: ReadOptions,
}

impl ArchiveAccessor {
    /// Open the data file at `data_path` for an already parsed index.
    pub fn open(
        shard: impl Into<String>,
        index: ArchiveIndex,
        data_path: &Utf8Path,
        options: ReadOptions,
    ) -> Result<Self> {
        let file = File::open(data_path.as_std_path())?;
        let mut accessor = Self::from_file(shard, index, file, options)?;
        accessor.data_path = Some(data_path.to_path_buf());
        Ok(accessor)
    }

    /// Wrap an already open data file.
    pub fn from_file(
        shard: impl Into<String>,
        index: ArchiveIndex,
        file: File,
        options: ReadOptions,
    ) -> Result<Self> {
        Ok(Self {
            shard: shard.into(),
            index,
            data: PositionedFile::new(file)?,
            data_path: None,
            options,
        })
    }

    /// Shard identifier (the shared stem of the `.bhd` / `.bdt` pair).
    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn data_path(&self) -> Option<&Utf8Path> {
        self.data_path.as_deref()
    }

    /// Size of the data file in bytes.
    pub fn data_len(&self) -> u64 {
        self.data.len
    }

    /// Read the stored bytes of a file without any post-processing.
    pub fn read_raw(&self, header: &FileHeader) -> Result<Vec<u8>> {
        let len = header.stored_size();
        let end = header.offset.checked_add(len);
        if end.map_or(true, |end| end > self.data.len) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "file {:016x} ({} bytes at {:#x}) lies outside data file of shard '{}' ({} bytes)",
                    header.hash, len, header.offset, self.shard, self.data.len
                ),
            )));
        }

        let mut buf = vec![0u8; len as usize];
        self.data.read_exact_at(&mut buf, header.offset)?;
        Ok(buf)
    }

    /// Read a file's contents: positioned read, decryption, size trim, digest
    /// check, then container decompression when configured.
    pub fn read_file(&self, header: &FileHeader) -> Result<Vec<u8>> {
        let mut data = self.read_raw(header)?;

        if let Some(key) = &header.aes_key {
            self.decrypt(header.hash, &mut data, key)?;
        }

        let logical = header.logical_size();
        if logical < data.len() as u64 {
            data.truncate(logical as usize);
        }

        if let Some(digest) = &header.digest {
            if !digest.verify(&data) {
                let strict = self.options.integrity == IntegrityPolicy::Strict;
                diagnostics::emit(
                    self.options.sink.as_ref(),
                    DiagnosticEvent::IntegrityMismatch {
                        shard: self.shard.clone(),
                        hash: header.hash,
                        strict,
                    },
                );
                if strict {
                    return Err(Error::IntegrityMismatch {
                        shard: self.shard.clone(),
                        hash: header.hash,
                    });
                }
            }
        }

        if let Some(decompressor) = &self.options.decompressor {
            if decompressor.is_compressed(&data) {
                data = decompressor.decompress(&data)?;
            }
        }

        Ok(data)
    }

    /// Look up `hash` in this shard's index and read it.
    pub fn read_hash(&self, hash: u64) -> Result<Option<Vec<u8>>> {
        match self.index.lookup(hash) {
            Some(header) => self.read_file(header).map(Some),
            None => Ok(None),
        }
    }

    fn decrypt(&self, hash: u64, data: &mut [u8], key: &AesKey) -> Result<()> {
        let decryptor = self
            .options
            .decryptor
            .as_ref()
            .ok_or(Error::DecryptorMissing(hash))?;

        let ranges: Vec<_> = key.ranges.iter().filter_map(|r| r.clamp(data.len())).collect();
        let ranges = if key.ranges.iter().any(|r| r.is_used()) {
            ranges
        } else {
            vec![0..data.len()]
        };

        for range in ranges {
            let plain = decryptor.decrypt(&data[range.clone()], &key.key, key.iv.as_ref())?;
            if plain.len() != range.len() {
                return Err(Error::Codec(format!(
                    "decryptor returned {} bytes for a {} byte range of {:016x}",
                    plain.len(),
                    range.len(),
                    hash
                )));
            }
            data[range].copy_from_slice(&plain);
        }
        Ok(())
    }
}
