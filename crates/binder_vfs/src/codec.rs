//! Seams for the decryption and decompression primitives.
//!
//! The VFS never implements ciphers or container codecs itself; it calls these
//! traits only when a file's header (encryption metadata) or its container magic
//! requires it.

use crate::error::Result;

/// Magic at the start of a DCX-compressed container.
pub const DCX_MAGIC: [u8; 4] = *b"DCX\0";

/// Decrypts a byte range of an archived file.
pub trait Decryptor: Send + Sync {
    /// Decrypt `data` with a 128-bit key. `iv` is present only for chained modes.
    fn decrypt(&self, data: &[u8], key: &[u8; 16], iv: Option<&[u8; 16]>) -> Result<Vec<u8>>;
}

/// Decompresses container payloads.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Whether `data` is a container this decompressor should unpack.
    fn is_compressed(&self, data: &[u8]) -> bool {
        data.starts_with(&DCX_MAGIC)
    }
}

impl<F> Decryptor for F
where
    F: Fn(&[u8], &[u8; 16], Option<&[u8; 16]>) -> Result<Vec<u8>> + Send + Sync,
{
    fn decrypt(&self, data: &[u8], key: &[u8; 16], iv: Option<&[u8; 16]>) -> Result<Vec<u8>> {
        self(data, key, iv)
    }
}
