//! Path hashing used by binder archive indexes.
//!
//! Archives carry no filenames; every record is keyed by a hash of the file's
//! canonical path. The hash is a simple multiplicative string hash over the
//! lower-cased, slash-normalised absolute path (`/chr/c1234.bnd`). Older games
//! use a 32-bit accumulator with multiplier 37, newer ones a 64-bit accumulator
//! with multiplier 0x85.

use crate::path::PathKey;
use serde::{Deserialize, Serialize};

/// Formats a path hash as a hexadecimal string.
pub fn format_path_hash(path_hash: u64) -> String {
    format!("{:016x}", path_hash)
}

/// The hashing scheme an archive's records were keyed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathHashAlgorithm {
    /// 32-bit wrapping accumulator, multiplier 37.
    Prime37,
    /// 64-bit wrapping accumulator, multiplier 0x85.
    #[default]
    Prime133,
}

impl PathHashAlgorithm {
    /// Hash raw text. The text is normalised the same way [`PathKey`] does.
    pub fn hash_str(self, path: &str) -> u64 {
        self.hash_key(&PathKey::parse(path))
    }

    /// Hash a canonical path key.
    pub fn hash_key(self, key: &PathKey) -> u64 {
        self.hash_canonical(key.canonical())
    }

    /// Hash an already canonical string (lower-case, `/`-separated, absolute).
    pub fn hash_canonical(self, canonical: &str) -> u64 {
        match self {
            PathHashAlgorithm::Prime37 => {
                let mut hash: u32 = 0;
                for byte in canonical.bytes() {
                    hash = hash.wrapping_mul(37).wrapping_add(u32::from(byte));
                }
                u64::from(hash)
            }
            PathHashAlgorithm::Prime133 => {
                let mut hash: u64 = 0;
                for byte in canonical.bytes() {
                    hash = hash.wrapping_mul(0x85).wrapping_add(u64::from(byte));
                }
                hash
            }
        }
    }
}
