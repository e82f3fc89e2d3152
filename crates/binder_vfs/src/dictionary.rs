//! Name dictionary for recovering archive paths from their hashes.

use crate::diagnostics::{self, DiagnosticEvent, DiagnosticSink, LogOnlySink};
use crate::error::Result;
use crate::hash::{format_path_hash, PathHashAlgorithm};
use crate::path::PathKey;
use camino::Utf8Path;
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use walkdir::WalkDir;

/// Maps path hashes to canonical paths.
///
/// Archives store only the hash of each path. The dictionary is built from
/// newline-delimited lists of known paths; each line is canonicalised and
/// hashed with the configured algorithm.
#[derive(Debug, Clone, Default)]
pub struct NameDictionary {
    algorithm: PathHashAlgorithm,
    items: HashMap<u64, PathKey>,
}

impl NameDictionary {
    /// Create an empty dictionary hashing with `algorithm`.
    pub fn new(algorithm: PathHashAlgorithm) -> Self {
        Self {
            algorithm,
            items: HashMap::new(),
        }
    }

    /// Build a dictionary from an in-memory list of paths.
    pub fn from_paths<I, S>(algorithm: PathHashAlgorithm, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dictionary = Self::new(algorithm);
        for path in paths {
            dictionary.insert(path.as_ref(), &LogOnlySink);
        }
        dictionary
    }

    /// Load every file under `dir` recursively. A missing directory yields an
    /// empty dictionary.
    pub fn from_directory(
        algorithm: PathHashAlgorithm,
        dir: impl AsRef<Utf8Path>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self> {
        let mut dictionary = Self::new(algorithm);
        dictionary.add_from_dir(dir, sink)?;
        Ok(dictionary)
    }

    /// Load a dictionary file, or every file of a dictionary directory.
    pub fn load(
        algorithm: PathHashAlgorithm,
        path: impl AsRef<Utf8Path>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut dictionary = Self::new(algorithm);
        if path.is_dir() {
            dictionary.add_from_dir(path, sink)?;
        } else {
            dictionary.add_from_file(&File::open(path.as_std_path())?, sink)?;
        }
        tracing::info!("Loaded {} dictionary entries from {}", dictionary.len(), path);
        Ok(dictionary)
    }

    /// Add every file under `dir`, in file name order. A missing directory
    /// adds nothing.
    pub fn add_from_dir(&mut self, dir: impl AsRef<Utf8Path>, sink: &dyn DiagnosticSink) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(());
        }

        let files = WalkDir::new(dir.as_std_path())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|x| x.ok())
            .filter(|entry| entry.file_type().is_file());

        for entry in files {
            self.add_from_file(&File::open(entry.path())?, sink)?;
        }
        Ok(())
    }

    /// Add one path per line of an open file.
    pub fn add_from_file(&mut self, file: &File, sink: &dyn DiagnosticSink) -> Result<()> {
        self.add_from_reader(file, sink)
    }

    /// Add one path per line. Blank lines and `#` comments are skipped, as
    /// are lines that are not valid UTF-8.
    pub fn add_from_reader(&mut self, reader: impl Read, sink: &dyn DiagnosticSink) -> Result<()> {
        for (number, line) in BufReader::new(reader).split(b'\n').enumerate() {
            let line = line?;
            match std::str::from_utf8(&line) {
                Ok(line) => {
                    self.insert(line, sink);
                }
                Err(err) => {
                    tracing::warn!("Skipping dictionary line {}: {}", number + 1, err);
                }
            }
        }
        Ok(())
    }

    /// Add one path per line of `text`.
    pub fn add_from_str(&mut self, text: &str, sink: &dyn DiagnosticSink) {
        for line in text.lines() {
            self.insert(line, sink);
        }
    }

    /// Add a single path. Returns its hash, or `None` when the line was skipped.
    pub fn insert(&mut self, line: &str, sink: &dyn DiagnosticSink) -> Option<u64> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let key = PathKey::parse(line);
        if key.is_root() {
            return None;
        }
        let hash = self.algorithm.hash_key(&key);

        match self.items.entry(hash) {
            Entry::Vacant(slot) => {
                slot.insert(key);
            }
            Entry::Occupied(existing) => {
                if existing.get() != &key {
                    diagnostics::emit(
                        sink,
                        DiagnosticEvent::DictionaryCollision {
                            hash,
                            kept: existing.get().to_string(),
                            dropped: key.to_string(),
                        },
                    );
                }
            }
        }
        Some(hash)
    }

    /// The algorithm used to hash inserted paths.
    pub fn algorithm(&self) -> PathHashAlgorithm {
        self.algorithm
    }

    /// Hash a path with this dictionary's algorithm.
    pub fn hash(&self, path: &PathKey) -> u64 {
        self.algorithm.hash_key(path)
    }

    /// The path recorded for `hash`.
    pub fn resolve(&self, hash: u64) -> Option<&PathKey> {
        self.items.get(&hash)
    }

    /// Resolve a hash to its path, or to the hash in hex if unknown.
    pub fn resolve_path(&self, hash: u64) -> Cow<'_, str> {
        self.items
            .get(&hash)
            .map(|key| Cow::Owned(key.to_string()))
            .unwrap_or_else(|| Cow::Owned(format_path_hash(hash)))
    }

    /// Whether `hash` has a known path.
    pub fn contains(&self, hash: u64) -> bool {
        self.items.contains_key(&hash)
    }

    /// Forget the path recorded for `hash`.
    pub fn remove(&mut self, hash: u64) -> Option<PathKey> {
        self.items.remove(&hash)
    }

    /// Number of distinct hashes with a known path.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All `(hash, path)` pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &PathKey)> {
        self.items.iter().map(|(hash, key)| (*hash, key))
    }
}
