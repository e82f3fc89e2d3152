//! Canonical virtual paths.
//!
//! Every store in this crate is addressed through a [`PathKey`]. Keys are parsed
//! from free-form text (`Map\MapStudio\m10_00_00_00.msb`, `/chr/c1234.bnd`, ...)
//! and compare case-insensitively, so the same asset resolves identically no
//! matter how a caller spells it. The original spelling is retained for display.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A canonical, case-folded path used as the universal lookup key.
///
/// A key consists of directory segments and an optional filename. When the last
/// segment of the parsed text contains a `.` it is treated as the filename;
/// otherwise the key addresses a directory.
#[derive(Clone)]
pub struct PathKey {
    directories: Vec<String>,
    file_name: Option<String>,
    /// Lower-cased absolute form, used for equality, hashing and ordering.
    canonical: String,
}

impl PathKey {
    /// The root directory (`/`).
    pub fn root() -> Self {
        Self::from_parts(Vec::new(), None)
    }

    /// Parse a path, accepting both `/` and `\` as separators.
    ///
    /// Segments are trimmed, empty segments and `.` are dropped and `..` pops the
    /// previous segment (never above the root).
    pub fn parse(text: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();
        for raw in text.split(['/', '\\']) {
            let segment = raw.trim();
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment.to_string()),
            }
        }

        let file_name = match segments.last() {
            Some(last) if last.contains('.') => segments.pop(),
            _ => None,
        };

        Self::from_parts(segments, file_name)
    }

    fn from_parts(directories: Vec<String>, file_name: Option<String>) -> Self {
        let mut canonical = String::with_capacity(
            directories.iter().map(|d| d.len() + 1).sum::<usize>()
                + file_name.as_ref().map_or(1, |f| f.len() + 1),
        );
        for dir in &directories {
            canonical.push('/');
            canonical.push_str(&dir.to_lowercase());
        }
        if let Some(name) = &file_name {
            canonical.push('/');
            canonical.push_str(&name.to_lowercase());
        }
        if canonical.is_empty() {
            canonical.push('/');
        }

        Self {
            directories,
            file_name,
            canonical,
        }
    }

    /// The lower-cased absolute form (`/chr/c1234.bnd`).
    ///
    /// This is the string path hashes are computed from.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Directory segments in their original case.
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// The filename in its original case, if this key addresses a file.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// All segments (directories followed by the filename).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.directories
            .iter()
            .map(String::as_str)
            .chain(self.file_name.as_deref())
    }

    pub fn is_root(&self) -> bool {
        self.directories.is_empty() && self.file_name.is_none()
    }

    /// Whether this key addresses a directory rather than a file.
    pub fn is_directory(&self) -> bool {
        self.file_name.is_none()
    }

    /// The last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .or_else(|| self.directories.last().map(String::as_str))
    }

    /// The directory containing this entry. The root is its own parent.
    pub fn parent(&self) -> PathKey {
        if self.file_name.is_some() {
            return self.directory();
        }
        let mut dirs = self.directories.clone();
        dirs.pop();
        Self::from_parts(dirs, None)
    }

    /// The directory part of this key (the key itself for directories).
    pub fn directory(&self) -> PathKey {
        Self::from_parts(self.directories.clone(), None)
    }

    /// This key with every segment, including a filename, read as a directory.
    pub fn as_directory(&self) -> PathKey {
        let mut dirs = self.directories.clone();
        dirs.extend(self.file_name.clone());
        Self::from_parts(dirs, None)
    }

    /// Append a filename to this key's directory part.
    pub fn join_file(&self, name: &str) -> PathKey {
        Self::from_parts(self.directories.clone(), Some(name.to_string()))
    }

    /// Append a directory segment to this key's directory part.
    pub fn join_dir(&self, name: &str) -> PathKey {
        let mut dirs = self.directories.clone();
        dirs.push(name.to_string());
        Self::from_parts(dirs, None)
    }

    /// Whether `self` is `other` or lies underneath it (case-insensitive).
    pub fn starts_with(&self, other: &PathKey) -> bool {
        if other.is_root() {
            return true;
        }
        self.canonical == other.canonical
            || self
                .canonical
                .strip_prefix(other.canonical.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl PartialEq for PathKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PathKey {}

impl Hash for PathKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for PathKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for segment in self.segments() {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathKey({})", self)
    }
}

impl From<&str> for PathKey {
    fn from(text: &str) -> Self {
        PathKey::parse(text)
    }
}

impl From<String> for PathKey {
    fn from(text: String) -> Self {
        PathKey::parse(&text)
    }
}

impl From<&PathKey> for PathKey {
    fn from(key: &PathKey) -> Self {
        key.clone()
    }
}

impl FromStr for PathKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PathKey::parse(s))
    }
}

impl Serialize for PathKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
