//! Mount configuration stored as TOML.

use crate::archive::ArchiveFormat;
use crate::error::Result;
use crate::hash::PathHashAlgorithm;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// Default configuration file name, looked up next to a game directory.
pub const CONFIG_FILE_NAME: &str = "binder-vfs.toml";

/// What to do when a file's digest does not match its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Report the mismatch and return the data anyway.
    #[default]
    Warn,
    /// Report the mismatch and fail the read.
    Strict,
}

/// Configuration for mounting a game's archives and an optional project layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Path hash algorithm. When unset, the archive format's default is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<PathHashAlgorithm>,
    pub archive_format: ArchiveFormat,
    pub integrity: IntegrityPolicy,
    /// Scan all headers by hash when a path is not in the resolved index.
    pub fallback_lookup: bool,
    /// Explicit shard mount order. When unset, shards are discovered and
    /// sorted by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards: Option<Vec<String>>,
    /// Dictionary file or directory of dictionary files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<Utf8PathBuf>,
    /// Writable directory layered over the archives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<Utf8PathBuf>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: None,
            archive_format: ArchiveFormat::default(),
            integrity: IntegrityPolicy::default(),
            fallback_lookup: true,
            shards: None,
            dictionary: None,
            project_dir: None,
        }
    }
}

impl VfsConfig {
    /// Defaults matching an archive layout, including its hash algorithm.
    pub fn for_format(format: ArchiveFormat) -> Self {
        Self {
            archive_format: format,
            ..Self::default()
        }
    }

    /// The configured hash algorithm, or the archive format's default.
    pub fn path_hash_algorithm(&self) -> PathHashAlgorithm {
        self.hash_algorithm
            .unwrap_or_else(|| self.archive_format.default_hash_algorithm())
    }

    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    ///
    /// Relative `dictionary` and `project_dir` entries are resolved against
    /// the file's directory.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path.as_std_path())?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            config.dictionary = config.dictionary.map(|p| absolutize(base, p));
            config.project_dir = config.project_dir.map(|p| absolutize(base, p));
        }

        tracing::debug!("Loaded config from {}", path);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as TOML, omitting unset optional keys.
    pub fn save(&self, path: impl AsRef<Utf8Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Other(e.to_string()))?;
        fs::write(path.as_ref().as_std_path(), content)?;
        Ok(())
    }
}

fn absolutize(base: &Utf8Path, path: Utf8PathBuf) -> Utf8PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VfsConfig::from_toml_str("").unwrap();
        assert_eq!(config, VfsConfig::default());
        assert!(config.fallback_lookup);
        assert_eq!(config.integrity, IntegrityPolicy::Warn);
        assert_eq!(config.hash_algorithm, None);
        assert_eq!(config.path_hash_algorithm(), PathHashAlgorithm::Prime133);
    }

    #[test]
    fn test_hash_algorithm_follows_format() {
        let config = VfsConfig::from_toml_str(r#"archive_format = "dark-souls3""#).unwrap();
        assert_eq!(config.path_hash_algorithm(), PathHashAlgorithm::Prime37);
        assert_eq!(
            VfsConfig::for_format(ArchiveFormat::DarkSouls3).path_hash_algorithm(),
            PathHashAlgorithm::Prime37
        );

        // An explicit key still wins.
        let config = VfsConfig::from_toml_str(
            "archive_format = \"dark-souls3\"\nhash_algorithm = \"prime133\"\n",
        )
        .unwrap();
        assert_eq!(config.path_hash_algorithm(), PathHashAlgorithm::Prime133);
    }

    #[test]
    fn test_parse_all_keys() {
        let config = VfsConfig::from_toml_str(
            r#"
            hash_algorithm = "prime37"
            archive_format = "dark-souls3"
            integrity = "strict"
            fallback_lookup = false
            shards = ["Data1", "Data0"]
            dictionary = "names.txt"
            project_dir = "project"
            "#,
        )
        .unwrap();

        assert_eq!(config.hash_algorithm, Some(PathHashAlgorithm::Prime37));
        assert_eq!(config.archive_format, ArchiveFormat::DarkSouls3);
        assert_eq!(config.integrity, IntegrityPolicy::Strict);
        assert!(!config.fallback_lookup);
        assert_eq!(
            config.shards,
            Some(vec!["Data1".to_string(), "Data0".to_string()])
        );
        assert_eq!(config.dictionary.as_deref(), Some(Utf8Path::new("names.txt")));
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        assert!(matches!(
            VfsConfig::from_toml_str(r#"integrity = "paranoid""#),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let path = root.join(CONFIG_FILE_NAME);
        fs::write(&path, "dictionary = \"names.txt\"\n").unwrap();

        let config = VfsConfig::load(&path).unwrap();
        assert_eq!(config.dictionary, Some(root.join("names.txt")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("vfs.toml");
        let mut config = VfsConfig::for_format(ArchiveFormat::DarkSouls3);
        config.shards = Some(vec!["Data0".into()]);
        config.save(&path).unwrap();

        assert_eq!(VfsConfig::load(&path).unwrap(), config);
        assert_eq!(
            VfsConfig::load_or_default(path.with_file_name("missing.toml")).unwrap(),
            VfsConfig::default()
        );
    }
}
