//! Assembling the usual stack: a project directory over a game's archives.

use crate::archive::{ArchiveVirtualFileSystem, ReadOptions};
use crate::config::VfsConfig;
use crate::dictionary::NameDictionary;
use crate::error::Result;
use crate::overlay::OverlayVirtualFileSystem;
use crate::real::RealFileSystem;
use crate::vfs::VirtualFileSystem;
use camino::Utf8Path;
use std::sync::Arc;

/// A mounted game: its archives, an optional project layer and the overlay
/// composing them.
#[derive(Debug, Clone)]
pub struct GameMount {
    pub archives: Arc<ArchiveVirtualFileSystem>,
    pub project: Option<Arc<RealFileSystem>>,
    pub overlay: OverlayVirtualFileSystem,
}

impl GameMount {
    /// Mount the shards in `game_dir` according to `config`.
    ///
    /// The project directory, when configured, is the writable top layer; the
    /// archives sit below it.
    pub fn open(game_dir: impl AsRef<Utf8Path>, config: &VfsConfig, read: ReadOptions) -> Result<Self> {
        let game_dir = game_dir.as_ref();

        let dictionary = match &config.dictionary {
            Some(path) => NameDictionary::load(config.path_hash_algorithm(), path, read.sink.as_ref())?,
            None => {
                tracing::warn!("No name dictionary configured, archive files will only be reachable by hash");
                NameDictionary::new(config.path_hash_algorithm())
            }
        };

        let archives = Arc::new(ArchiveVirtualFileSystem::mount_dir(
            game_dir, config, &dictionary, read,
        )?);

        let project = config
            .project_dir
            .as_ref()
            .map(|dir| Arc::new(RealFileSystem::new(dir.clone())));

        let mut layers: Vec<Arc<dyn VirtualFileSystem>> = Vec::with_capacity(2);
        if let Some(project) = &project {
            layers.push(project.clone());
        }
        layers.push(archives.clone());

        Ok(Self {
            archives,
            project,
            overlay: OverlayVirtualFileSystem::new(layers),
        })
    }
}
