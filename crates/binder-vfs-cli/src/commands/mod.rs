mod cat;
mod extract;
mod info;
mod ls;

pub use cat::*;
pub use extract::*;
pub use info::*;
pub use ls::*;

use crate::errors::CliError;
use crate::MountArgs;
use binder_vfs::config::CONFIG_FILE_NAME;
use binder_vfs::{GameMount, ReadOptions, VfsConfig};

/// Resolve the effective config: an explicit `--config`, else `binder-vfs.toml`
/// in the game directory, else defaults. Command line flags win over the file.
pub fn load_config(args: &MountArgs) -> Result<VfsConfig, CliError> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| args.game_dir.join(CONFIG_FILE_NAME));

    let loaded = if args.config.is_some() {
        VfsConfig::load(&path)
    } else {
        VfsConfig::load_or_default(&path)
    };
    let mut config = loaded.map_err(|source| CliError::ConfigLoad { path, source })?;

    if let Some(dictionary) = &args.dictionary {
        config.dictionary = Some(dictionary.clone());
    }
    if let Some(project_dir) = &args.project_dir {
        config.project_dir = Some(project_dir.clone());
    }
    Ok(config)
}

pub fn open_mount(args: &MountArgs) -> Result<GameMount, CliError> {
    if !args.game_dir.is_dir() {
        return Err(CliError::GameDirMissing {
            path: args.game_dir.clone(),
        });
    }

    let config = load_config(args)?;
    let mount = GameMount::open(&args.game_dir, &config, ReadOptions::default())?;
    Ok(mount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn mount_args(game_dir: &Utf8Path) -> MountArgs {
        MountArgs {
            game_dir: game_dir.to_path_buf(),
            dictionary: None,
            project_dir: None,
            config: None,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(
            root.join(CONFIG_FILE_NAME),
            "dictionary = \"names.txt\"\nintegrity = \"strict\"\n",
        )
        .unwrap();

        let mut args = mount_args(root);
        assert_eq!(
            load_config(&args).unwrap().dictionary,
            Some(root.join("names.txt"))
        );

        args.dictionary = Some("other.txt".into());
        let config = load_config(&args).unwrap();
        assert_eq!(config.dictionary, Some("other.txt".into()));
        assert_eq!(config.integrity, binder_vfs::IntegrityPolicy::Strict);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let mut args = mount_args(root);
        assert!(load_config(&args).is_ok());

        args.config = Some(root.join("missing.toml"));
        assert!(matches!(
            load_config(&args),
            Err(CliError::ConfigLoad { .. })
        ));
    }

    #[test]
    fn io_failures_surface_as_vfs_errors() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let mut args = mount_args(root);
        args.dictionary = Some(root.join("missing.txt"));

        assert!(matches!(
            open_mount(&args),
            Err(CliError::Vfs(binder_vfs::Error::Io(_)))
        ));
    }
}
