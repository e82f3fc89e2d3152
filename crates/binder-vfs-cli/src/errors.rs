use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Game directory not found: {path}")]
    #[diagnostic(
        code(mount::game_dir_missing),
        help("Pass the directory containing the .bhd/.bdt files with --game-dir")
    )]
    GameDirMissing { path: Utf8PathBuf },

    #[error("Failed to load config file {path}")]
    #[diagnostic(
        code(config::load_failed),
        help("Check binder-vfs.toml for syntax errors and unknown values")
    )]
    ConfigLoad {
        path: Utf8PathBuf,
        #[source]
        source: binder_vfs::Error,
    },

    #[error("No archive shards could be mounted from {path}")]
    #[diagnostic(
        code(mount::no_shards),
        help("Make sure the index files are decrypted; run `bvfs info` for the reason each shard was skipped")
    )]
    NoShards { path: Utf8PathBuf },

    #[error("File not found: {path}")]
    #[diagnostic(
        code(file::not_found),
        help("Paths are case-insensitive; files missing from the name dictionary are only found by exact path")
    )]
    FileNotFound { path: String },

    #[error("Directory not found: {path}")]
    #[diagnostic(code(file::directory_not_found))]
    DirectoryNotFound { path: String },

    #[error("Failed to extract {failed} of {total} files")]
    #[diagnostic(
        code(extract::partial),
        help("Encrypted files need a decryptor; rerun with -v to see each failure")
    )]
    ExtractIncomplete { failed: usize, total: usize },

    #[error(transparent)]
    #[diagnostic(code(vfs::error))]
    Vfs(#[from] binder_vfs::Error),
}
