use super::open_mount;
use crate::errors::CliError;
use crate::MountArgs;
use binder_vfs::{PathKey, VirtualFile, VirtualFileSystem};
use camino::Utf8PathBuf;
use miette::{IntoDiagnostic, Result};
use std::io::Write;

pub struct CatArgs {
    pub mount: MountArgs,
    pub path: String,
    pub output: Option<Utf8PathBuf>,
}

pub fn cat_file(args: CatArgs) -> Result<()> {
    let mount = open_mount(&args.mount)?;
    let key = PathKey::parse(&args.path);

    let file = mount
        .overlay
        .try_get_file(&key)
        .ok_or_else(|| CliError::FileNotFound {
            path: args.path.clone(),
        })?;
    let data = file.read_bytes().map_err(CliError::from)?;

    match args.output {
        Some(output) => {
            if let Some(parent) = output.parent().filter(|p| !p.as_str().is_empty()) {
                std::fs::create_dir_all(parent).into_diagnostic()?;
            }
            std::fs::write(&output, &data).into_diagnostic()?;
            tracing::info!("Wrote {} bytes to {}", data.len(), output);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data).into_diagnostic()?;
            stdout.flush().into_diagnostic()?;
        }
    }

    Ok(())
}
