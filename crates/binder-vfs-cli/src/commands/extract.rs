use super::open_mount;
use crate::errors::CliError;
use crate::println_pad;
use crate::MountArgs;
use binder_vfs::{format_path_hash, ArchiveFile, FileHandle, VirtualFile, VirtualFileSystem};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::Result;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Directory receiving files whose path could not be recovered.
const UNKNOWN_DIR: &str = "_unknown";

pub struct ExtractArgs {
    pub mount: MountArgs,
    pub output_dir: Utf8PathBuf,
}

/// Where `file` lands relative to the output directory.
fn relative_output_path(file: &ArchiveFile) -> Utf8PathBuf {
    match file.path() {
        Some(path) => path.segments().collect(),
        None => Utf8Path::new(UNKNOWN_DIR).join(format!("{}.bin", format_path_hash(file.hash()))),
    }
}

fn write_file(target: &Utf8Path, source: &dyn VirtualFile) -> binder_vfs::Result<()> {
    let data = source.read_bytes()?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, data)?;
    Ok(())
}

pub fn extract_all(args: ExtractArgs) -> Result<()> {
    let mount = open_mount(&args.mount)?;
    let files = mount.archives.all_files();
    if mount.archives.accessors().is_empty() {
        return Err(CliError::NoShards {
            path: args.mount.game_dir.clone(),
        }
        .into());
    }

    println_pad!(
        "{} {} files",
        "📦 Extracting".bright_blue().bold(),
        files.len().to_string().bright_cyan().bold()
    );
    println_pad!(
        "{} {}",
        "📁 Extracting to:".bright_yellow(),
        args.output_dir.as_str().bright_white().bold()
    );

    let failed = AtomicUsize::new(0);
    files.par_iter().for_each(|file| {
        let target = args.output_dir.join(relative_output_path(file));

        // Resolved paths go through the overlay so project edits win.
        let source: FileHandle = match file.path() {
            Some(path) => mount
                .overlay
                .try_get_file(path)
                .unwrap_or_else(|| Arc::clone(file) as FileHandle),
            None => Arc::clone(file) as FileHandle,
        };

        if let Err(err) = write_file(&target, source.as_ref()) {
            tracing::warn!("Failed to extract {}: {}", target, err);
            failed.fetch_add(1, Ordering::Relaxed);
        }
    });

    let failed = failed.into_inner();
    if failed > 0 {
        return Err(CliError::ExtractIncomplete {
            failed,
            total: files.len(),
        }
        .into());
    }

    println_pad!("{}", "✅ Extraction complete!".bright_green().bold());
    Ok(())
}
