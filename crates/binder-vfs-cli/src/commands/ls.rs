use super::open_mount;
use crate::errors::CliError;
use crate::println_pad;
use crate::utils::format_size;
use crate::MountArgs;
use binder_vfs::{PathKey, VirtualDirectory, VirtualFile, VirtualFileSystem};
use colored::Colorize;
use miette::Result;

pub struct ListArgs {
    pub mount: MountArgs,
    pub path: String,
}

pub fn list_directory(args: ListArgs) -> Result<()> {
    let mount = open_mount(&args.mount)?;
    let fs = &mount.overlay;
    let key = PathKey::parse(&args.path).as_directory();

    let Some(directory) = fs.try_get_directory(&key) else {
        return Err(CliError::DirectoryNotFound { path: args.path }.into());
    };

    println_pad!(
        "{} {}",
        "📂".bright_blue(),
        directory.path().to_string().bright_cyan().bold()
    );

    for dir in directory.directories().map_err(CliError::from)? {
        println_pad!("   {}/", dir.name().bright_blue().bold());
    }

    for file in directory.files().map_err(CliError::from)? {
        let size = file
            .len_hint()
            .map(format_size)
            .unwrap_or_else(|| "?".to_string());
        let name = if file.path().is_some() {
            file.name().bright_white()
        } else {
            file.name().dimmed()
        };
        println_pad!("   {} {}", name, size.dimmed());
    }

    Ok(())
}
