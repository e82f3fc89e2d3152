use super::open_mount;
use crate::println_pad;
use crate::MountArgs;
use binder_vfs::{DiagnosticEvent, DiagnosticSummary};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

pub struct InfoArgs {
    pub mount: MountArgs,
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShardInfo<'a> {
    id: &'a str,
    files: usize,
    buckets: usize,
    big_endian: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MountReport<'a> {
    shards: Vec<ShardInfo<'a>>,
    files: usize,
    resolved: usize,
    unresolved: usize,
    summary: DiagnosticSummary,
    events: Vec<DiagnosticEvent>,
}

pub fn show_info(args: InfoArgs) -> Result<()> {
    let mount = open_mount(&args.mount)?;
    let archives = &mount.archives;
    let diagnostics = archives.diagnostics();

    let report = MountReport {
        shards: archives
            .accessors()
            .iter()
            .map(|accessor| ShardInfo {
                id: accessor.shard(),
                files: accessor.index().file_count(),
                buckets: accessor.index().bucket_count(),
                big_endian: accessor.index().is_big_endian(),
            })
            .collect(),
        files: archives.file_count(),
        resolved: archives.resolved_count(),
        unresolved: archives.unresolved_files().count(),
        summary: diagnostics.summary(),
        events: diagnostics.events(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        return Ok(());
    }

    println_pad!(
        "{} {}",
        "🎮 Game directory:".bright_blue().bold(),
        args.mount.game_dir.as_str().bright_cyan().bold()
    );
    if let Some(project) = &mount.project {
        println_pad!(
            "{} {}",
            "🛠️  Project layer:".bright_green(),
            project.root().as_str().bright_white().bold()
        );
    }

    println_pad!("\n{}", "🗄️  Shards:".bright_magenta().bold());
    for shard in &report.shards {
        println_pad!(
            "   {} {} {}",
            "•".bright_cyan(),
            shard.id.bright_cyan().bold(),
            format!("({} files, {} buckets)", shard.files, shard.buckets).dimmed()
        );
    }

    println_pad!(
        "\n{} {} {}",
        "📁 Files:".bright_yellow(),
        report.files.to_string().bright_white().bold(),
        format!("({} resolved, {} unresolved)", report.resolved, report.unresolved).dimmed()
    );

    let summary = &report.summary;
    println_pad!("\n{}", "🩺 Diagnostics:".bright_magenta().bold());
    for (label, count) in [
        ("skipped shards", summary.invalid_shards),
        ("unresolved hashes", summary.unresolved_hashes),
        ("shared unresolved hashes", summary.shared_unresolved_hashes),
        ("duplicate paths", summary.duplicate_paths),
        ("dictionary collisions", summary.dictionary_collisions),
        ("integrity mismatches", summary.integrity_mismatches),
    ] {
        let count = if count == 0 {
            count.to_string().bright_green()
        } else {
            count.to_string().bright_red()
        };
        println_pad!("   {} {}: {}", "•".bright_cyan(), label, count);
    }

    for event in &report.events {
        if let DiagnosticEvent::InvalidArchiveIndex { shard, reason } = event {
            println_pad!(
                "   {} {} {}",
                "⚠️".bright_red(),
                shard.bright_red().bold(),
                reason.dimmed()
            );
        }
    }

    Ok(())
}
