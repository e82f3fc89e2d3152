use camino::Utf8PathBuf;
use clap::builder::{styling::AnsiColor, Styles};
use clap::{ArgAction, ColorChoice};
use clap::{Args as ClapArgs, CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    cat_file, extract_all, list_directory, show_info, CatArgs, ExtractArgs, InfoArgs, ListArgs,
};
use miette::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    mount: MountArgs,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options describing what to mount.
#[derive(ClapArgs, Debug, Clone)]
pub struct MountArgs {
    /// Directory containing the game's .bhd/.bdt shards
    #[arg(short, long, default_value = ".", global = true)]
    pub game_dir: Utf8PathBuf,

    /// Name dictionary file or directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub dictionary: Option<Utf8PathBuf>,

    /// Writable project directory layered over the archives
    #[arg(short, long, global = true)]
    pub project_dir: Option<Utf8PathBuf>,

    /// Path to a binder-vfs.toml config file (defaults to the one in the game directory)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show mounted shards, file counts and diagnostics
    Info {
        /// Print the diagnostic report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a directory of the mounted filesystem
    Ls {
        /// Directory to list
        #[arg(default_value = "/")]
        path: String,
    },
    /// Write a file's contents to stdout or to a file
    Cat {
        /// Path of the file to read
        path: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
    },
    /// Extract every archived file to a directory
    Extract {
        /// The directory to extract to
        #[arg(short, long, default_value = "extracted")]
        output_dir: Utf8PathBuf,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "binder_vfs=info,bvfs=info",
        1 => "binder_vfs=debug,bvfs=debug",
        _ => "binder_vfs=trace,bvfs=trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(args.verbose);

    match args.command {
        Commands::Info { json } => show_info(InfoArgs {
            mount: args.mount,
            json,
        }),
        Commands::Ls { path } => list_directory(ListArgs {
            mount: args.mount,
            path,
        }),
        Commands::Cat { path, output } => cat_file(CatArgs {
            mount: args.mount,
            path,
            output,
        }),
        Commands::Extract { output_dir } => extract_all(ExtractArgs {
            mount: args.mount,
            output_dir,
        }),
    }
}
