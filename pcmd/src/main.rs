//! `pcmd`: thin CLI over the pcache SDK with put, get, sync and meta
//! bootstrap generation. Global endpoint/credentials come from
//! `~/.pcmd.cfg`.

mod config;
mod flags;
mod get;
mod meta;
mod put;
mod s3_uri;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "pcmd", version, about = "PCP-accelerated S3 transfer tool")]
struct Cli {
    /// Print detailed logs.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file to an object.
    Put(put::PutArgs),
    /// Download an object to a local file.
    Get(get::GetArgs),
    /// Sync between a local folder and a bucket prefix.
    Sync(sync::SyncArgs),
    /// Generate management-service bootstrap meta files.
    Meta(meta::MetaArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "pcmd=debug,pcache=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = Config::load();
    match cli.command {
        Command::Put(args) => put::run(&config, cli.debug, args).await,
        Command::Get(args) => get::run(&config, cli.debug, args).await,
        Command::Sync(args) => sync::run(&config, cli.debug, args).await,
        Command::Meta(args) => meta::run(args),
    }
}
