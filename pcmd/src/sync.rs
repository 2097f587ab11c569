use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Args;
use pcache::PBucket;

use crate::config::Config;
use crate::flags::{bucket_config, TransferFlags};
use crate::s3_uri::{is_s3_uri, parse_s3_uri, S3Uri};

/// Sync between a local folder and a bucket prefix. The direction is
/// inferred from which positional argument carries the s3:// scheme.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// `folder s3://bucket/prefix` uploads, `s3://bucket/prefix folder`
    /// downloads.
    pub source: String,
    pub target: String,

    /// Log the intended transfers without running them.
    #[arg(long)]
    pub dry: bool,

    #[command(flatten)]
    pub flags: TransferFlags,
}

enum Direction {
    Upload { folder: Utf8PathBuf, uri: S3Uri },
    Download { uri: S3Uri, folder: Utf8PathBuf },
}

fn direction(args: &SyncArgs) -> anyhow::Result<Direction> {
    match (is_s3_uri(&args.source), is_s3_uri(&args.target)) {
        (false, true) => Ok(Direction::Upload {
            folder: Utf8PathBuf::from(args.source.trim()),
            uri: parse_s3_uri(args.target.trim())?,
        }),
        (true, false) => Ok(Direction::Download {
            uri: parse_s3_uri(args.source.trim())?,
            folder: Utf8PathBuf::from(args.target.trim()),
        }),
        _ => anyhow::bail!(
            "exactly one of source and target must be an s3:// uri, got {:?} and {:?}",
            args.source,
            args.target
        ),
    }
}

pub async fn run(config: &Config, debug: bool, args: SyncArgs) -> anyhow::Result<()> {
    let opts = args.flags.options(debug, args.dry)?;

    match direction(&args)? {
        Direction::Upload { folder, uri } => {
            let metadata = std::fs::metadata(&folder)
                .with_context(|| format!("folder {folder} does not exist"))?;
            if !metadata.is_dir() {
                anyhow::bail!("{folder} is not a directory");
            }

            let bucket_cfg =
                args.flags.apply(bucket_config(config, &uri.bucket, &["PutObject"])?);
            let bucket = PBucket::connect(bucket_cfg).await?;
            bucket
                .sync_folder_to_prefix(&folder, &uri.key, &opts)
                .await
                .with_context(|| format!("failed to sync {folder} to {}", args.target))?;
            bucket.close().await;
            println!("synced folder {folder} to {}", args.target);
        }
        Direction::Download { uri, folder } => {
            let bucket_cfg = args.flags.apply(bucket_config(
                config,
                &uri.bucket,
                &["GetObject", "ListObject"],
            )?);
            let bucket = PBucket::connect(bucket_cfg).await?;
            bucket
                .sync_prefix_to_folder(&uri.key, &folder, &opts)
                .await
                .with_context(|| format!("failed to sync {} to {folder}", args.source))?;
            bucket.close().await;
            println!("synced {} to folder {folder}", args.source);
        }
    }

    let files = opts.file_stats.snapshot();
    let blocks = opts.block_stats.snapshot();
    println!(
        "files: {} total, {} ok, {} failed, {} skipped",
        files.count_total,
        files.count_success,
        files.count_fail,
        files.count_skip_exist + files.count_skip_unchanged
    );
    if debug {
        println!("block stats: {blocks:?}");
    }
    Ok(())
}
