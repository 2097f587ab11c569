use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Args;
use pcache::PBucket;

use crate::config::Config;
use crate::flags::{bucket_config, TransferFlags};
use crate::s3_uri::parse_s3_uri;

/// Upload a local file to an object.
#[derive(Debug, Args)]
pub struct PutArgs {
    /// Local file to upload.
    pub local: Utf8PathBuf,
    /// Target, as s3://bucket/key.
    pub target: String,

    #[command(flatten)]
    pub flags: TransferFlags,
}

pub async fn run(config: &Config, debug: bool, args: PutArgs) -> anyhow::Result<()> {
    let uri = parse_s3_uri(&args.target)?;
    if uri.key.is_empty() {
        anyhow::bail!("target {:?} is missing an object key", args.target);
    }

    let opts = args.flags.options(debug, false)?;
    let bucket_cfg = args.flags.apply(bucket_config(config, &uri.bucket, &["PutObject"])?);
    let bucket = PBucket::connect(bucket_cfg).await?;

    let outcome = bucket
        .put_object(&args.local, &uri.key, &opts)
        .await
        .with_context(|| format!("failed to put {} to {}", args.local, args.target))?;
    bucket.close().await;

    println!(
        "put {} to {} ({} bytes, etag {}, {:?})",
        args.local, args.target, outcome.size, outcome.etag, outcome.state
    );
    if debug {
        println!("block stats: {:?}", opts.block_stats.snapshot());
        println!("file stats: {:?}", opts.file_stats.snapshot());
    }
    Ok(())
}
