use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Args;
use pcache::PBucket;

use crate::config::Config;
use crate::flags::{bucket_config, TransferFlags};
use crate::s3_uri::parse_s3_uri;

/// Download an object to a local file.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Source, as s3://bucket/key.
    pub source: String,
    /// Local path to download into.
    pub local: Utf8PathBuf,

    #[command(flatten)]
    pub flags: TransferFlags,
}

pub async fn run(config: &Config, debug: bool, args: GetArgs) -> anyhow::Result<()> {
    let uri = parse_s3_uri(&args.source)?;
    if uri.key.is_empty() {
        anyhow::bail!("source {:?} is missing an object key", args.source);
    }

    let opts = args.flags.options(debug, false)?;
    let bucket_cfg = args.flags.apply(bucket_config(config, &uri.bucket, &["GetObject"])?);
    let bucket = PBucket::connect(bucket_cfg).await?;

    let outcome = bucket
        .get_object(&uri.key, &args.local, &opts)
        .await
        .with_context(|| format!("failed to get {} to {}", args.source, args.local))?;
    bucket.close().await;

    println!("got {} to {} ({:?})", args.source, args.local, outcome.state);
    if !outcome.metadata.is_empty() {
        println!("metadata: {:?}", outcome.metadata);
    }
    if debug {
        println!("block stats: {:?}", opts.block_stats.snapshot());
        println!("file stats: {:?}", opts.file_stats.snapshot());
    }
    Ok(())
}
