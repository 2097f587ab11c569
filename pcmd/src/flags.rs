//! Transfer flags shared by `put`, `get` and `sync`.

use anyhow::Context;
use clap::Args;
use pcache::{PBucketConfig, TransferOptions};

use crate::config::Config;

#[derive(Debug, Args)]
pub struct TransferFlags {
    /// Every file of the batch fits in one block; plan transfers without
    /// consulting the remote layout.
    #[arg(long = "small-file")]
    pub small_file: bool,

    /// Skip files/objects that already exist on the receiving side.
    #[arg(long = "skip-existing")]
    pub skip_existing: bool,

    /// Skip files/objects that compare equal (by checksum when one is
    /// configured, by size otherwise).
    #[arg(long = "skip-unchanged")]
    pub skip_unchanged: bool,

    /// Checksum to verify or compare with: "md5" or "crc32".
    #[arg(long, default_value = "")]
    pub checksum: String,

    /// Thread number of the block worker pool.
    #[arg(long = "block-thead-number")]
    pub block_thread_number: Option<usize>,

    /// Thread number of the file worker pool.
    #[arg(long = "file-thread-number")]
    pub file_thread_number: Option<usize>,

    /// Multiplier on the block HTTP timeouts.
    #[arg(long = "http-timeout-factor")]
    pub http_timeout_factor: Option<f64>,
}

impl TransferFlags {
    pub fn options(&self, debug: bool, dry_run: bool) -> anyhow::Result<TransferOptions> {
        let mut opts = TransferOptions::new();
        opts.dry_run = dry_run;
        opts.debug_mode = debug;
        opts.is_small_file = self.small_file;
        opts.skip_existing = self.skip_existing;
        opts.skip_unchanged = self.skip_unchanged;
        opts.checksum = self
            .checksum
            .parse()
            .with_context(|| format!("invalid --checksum {:?}", self.checksum))?;
        Ok(opts)
    }

    pub fn apply(&self, mut config: PBucketConfig) -> PBucketConfig {
        if let Some(threads) = self.block_thread_number {
            config = config.with_block_worker_threads(threads);
        }
        if let Some(threads) = self.file_thread_number {
            config = config.with_file_task_threads(threads);
        }
        if let Some(factor) = self.http_timeout_factor {
            config = config.with_http_timeout_factor(factor);
        }
        config
    }
}

/// Builds a bucket config from the global CLI config plus the permissions
/// the command needs.
pub fn bucket_config(
    config: &Config,
    bucket: &str,
    permissions: &[&str],
) -> anyhow::Result<PBucketConfig> {
    if config.endpoint.is_empty() {
        anyhow::bail!("no PMS endpoint configured; set `endpoint` in ~/.pcmd.cfg");
    }
    if config.ak.is_empty() || config.sk.is_empty() {
        anyhow::bail!("no credentials configured; set `ak` and `sk` in ~/.pcmd.cfg");
    }
    Ok(PBucketConfig::new(
        &config.endpoint,
        bucket,
        &config.ak,
        &config.sk,
        permissions.iter().map(|p| p.to_string()).collect(),
    ))
}
