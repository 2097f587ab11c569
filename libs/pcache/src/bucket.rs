//! The `PBucket` façade: wires the managers together and exposes the
//! object operations.
//!
//! Both cached managers (PCP topology, STS-bound S3 client) live behind
//! atomic pointer swaps. Readers take the current instance lock-free; when
//! one observes an expired deadline, exactly one wins the compare-and-swap
//! on the updating flag and rebuilds the manager off-band while everyone
//! else keeps using the stale instance. A failed refresh keeps the stale
//! manager and only logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::block_worker::{BlockWorkerPool, DEFAULT_PCP_RETRY_TIMES};
use crate::error::{Error, Result};
use crate::file_manager::{
    block_count_for, log_sync_summary, FileManager, FileTask, FileTaskState, TransferKind,
};
use crate::options::{TransferOptions, WriteLayer};
use crate::pcp_manager::PcpManager;
use crate::pms::PmsClient;
use crate::secret::SecretManager;
use crate::sts::{S3ClientManager, StsInfo};

/// S3 rejects multipart parts below 5 MiB (except the last one), so blocks
/// can never be smaller.
pub const MIN_BLOCK_SIZE: i64 = 5 * 1024 * 1024;

pub const DEFAULT_BLOCK_WORKER_THREADS: usize = 8;
pub const DEFAULT_WORKER_CHANNEL_SIZE: usize = 128;
pub const DEFAULT_FILE_TASK_THREADS: usize = 8;
pub const DEFAULT_STS_TTL_SECS: u64 = 1800;
pub const MIN_STS_TTL_SECS: u64 = 900;
pub const DEFAULT_PCP_TTL_SECS: u64 = 60;
pub const MIN_PCP_TTL_SECS: u64 = 10;

/// Construction parameters for a [`PBucket`], builder style.
#[derive(Clone)]
pub struct PBucketConfig {
    pub pms_url: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub permissions: Vec<String>,
    /// Scope all STS grants to this path inside the bucket.
    pub path: String,
    pub block_size: i64,
    pub block_worker_threads: usize,
    pub worker_channel_size: usize,
    pub file_task_threads: usize,
    pub sts_ttl_secs: u64,
    pub pcp_ttl_secs: u64,
    pub enable_pcp: bool,
    pub write_layer: WriteLayer,
    pub http_timeout_factor: f64,
    pub pcp_retry_times: usize,
}

impl PBucketConfig {
    pub fn new(
        pms_url: impl Into<String>,
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            pms_url: pms_url.into(),
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            permissions,
            path: String::new(),
            block_size: MIN_BLOCK_SIZE,
            block_worker_threads: DEFAULT_BLOCK_WORKER_THREADS,
            worker_channel_size: DEFAULT_WORKER_CHANNEL_SIZE,
            file_task_threads: DEFAULT_FILE_TASK_THREADS,
            sts_ttl_secs: DEFAULT_STS_TTL_SECS,
            pcp_ttl_secs: DEFAULT_PCP_TTL_SECS,
            enable_pcp: true,
            write_layer: WriteLayer::default(),
            http_timeout_factor: 1.0,
            pcp_retry_times: DEFAULT_PCP_RETRY_TIMES,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_block_worker_threads(mut self, threads: usize) -> Self {
        self.block_worker_threads = threads;
        self
    }

    pub fn with_worker_channel_size(mut self, size: usize) -> Self {
        self.worker_channel_size = size;
        self
    }

    pub fn with_file_task_threads(mut self, threads: usize) -> Self {
        self.file_task_threads = threads;
        self
    }

    pub fn with_sts_ttl_secs(mut self, ttl: u64) -> Self {
        self.sts_ttl_secs = ttl;
        self
    }

    pub fn with_pcp_ttl_secs(mut self, ttl: u64) -> Self {
        self.pcp_ttl_secs = ttl;
        self
    }

    pub fn with_pcp_enabled(mut self, enabled: bool) -> Self {
        self.enable_pcp = enabled;
        self
    }

    pub fn with_write_layer(mut self, layer: WriteLayer) -> Self {
        self.write_layer = layer;
        self
    }

    pub fn with_http_timeout_factor(mut self, factor: f64) -> Self {
        self.http_timeout_factor = factor;
        self
    }

    pub fn with_pcp_retry_times(mut self, retries: usize) -> Self {
        self.pcp_retry_times = retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pms_url.is_empty() {
            return Err(Error::InvalidConfig("missing pms url".into()));
        }
        if self.bucket.is_empty() {
            return Err(Error::InvalidConfig("missing bucket".into()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::InvalidConfig("access key and secret key required".into()));
        }
        if self.permissions.is_empty() {
            return Err(Error::InvalidConfig("at least one permission required".into()));
        }
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "block size {} below the multipart minimum of {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.block_worker_threads < 1 {
            return Err(Error::InvalidConfig("block worker threads must be >= 1".into()));
        }
        if self.worker_channel_size < 1 {
            return Err(Error::InvalidConfig("worker channel size must be >= 1".into()));
        }
        if self.file_task_threads < 1 {
            return Err(Error::InvalidConfig("file task threads must be >= 1".into()));
        }
        if self.sts_ttl_secs < MIN_STS_TTL_SECS {
            return Err(Error::InvalidConfig(format!(
                "sts ttl must be >= {MIN_STS_TTL_SECS}s"
            )));
        }
        if self.pcp_ttl_secs < MIN_PCP_TTL_SECS {
            return Err(Error::InvalidConfig(format!(
                "pcp ttl must be >= {MIN_PCP_TTL_SECS}s"
            )));
        }
        if self.pcp_retry_times < 1 {
            return Err(Error::InvalidConfig("pcp retry times must be >= 1".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PBucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret key stays out of logs.
        f.debug_struct("PBucketConfig")
            .field("pms_url", &self.pms_url)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("permissions", &self.permissions)
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .field("block_worker_threads", &self.block_worker_threads)
            .field("worker_channel_size", &self.worker_channel_size)
            .field("file_task_threads", &self.file_task_threads)
            .field("sts_ttl_secs", &self.sts_ttl_secs)
            .field("pcp_ttl_secs", &self.pcp_ttl_secs)
            .field("enable_pcp", &self.enable_pcp)
            .field("write_layer", &self.write_layer)
            .field("http_timeout_factor", &self.http_timeout_factor)
            .field("pcp_retry_times", &self.pcp_retry_times)
            .finish_non_exhaustive()
    }
}

/// Result of a PUT through the façade.
#[derive(Debug, Clone)]
pub struct PutObjectOutcome {
    /// The origin ETag, or the literal `"cached"` while the object only
    /// exists on a PCP awaiting write-back.
    pub etag: String,
    pub size: i64,
    pub state: FileTaskState,
}

/// Result of a GET through the façade.
#[derive(Debug, Clone)]
pub struct GetObjectOutcome {
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
    pub state: FileTaskState,
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub size: i64,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
}

/// One page of a listing, with the token to fetch the next one.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub entries: Vec<ObjectEntry>,
    pub next_token: Option<String>,
}

struct BucketCore {
    config: PBucketConfig,
    pms: PmsClient,
    pcp_mgr: ArcSwapOption<PcpManager>,
    pcp_updating: AtomicBool,
    s3_mgr: ArcSwap<S3ClientManager>,
    s3_updating: AtomicBool,
    pool: BlockWorkerPool,
}

/// Handle to one logical bucket behind the PMS. Cheap to clone; all clones
/// share the managers and the worker pool.
#[derive(Clone)]
pub struct PBucket {
    core: Arc<BucketCore>,
}

impl PBucket {
    pub async fn connect(config: PBucketConfig) -> Result<PBucket> {
        config.validate()?;

        let secrets = SecretManager::new(&config.access_key, &config.secret_key);
        let pms = PmsClient::new(config.pms_url.clone(), secrets)?;

        let pcp_mgr = if config.enable_pcp {
            let table = pms.fetch_pcp_table("").await?;
            info!(
                checksum = %table.checksum,
                nodes = table.pcp_list.len(),
                "installed initial pcp table"
            );
            ArcSwapOption::new(Some(Arc::new(PcpManager::new(&table, config.pcp_ttl_secs))))
        } else {
            ArcSwapOption::empty()
        };

        let router = pms
            .fetch_sts(&config.bucket, &config.path, &config.permissions)
            .await?;
        let s3_mgr = ArcSwap::from_pointee(S3ClientManager::new(router, config.sts_ttl_secs));

        let pool = BlockWorkerPool::start(
            config.block_worker_threads,
            config.worker_channel_size,
            config.http_timeout_factor,
            config.pcp_retry_times,
        )?;

        info!(bucket = %config.bucket, path = %config.path, "pbucket ready");
        Ok(PBucket {
            core: Arc::new(BucketCore {
                config,
                pms,
                pcp_mgr,
                pcp_updating: AtomicBool::new(false),
                s3_mgr,
                s3_updating: AtomicBool::new(false),
                pool,
            }),
        })
    }

    /// Stops the block worker pool. Safe to call once at the end of the
    /// bucket's life; other clones lose their workers with it.
    pub async fn close(&self) {
        self.core.pool.close().await;
    }

    pub fn bucket_name(&self) -> &str {
        &self.core.config.bucket
    }

    pub fn block_size(&self) -> i64 {
        self.core.config.block_size
    }

    pub(crate) fn default_write_layer(&self) -> WriteLayer {
        self.core.config.write_layer
    }

    pub(crate) fn worker_pool(&self) -> &BlockWorkerPool {
        &self.core.pool
    }

    /// Uploads a local file to `object_key`, through PCPs where the ring
    /// assigns them and multipart when it spans more than one block.
    pub async fn put_object(
        &self,
        local_path: impl AsRef<Utf8Path>,
        object_key: &str,
        opts: &TransferOptions,
    ) -> Result<PutObjectOutcome> {
        let local_path = local_path.as_ref();
        let local_size = tokio::fs::metadata(local_path).await?.len() as i64;

        let (s3, sts) = self.s3_snapshot().await;
        let mut task = FileTask::new(
            TransferKind::Put,
            self.bucket_name().to_string(),
            object_key.to_string(),
            local_path.to_path_buf(),
            self.block_size(),
            s3,
            sts,
        );
        task.checksum = opts.checksum;
        task.local_size = local_size;
        task.block_count = block_count_for(local_size, task.block_size);

        let task = self.run_file_task(task, opts).await?;
        Ok(PutObjectOutcome {
            etag: task.etag().unwrap_or_else(|| "cached".to_string()),
            size: task.local_size,
            state: task.state(),
        })
    }

    /// Downloads `object_key` into a local file; multipart objects land as
    /// part files first and are merged in block order.
    pub async fn get_object(
        &self,
        object_key: &str,
        local_path: impl AsRef<Utf8Path>,
        opts: &TransferOptions,
    ) -> Result<GetObjectOutcome> {
        let (s3, sts) = self.s3_snapshot().await;
        let mut task = FileTask::new(
            TransferKind::Get,
            self.bucket_name().to_string(),
            object_key.to_string(),
            local_path.as_ref().to_path_buf(),
            self.block_size(),
            s3,
            sts,
        );
        task.checksum = opts.checksum;

        let task = self.run_file_task(task, opts).await?;
        Ok(GetObjectOutcome {
            etag: task.etag(),
            metadata: task.metadata.clone(),
            state: task.state(),
        })
    }

    /// Reads object bytes starting at `offset` into `buf`, returning how
    /// many were read. Reads past the end of the object are clipped; only
    /// the blocks overlapping the requested window are touched.
    pub async fn get_object_range(
        &self,
        object_key: &str,
        offset: u64,
        buf: &mut [u8],
        opts: &TransferOptions,
    ) -> Result<usize> {
        self.get_range(object_key, offset, buf, opts).await
    }

    pub async fn delete_object(&self, object_key: &str) -> Result<()> {
        let (s3, sts) = self.s3_snapshot().await;
        s3.delete_object()
            .bucket(&sts.bucket_name)
            .key(object_key)
            .send()
            .await
            .map_err(|e| Error::s3(e, "delete object"))?;
        Ok(())
    }

    pub async fn head_object(&self, object_key: &str) -> Result<ObjectInfo> {
        let (s3, sts) = self.s3_snapshot().await;
        let output = s3
            .head_object()
            .bucket(&sts.bucket_name)
            .key(object_key)
            .send()
            .await
            .map_err(|e| Error::s3(e, "head object"))?;
        Ok(ObjectInfo {
            size: output.content_length().unwrap_or(0),
            etag: output.e_tag().map(|t| t.to_string()),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    /// One ListObjectsV2 page under `prefix`; pass the returned token back
    /// in to continue.
    pub async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        let (s3, sts) = self.s3_snapshot().await;
        let output = s3
            .list_objects_v2()
            .bucket(&sts.bucket_name)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| Error::s3(e, "list objects"))?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectEntry {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0),
                })
            })
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(|t| t.to_string())
        } else {
            None
        };
        Ok(ObjectPage {
            entries,
            next_token,
        })
    }

    /// Walks `folder` and uploads every file under `prefix`, bounded by the
    /// file task semaphore.
    pub async fn sync_folder_to_prefix(
        &self,
        folder: impl AsRef<Utf8Path>,
        prefix: &str,
        opts: &TransferOptions,
    ) -> Result<()> {
        let folder = folder.as_ref().to_path_buf();
        let started = Instant::now();

        let entries = walk_local_files(folder.clone()).await?;
        let mut manager = FileManager::new(self.core.config.file_task_threads);
        for (local_path, size) in entries {
            let rel = local_path
                .strip_prefix(&folder)
                .expect("walked path is under its root");
            let object_key = merge_key(prefix, rel.as_str());

            if opts.dry_run {
                info!(
                    file = %local_path,
                    bucket = %self.bucket_name(),
                    key = %object_key,
                    "dry run: would put"
                );
                continue;
            }

            let (s3, sts) = self.s3_snapshot().await;
            let mut task = FileTask::new(
                TransferKind::Put,
                self.bucket_name().to_string(),
                object_key,
                local_path,
                self.block_size(),
                s3,
                sts,
            );
            task.checksum = opts.checksum;
            task.local_size = size;
            task.block_count = if opts.is_small_file {
                1
            } else {
                block_count_for(size, task.block_size)
            };
            manager.add_task(self.clone(), task, opts.clone());
        }
        if !opts.dry_run {
            manager.wait().await;
        }

        log_sync_summary(
            "sync folder to prefix",
            folder.as_str(),
            prefix,
            opts,
            started,
        );
        Ok(())
    }

    /// Lists every object under `prefix` and downloads it into `folder`,
    /// bounded by the file task semaphore.
    pub async fn sync_prefix_to_folder(
        &self,
        prefix: &str,
        folder: impl AsRef<Utf8Path>,
        opts: &TransferOptions,
    ) -> Result<()> {
        let folder = folder.as_ref();
        let started = Instant::now();

        let mut manager = FileManager::new(self.core.config.file_task_threads);
        let mut continuation_token = None;
        loop {
            let page = self.list_objects(prefix, continuation_token.take()).await?;
            for entry in page.entries {
                let rel = entry
                    .key
                    .strip_prefix(prefix)
                    .unwrap_or(entry.key.as_str());
                let local_path = Utf8PathBuf::from(merge_key(folder.as_str(), rel));

                if opts.dry_run {
                    info!(
                        file = %local_path,
                        bucket = %self.bucket_name(),
                        key = %entry.key,
                        "dry run: would get"
                    );
                    continue;
                }

                let (s3, sts) = self.s3_snapshot().await;
                let mut task = FileTask::new(
                    TransferKind::Get,
                    self.bucket_name().to_string(),
                    entry.key,
                    local_path,
                    self.block_size(),
                    s3,
                    sts,
                );
                task.checksum = opts.checksum;
                task.object_size = entry.size;
                task.block_count = if opts.is_small_file {
                    1
                } else {
                    block_count_for(entry.size, task.block_size)
                };
                manager.add_task(self.clone(), task, opts.clone());
            }
            if page.next_token.is_none() {
                break;
            }
            continuation_token = page.next_token;
        }
        if !opts.dry_run {
            manager.wait().await;
        }

        log_sync_summary(
            "sync prefix to folder",
            prefix,
            folder.as_str(),
            opts,
            started,
        );
        Ok(())
    }

    /// Routes a block key to its PCP host, refreshing the topology when the
    /// installed table expired. Exactly one caller performs the refresh;
    /// everyone else keeps reading the stale (still valid) ring.
    pub(crate) async fn pcp_host_for(&self, key: &str) -> String {
        if !self.core.config.enable_pcp {
            return String::new();
        }
        let Some(mgr) = self.core.pcp_mgr.load_full() else {
            return String::new();
        };
        if !mgr.is_expired() {
            return mgr.get(key);
        }

        if self
            .core
            .pcp_updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return mgr.get(key);
        }
        let _reset = scopeguard::guard((), |_| {
            self.core.pcp_updating.store(false, Ordering::Release);
        });

        let ttl = self.core.config.pcp_ttl_secs;
        match self.core.pms.fetch_pcp_table(mgr.checksum()).await {
            Err(err) => {
                warn!(error = %err, "failed to refresh pcp table, keeping stale one");
                mgr.get(key)
            }
            Ok(table) if table.checksum == mgr.checksum() => {
                // Unchanged topology: only the deadline moves.
                mgr.extend(ttl);
                mgr.get(key)
            }
            Ok(table) => {
                info!(
                    checksum = %table.checksum,
                    nodes = table.pcp_list.len(),
                    "installing refreshed pcp table"
                );
                let fresh = Arc::new(PcpManager::new(&table, ttl));
                self.core.pcp_mgr.store(Some(fresh.clone()));
                fresh.get(key)
            }
        }
    }

    /// The current S3 client and STS grant, refreshing them when expired
    /// with the same single-flight discipline as the PCP table.
    pub(crate) async fn s3_snapshot(&self) -> (aws_sdk_s3::Client, StsInfo) {
        let mgr = self.core.s3_mgr.load_full();
        if !mgr.is_expired() {
            return (mgr.s3_client().clone(), mgr.sts_info().clone());
        }

        if self
            .core
            .s3_updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return (mgr.s3_client().clone(), mgr.sts_info().clone());
        }
        let _reset = scopeguard::guard((), |_| {
            self.core.s3_updating.store(false, Ordering::Release);
        });

        match self.new_s3_manager().await {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                self.core.s3_mgr.store(fresh.clone());
                (fresh.s3_client().clone(), fresh.sts_info().clone())
            }
            Err(err) => {
                warn!(error = %err, "failed to refresh sts credentials, keeping stale ones");
                (mgr.s3_client().clone(), mgr.sts_info().clone())
            }
        }
    }

    async fn new_s3_manager(&self) -> Result<S3ClientManager> {
        let config = &self.core.config;
        let router = self
            .core
            .pms
            .fetch_sts(&config.bucket, &config.path, &config.permissions)
            .await?;
        Ok(S3ClientManager::new(router, config.sts_ttl_secs))
    }
}

/// Joins a prefix and a relative key with exactly one `/` between them.
pub(crate) fn merge_key(prefix: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if prefix.is_empty() {
        return rel.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), rel)
}

/// Collects `(path, size)` for every regular file under `root`. The walk
/// itself is blocking, so it runs on the blocking pool.
async fn walk_local_files(root: Utf8PathBuf) -> Result<Vec<(Utf8PathBuf, i64)>> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&root) {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk error")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.path().to_path_buf())
                .map_err(|p| Error::InvalidConfig(format!("non-utf8 path {}", p.display())))?;
            let size = entry.metadata().map(|m| m.len() as i64).unwrap_or(0);
            files.push((path, size));
        }
        Ok(files)
    })
    .await
    .expect("walk task never panics")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PBucketConfig {
        PBucketConfig::new(
            "http://127.0.0.1:8080",
            "pb-minio",
            "unittest",
            "sk-secret",
            vec!["PutObject".to_string(), "GetObject".to_string()],
        )
    }

    #[test]
    fn default_config_is_valid() {
        let config = base_config();
        config.validate().unwrap();
        assert_eq!(config.block_size, MIN_BLOCK_SIZE);
        assert_eq!(config.block_worker_threads, 8);
        assert_eq!(config.worker_channel_size, 128);
        assert_eq!(config.file_task_threads, 8);
        assert_eq!(config.sts_ttl_secs, 1800);
        assert_eq!(config.pcp_ttl_secs, 60);
        assert!(config.enable_pcp);
        assert_eq!(config.write_layer, WriteLayer::REMOTE);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(base_config().with_block_size(MIN_BLOCK_SIZE - 1).validate().is_err());
        assert!(base_config().with_block_worker_threads(0).validate().is_err());
        assert!(base_config().with_worker_channel_size(0).validate().is_err());
        assert!(base_config().with_file_task_threads(0).validate().is_err());
        assert!(base_config().with_sts_ttl_secs(899).validate().is_err());
        assert!(base_config().with_pcp_ttl_secs(9).validate().is_err());
        assert!(base_config().with_pcp_retry_times(0).validate().is_err());

        let mut config = base_config();
        config.bucket = String::new();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.permissions.clear();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.secret_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_key_joins_cleanly() {
        assert_eq!(merge_key("", "a/b"), "a/b");
        assert_eq!(merge_key("pre", "a/b"), "pre/a/b");
        assert_eq!(merge_key("pre/", "/a/b"), "pre/a/b");
        assert_eq!(merge_key("/tmp/out", "x.bin"), "/tmp/out/x.bin");
    }
}
