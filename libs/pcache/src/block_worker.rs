//! The block worker pool and the per-block transfer logic.
//!
//! A fixed fleet of workers consumes blocks from one bounded queue;
//! producers feel backpressure when the queue fills. Each block is tried
//! against its assigned PCP first (with a bounded number of retries) and
//! falls back to the origin store; the outcome is recorded on the block and
//! never bubbles out of the worker.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use camino::Utf8Path;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::block::{Block, BlockState};
use crate::error::{Error, Result};
use crate::file_manager::TransferKind;

/// Attempts against a PCP before falling back to the origin store.
pub const DEFAULT_PCP_RETRY_TIMES: usize = 2;

/// Base HTTP timeouts, each scaled by the configured factor.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_CONNS_PER_HOST: usize = 10;

/// A PCP put answers with the ETag in the body; cap what we will read.
const MAX_ETAG_BYTES: usize = 128;

pub(crate) struct BlockJob {
    pub block: Block,
    /// Hands the finished block back to the coordinator's barrier.
    pub done: mpsc::UnboundedSender<Block>,
}

pub(crate) struct BlockWorkerPool {
    /// `None` once the pool has been closed.
    tx: std::sync::Mutex<Option<mpsc::Sender<BlockJob>>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BlockWorkerPool {
    /// Spawns `threads` workers over a queue of `channel_size` slots. The
    /// single HTTP client is shared by all workers and sized from the
    /// timeout factor.
    pub(crate) fn start(
        threads: usize,
        channel_size: usize,
        http_timeout_factor: f64,
        pcp_retry_times: usize,
    ) -> Result<Self> {
        let http = build_http_client(http_timeout_factor)
            .map_err(|e| Error::Pcp(anyhow::Error::new(e).context("build pcp http client")))?;

        let (tx, rx) = mpsc::channel(channel_size);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let handles = (0..threads)
            .map(|worker_id| {
                let worker = Worker {
                    http: http.clone(),
                    retry_times: pcp_retry_times,
                };
                let rx = rx.clone();
                let cancel = cancel.clone();
                tokio::spawn(worker.run(worker_id, rx, cancel))
            })
            .collect();

        Ok(Self {
            tx: std::sync::Mutex::new(Some(tx)),
            cancel,
            handles: Mutex::new(handles),
        })
    }

    /// Enqueues a block, waiting when the queue is full. A pool that has
    /// already shut down fails the block instead of wedging the barrier.
    pub(crate) async fn submit(&self, job: BlockJob) {
        let tx = self
            .tx
            .lock()
            .expect("worker pool sender lock poisoned")
            .clone();
        let rejected = match tx {
            Some(tx) => match tx.send(job).await {
                Ok(()) => None,
                Err(send_err) => Some(send_err.0),
            },
            None => Some(job),
        };
        if let Some(mut job) = rejected {
            warn!(
                key = %job.block.task.object_key,
                block = job.block.number,
                "block worker pool is closed, failing block"
            );
            job.block.state = BlockState::Fail;
            let _ = job.done.send(job.block);
        }
    }

    /// Cancels the workers and joins them. In-flight HTTP requests are
    /// dropped with the worker futures; anything still queued is abandoned
    /// and surfaces at the coordinator barrier as a missing block.
    pub(crate) async fn close(&self) {
        self.tx
            .lock()
            .expect("worker pool sender lock poisoned")
            .take();
        self.cancel.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "block worker did not shut down cleanly");
            }
        }
    }
}

fn build_http_client(factor: f64) -> reqwest::Result<reqwest::Client> {
    let factor = if factor > 0.0 { factor } else { 1.0 };
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.mul_f64(factor))
        .read_timeout(READ_TIMEOUT.mul_f64(factor))
        .timeout(OVERALL_TIMEOUT.mul_f64(factor))
        .pool_max_idle_per_host(IDLE_CONNS_PER_HOST)
        .build()
}

struct Worker {
    http: reqwest::Client,
    retry_times: usize,
}

impl Worker {
    async fn run(
        self,
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<BlockJob>>>,
        cancel: CancellationToken,
    ) {
        loop {
            let job = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    job = rx.recv() => job,
                }
            };
            let Some(mut job) = job else {
                info!(worker_id, "block worker exiting");
                return;
            };

            let started = Instant::now();
            let result = match job.block.task.kind {
                TransferKind::Put => self.put_block(&mut job.block).await,
                TransferKind::Get => self.get_block(&mut job.block).await,
            };
            if let Err(err) = result {
                warn!(
                    key = %job.block.task.object_key,
                    block = job.block.number,
                    error = %format!("{err:#}"),
                    "block transfer failed"
                );
            }
            job.block.duration_ms = started.elapsed().as_millis() as i64;
            // The coordinator may already have given up (e.g. the caller
            // dropped the future); a closed barrier is not an error.
            let _ = job.done.send(job.block);
        }
    }

    /// Uploads one block: PCP first when a host was assigned, then the
    /// origin store. See the state machine on [`BlockState`].
    async fn put_block(&self, block: &mut Block) -> anyhow::Result<()> {
        let task = block.task.clone();

        let buf = match read_block(&task.local_path, block.number * task.block_size, block.size)
            .await
        {
            Ok(buf) => buf,
            Err(err) => {
                block.state = BlockState::Fail;
                return Err(err).with_context(|| {
                    format!("read block {} of {}", block.number, task.local_path)
                });
            }
        };

        let mut etag: Option<String> = None;
        if !block.pcp_host.is_empty() {
            match self.put_to_pcp_with_retries(block, &buf).await {
                Ok(pcp_etag) => {
                    block.state = BlockState::OkPcpDisk;
                    if block.debug {
                        debug!(
                            pcp_host = %block.pcp_host,
                            block = %block.pcp_url(),
                            "successfully put block to pcp"
                        );
                    }
                    etag = Some(pcp_etag);
                }
                Err(err) => {
                    warn!(
                        pcp_host = %block.pcp_host,
                        block = %block.pcp_url(),
                        error = %format!("{err:#}"),
                        "failed to put block to pcp, falling back to origin"
                    );
                    block.state = BlockState::OkLocalPcpFail;
                }
            }
        }

        if etag.is_none() {
            match self.put_to_origin(block, buf).await {
                Ok(origin_etag) => {
                    if block.state != BlockState::OkLocalPcpFail {
                        block.state = BlockState::OkLocal;
                    }
                    if block.debug {
                        debug!(block = %block.pcp_url(), "successfully put block to origin");
                    }
                    etag = Some(origin_etag);
                }
                Err(err) => {
                    block.state = BlockState::Fail;
                    return Err(err);
                }
            }
        }

        let etag = etag.expect("either pcp or origin produced an etag");
        if task.is_single() {
            task.set_etag(etag.clone());
        }
        block.etag = Some(etag);
        Ok(())
    }

    async fn put_to_pcp_with_retries(&self, block: &Block, buf: &Bytes) -> anyhow::Result<String> {
        let mut last_err = None;
        for attempt in 1..=self.retry_times {
            match self.put_to_pcp(block, buf).await {
                Ok(etag) => return Ok(etag),
                Err(err) => {
                    warn!(
                        pcp_host = %block.pcp_host,
                        block = %block.pcp_url(),
                        attempt,
                        error = %format!("{err:#}"),
                        "pcp put attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    /// `POST {pcp}/{bucket}/{key}.{n}_{count}` with the block body. A 200
    /// answers with the ETag in the body.
    async fn put_to_pcp(&self, block: &Block, buf: &Bytes) -> anyhow::Result<String> {
        let task = &block.task;
        let url = block.pcp_url();

        let mut req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, buf.len())
            .header("X-STS", serde_json::to_string(&task.sts)?)
            .header("X-WRITE-LAYER", block.write_layer.bits().to_string());
        if let Some(upload_id) = &task.upload_id {
            req = req.header("X-UPLOAD-ID", upload_id);
        }
        if !task.metadata.is_empty() {
            req = req.header("X-USER-META", serde_json::to_string(&task.metadata)?);
        }

        let resp = req
            .body(buf.clone())
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("pcp put returned {status}");
        }

        let body = resp.bytes().await.context("read pcp put response")?;
        let capped = &body[..body.len().min(MAX_ETAG_BYTES)];
        let etag = String::from_utf8_lossy(capped).trim().to_string();
        if etag.is_empty() {
            anyhow::bail!("pcp put returned an empty etag");
        }
        Ok(etag)
    }

    async fn put_to_origin(&self, block: &Block, buf: Bytes) -> anyhow::Result<String> {
        let task = &block.task;
        if task.is_single() {
            let resp = task
                .s3
                .put_object()
                .bucket(&task.sts.bucket_name)
                .key(&task.object_key)
                .set_metadata(if task.metadata.is_empty() {
                    None
                } else {
                    Some(task.metadata.clone())
                })
                .body(buf.into())
                .send()
                .await
                .with_context(|| format!("put object {}", task.object_key))?;
            resp.e_tag()
                .map(|t| t.to_string())
                .ok_or_else(|| anyhow::anyhow!("put object returned no etag"))
        } else {
            let part_number = (block.number + 1) as i32;
            let resp = task
                .s3
                .upload_part()
                .bucket(&task.sts.bucket_name)
                .key(&task.object_key)
                .set_upload_id(task.upload_id.clone())
                .part_number(part_number)
                .body(buf.into())
                .send()
                .await
                .with_context(|| {
                    format!("upload part {part_number} of {}", task.object_key)
                })?;
            resp.e_tag()
                .map(|t| t.to_string())
                .ok_or_else(|| anyhow::anyhow!("upload part returned no etag"))
        }
    }

    /// Downloads one block: PCP first when assigned, origin fallback.
    async fn get_block(&self, block: &mut Block) -> anyhow::Result<()> {
        let mut pcp_failed = false;
        if !block.pcp_host.is_empty() {
            match self.get_from_pcp_with_retries(block).await {
                Ok(()) => {
                    if block.debug {
                        debug!(
                            pcp_host = %block.pcp_host,
                            block = %block.pcp_url(),
                            state = ?block.state,
                            "successfully got block from pcp"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        pcp_host = %block.pcp_host,
                        block = %block.pcp_url(),
                        error = %format!("{err:#}"),
                        "failed to get block from pcp, falling back to origin"
                    );
                    block.state = BlockState::OkLocalPcpFail;
                    pcp_failed = true;
                }
            }
        }

        if block.pcp_host.is_empty() || pcp_failed {
            match self.get_from_origin(block).await {
                Ok(()) => {
                    if block.state != BlockState::OkLocalPcpFail {
                        block.state = BlockState::OkLocal;
                    }
                    if block.debug {
                        debug!(block = %block.pcp_url(), "successfully got block from origin");
                    }
                }
                Err(err) => {
                    block.state = BlockState::Fail;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn get_from_pcp_with_retries(&self, block: &mut Block) -> anyhow::Result<()> {
        let mut last_err = None;
        for attempt in 1..=self.retry_times {
            match self.get_from_pcp(block).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        pcp_host = %block.pcp_host,
                        block = %block.pcp_url(),
                        attempt,
                        error = %format!("{err:#}"),
                        "pcp get attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    /// `GET {pcp}/{bucket}/{key}.{n}_{count}`. The `X-CACHE-HIT` response
    /// header encodes which tier served the block and becomes its state.
    async fn get_from_pcp(&self, block: &mut Block) -> anyhow::Result<()> {
        let task = block.task.clone();
        let url = block.pcp_url();

        let resp = self
            .http
            .get(&url)
            .header("X-STS", serde_json::to_string(&task.sts)?)
            .header("X-BLOCK-SIZE", task.block_size.to_string())
            .header("X-DATA-SIZE", block.size.to_string())
            .header("X-BLOCK-OFFSET", block.file_offset.to_string())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("pcp get returned {status}");
        }

        if let Some(content_length) = resp.content_length().filter(|l| *l > 0) {
            let content_length = content_length as i64;
            if block.size == 0 {
                block.size = content_length;
            } else if task.is_local_file() && content_length != block.size {
                anyhow::bail!(
                    "pcp content length mismatch: got {content_length}, expected {}",
                    block.size
                );
            }
        }

        // Tier of the served copy; a PCP that omits the header still served
        // the block, attribute it to the farthest tier.
        match resp
            .headers()
            .get("X-CACHE-HIT")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.parse::<i64>())
        {
            Some(Ok(hit)) => block.state = BlockState::from_cache_hit(hit),
            Some(Err(_)) => {
                warn!(block = %url, "invalid X-CACHE-HIT header from pcp");
                block.state = BlockState::OkPcpRemote;
            }
            None => block.state = BlockState::OkPcpRemote,
        }

        let body = resp.bytes().await.context("read pcp get response")?;
        self.store_block_bytes(block, body).await
    }

    async fn get_from_origin(&self, block: &mut Block) -> anyhow::Result<()> {
        let task = block.task.clone();

        let mut req = task
            .s3
            .get_object()
            .bucket(&task.sts.bucket_name)
            .key(&task.object_key);
        let whole_object = task.is_single() && task.is_local_file();
        if !whole_object {
            let end = block.file_offset + block.size - 1;
            req = req.range(format!("bytes={}-{}", block.file_offset, end));
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("get object {}", task.object_key))?;
        if whole_object {
            if let Some(etag) = resp.e_tag() {
                task.set_etag(etag.to_string());
            }
        }

        let body = resp
            .body
            .collect()
            .await
            .context("read origin get response")?
            .into_bytes();
        self.store_block_bytes(block, body).await
    }

    /// Lands fetched bytes where the task wants them: the final local file
    /// for a single block, a part file for a multipart GET, or the block's
    /// disjoint slice of the caller's buffer for range reads.
    async fn store_block_bytes(&self, block: &mut Block, body: Bytes) -> anyhow::Result<()> {
        let task = block.task.clone();
        if task.is_local_file() {
            let path = if task.is_single() {
                task.local_path.clone()
            } else {
                block.part_path()
            };
            let mut file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("create {path}"))?;
            file.write_all(&body)
                .await
                .with_context(|| format!("write {path}"))?;
            file.flush().await.with_context(|| format!("flush {path}"))?;
        } else {
            let len = body.len() as i64;
            block.data = Some(body);
            task.add_data_size(len);
        }
        Ok(())
    }
}

async fn read_block(path: &Utf8Path, offset: i64, size: i64) -> anyhow::Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset as u64)).await?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;

    use crate::file_manager::{BlockSink, FileTask};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn worker() -> Worker {
        Worker {
            http: build_http_client(1.0).unwrap(),
            retry_times: DEFAULT_PCP_RETRY_TIMES,
        }
    }

    fn get_task(host: &str) -> (Arc<FileTask>, Block) {
        let mut task = FileTask::for_tests(
            TransferKind::Get,
            "pb-minio",
            "test/obj.bin",
            "",
            BlockSink::Buffer,
            1,
        );
        task.block_size = 8;
        let task = Arc::new(task);
        let mut block = Block::new(task.clone(), 0, 8, 0, host.to_string());
        block.offset_in_buffer = 0;
        (task, block)
    }

    #[tokio::test]
    async fn pcp_get_records_cache_tier_and_bytes() {
        async fn handler() -> (HeaderMap, Vec<u8>) {
            let mut headers = HeaderMap::new();
            headers.insert("X-CACHE-HIT", "2".parse().unwrap());
            (headers, b"8 bytes!".to_vec())
        }
        let base = serve(Router::new().route("/pb-minio/test/{*rest}", get(handler))).await;

        let (task, mut block) = get_task(&base);
        worker().get_from_pcp(&mut block).await.unwrap();

        assert_eq!(block.state, BlockState::OkPcpMemory);
        assert_eq!(block.data.as_deref(), Some(&b"8 bytes!"[..]));
        assert_eq!(task.data_size(), 8);
    }

    #[tokio::test]
    async fn pcp_get_retries_then_reports_failure() {
        #[derive(Clone)]
        struct Hits(Arc<AtomicUsize>);
        async fn failing(State(hits): State<Hits>) -> StatusCode {
            hits.0.fetch_add(1, Ordering::SeqCst);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        let hits = Hits(Arc::new(AtomicUsize::new(0)));
        let base = serve(
            Router::new()
                .route("/pb-minio/test/{*rest}", get(failing))
                .with_state(hits.clone()),
        )
        .await;

        let (_task, mut block) = get_task(&base);
        let err = worker().get_from_pcp_with_retries(&mut block).await;
        assert!(err.is_err());
        assert_eq!(hits.0.load(Ordering::SeqCst), DEFAULT_PCP_RETRY_TIMES);
    }

    #[tokio::test]
    async fn pcp_put_returns_trimmed_etag_and_sends_headers() {
        #[derive(Clone, Default)]
        struct Seen(Arc<std::sync::Mutex<Option<(String, String, usize)>>>);
        async fn handler(
            State(seen): State<Seen>,
            headers: HeaderMap,
            body: axum::body::Bytes,
        ) -> String {
            let sts = headers["X-STS"].to_str().unwrap().to_string();
            let layer = headers["X-WRITE-LAYER"].to_str().unwrap().to_string();
            *seen.0.lock().unwrap() = Some((sts, layer, body.len()));
            "  \"etag-123\"\n".to_string()
        }
        let seen = Seen::default();
        let base = serve(
            Router::new()
                .route("/pb-minio/test/{*rest}", post(handler))
                .with_state(seen.clone()),
        )
        .await;

        let mut task = FileTask::for_tests(
            TransferKind::Put,
            "pb-minio",
            "test/obj.bin",
            "",
            BlockSink::LocalFile,
            4,
        );
        task.upload_id = Some("up-1".into());
        let task = Arc::new(task);
        let block = Block::new(task, 1, 8, 8, base.clone());

        let etag = worker()
            .put_to_pcp(&block, &Bytes::from_static(b"12345678"))
            .await
            .unwrap();
        assert_eq!(etag, "\"etag-123\"");

        let (sts, layer, body_len) = seen.0.lock().unwrap().clone().unwrap();
        assert!(sts.contains("\"bucketName\""));
        assert_eq!(layer, "4");
        assert_eq!(body_len, 8);
    }

    #[tokio::test]
    async fn pcp_get_sends_the_blocks_own_file_offset() {
        #[derive(Clone, Default)]
        struct Seen(Arc<std::sync::Mutex<Option<(String, String, String)>>>);
        async fn handler(State(seen): State<Seen>, headers: HeaderMap) -> (HeaderMap, Vec<u8>) {
            let offset = headers["X-BLOCK-OFFSET"].to_str().unwrap().to_string();
            let block_size = headers["X-BLOCK-SIZE"].to_str().unwrap().to_string();
            let data_size = headers["X-DATA-SIZE"].to_str().unwrap().to_string();
            *seen.0.lock().unwrap() = Some((offset, block_size, data_size));
            let mut resp_headers = HeaderMap::new();
            resp_headers.insert("X-CACHE-HIT", "1".parse().unwrap());
            (resp_headers, b"block #1".to_vec())
        }
        let seen = Seen::default();
        let base = serve(
            Router::new()
                .route("/pb-minio/test/{*rest}", get(handler))
                .with_state(seen.clone()),
        )
        .await;

        let dir = camino_tempfile::tempdir().unwrap();
        let local = dir.path().join("obj.bin");
        let mut task = FileTask::for_tests(
            TransferKind::Get,
            "pb-minio",
            "test/obj.bin",
            local.as_str(),
            BlockSink::LocalFile,
            3,
        );
        task.block_size = 8;
        let task = Arc::new(task);
        // Second block of a three-block local-file GET: its bytes start at
        // number * block_size, and that is what the PCP must be told.
        let mut block = Block::new(task, 1, 8, 8, base);

        worker().get_from_pcp(&mut block).await.unwrap();

        let (offset, block_size, data_size) = seen.0.lock().unwrap().clone().unwrap();
        assert_eq!(offset, "8");
        assert_eq!(block_size, "8");
        assert_eq!(data_size, "8");
        assert_eq!(block.state, BlockState::OkPcpDisk);
        let part = tokio::fs::read(block.part_path()).await.unwrap();
        assert_eq!(part, b"block #1");
    }

    #[tokio::test]
    async fn pcp_content_length_mismatch_fails_local_file_blocks() {
        async fn handler() -> (HeaderMap, Vec<u8>) {
            let mut headers = HeaderMap::new();
            headers.insert("X-CACHE-HIT", "1".parse().unwrap());
            (headers, b"short".to_vec())
        }
        let base = serve(Router::new().route("/pb-minio/test/{*rest}", get(handler))).await;

        let dir = camino_tempfile::tempdir().unwrap();
        let local = dir.path().join("obj.bin");
        let mut task = FileTask::for_tests(
            TransferKind::Get,
            "pb-minio",
            "test/obj.bin",
            local.as_str(),
            BlockSink::LocalFile,
            2,
        );
        task.block_size = 8;
        let task = Arc::new(task);
        let mut block = Block::new(task, 0, 8, 0, base);

        let err = worker().get_from_pcp(&mut block).await.unwrap_err();
        assert!(err.to_string().contains("content length mismatch"), "{err}");
    }

    #[tokio::test]
    async fn pool_drains_and_joins_on_close() {
        let pool = BlockWorkerPool::start(2, 4, 1.0, DEFAULT_PCP_RETRY_TIMES).unwrap();
        pool.close().await;

        // Submitting after close must fail the block rather than hang the
        // caller's barrier.
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let task = Arc::new(FileTask::for_tests(
            TransferKind::Get,
            "pb",
            "k",
            "",
            BlockSink::Buffer,
            1,
        ));
        let block = Block::new(task, 0, 0, 0, String::new());
        pool.submit(BlockJob {
            block,
            done: done_tx,
        })
        .await;
        let failed = done_rx.recv().await.unwrap();
        assert_eq!(failed.state, BlockState::Fail);
    }
}
