//! Per-file transfer coordination: skip decisions, checksum handling, the
//! multipart lifecycle, block fan-out and the completion barrier, plus the
//! semaphore-gated scheduler the sync operations run file tasks through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::block::{Block, BlockState};
use crate::block_worker::BlockJob;
use crate::bucket::PBucket;
use crate::checksum::{file_checksum, ChecksumKind};
use crate::error::{Error, Result};
use crate::options::TransferOptions;
use crate::sts::StsInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Put,
    Get,
}

/// Terminal state of a whole file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTaskState {
    Fail,
    Ok,
    OkSkipExist,
    OkSkipUnchanged,
}

/// Where a GET lands its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSink {
    /// The final local path (single block) or per-block part files that are
    /// merged afterwards.
    LocalFile,
    /// A caller-supplied buffer; every block owns a disjoint slice of it.
    Buffer,
}

/// One file transfer.
///
/// The coordinator owns the task exclusively while it prepares it (skip
/// checks, checksums, multipart creation); fan-out then freezes it behind an
/// `Arc` and workers only touch the three interior-mutable fields below.
pub struct FileTask {
    pub kind: TransferKind,
    /// Logical bucket name, used on the PCP wire path.
    pub bucket: String,
    pub object_key: String,
    pub local_path: Utf8PathBuf,
    pub checksum: ChecksumKind,
    /// User metadata attached on PUT / observed on GET. The keys
    /// `checksum_md5` and `checksum_crc32` are reserved.
    pub metadata: HashMap<String, String>,
    pub local_checksum: String,
    pub object_checksum: String,
    pub local_size: i64,
    pub object_size: i64,
    pub block_size: i64,
    pub block_count: i64,
    pub upload_id: Option<String>,
    /// Range reads: the caller's requested start offset within the object.
    pub range_offset: i64,
    pub(crate) sink: BlockSink,
    pub(crate) s3: aws_sdk_s3::Client,
    pub(crate) sts: StsInfo,
    state: Mutex<FileTaskState>,
    etag: Mutex<Option<String>>,
    data_size: AtomicI64,
}

impl FileTask {
    pub(crate) fn new(
        kind: TransferKind,
        bucket: String,
        object_key: String,
        local_path: Utf8PathBuf,
        block_size: i64,
        s3: aws_sdk_s3::Client,
        sts: StsInfo,
    ) -> Self {
        Self {
            kind,
            bucket,
            object_key,
            local_path,
            checksum: ChecksumKind::None,
            metadata: HashMap::new(),
            local_checksum: String::new(),
            object_checksum: String::new(),
            local_size: 0,
            object_size: 0,
            block_size,
            block_count: 0,
            upload_id: None,
            range_offset: 0,
            sink: BlockSink::LocalFile,
            s3,
            sts,
            state: Mutex::new(FileTaskState::Fail),
            etag: Mutex::new(None),
            data_size: AtomicI64::new(0),
        }
    }

    /// A transfer that fits one block bypasses multipart entirely.
    pub fn is_single(&self) -> bool {
        self.block_count == 1
    }

    pub(crate) fn is_local_file(&self) -> bool {
        self.sink == BlockSink::LocalFile
    }

    pub fn state(&self) -> FileTaskState {
        *self.state.lock().expect("file task state lock poisoned")
    }

    pub(crate) fn set_state(&self, state: FileTaskState) {
        *self.state.lock().expect("file task state lock poisoned") = state;
    }

    pub fn etag(&self) -> Option<String> {
        self.etag.lock().expect("file task etag lock poisoned").clone()
    }

    pub(crate) fn set_etag(&self, etag: String) {
        *self.etag.lock().expect("file task etag lock poisoned") = Some(etag);
    }

    /// Bytes accumulated into the caller's buffer so far (range reads).
    pub fn data_size(&self) -> i64 {
        self.data_size.load(Ordering::Acquire)
    }

    pub(crate) fn add_data_size(&self, n: i64) {
        self.data_size.fetch_add(n, Ordering::AcqRel);
    }

    /// The size relevant for statistics: what we pushed for a PUT, what we
    /// pulled for a GET.
    pub fn size(&self) -> i64 {
        if self.local_size > 0 {
            self.local_size
        } else {
            self.object_size
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        kind: TransferKind,
        bucket: &str,
        object_key: &str,
        local_path: &str,
        sink: BlockSink,
        block_count: i64,
    ) -> Self {
        let mut task = Self::new(
            kind,
            bucket.to_string(),
            object_key.to_string(),
            Utf8PathBuf::from(local_path),
            crate::MIN_BLOCK_SIZE,
            crate::sts::s3_client_from_sts(&StsInfo::default()),
            StsInfo::default(),
        );
        task.sink = sink;
        task.block_count = block_count;
        task
    }
}

/// One planned block of a transfer, before a worker takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlannedBlock {
    pub number: i64,
    pub file_offset: i64,
    pub size: i64,
    pub offset_in_buffer: usize,
}

/// Splits a whole object of `total_size` bytes into its block layout. An
/// empty object still occupies one zero-length block so every transfer has
/// a barrier to wait on.
pub(crate) fn block_plan(total_size: i64, block_size: i64) -> Vec<PlannedBlock> {
    let count = block_count_for(total_size, block_size);
    (0..count)
        .map(|number| {
            let file_offset = number * block_size;
            PlannedBlock {
                number,
                file_offset,
                size: (total_size - file_offset).min(block_size).max(0),
                offset_in_buffer: 0,
            }
        })
        .collect()
}

pub(crate) fn block_count_for(total_size: i64, block_size: i64) -> i64 {
    ((total_size + block_size - 1) / block_size).max(1)
}

/// Computes the blocks overlapping `[offset, offset + len)` of an object,
/// each clipped to the requested window and annotated with its landing spot
/// in the caller's buffer. Reads past the end of the object are clipped.
pub(crate) fn range_plan(
    object_size: i64,
    offset: i64,
    len: i64,
    block_size: i64,
) -> Vec<PlannedBlock> {
    let end = (offset + len).min(object_size);
    if offset >= end {
        return Vec::new();
    }
    let first = offset / block_size;
    let last = (end - 1) / block_size;
    (first..=last)
        .map(|number| {
            let block_start = number * block_size;
            let block_end = (block_start + block_size).min(object_size);
            let start = block_start.max(offset);
            let stop = block_end.min(end);
            PlannedBlock {
                number,
                file_offset: start,
                size: stop - start,
                offset_in_buffer: (start - offset) as usize,
            }
        })
        .collect()
}

enum Prepared {
    Go,
    Skip(FileTaskState),
}

impl PBucket {
    /// Runs one file task to its terminal state, recording file statistics
    /// on every exit path. This is the single entry point used by the
    /// direct object operations and by [`FileManager`] tasks alike.
    pub(crate) async fn run_file_task(
        &self,
        task: FileTask,
        opts: &TransferOptions,
    ) -> Result<Arc<FileTask>> {
        let started = Instant::now();
        let (task, result) = match task.kind {
            TransferKind::Put => self.put_file(task, opts).await,
            TransferKind::Get => self.get_file(task, opts).await,
        };
        if result.is_err() {
            task.set_state(FileTaskState::Fail);
        }
        opts.file_stats
            .record(&task, started.elapsed().as_millis() as i64);

        match result {
            Ok(()) => Ok(task),
            Err(err) => {
                error!(key = %task.object_key, error = %err, "file task failed");
                Err(err)
            }
        }
    }

    async fn put_file(
        &self,
        mut task: FileTask,
        opts: &TransferOptions,
    ) -> (Arc<FileTask>, Result<()>) {
        match self.prepare_put(&mut task, opts).await {
            Ok(Prepared::Skip(state)) => {
                task.set_state(state);
                debug!(key = %task.object_key, ?state, "put skipped");
                return (Arc::new(task), Ok(()));
            }
            Ok(Prepared::Go) => {}
            Err(err) => return (Arc::new(task), Err(err)),
        }

        let task = Arc::new(task);
        let result = self.put_blocks(&task, opts).await;
        (task, result)
    }

    async fn prepare_put(
        &self,
        task: &mut FileTask,
        opts: &TransferOptions,
    ) -> Result<Prepared> {
        if opts.skip_existing && try_head(task).await.is_some() {
            return Ok(Prepared::Skip(FileTaskState::OkSkipExist));
        }

        if opts.skip_unchanged && compare_unchanged(task).await? {
            return Ok(Prepared::Skip(FileTaskState::OkSkipUnchanged));
        }

        if let Some(meta_key) = task.checksum.metadata_key() {
            if task.local_checksum.is_empty() {
                task.local_checksum = file_checksum(&task.local_path, task.checksum).await?;
            }
            task.metadata
                .insert(meta_key.to_string(), task.local_checksum.clone());
        }

        if !task.is_single() {
            let resp = task
                .s3
                .create_multipart_upload()
                .bucket(&task.sts.bucket_name)
                .key(&task.object_key)
                .set_metadata(non_empty(&task.metadata))
                .send()
                .await
                .map_err(|e| Error::s3(e, "create multipart upload"))?;
            let upload_id = resp.upload_id().ok_or_else(|| {
                Error::S3(anyhow::anyhow!(
                    "create multipart upload returned no upload id for {}",
                    task.object_key
                ))
            })?;
            task.upload_id = Some(upload_id.to_string());
        }

        Ok(Prepared::Go)
    }

    async fn put_blocks(&self, task: &Arc<FileTask>, opts: &TransferOptions) -> Result<()> {
        let plan = block_plan(task.local_size, task.block_size);
        let expected = plan.len();
        let blocks = self.dispatch_blocks(task, plan, opts).await;

        // A block lost to pool shutdown counts as failed too.
        let failed = expected - blocks.iter().filter(|b| b.state.is_ok()).count();
        if failed > 0 {
            if let Some(upload_id) = &task.upload_id {
                self.abort_multipart(task, upload_id).await;
            }
            return Err(Error::BlockFailed {
                key: task.object_key.clone(),
                failed,
                total: task.block_count,
            });
        }

        if let Some(upload_id) = &task.upload_id {
            // `dispatch_blocks` hands the blocks back sorted by number, so
            // the parts are already in ascending PartNumber order.
            let parts: Vec<CompletedPart> = blocks
                .iter()
                .map(|b| {
                    CompletedPart::builder()
                        .part_number((b.number + 1) as i32)
                        .set_e_tag(b.etag.clone())
                        .build()
                })
                .collect();
            let resp = task
                .s3
                .complete_multipart_upload()
                .bucket(&task.sts.bucket_name)
                .key(&task.object_key)
                .upload_id(upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| Error::s3(e, "complete multipart upload"))?;
            if let Some(etag) = resp.e_tag() {
                task.set_etag(etag.to_string());
            }
        }

        task.set_state(FileTaskState::Ok);
        if opts.debug_mode {
            debug!(
                file = %task.local_path,
                bucket = %task.bucket,
                key = %task.object_key,
                blocks = task.block_count,
                "successfully put file"
            );
        }
        Ok(())
    }

    /// Best-effort: the upload is already failed, an abort error only gets
    /// logged.
    async fn abort_multipart(&self, task: &FileTask, upload_id: &str) {
        if let Err(err) = task
            .s3
            .abort_multipart_upload()
            .bucket(&task.sts.bucket_name)
            .key(&task.object_key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(key = %task.object_key, error = %err, "failed to abort multipart upload");
        }
    }

    async fn get_file(
        &self,
        mut task: FileTask,
        opts: &TransferOptions,
    ) -> (Arc<FileTask>, Result<()>) {
        match self.prepare_get(&mut task, opts).await {
            Ok(Prepared::Skip(state)) => {
                task.set_state(state);
                debug!(key = %task.object_key, ?state, "get skipped");
                return (Arc::new(task), Ok(()));
            }
            Ok(Prepared::Go) => {}
            Err(err) => return (Arc::new(task), Err(err)),
        }

        let task = Arc::new(task);
        let result = self.get_blocks(&task, opts).await;
        (task, result)
    }

    async fn prepare_get(
        &self,
        task: &mut FileTask,
        opts: &TransferOptions,
    ) -> Result<Prepared> {
        // The object's size (and checksum, when verification is on) comes
        // from a HeadObject unless the caller already knows the layout,
        // e.g. from a ListObjectsV2 page.
        if task.block_count == 0 || !task.checksum.is_none() {
            let head = try_head(task).await.ok_or_else(|| {
                Error::S3(anyhow::anyhow!("object {} not found", task.object_key))
            })?;
            absorb_head(task, &head);
            if task.block_count == 0 {
                task.block_count = block_count_for(task.object_size, task.block_size);
            }
        }
        task.local_size = task.object_size;

        let local_exists = tokio::fs::metadata(&task.local_path).await.is_ok();
        if opts.skip_existing && local_exists {
            return Ok(Prepared::Skip(FileTaskState::OkSkipExist));
        }
        if opts.skip_unchanged && local_exists && compare_unchanged(task).await? {
            return Ok(Prepared::Skip(FileTaskState::OkSkipUnchanged));
        }

        if let Some(parent) = task.local_path.parent() {
            if !parent.as_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Prepared::Go)
    }

    async fn get_blocks(&self, task: &Arc<FileTask>, opts: &TransferOptions) -> Result<()> {
        let plan = block_plan(task.object_size, task.block_size);
        let expected = plan.len();
        let blocks = self.dispatch_blocks(task, plan, opts).await;

        let failed = expected - blocks.iter().filter(|b| b.state.is_ok()).count();
        if failed > 0 {
            // Part files already written stay in place: an operator can
            // resume or inspect them.
            return Err(Error::BlockFailed {
                key: task.object_key.clone(),
                failed,
                total: task.block_count,
            });
        }

        if !task.is_single() {
            merge_parts(&blocks, &task.local_path).await?;
        }

        if !task.checksum.is_none() && !task.object_checksum.is_empty() {
            let local = file_checksum(&task.local_path, task.checksum).await?;
            if local != task.object_checksum {
                // Keep the downloaded file around for inspection.
                return Err(Error::ChecksumMismatch {
                    key: task.object_key.clone(),
                    expected: task.object_checksum.clone(),
                    actual: local,
                });
            }
        }

        task.set_state(FileTaskState::Ok);
        if opts.debug_mode {
            debug!(
                file = %task.local_path,
                bucket = %task.bucket,
                key = %task.object_key,
                blocks = task.block_count,
                "successfully got file"
            );
        }
        Ok(())
    }

    /// The range-read coordinator: heads the object, plans the overlapping
    /// blocks, fans them out against a caller buffer sink and copies each
    /// block's bytes into its disjoint slice once the barrier releases.
    pub(crate) async fn get_range(
        &self,
        object_key: &str,
        offset: u64,
        buf: &mut [u8],
        opts: &TransferOptions,
    ) -> Result<usize> {
        let (s3, sts) = self.s3_snapshot().await;
        let mut task = FileTask::new(
            TransferKind::Get,
            self.bucket_name().to_string(),
            object_key.to_string(),
            Utf8PathBuf::new(),
            self.block_size(),
            s3,
            sts,
        );
        task.sink = BlockSink::Buffer;
        task.range_offset = offset as i64;

        let head = try_head(&task).await.ok_or_else(|| {
            Error::S3(anyhow::anyhow!("object {object_key} not found"))
        })?;
        absorb_head(&mut task, &head);
        task.local_size = task.object_size;
        task.block_count = block_count_for(task.object_size, task.block_size);

        let plan = range_plan(
            task.object_size,
            offset as i64,
            buf.len() as i64,
            task.block_size,
        );
        if plan.is_empty() {
            task.set_state(FileTaskState::Ok);
            return Ok(0);
        }

        let started = Instant::now();
        let expected = plan.len();
        let task = Arc::new(task);
        let blocks = self.dispatch_blocks(&task, plan, opts).await;

        let failed = expected - blocks.iter().filter(|b| b.state.is_ok()).count();
        if failed > 0 {
            task.set_state(FileTaskState::Fail);
            opts.file_stats
                .record(&task, started.elapsed().as_millis() as i64);
            return Err(Error::BlockFailed {
                key: task.object_key.clone(),
                failed,
                total: task.block_count,
            });
        }

        for block in &blocks {
            if let Some(data) = &block.data {
                buf[block.offset_in_buffer..block.offset_in_buffer + data.len()]
                    .copy_from_slice(data);
            }
        }

        task.set_state(FileTaskState::Ok);
        opts.file_stats
            .record(&task, started.elapsed().as_millis() as i64);
        Ok(task.data_size() as usize)
    }

    /// Fan-out and barrier: every planned block is routed, enqueued on the
    /// worker pool and awaited; the finished blocks come back sorted by
    /// block number with their stats recorded.
    async fn dispatch_blocks(
        &self,
        task: &Arc<FileTask>,
        plan: Vec<PlannedBlock>,
        opts: &TransferOptions,
    ) -> Vec<Block> {
        let expected = plan.len();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for planned in plan {
            let route_key = format!("{}{}", task.object_key, planned.number);
            let pcp_host = self.pcp_host_for(&route_key).await;
            let mut block = Block::new(
                task.clone(),
                planned.number,
                planned.size,
                planned.file_offset,
                pcp_host,
            );
            block.offset_in_buffer = planned.offset_in_buffer;
            block.write_layer = opts.write_layer.unwrap_or(self.default_write_layer());
            block.debug = opts.debug_mode;

            self.worker_pool()
                .submit(BlockJob {
                    block,
                    done: done_tx.clone(),
                })
                .await;
        }
        drop(done_tx);

        let mut blocks = Vec::with_capacity(expected);
        while blocks.len() < expected {
            match done_rx.recv().await {
                Some(block) => blocks.push(block),
                None => break,
            }
        }

        blocks.sort_by_key(|b| b.number);
        for block in &blocks {
            opts.block_stats.record(block);
        }
        blocks
    }
}

fn non_empty(metadata: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.clone())
    }
}

/// HeadObject that treats every error as "not there": the callers branch on
/// presence, and a transient head failure only downgrades a skip decision
/// to a real transfer.
async fn try_head(task: &FileTask) -> Option<HeadObjectOutput> {
    match task
        .s3
        .head_object()
        .bucket(&task.sts.bucket_name)
        .key(&task.object_key)
        .send()
        .await
    {
        Ok(output) => Some(output),
        Err(err) => {
            debug!(key = %task.object_key, error = %err, "head object failed");
            None
        }
    }
}

fn absorb_head(task: &mut FileTask, head: &HeadObjectOutput) {
    task.object_size = head.content_length().unwrap_or(0);
    if let Some(etag) = head.e_tag() {
        task.set_etag(etag.to_string());
    }
    if let Some(metadata) = head.metadata() {
        if task.metadata.is_empty() {
            task.metadata = metadata.clone();
        }
        if let Some(meta_key) = task.checksum.metadata_key() {
            if let Some(sum) = metadata.get(meta_key) {
                task.object_checksum = sum.clone();
            }
        }
    }
}

/// Local and remote compare equal when the configured checksum matches, or,
/// without a checksum, when the sizes do.
async fn compare_unchanged(task: &mut FileTask) -> Result<bool> {
    let Some(head) = try_head(task).await else {
        return Ok(false);
    };

    if let Some(meta_key) = task.checksum.metadata_key() {
        let Some(object_sum) = head.metadata().and_then(|m| m.get(meta_key)).cloned() else {
            return Ok(false);
        };
        if task.local_checksum.is_empty() {
            task.local_checksum = file_checksum(&task.local_path, task.checksum).await?;
        }
        task.object_checksum = object_sum.clone();
        return Ok(task.local_checksum == object_sum);
    }

    let local_size = match task.kind {
        TransferKind::Put => task.local_size,
        TransferKind::Get => tokio::fs::metadata(&task.local_path).await?.len() as i64,
    };
    Ok(head.content_length() == Some(local_size))
}

/// Concatenates the part files in ascending block order into the final
/// local file, then unlinks them. `blocks` arrive sorted from the barrier.
async fn merge_parts(blocks: &[Block], target: &Utf8Path) -> Result<()> {
    let mut out = tokio::fs::File::create(target).await?;
    for block in blocks {
        let part_path = block.part_path();
        let mut part = tokio::fs::File::open(&part_path).await?;
        tokio::io::copy(&mut part, &mut out).await?;
    }
    out.flush().await?;
    drop(out);

    for block in blocks {
        tokio::fs::remove_file(block.part_path()).await?;
    }
    Ok(())
}

/// Schedules concurrent file tasks behind a counting semaphore; used by the
/// sync operations to bound how many files are in flight at once.
pub(crate) struct FileManager {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl FileManager {
    pub(crate) fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: JoinSet::new(),
        }
    }

    pub(crate) fn add_task(&mut self, bucket: PBucket, task: FileTask, opts: TransferOptions) {
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            // Failures are already recorded in the file statistics and
            // logged by the coordinator; a sync keeps going.
            let _ = bucket.run_file_task(task, &opts).await;
        });
    }

    /// Blocks until every added task has finished.
    pub(crate) async fn wait(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "file task panicked");
            }
        }
    }
}

pub(crate) fn log_sync_summary(
    direction: &str,
    from: &str,
    to: &str,
    opts: &TransferOptions,
    started: Instant,
) {
    info!(
        %from,
        %to,
        block_stats = ?opts.block_stats.snapshot(),
        file_stats = ?opts.file_stats.snapshot(),
        total_ms = started.elapsed().as_millis() as i64,
        "{direction} done"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: i64 = 1024 * 1024;

    #[test]
    fn block_plan_splits_with_short_tail() {
        let plan = block_plan(10 * MIB + 1024, 5 * MIB);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].size, 5 * MIB);
        assert_eq!(plan[1].size, 5 * MIB);
        assert_eq!(plan[2].size, 1024);
        assert_eq!(plan[2].file_offset, 10 * MIB);
    }

    #[test]
    fn block_plan_single_block_for_small_and_empty_files() {
        assert_eq!(block_plan(1024, 5 * MIB).len(), 1);
        assert_eq!(block_plan(1024, 5 * MIB)[0].size, 1024);

        let empty = block_plan(0, 5 * MIB);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].size, 0);
    }

    #[test]
    fn block_count_matches_ceiling() {
        assert_eq!(block_count_for(10 * MIB, 5 * MIB), 2);
        assert_eq!(block_count_for(10 * MIB + 1, 5 * MIB), 3);
        assert_eq!(block_count_for(1, 5 * MIB), 1);
        assert_eq!(block_count_for(0, 5 * MIB), 1);
    }

    #[test]
    fn range_plan_touches_exactly_the_overlapping_blocks() {
        // 10 MiB + 1 KiB object, 5 MiB blocks, 1024 bytes straddling the
        // first block boundary.
        let object_size = 10 * MIB + 1024;
        let offset = 5 * MIB - 512;
        let plan = range_plan(object_size, offset, 1024, 5 * MIB);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].number, 0);
        assert_eq!(plan[0].file_offset, offset);
        assert_eq!(plan[0].size, 512);
        assert_eq!(plan[0].offset_in_buffer, 0);
        assert_eq!(plan[1].number, 1);
        assert_eq!(plan[1].file_offset, 5 * MIB);
        assert_eq!(plan[1].size, 512);
        assert_eq!(plan[1].offset_in_buffer, 512);
    }

    #[test]
    fn range_plan_clips_at_end_of_object() {
        let plan = range_plan(6 * MIB, 5 * MIB, 4 * MIB, 5 * MIB);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].number, 1);
        assert_eq!(plan[0].size, MIB);
    }

    #[test]
    fn range_plan_past_end_is_empty() {
        assert!(range_plan(MIB, 2 * MIB, 1024, 5 * MIB).is_empty());
        assert!(range_plan(MIB, 0, 0, 5 * MIB).is_empty());
    }

    #[tokio::test]
    async fn merge_parts_concatenates_and_unlinks() {
        let dir = camino_tempfile::tempdir().unwrap();
        let target = dir.path().join("merged.bin");

        let task = Arc::new(FileTask::for_tests(
            TransferKind::Get,
            "pb",
            "k",
            target.as_str(),
            BlockSink::LocalFile,
            3,
        ));
        let blocks: Vec<Block> = (0..3)
            .map(|i| Block::new(task.clone(), i, 4, i * 4, String::new()))
            .collect();

        for (i, block) in blocks.iter().enumerate() {
            tokio::fs::write(block.part_path(), format!("pt{i}\n"))
                .await
                .unwrap();
        }

        merge_parts(&blocks, &target).await.unwrap();

        let merged = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(merged, "pt0\npt1\npt2\n");
        for block in &blocks {
            assert!(tokio::fs::metadata(block.part_path()).await.is_err());
        }
    }

    #[test]
    fn task_state_and_counters() {
        let task = FileTask::for_tests(
            TransferKind::Put,
            "pb",
            "k",
            "/tmp/f",
            BlockSink::LocalFile,
            1,
        );
        assert_eq!(task.state(), FileTaskState::Fail);
        task.set_state(FileTaskState::OkSkipUnchanged);
        assert_eq!(task.state(), FileTaskState::OkSkipUnchanged);

        assert!(task.etag().is_none());
        task.set_etag("\"abc\"".into());
        assert_eq!(task.etag().as_deref(), Some("\"abc\""));

        task.add_data_size(512);
        task.add_data_size(512);
        assert_eq!(task.data_size(), 1024);
        assert!(task.is_single());
    }
}
