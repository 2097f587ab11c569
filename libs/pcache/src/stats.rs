//! Transfer statistics, aggregated across the block worker pool and the
//! file task coordinator.
//!
//! Both aggregators are mutated from many tasks at once, so every field is
//! an atomic; a consistent-enough snapshot is taken field by field when the
//! caller asks for one.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::block::{Block, BlockState};
use crate::file_manager::{FileTask, FileTaskState};

#[derive(Default)]
pub struct BlockStats {
    count_total: AtomicI64,
    count_fail: AtomicI64,
    count_pcp_remote: AtomicI64,
    count_pcp_disk: AtomicI64,
    count_pcp_memory: AtomicI64,
    count_local: AtomicI64,
    count_local_pcp_fail: AtomicI64,
    time_total_ms: AtomicI64,
    time_max_ms: AtomicI64,
    time_min_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStatsSnapshot {
    pub count_total: i64,
    pub count_fail: i64,
    pub count_pcp_remote: i64,
    pub count_pcp_disk: i64,
    pub count_pcp_memory: i64,
    pub count_local: i64,
    pub count_local_pcp_fail: i64,
    pub time_total_ms: i64,
    pub time_max_ms: i64,
    pub time_min_ms: i64,
}

impl BlockStats {
    pub fn new() -> Self {
        Self {
            time_min_ms: AtomicI64::new(i64::MAX),
            ..Default::default()
        }
    }

    pub(crate) fn record(&self, block: &Block) {
        self.count_total.fetch_add(1, Ordering::Relaxed);
        let counter = match block.state {
            BlockState::Fail => &self.count_fail,
            BlockState::OkPcpRemote => &self.count_pcp_remote,
            BlockState::OkPcpDisk => &self.count_pcp_disk,
            BlockState::OkPcpMemory => &self.count_pcp_memory,
            BlockState::OkLocal => &self.count_local,
            BlockState::OkLocalPcpFail => &self.count_local_pcp_fail,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.time_total_ms
            .fetch_add(block.duration_ms, Ordering::Relaxed);
        self.time_max_ms
            .fetch_max(block.duration_ms, Ordering::Relaxed);
        self.time_min_ms
            .fetch_min(block.duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BlockStatsSnapshot {
        BlockStatsSnapshot {
            count_total: self.count_total.load(Ordering::Relaxed),
            count_fail: self.count_fail.load(Ordering::Relaxed),
            count_pcp_remote: self.count_pcp_remote.load(Ordering::Relaxed),
            count_pcp_disk: self.count_pcp_disk.load(Ordering::Relaxed),
            count_pcp_memory: self.count_pcp_memory.load(Ordering::Relaxed),
            count_local: self.count_local.load(Ordering::Relaxed),
            count_local_pcp_fail: self.count_local_pcp_fail.load(Ordering::Relaxed),
            time_total_ms: self.time_total_ms.load(Ordering::Relaxed),
            time_max_ms: self.time_max_ms.load(Ordering::Relaxed),
            time_min_ms: self.time_min_ms.load(Ordering::Relaxed),
        }
    }

    pub fn average_time_ms(&self) -> i64 {
        let count = self.count_total.load(Ordering::Relaxed);
        if count > 0 {
            self.time_total_ms.load(Ordering::Relaxed) / count
        } else {
            0
        }
    }
}

impl std::fmt::Debug for BlockStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}

#[derive(Default)]
pub struct FileStats {
    count_total: AtomicI64,
    count_fail: AtomicI64,
    count_success: AtomicI64,
    count_skip_exist: AtomicI64,
    count_skip_unchanged: AtomicI64,
    size_total: AtomicI64,
    size_max: AtomicI64,
    size_min: AtomicI64,
    time_total_ms: AtomicI64,
    time_max_ms: AtomicI64,
    time_min_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStatsSnapshot {
    pub count_total: i64,
    pub count_fail: i64,
    pub count_success: i64,
    pub count_skip_exist: i64,
    pub count_skip_unchanged: i64,
    pub size_total: i64,
    pub size_max: i64,
    pub size_min: i64,
    pub time_total_ms: i64,
    pub time_max_ms: i64,
    pub time_min_ms: i64,
}

impl FileStats {
    pub fn new() -> Self {
        Self {
            size_min: AtomicI64::new(i64::MAX),
            time_min_ms: AtomicI64::new(i64::MAX),
            ..Default::default()
        }
    }

    pub(crate) fn record(&self, task: &FileTask, duration_ms: i64) {
        self.count_total.fetch_add(1, Ordering::Relaxed);
        match task.state() {
            FileTaskState::Fail => {
                self.count_fail.fetch_add(1, Ordering::Relaxed);
            }
            FileTaskState::Ok => {
                self.count_success.fetch_add(1, Ordering::Relaxed);
            }
            FileTaskState::OkSkipExist => {
                self.count_success.fetch_add(1, Ordering::Relaxed);
                self.count_skip_exist.fetch_add(1, Ordering::Relaxed);
            }
            FileTaskState::OkSkipUnchanged => {
                self.count_success.fetch_add(1, Ordering::Relaxed);
                self.count_skip_unchanged.fetch_add(1, Ordering::Relaxed);
            }
        }

        let size = task.size();
        self.size_total.fetch_add(size, Ordering::Relaxed);
        self.size_max.fetch_max(size, Ordering::Relaxed);
        self.size_min.fetch_min(size, Ordering::Relaxed);

        self.time_total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.time_max_ms.fetch_max(duration_ms, Ordering::Relaxed);
        self.time_min_ms.fetch_min(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FileStatsSnapshot {
        FileStatsSnapshot {
            count_total: self.count_total.load(Ordering::Relaxed),
            count_fail: self.count_fail.load(Ordering::Relaxed),
            count_success: self.count_success.load(Ordering::Relaxed),
            count_skip_exist: self.count_skip_exist.load(Ordering::Relaxed),
            count_skip_unchanged: self.count_skip_unchanged.load(Ordering::Relaxed),
            size_total: self.size_total.load(Ordering::Relaxed),
            size_max: self.size_max.load(Ordering::Relaxed),
            size_min: self.size_min.load(Ordering::Relaxed),
            time_total_ms: self.time_total_ms.load(Ordering::Relaxed),
            time_max_ms: self.time_max_ms.load(Ordering::Relaxed),
            time_min_ms: self.time_min_ms.load(Ordering::Relaxed),
        }
    }

    pub fn average_time_ms(&self) -> i64 {
        let count = self.count_total.load(Ordering::Relaxed);
        if count > 0 {
            self.time_total_ms.load(Ordering::Relaxed) / count
        } else {
            0
        }
    }

    pub fn average_size(&self) -> i64 {
        let count = self.count_total.load(Ordering::Relaxed);
        if count > 0 {
            self.size_total.load(Ordering::Relaxed) / count
        } else {
            0
        }
    }
}

impl std::fmt::Debug for FileStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::block::Block;
    use crate::file_manager::{BlockSink, TransferKind};

    fn block(state: BlockState, duration_ms: i64) -> Block {
        let task = Arc::new(FileTask::for_tests(
            TransferKind::Put,
            "pb",
            "k",
            "/tmp/f",
            BlockSink::LocalFile,
            1,
        ));
        let mut block = Block::new(task, 0, 1024, 0, String::new());
        block.state = state;
        block.duration_ms = duration_ms;
        block
    }

    #[test]
    fn block_stats_count_per_state_and_track_times() {
        let stats = BlockStats::new();
        stats.record(&block(BlockState::OkLocal, 10));
        stats.record(&block(BlockState::OkPcpDisk, 30));
        stats.record(&block(BlockState::OkPcpMemory, 20));
        stats.record(&block(BlockState::OkLocalPcpFail, 40));
        stats.record(&block(BlockState::Fail, 5));

        let snap = stats.snapshot();
        assert_eq!(snap.count_total, 5);
        assert_eq!(snap.count_local, 1);
        assert_eq!(snap.count_pcp_disk, 1);
        assert_eq!(snap.count_pcp_memory, 1);
        assert_eq!(snap.count_local_pcp_fail, 1);
        assert_eq!(snap.count_fail, 1);
        assert_eq!(snap.count_pcp_remote, 0);
        assert_eq!(snap.time_total_ms, 105);
        assert_eq!(snap.time_max_ms, 40);
        assert_eq!(snap.time_min_ms, 5);
        assert_eq!(stats.average_time_ms(), 21);
    }

    #[test]
    fn file_stats_separate_skips_from_plain_success() {
        let stats = FileStats::new();

        let ok = FileTask::for_tests(
            TransferKind::Put,
            "pb",
            "k",
            "/tmp/f",
            BlockSink::LocalFile,
            1,
        );
        ok.set_state(FileTaskState::Ok);
        stats.record(&ok, 100);

        let skipped = FileTask::for_tests(
            TransferKind::Put,
            "pb",
            "k2",
            "/tmp/f2",
            BlockSink::LocalFile,
            1,
        );
        skipped.set_state(FileTaskState::OkSkipUnchanged);
        stats.record(&skipped, 1);

        let failed = FileTask::for_tests(
            TransferKind::Get,
            "pb",
            "k3",
            "/tmp/f3",
            BlockSink::LocalFile,
            1,
        );
        failed.set_state(FileTaskState::Fail);
        stats.record(&failed, 7);

        let snap = stats.snapshot();
        assert_eq!(snap.count_total, 3);
        assert_eq!(snap.count_success, 2);
        assert_eq!(snap.count_skip_unchanged, 1);
        assert_eq!(snap.count_skip_exist, 0);
        assert_eq!(snap.count_fail, 1);
        assert_eq!(snap.time_max_ms, 100);
        assert_eq!(snap.time_min_ms, 1);
    }
}
