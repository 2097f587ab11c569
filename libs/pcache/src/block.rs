//! The block: the smallest transferable and routable unit of a file.

use std::sync::Arc;

use bytes::Bytes;
use camino::Utf8PathBuf;

use crate::file_manager::FileTask;
use crate::options::WriteLayer;

/// Terminal state of one block transfer.
///
/// The `OkPcp*` variants order by increasing distance of the served copy:
/// memory beats disk beats the PCP's own remote tier. `OkLocalPcpFail`
/// records that a PCP was tried and failed before the origin succeeded;
/// once set it is never downgraded back to plain `OkLocal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Fail,
    OkPcpRemote,
    OkPcpDisk,
    OkPcpMemory,
    OkLocal,
    OkLocalPcpFail,
}

impl BlockState {
    /// Maps the PCP's `X-CACHE-HIT` response header onto a state:
    /// 0 = served from the PCP's remote tier, 1 = disk, 2 and above =
    /// memory.
    pub fn from_cache_hit(hit: i64) -> Self {
        match hit {
            0 => BlockState::OkPcpRemote,
            1 => BlockState::OkPcpDisk,
            _ => BlockState::OkPcpMemory,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, BlockState::Fail)
    }
}

/// One block of a file transfer.
///
/// Created by the file coordinator during fan-out, handed to exactly one
/// worker through the pool's queue, mutated only by that worker, and handed
/// back to the coordinator once done. The coordinator never touches a block
/// while it is in flight.
pub struct Block {
    pub(crate) task: Arc<FileTask>,
    /// Index of this block within the object's block layout.
    pub number: i64,
    /// Bytes this block actually carries; `<= block_size`, shorter for the
    /// tail block and for clipped range reads.
    pub size: i64,
    /// Absolute offset of this block's first byte within the object.
    pub file_offset: i64,
    /// Range reads only: where this block's bytes land in the caller's
    /// buffer.
    pub offset_in_buffer: usize,
    /// Assigned PCP host; empty means "go straight to the origin store".
    pub pcp_host: String,
    pub etag: Option<String>,
    pub duration_ms: i64,
    pub state: BlockState,
    /// Range reads only: the fetched bytes, copied into the caller's buffer
    /// by the coordinator after the barrier.
    pub(crate) data: Option<Bytes>,
    pub(crate) write_layer: WriteLayer,
    pub(crate) debug: bool,
}

impl Block {
    pub(crate) fn new(
        task: Arc<FileTask>,
        number: i64,
        size: i64,
        file_offset: i64,
        pcp_host: String,
    ) -> Self {
        Self {
            task,
            number,
            size,
            file_offset,
            offset_in_buffer: 0,
            pcp_host,
            etag: None,
            duration_ms: 0,
            state: BlockState::Fail,
            data: None,
            write_layer: WriteLayer::default(),
            debug: false,
        }
    }

    /// `{pcp_host}/{bucket}/{object_key}.{block_number}_{block_count}`
    pub(crate) fn pcp_url(&self) -> String {
        format!(
            "{}/{}/{}.{}_{}",
            self.pcp_host.trim_end_matches('/'),
            self.task.bucket,
            self.task.object_key,
            self.number,
            self.task.block_count,
        )
    }

    /// `{local_path}.{block_number}_{block_count}`, the on-disk part file
    /// a multipart GET writes before the merge.
    pub(crate) fn part_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!(
            "{}.{}_{}",
            self.task.local_path, self.number, self.task.block_count
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::{BlockSink, TransferKind};

    #[test]
    fn cache_hit_header_maps_to_tiers() {
        assert_eq!(BlockState::from_cache_hit(0), BlockState::OkPcpRemote);
        assert_eq!(BlockState::from_cache_hit(1), BlockState::OkPcpDisk);
        assert_eq!(BlockState::from_cache_hit(2), BlockState::OkPcpMemory);
        assert_eq!(BlockState::from_cache_hit(7), BlockState::OkPcpMemory);
    }

    #[test]
    fn pcp_url_and_part_path_layout() {
        let task = Arc::new(FileTask::for_tests(
            TransferKind::Get,
            "pb-minio",
            "test/data.bin",
            "/tmp/data.bin",
            BlockSink::LocalFile,
            4,
        ));
        let block = Block::new(task, 2, 1024, 2 * 1024, "http://pcp-1:8080/".to_string());
        assert_eq!(
            block.pcp_url(),
            "http://pcp-1:8080/pb-minio/test/data.bin.2_4"
        );
        assert_eq!(block.part_path(), Utf8PathBuf::from("/tmp/data.bin.2_4"));
    }
}
