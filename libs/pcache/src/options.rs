//! Per-operation transfer options, carried through every put/get/sync call.

use std::sync::Arc;

use crate::checksum::ChecksumKind;
use crate::error::{Error, Result};
use crate::stats::{BlockStats, FileStats};

/// Advisory placement of a block inside a PCP, sent as the `X-WRITE-LAYER`
/// bitmask. The PCP is free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteLayer(u8);

impl WriteLayer {
    pub const MEMORY: WriteLayer = WriteLayer(1);
    pub const DISK: WriteLayer = WriteLayer(2);
    pub const REMOTE: WriteLayer = WriteLayer(4);

    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits == 0 || bits > 7 {
            return Err(Error::InvalidConfig(format!(
                "write layer must be a bitmask in 1..=7, got {bits}"
            )));
        }
        Ok(WriteLayer(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn union(self, other: WriteLayer) -> WriteLayer {
        WriteLayer(self.0 | other.0)
    }
}

impl Default for WriteLayer {
    fn default() -> Self {
        WriteLayer::REMOTE
    }
}

/// Options for a single operation (one put/get/range call, or one whole
/// sync). The stats aggregators are shared so a sync's many file tasks fold
/// into the same counters.
#[derive(Clone)]
pub struct TransferOptions {
    /// Sync mode only: log the intended transfer and skip it.
    pub dry_run: bool,
    /// Emit per-block success logs.
    pub debug_mode: bool,
    /// Hint that every file of a batch fits in one block, so transfers can
    /// be planned without consulting the remote size again.
    pub is_small_file: bool,
    /// Before PUT, skip when the object exists; before GET, skip when the
    /// local file exists.
    pub skip_existing: bool,
    /// Skip when local and remote compare equal (by checksum when one is
    /// configured, by size otherwise).
    pub skip_unchanged: bool,
    /// Checksum carried in user metadata and used for equality.
    pub checksum: ChecksumKind,
    /// Advisory PCP placement; `None` uses the bucket's configured default.
    pub write_layer: Option<WriteLayer>,
    pub block_stats: Arc<BlockStats>,
    pub file_stats: Arc<FileStats>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            debug_mode: false,
            is_small_file: false,
            skip_existing: false,
            skip_unchanged: false,
            checksum: ChecksumKind::None,
            write_layer: None,
            block_stats: Arc::new(BlockStats::new()),
            file_stats: Arc::new(FileStats::new()),
        }
    }
}

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }
}
