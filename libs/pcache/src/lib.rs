//! Client SDK for moving files between a local filesystem and an
//! S3-compatible object store, accelerated by a fleet of peer cache
//! proxies (PCPs).
//!
//! Data travels in fixed-size blocks. A consistent-hash ring routes each
//! block to a PCP that may absorb it and promote it to the backing store
//! asynchronously; on any PCP failure the block transparently falls back
//! to the origin. Files larger than one block use the store's multipart
//! upload protocol, smaller ones a single put/get.
//!
//! [`PBucket`] is the entry point: it wires the PMS client (STS grants and
//! PCP topology), the pointer-swapped credential/topology caches and the
//! block worker pool together, and exposes the object operations.
#![deny(unsafe_code)]

mod block;
mod block_worker;
mod bucket;
mod chash;
mod checksum;
mod error;
mod file_manager;
mod options;
mod pcp_manager;
mod pms;
mod secret;
mod stats;
mod sts;
mod url_probe;

pub use block::BlockState;
pub use bucket::{
    GetObjectOutcome, ObjectEntry, ObjectInfo, ObjectPage, PBucket, PBucketConfig,
    PutObjectOutcome, DEFAULT_BLOCK_WORKER_THREADS, DEFAULT_FILE_TASK_THREADS,
    DEFAULT_PCP_TTL_SECS, DEFAULT_STS_TTL_SECS, DEFAULT_WORKER_CHANNEL_SIZE, MIN_BLOCK_SIZE,
};
pub use chash::{ConsistentHash, PcpTable, PhysicalNode};
pub use checksum::{file_checksum, ChecksumKind};
pub use error::{Error, Result};
pub use file_manager::{FileTask, FileTaskState, TransferKind};
pub use options::{TransferOptions, WriteLayer};
pub use pcp_manager::PcpManager;
pub use pms::{PmsClient, PMS_RETRY_COUNT};
pub use secret::SecretManager;
pub use stats::{BlockStats, BlockStatsSnapshot, FileStats, FileStatsSnapshot};
pub use sts::{Router, RoutingPolicy, S3ClientManager, StsInfo};
pub use url_probe::{PmsInfo, UrlProbe, PROBE_MIN_PERIOD};
