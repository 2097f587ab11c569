/// Errors surfaced by the public `PBucket` API.
///
/// Per-block failures never appear here directly: a worker records the
/// outcome on the block and the file coordinator folds the terminal states
/// into either success or [`Error::BlockFailed`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The PMS refused or could not serve a request after all retries.
    #[error("pms request failed: {0:#}")]
    Pms(#[source] anyhow::Error),

    /// An origin (S3) request failed.
    #[error("s3 request failed: {0:#}")]
    S3(#[source] anyhow::Error),

    /// A PCP protocol error that could not be recovered by falling back to
    /// the origin store.
    #[error("pcp request failed: {0:#}")]
    Pcp(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Downloaded bytes do not match the checksum recorded on the object.
    /// The local file is left in place for inspection.
    #[error("checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// One or more blocks of a file transfer terminated in FAIL.
    #[error("{failed} of {total} blocks failed for {key}")]
    BlockFailed {
        key: String,
        failed: usize,
        total: i64,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wraps an S3 SDK error, preserving the service error detail that the
    /// SDK otherwise hides behind "service error".
    pub(crate) fn s3<E>(err: E, context: &'static str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::S3(anyhow::Error::new(err).context(context))
    }
}
