//! `s3://bucket/key` URI handling.

use anyhow::bail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    /// Object key or prefix; may be empty for the bucket root.
    pub key: String,
}

pub fn is_s3_uri(s: &str) -> bool {
    s.starts_with("s3://")
}

pub fn parse_s3_uri(s: &str) -> anyhow::Result<S3Uri> {
    let Some(rest) = s.strip_prefix("s3://") else {
        bail!("{s:?} is not an s3:// uri");
    };
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        bail!("{s:?} is missing a bucket name");
    }
    Ok(S3Uri {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}
