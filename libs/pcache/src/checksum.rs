//! Content checksums carried in user metadata.
//!
//! The digest (MD5, or CRC32 in big-endian byte order) is Base64-encoded
//! and stored under the reserved metadata key `checksum_<type>`; skip
//! decisions and GET verification compare these strings.

use std::str::FromStr;

use camino::Utf8Path;
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

const READ_BUF_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumKind {
    #[default]
    None,
    Md5,
    Crc32,
}

impl ChecksumKind {
    /// The reserved user-metadata key this checksum is stored under.
    pub fn metadata_key(&self) -> Option<&'static str> {
        match self {
            ChecksumKind::None => None,
            ChecksumKind::Md5 => Some("checksum_md5"),
            ChecksumKind::Crc32 => Some("checksum_crc32"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ChecksumKind::None)
    }
}

impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(ChecksumKind::None),
            "md5" => Ok(ChecksumKind::Md5),
            "crc32" => Ok(ChecksumKind::Crc32),
            other => Err(Error::InvalidConfig(format!(
                "unknown checksum type {other:?}, expected \"md5\" or \"crc32\""
            ))),
        }
    }
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChecksumKind::None => "",
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Crc32 => "crc32",
        };
        f.write_str(s)
    }
}

/// Streams a local file through the digest; the file is never held in
/// memory as a whole.
pub async fn file_checksum(path: &Utf8Path, kind: ChecksumKind) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; READ_BUF_SIZE];

    match kind {
        ChecksumKind::None => Ok(String::new()),
        ChecksumKind::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            let digest = ctx.compute();
            Ok(base64::encode(digest.0))
        }
        ChecksumKind::Crc32 => {
            let mut crc = 0u32;
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                crc = crc32c::crc32c_append(crc, &buf[..n]);
            }
            Ok(base64::encode(crc.to_be_bytes()))
        }
    }
}
