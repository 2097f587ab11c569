//! Short-term credentials and the S3 client bound to them.
//!
//! The PMS answers an STS request with a [`Router`]: a routing policy plus
//! one or more [`StsInfo`] entries. The current policy always selects the
//! first entry. An [`S3ClientManager`] pairs the constructed S3 client with
//! the router it was built from and the wall-clock deadline after which the
//! pair must be rebuilt.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use aws_sdk_s3::config::{AsyncSleep, BehaviorVersion, Credentials, Region, SharedAsyncSleep};
use aws_smithy_async::rt::sleep::TokioSleep;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StsInfo {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub access_secret: String,
    #[serde(default)]
    pub security_token: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub expiration: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    #[serde(default)]
    pub algorithm: RoutingPolicy,
    #[serde(default)]
    pub sts_infos: Vec<StsInfo>,
}

impl Router {
    /// The routing policy in force selects the first STS entry.
    pub fn sts_info(&self) -> &StsInfo {
        &self.sts_infos[0]
    }
}

/// An S3 client built from one STS grant, valid until `expires_at`.
///
/// Instances are immutable once published; refresh replaces the whole
/// manager via pointer swap (see the `PBucket` refresh discipline).
pub struct S3ClientManager {
    client: aws_sdk_s3::Client,
    router: Router,
    expires_at: u64,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

impl S3ClientManager {
    pub fn new(router: Router, ttl_secs: u64) -> Self {
        let client = s3_client_from_sts(router.sts_info());
        Self {
            client,
            router,
            expires_at: unix_now() + ttl_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        unix_now() > self.expires_at
    }

    pub fn s3_client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    pub fn sts_info(&self) -> &StsInfo {
        self.router.sts_info()
    }
}

/// Builds an S3 client bound to the given STS credentials: static
/// AK/SK/session-token, explicit region, custom endpoint with path-style
/// addressing (the PMS hands out endpoints of S3-compatible stores, not
/// only AWS).
pub fn s3_client_from_sts(sts: &StsInfo) -> aws_sdk_s3::Client {
    let session_token = if sts.security_token.is_empty() {
        None
    } else {
        Some(sts.security_token.clone())
    };
    let credentials = Credentials::new(
        sts.access_key.clone(),
        sts.access_secret.clone(),
        session_token,
        None,
        "pcache-sts",
    );

    // The SDK needs a sleep impl for its own backoff machinery even though
    // retries stay at one attempt: the worker pool and the coordinator own
    // retry policy in this system.
    let sleep_impl: Arc<dyn AsyncSleep> = Arc::new(TokioSleep::new());

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::v2023_11_09())
        .region(Region::new(sts.region.clone()))
        .credentials_provider(credentials)
        .sleep_impl(SharedAsyncSleep::from(sleep_impl));

    if !sts.endpoint.is_empty() {
        builder = builder.endpoint_url(sts.endpoint.clone()).force_path_style(true);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_router() -> Router {
        serde_json::from_str(
            r#"{
                "algorithm": {"type": "OneRouter", "name": "default"},
                "stsInfos": [
                    {
                        "accessKey": "AKIA0",
                        "accessSecret": "secret0",
                        "securityToken": "token0",
                        "endpoint": "http://127.0.0.1:9000",
                        "bucketName": "pb-minio",
                        "path": "",
                        "storageType": "minio",
                        "region": "us-east-1",
                        "expiration": 1893456000
                    },
                    {"accessKey": "AKIA1", "accessSecret": "secret1", "bucketName": "other"}
                ]
            }"#,
        )
        .expect("valid router json")
    }

    #[test]
    fn router_selects_first_sts_entry() {
        let router = sample_router();
        assert_eq!(router.sts_info().access_key, "AKIA0");
        assert_eq!(router.sts_info().bucket_name, "pb-minio");
        assert_eq!(router.algorithm.kind, "OneRouter");
    }

    #[tokio::test]
    async fn manager_expiry_uses_seconds() {
        let mgr = S3ClientManager::new(sample_router(), 1800);
        assert!(!mgr.is_expired());
        assert_eq!(mgr.sts_info().region, "us-east-1");

        let stale = S3ClientManager {
            client: mgr.client.clone(),
            router: sample_router(),
            expires_at: unix_now() - 1,
        };
        assert!(stale.is_expired());
    }
}
