//! Client for the Permission/Management Service.
//!
//! Two authenticated GET surfaces: STS grants for the origin store and the
//! PCP topology table. Every call retries against the probe's current best
//! URL and reports failures back to it, so a dead PMS is demoted and the
//! fleet re-ranked while callers keep going.

use std::time::Duration;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::warn;

use crate::chash::PcpTable;
use crate::error::{Error, Result};
use crate::secret::SecretManager;
use crate::sts::Router;
use crate::url_probe::{merge_url, UrlProbe};

const URL_PATH_STS: &str = "/api/v1/pb";
const URL_PATH_PCP: &str = "/api/v1/pcp/hash";

/// Retries per PMS call before the error is surfaced.
pub const PMS_RETRY_COUNT: usize = 3;

/// Validity window of the token attached to STS requests.
const STS_TOKEN_VALIDITY: Duration = Duration::from_secs(1800);
/// Validity window of the token attached to PCP table requests.
const PCP_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

pub struct PmsClient {
    http: reqwest::Client,
    secrets: SecretManager,
    probe: UrlProbe,
}

impl PmsClient {
    pub fn new(pms_url: String, secrets: SecretManager) -> Result<Self> {
        if pms_url.is_empty() {
            return Err(Error::InvalidConfig("missing pms url".into()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Pms(e.into()))?;
        let probe = UrlProbe::new(pms_url, http.clone(), secrets.clone());
        Ok(Self {
            http,
            secrets,
            probe,
        })
    }

    pub fn probe(&self) -> &UrlProbe {
        &self.probe
    }

    /// Fetches a fresh [`Router`] (STS grant) for the bucket.
    ///
    /// `GET {base}/api/v1/pb/{bucket}/sts?path=…&permissions=…&permissions=…`
    pub async fn fetch_sts(
        &self,
        bucket: &str,
        path: &str,
        permissions: &[String],
    ) -> Result<Router> {
        let mut claims = Map::new();
        claims.insert("bucket".into(), Value::String(bucket.to_string()));
        claims.insert("path".into(), Value::String(path.to_string()));
        claims.insert(
            "permissions".into(),
            Value::Array(
                permissions
                    .iter()
                    .map(|p| Value::String(p.clone()))
                    .collect(),
            ),
        );

        let mut query: Vec<(&str, String)> = Vec::new();
        if !path.is_empty() {
            query.push(("path", path.to_string()));
        }
        for permission in permissions {
            query.push(("permissions", permission.clone()));
        }

        let router: Router = self
            .get_json(
                &format!("{URL_PATH_STS}/{bucket}/sts"),
                &query,
                Some(claims),
                STS_TOKEN_VALIDITY,
            )
            .await?;
        if router.sts_infos.is_empty() {
            return Err(Error::Pms(anyhow::anyhow!(
                "pms returned a router without sts entries for bucket {bucket}"
            )));
        }
        Ok(router)
    }

    /// Fetches the PCP topology table.
    ///
    /// The checksum of the currently-installed table is passed along so the
    /// server may answer with an unchanged marker; a response whose checksum
    /// equals the query means "nothing changed".
    pub async fn fetch_pcp_table(&self, checksum: &str) -> Result<PcpTable> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !checksum.is_empty() {
            query.push(("checksum", checksum.to_string()));
        }
        self.get_json(URL_PATH_PCP, &query, None, PCP_TOKEN_VALIDITY)
            .await
    }

    /// One signed GET with up to [`PMS_RETRY_COUNT`] attempts. Every failed
    /// attempt is reported to the URL probe before the next one picks the
    /// (possibly re-ranked) current URL.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        claims: Option<Map<String, Value>>,
        token_validity: Duration,
    ) -> Result<T> {
        let mut last_err = None;
        for attempt in 1..=PMS_RETRY_COUNT {
            let base = self.probe.get_url().await;
            let url = merge_url(&base, path);
            match self
                .try_get_json(&url, query, claims.clone(), token_validity)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(%url, attempt, error = %format!("{err:#}"), "pms request failed");
                    self.probe.report_fail(&base);
                    last_err = Some(err);
                }
            }
        }
        Err(Error::Pms(last_err.expect("at least one attempt ran")))
    }

    async fn try_get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        claims: Option<Map<String, Value>>,
        token_validity: Duration,
    ) -> anyhow::Result<T> {
        let token = self.secrets.token(claims, token_validity)?;
        let resp = self
            .http
            .get(url)
            .query(query)
            .header("X-AK", self.secrets.access_key())
            .header("X-TOKEN", token)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("invalid payload from {url}"))
    }
}
