//! PMS endpoint failover.
//!
//! The probe keeps an atomically-swapped slice of candidate PMS URLs ranked
//! by measured response time. Callers take the first active entry; a failed
//! request demotes its URL and forces a re-probe in the background. Probes
//! are single-flight and rate-limited to one per [`PROBE_MIN_PERIOD`] unless
//! forced.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::secret::SecretManager;

pub const URL_PATH_PMS_LIST: &str = "/api/v1/pms/list";

/// Minimum delay between two unforced probes.
pub const PROBE_MIN_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Validity window of the token attached to PMS list requests.
const PMS_LIST_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

/// One peer PMS as returned by `/api/v1/pms/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmsInfo {
    #[serde(default)]
    pub host: String,
    #[serde(rename = "metaVersion", default)]
    pub meta_version: i64,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

pub struct UrlStat {
    pub url: String,
    response_time_ms: AtomicI64,
    active: AtomicBool,
}

impl UrlStat {
    fn new(url: String, response_time_ms: i64) -> Self {
        Self {
            url,
            response_time_ms: AtomicI64::new(response_time_ms),
            active: AtomicBool::new(true),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn response_time_ms(&self) -> i64 {
        self.response_time_ms.load(Ordering::Relaxed)
    }
}

pub struct UrlProbe {
    inner: Arc<ProbeInner>,
}

struct ProbeInner {
    base_url: String,
    http: reqwest::Client,
    secrets: SecretManager,
    urls: ArcSwap<Vec<Arc<UrlStat>>>,
    probing: AtomicBool,
    last_probe_unix_ms: AtomicU64,
    min_period: Duration,
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// Joins a base URL and an absolute path without doubling the separator.
pub(crate) fn merge_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl UrlProbe {
    /// Seeds the probe with the configured base URL. The peer list is only
    /// learned from `/api/v1/pms/list` once a probe runs.
    pub fn new(base_url: String, http: reqwest::Client, secrets: SecretManager) -> Self {
        let seed = vec![Arc::new(UrlStat::new(base_url.clone(), 0))];
        Self {
            inner: Arc::new(ProbeInner {
                base_url,
                http,
                secrets,
                urls: ArcSwap::from_pointee(seed),
                probing: AtomicBool::new(false),
                last_probe_unix_ms: AtomicU64::new(0),
                min_period: PROBE_MIN_PERIOD,
            }),
        }
    }

    /// Returns the URL the next PMS request should target: the first active
    /// entry, else the first entry at all, else the seed base URL after a
    /// forced probe.
    pub async fn get_url(&self) -> String {
        let urls = self.inner.urls.load();
        if let Some(stat) = urls.iter().find(|u| u.is_active()) {
            return stat.url.clone();
        }
        if let Some(stat) = urls.first() {
            // All entries demoted: keep serving the least-bad candidate and
            // re-rank in the background.
            self.spawn_probe(true);
            return stat.url.clone();
        }
        drop(urls);

        self.inner.clone().probe(true).await;
        let urls = self.inner.urls.load();
        urls.first()
            .map(|u| u.url.clone())
            .unwrap_or_else(|| self.inner.base_url.clone())
    }

    /// Demotes a URL that just failed a request and forces a background
    /// re-probe.
    pub fn report_fail(&self, url: &str) {
        let urls = self.inner.urls.load();
        for stat in urls.iter() {
            if stat.url == url {
                stat.active.store(false, Ordering::Release);
                warn!(%url, "pms url demoted after request failure");
            }
        }
        self.spawn_probe(true);
    }

    pub fn urls(&self) -> Vec<Arc<UrlStat>> {
        self.inner.urls.load().as_ref().clone()
    }

    /// Runs a probe to completion. Exposed for callers that want the
    /// re-ranked list before their next request; most paths rely on
    /// [`UrlProbe::report_fail`] and the background probe instead.
    pub async fn probe_now(&self) {
        self.inner.clone().probe(true).await;
    }

    fn spawn_probe(&self, force: bool) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.probe(force).await;
        });
    }
}

impl ProbeInner {
    /// Fetches the peer list, probes every candidate concurrently, and
    /// swaps in the successes sorted by response time. Single-flight: a
    /// second caller while a probe is in flight returns immediately.
    async fn probe(self: Arc<Self>, force: bool) {
        if self
            .probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let _reset = scopeguard::guard((), |_| {
            self.probing.store(false, Ordering::Release);
        });

        let now = unix_ms();
        let last = self.last_probe_unix_ms.load(Ordering::Acquire);
        if !force && now.saturating_sub(last) < self.min_period.as_millis() as u64 {
            return;
        }
        self.last_probe_unix_ms.store(now, Ordering::Release);

        let candidates = self.refresh_candidates().await;
        if candidates.is_empty() {
            warn!("pms probe found no candidate urls, keeping current list");
            return;
        }

        let probes = candidates.into_iter().map(|url| {
            let inner = self.clone();
            async move {
                let started = Instant::now();
                match inner.fetch_pms_list(&url).await {
                    Ok(_) => Some((url, started.elapsed().as_millis() as i64)),
                    Err(err) => {
                        debug!(%url, error = %err, "pms candidate failed probe");
                        None
                    }
                }
            }
        });
        let mut ranked: Vec<(String, i64)> = futures::future::join_all(probes)
            .await
            .into_iter()
            .flatten()
            .collect();
        if ranked.is_empty() {
            warn!("all pms candidates failed the probe, keeping current list");
            return;
        }
        ranked.sort_by_key(|(_, ms)| *ms);

        let stats: Vec<Arc<UrlStat>> = ranked
            .into_iter()
            .map(|(url, ms)| Arc::new(UrlStat::new(url, ms)))
            .collect();
        info!(
            best = %stats[0].url,
            count = stats.len(),
            "pms url list re-ranked"
        );
        self.urls.store(Arc::new(stats));
    }

    /// The candidate set for a probe: the peer list served by the first
    /// active URL, else by any known URL, else by the original base.
    async fn refresh_candidates(&self) -> Vec<String> {
        let current = self.urls.load();
        let mut sources: Vec<String> = current
            .iter()
            .filter(|u| u.is_active())
            .map(|u| u.url.clone())
            .collect();
        sources.extend(current.iter().map(|u| u.url.clone()));
        sources.push(self.base_url.clone());

        for source in sources {
            match self.fetch_pms_list(&source).await {
                Ok(list) if !list.is_empty() => {
                    return list.into_iter().map(|p| p.host).collect();
                }
                Ok(_) => {
                    debug!(%source, "pms returned an empty peer list");
                }
                Err(err) => {
                    debug!(%source, error = %err, "failed to refresh pms list");
                }
            }
        }
        // Could not learn a peer list from anyone; fall back to probing
        // what we already know.
        let current = self.urls.load();
        if current.is_empty() {
            vec![self.base_url.clone()]
        } else {
            current.iter().map(|u| u.url.clone()).collect()
        }
    }

    async fn fetch_pms_list(&self, base: &str) -> anyhow::Result<Vec<PmsInfo>> {
        let url = merge_url(base, URL_PATH_PMS_LIST);
        let token = self.secrets.token(None, PMS_LIST_TOKEN_VALIDITY)?;
        let resp = self
            .http
            .get(&url)
            .header("X-AK", self.secrets.access_key())
            .header("X-TOKEN", token)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        resp.json::<Vec<PmsInfo>>()
            .await
            .with_context(|| format!("invalid pms list payload from {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(urls: &[&str]) -> UrlProbe {
        let probe = UrlProbe::new(
            urls[0].to_string(),
            reqwest::Client::new(),
            SecretManager::new("ak", "sk"),
        );
        let seeded: Vec<Arc<UrlStat>> = urls
            .iter()
            .map(|u| Arc::new(UrlStat::new(u.to_string(), 0)))
            .collect();
        probe.inner.urls.store(Arc::new(seeded));
        probe
    }

    #[tokio::test]
    async fn get_url_returns_first_active() {
        let probe = probe_with(&["http://pms-a", "http://pms-b"]);
        assert_eq!(probe.get_url().await, "http://pms-a");

        probe.report_fail("http://pms-a");
        assert_eq!(probe.get_url().await, "http://pms-b");
    }

    #[tokio::test]
    async fn get_url_falls_back_to_first_when_all_demoted() {
        let probe = probe_with(&["http://pms-a", "http://pms-b"]);
        probe.report_fail("http://pms-a");
        probe.report_fail("http://pms-b");
        assert_eq!(probe.get_url().await, "http://pms-a");
    }

    #[test]
    fn merge_url_normalizes_separators() {
        assert_eq!(
            merge_url("http://h:1/", "/api/v1/pms/list"),
            "http://h:1/api/v1/pms/list"
        );
        assert_eq!(
            merge_url("http://h:1", "api/v1/pms/list"),
            "http://h:1/api/v1/pms/list"
        );
    }
}
