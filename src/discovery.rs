//! Backend capability discovery.
//!
//! One best-effort GET against the health endpoint decides which session
//! model the backend supports. Discovery never fails: a network error,
//! non-200 status, or malformed body collapses to the conservative legacy
//! default, and callers proceed with durable storage.

use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::Mutex;

use crate::error::{OrbitLinkError, Result};
use crate::models::{BackendCapabilities, HealthCheckResponse};

/// Minimum backend version known to ship the refresh endpoint and the
/// secure-cookie session model. Used only when the health endpoint omits
/// an explicit capabilities object.
pub const MIN_REFRESH_VERSION: (u64, u64, u64) = (1, 2, 0);

const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(10);

/// One-shot, cached capability probe against `GET {base}/v1/api/health`.
pub struct CapabilityProbe {
    http: reqwest::Client,
    base_url: String,
    cache: Mutex<Option<(Instant, BackendCapabilities)>>,
}

impl CapabilityProbe {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url,
            cache: Mutex::new(None),
        }
    }

    /// Discover the backend's session capabilities.
    ///
    /// Never errors; every failure path yields
    /// [`BackendCapabilities::default()`].
    pub async fn discover(&self) -> BackendCapabilities {
        {
            let cache = self.cache.lock().await;
            if let Some((probed_at, capabilities)) = *cache {
                if probed_at.elapsed() < DISCOVERY_CACHE_TTL {
                    debug!(
                        "[DISCOVERY] Returning cached capabilities (age: {:?})",
                        probed_at.elapsed()
                    );
                    return capabilities;
                }
            }
        }

        let capabilities = match self.fetch_health().await {
            Ok(health) => {
                let capabilities = classify_capabilities(&health);
                debug!(
                    "[DISCOVERY] Backend version={} capabilities={:?}",
                    health.version, capabilities
                );
                capabilities
            }
            Err(e) => {
                debug!(
                    "[DISCOVERY] Probe failed, assuming legacy backend: {}",
                    e
                );
                BackendCapabilities::default()
            }
        };

        let mut cache = self.cache.lock().await;
        *cache = Some((Instant::now(), capabilities));
        capabilities
    }

    async fn fetch_health(&self) -> Result<HealthCheckResponse> {
        let url = format!("{}/v1/api/health", self.base_url);
        debug!("[DISCOVERY] Fetching {}", url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrbitLinkError::NetworkError(format!(
                "Health probe returned HTTP {}",
                status
            )));
        }
        Ok(response.json::<HealthCheckResponse>().await?)
    }
}

/// Derive capabilities from a health response.
///
/// An explicit capabilities object wins verbatim; otherwise the reported
/// version is compared against [`MIN_REFRESH_VERSION`] as a secondary
/// signal of refresh support.
pub fn classify_capabilities(health: &HealthCheckResponse) -> BackendCapabilities {
    if let Some(capabilities) = health.capabilities {
        return capabilities;
    }
    if version_at_least(&health.version, MIN_REFRESH_VERSION) {
        BackendCapabilities::secure_cookie()
    } else {
        BackendCapabilities::default()
    }
}

/// Lenient `major.minor.patch` comparison. Malformed versions compare as
/// older than everything (conservative).
fn version_at_least(version: &str, min: (u64, u64, u64)) -> bool {
    let mut parts = version.trim().trim_start_matches('v').splitn(3, '.');
    let mut next = || -> Option<u64> {
        parts
            .next()?
            .split(|c: char| !c.is_ascii_digit())
            .next()?
            .parse()
            .ok()
    };
    let (Some(major), Some(minor)) = (next(), next()) else {
        return false;
    };
    let patch = next().unwrap_or(0);
    (major, minor, patch) >= min
}
