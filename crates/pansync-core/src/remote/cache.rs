//! Time-boxed cache of the last known good upload endpoint.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{RemoteDisk, RemoteError};

/// Source of "now" for TTL checks, injectable so tests control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Caches the upload endpoint for `ttl`; refreshed lazily on the first call after expiry.
pub struct UploadEndpointCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: Mutex<Option<(String, Instant)>>,
}

impl UploadEndpointCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    fn cached(&self) -> Option<String> {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .filter(|(_, at)| self.clock.now().saturating_duration_since(*at) < self.ttl)
            .map(|(endpoint, _)| endpoint.clone())
    }

    /// Cached endpoint, or a freshly resolved one when missing or expired.
    pub async fn get(&self, remote: &dyn RemoteDisk) -> Result<String, RemoteError> {
        if let Some(endpoint) = self.cached() {
            return Ok(endpoint);
        }
        let endpoint = remote.upload_endpoint().await?;
        tracing::debug!(%endpoint, "resolved upload endpoint");
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((endpoint.clone(), self.clock.now()));
        Ok(endpoint)
    }

    /// Drop the cached endpoint (e.g. after a connection failure against it).
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
