//! Per-account FIFO for recursive remote listings.
//!
//! Recursive listings are rate limited far below what single calls allow, so
//! every page request of every folder of one account goes through one queue
//! that issues calls no closer together than the configured interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use crate::remote::{RemoteDisk, RemoteEntry, RemoteError};

struct ListRequest {
    path: String,
    reply: oneshot::Sender<Result<Vec<RemoteEntry>, RemoteError>>,
}

/// Handle to an account's listing queue. Cheap to clone.
#[derive(Clone)]
pub struct ListingQueue {
    tx: mpsc::UnboundedSender<ListRequest>,
}

impl ListingQueue {
    /// Spawn the queue task. It exits once every handle is dropped.
    pub fn spawn(remote: Arc<dyn RemoteDisk>, spacing: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(remote, spacing, rx));
        Self { tx }
    }

    /// Every entry below `path`, walking all pages. Requests are served in
    /// arrival order.
    pub async fn list_all(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ListRequest {
                path: path.to_string(),
                reply,
            })
            .map_err(|_| RemoteError::Connection("listing queue closed".into()))?;
        rx.await
            .map_err(|_| RemoteError::Connection("listing queue dropped request".into()))?
    }
}

async fn run_queue(
    remote: Arc<dyn RemoteDisk>,
    spacing: Duration,
    mut rx: mpsc::UnboundedReceiver<ListRequest>,
) {
    let mut ticker = interval(spacing.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while let Some(req) = rx.recv().await {
        let mut entries = Vec::new();
        let mut cursor = 0u64;
        let result = loop {
            ticker.tick().await;
            match remote.list_recursive(&req.path, cursor).await {
                Ok(page) => {
                    entries.extend(page.entries);
                    if !page.has_more {
                        break Ok(std::mem::take(&mut entries));
                    }
                    cursor = page.cursor;
                }
                Err(e) => break Err(e),
            }
        };
        match &result {
            Ok(list) => tracing::debug!(path = %req.path, entries = list.len(), "remote listing done"),
            Err(e) => tracing::warn!(path = %req.path, error = %e, "remote listing failed"),
        }
        let _ = req.reply.send(result);
    }
    tracing::debug!("listing queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::DirRemote;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn pages_are_spaced_by_interval() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::create_dir_all(dir.path().join("r").join(name)).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("s")).unwrap();
        std::fs::write(dir.path().join("s/f"), b"1").unwrap();
        let remote = Arc::new(DirRemote::new(dir.path()).with_page_size(1));
        let queue = ListingQueue::spawn(remote.clone(), Duration::from_secs(7));

        let start = Instant::now();
        let (r, s) = tokio::join!(queue.list_all("/r"), queue.list_all("/s"));
        assert_eq!(r.unwrap().len(), 3);
        assert_eq!(s.unwrap().len(), 1);
        // Four calls: the first is immediate, the rest wait a full interval.
        assert_eq!(remote.list_requests(), 4);
        assert!(start.elapsed() >= Duration::from_secs(21));
    }

    #[tokio::test]
    async fn errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ListingQueue::spawn(
            Arc::new(DirRemote::new(dir.path())),
            Duration::from_millis(1),
        );
        assert!(matches!(
            queue.list_all("/missing").await,
            Err(RemoteError::NotFound(_))
        ));
    }
}
