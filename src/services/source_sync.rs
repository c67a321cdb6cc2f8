//! Source sync service
//!
//! Polls the configured HTTP mirror for the raw endpoint list and keeps the
//! local copy on disk current. Downstream consumers only ever read the local
//! file, so a mirror outage degrades to serving the last good copy. When a
//! poll brings new content the updater is nudged through a watch channel.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::config::SourceConfig;
use crate::error::{RelayError, Result};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Service mirroring the raw endpoint list to the local source path
pub struct SourceSync {
    client: reqwest::Client,
    mirror_url: String,
    local_path: PathBuf,
    poll_interval: Duration,
}

impl SourceSync {
    /// Build the sync service, or `None` when no mirror is configured and
    /// the local file is the sole source of truth.
    pub fn from_config(config: &SourceConfig) -> Result<Option<Self>> {
        let Some(mirror_url) = config.mirror_url.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Some(Self {
            client,
            mirror_url,
            local_path: config.local_path.clone(),
            poll_interval: Duration::from_secs(config.poll_interval.max(1)),
        }))
    }

    /// Fetch the mirror once and persist it.
    ///
    /// Returns `true` when the downloaded content differs from the local
    /// copy. The file is only rewritten on change.
    #[instrument(skip(self), fields(mirror = %self.mirror_url))]
    pub async fn fetch_once(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.mirror_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RelayError::SourceUnavailable(e.to_string()))?;
        let body = response.text().await?;

        let current = tokio::fs::read_to_string(&self.local_path)
            .await
            .unwrap_or_default();
        if body == current {
            debug!("Mirror unchanged");
            return Ok(false);
        }

        if let Some(parent) = self.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.local_path, &body).await?;

        info!(bytes = body.len(), "Source list updated from mirror");
        Ok(true)
    }

    /// Poll the mirror until shutdown, signalling `notify_tx` on new data.
    #[instrument(skip(self, shutdown, notify_tx))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, notify_tx: watch::Sender<()>) {
        info!(
            "Starting source sync (interval: {}s)",
            self.poll_interval.as_secs()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.tick().await; // Initial fetch happens at startup, before run()

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.fetch_once().await {
                        Ok(true) => {
                            let _ = notify_tx.send(());
                        }
                        Ok(false) => {}
                        Err(e) => error!("Mirror poll failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Source sync shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for managing the source sync service
pub struct SourceSyncHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SourceSyncHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// One-shot HTTP server returning a fixed body for every request
    async fn serve_fixed(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}/list.txt", addr)
    }

    fn sync_for(mirror_url: String, local_path: PathBuf) -> SourceSync {
        SourceSync::from_config(&SourceConfig {
            mirror_url: Some(mirror_url),
            local_path,
            poll_interval: 300,
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_from_config_without_mirror() {
        let sync = SourceSync::from_config(&SourceConfig {
            mirror_url: None,
            local_path: PathBuf::from("data/endpoints.txt"),
            poll_interval: 300,
        })
        .unwrap();
        assert!(sync.is_none());
    }

    #[tokio::test]
    async fn test_fetch_writes_new_content() {
        let url = serve_fixed("vless://u@1.2.3.4:443\n").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.txt");

        let sync = sync_for(url, path.clone());
        assert!(sync.fetch_once().await.unwrap());
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "vless://u@1.2.3.4:443\n"
        );

        // Same content again reports no change.
        assert!(!sync.fetch_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_creates_parent_directories() {
        let url = serve_fixed("payload").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/endpoints.txt");

        let sync = sync_for(url, path.clone());
        assert!(sync.fetch_once().await.unwrap());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unreachable_mirror_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sync = sync_for(
            // Reserved port with nothing listening.
            "http://127.0.0.1:1/list.txt".to_string(),
            dir.path().join("endpoints.txt"),
        );
        assert!(sync.fetch_once().await.is_err());
    }
}
