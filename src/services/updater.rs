//! Availability updater
//!
//! Orchestrates the refresh cycle: pull the raw list from disk, whitelist
//! and merge it into the full candidate set, probe every candidate through
//! the worker pool, then publish the filtered subset. A cycle that fails
//! before publication leaves the previously published snapshot untouched.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::cache::{CacheStore, AVAILABLE_KEY, FULL_KEY};
use crate::config::ProbeSettings;
use crate::error::{RelayError, Result};
use crate::models::EndpointDescriptor;
use crate::parser;
use crate::probe::ProbeScheduler;
use crate::whitelist::WhitelistFilter;

const STABLE_MARK: &str = "Stable | ";

/// Service that keeps the published endpoint snapshot current
pub struct ConfigUpdater {
    cache: Arc<CacheStore>,
    filter: Arc<WhitelistFilter>,
    scheduler: ProbeScheduler,
    source_path: PathBuf,
    settings: ProbeSettings,
}

impl ConfigUpdater {
    pub fn new(
        cache: Arc<CacheStore>,
        filter: Arc<WhitelistFilter>,
        scheduler: ProbeScheduler,
        source_path: PathBuf,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            cache,
            filter,
            scheduler,
            source_path,
            settings,
        }
    }

    /// Run refresh cycles until shutdown.
    ///
    /// `source_rx` fires when the source sync loop has written new raw data;
    /// the updater then folds it in on the spot instead of waiting for the
    /// next tick.
    #[instrument(skip(self, shutdown, source_rx))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, mut source_rx: watch::Receiver<()>) {
        info!(
            "Starting availability updater (interval: {}s)",
            self.settings.refresh_interval
        );

        if let Err(e) = self.refresh_available().await {
            error!("Initial refresh failed: {}", e);
        }

        let mut ticker = interval(std::time::Duration::from_secs(
            self.settings.refresh_interval.max(1),
        ));
        ticker.tick().await; // Skip immediate tick

        // Once the sync side drops its sender the arm is disabled; the
        // ticker alone drives the loop from then on.
        let mut source_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_available().await {
                        error!("Refresh cycle failed: {}", e);
                    }
                }
                changed = source_rx.changed(), if source_open => {
                    match changed {
                        Ok(()) => {
                            if let Err(e) = self.merge_from_source().await {
                                error!("Merging updated source failed: {}", e);
                            }
                        }
                        Err(_) => source_open = false,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Availability updater shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fold the on-disk raw list into the full candidate set.
    ///
    /// New whitelisted descriptors enter with zero history; descriptors
    /// already known by raw connection string keep their accumulated
    /// latency and stability. Returns the size of the merged set.
    #[instrument(skip(self))]
    pub async fn merge_from_source(&self) -> Result<usize> {
        let text = tokio::fs::read_to_string(&self.source_path)
            .await
            .map_err(|e| {
                RelayError::SourceUnavailable(format!("{}: {}", self.source_path.display(), e))
            })?;

        let mut incoming = parser::parse_source_text(&text);
        let parsed = incoming.len();
        incoming.retain(|d| match self.filter.is_available(d) {
            Ok(()) => true,
            Err(e) => {
                debug!(url = %d.url, "Descriptor rejected: {}", e);
                false
            }
        });

        let existing = self.cache.get(FULL_KEY).unwrap_or_default();
        let merged = merge_descriptors(existing, incoming);
        let total = merged.len();

        info!(parsed, accepted = total, "Source merged");
        self.cache.set(FULL_KEY, merged);
        Ok(total)
    }

    /// One full refresh cycle: probe every known candidate, persist the
    /// updated scores, and publish the subset above the acceptance
    /// threshold.
    #[instrument(skip(self))]
    pub async fn refresh_available(&self) -> Result<()> {
        if !self.cache.contains(FULL_KEY) {
            self.merge_from_source().await?;
        }
        let full = self
            .cache
            .get(FULL_KEY)
            .ok_or_else(|| RelayError::SourceUnavailable("no candidates loaded".into()))?;

        let tested = self.scheduler.run(full).await;

        // Scores must survive the cycle, so the full set is written back
        // before filtering.
        self.cache.set(FULL_KEY, tested.clone());

        let available: Vec<EndpointDescriptor> = tested
            .into_iter()
            .filter(|d| d.stability >= self.settings.accept_threshold)
            .map(|mut d| {
                if d.stability >= self.settings.stable_threshold {
                    d.url = mark_as_stable(&d.url);
                }
                d
            })
            .collect();

        info!(published = available.len(), "Availability refreshed");
        self.cache.set(AVAILABLE_KEY, available);
        Ok(())
    }
}

/// Handle for managing the availability updater
pub struct UpdaterHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl UpdaterHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Merge a freshly parsed batch into the existing set, keyed by raw
/// connection string. Existing entries win so probe history is preserved.
fn merge_descriptors(
    existing: Vec<EndpointDescriptor>,
    incoming: Vec<EndpointDescriptor>,
) -> Vec<EndpointDescriptor> {
    let mut merged = existing;
    for candidate in incoming {
        if !merged.iter().any(|d| d.url == candidate.url) {
            merged.push(candidate);
        }
    }
    merged
}

/// Annotate a connection string's display name with the stable marker.
///
/// Idempotent: a URL already carrying the marker is returned unchanged.
fn mark_as_stable(url: &str) -> String {
    match url.split_once('#') {
        Some((_, fragment)) if fragment.starts_with(STABLE_MARK) => url.to_string(),
        Some((before, fragment)) => format!("{}#{}{}", before, STABLE_MARK, fragment),
        None => format!("{}#{}", url, STABLE_MARK),
    }
}
