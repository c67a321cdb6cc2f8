//! Worker pool scheduler
//!
//! Fixed pool of workers draining a shared queue of descriptor indices.
//! Each worker is bound to one local port for its whole lifetime so no two
//! probes ever share a listener port, and each descriptor is only written
//! by the worker that pulled its index. The caller blocks until every job
//! has drained (join barrier).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::models::{EndpointDescriptor, TEST_RESULT_FAILED};
use crate::probe::ProbeEngine;
use crate::scoring;

/// Roughly how many descriptors one worker should cover
const DESCRIPTORS_PER_WORKER: usize = 32;

/// Schedules probes for a batch of descriptors across a bounded worker pool
pub struct ProbeScheduler {
    engine: Arc<dyn ProbeEngine>,
    base_port: u16,
    min_workers: usize,
}

impl ProbeScheduler {
    pub fn new(engine: Arc<dyn ProbeEngine>, base_port: u16, min_workers: usize) -> Self {
        Self {
            engine,
            base_port,
            min_workers,
        }
    }

    /// Pool size for a batch: one worker per ~32 descriptors with a
    /// configurable floor, never more workers than jobs or than local
    /// ports left above `base_port`.
    fn worker_count(&self, batch: usize) -> usize {
        let ports_available = (u16::MAX - self.base_port) as usize + 1;
        (batch / DESCRIPTORS_PER_WORKER)
            .max(self.min_workers)
            .max(1)
            .min(batch)
            .min(ports_available)
    }

    /// Probe every descriptor in the batch, applying the stability scorer
    /// per job, and return the batch with `test_result` and `stability`
    /// updated in place.
    #[instrument(skip(self, descriptors), fields(batch = descriptors.len()))]
    pub async fn run(&self, descriptors: Vec<EndpointDescriptor>) -> Vec<EndpointDescriptor> {
        if descriptors.is_empty() {
            return descriptors;
        }

        let batch = descriptors.len();
        let worker_count = self.worker_count(batch);
        info!("{} descriptors will be tested by {} workers", batch, worker_count);

        // Per-index mutexes: workers only ever lock indices they pulled, so
        // there is no contention, only partitioned ownership.
        let shared: Arc<Vec<Mutex<EndpointDescriptor>>> =
            Arc::new(descriptors.into_iter().map(Mutex::new).collect());

        // Enqueue every index, then close the queue by dropping the sender.
        let (tx, rx) = mpsc::unbounded_channel();
        for index in 0..batch {
            let _ = tx.send(index);
        }
        drop(tx);
        let jobs = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for w in 0..worker_count {
            let port = self.base_port + w as u16;
            let engine = Arc::clone(&self.engine);
            let shared = Arc::clone(&shared);
            let jobs = Arc::clone(&jobs);

            workers.push(tokio::spawn(async move {
                loop {
                    let index = { jobs.lock().await.recv().await };
                    let Some(index) = index else { break };

                    let snapshot = shared[index].lock().clone();
                    let outcome = engine.probe(&snapshot, port).await;

                    let mut descriptor = shared[index].lock();
                    match outcome {
                        Ok(latency) => {
                            // Sub-millisecond results round up so a success
                            // is never confused with "never probed".
                            descriptor.test_result = (latency.as_millis() as i64).max(1);
                            descriptor.stability = scoring::on_success(descriptor.stability);
                        }
                        Err(e) => {
                            warn!(url = %descriptor.url, "Probe failed: {}", e);
                            descriptor.test_result = TEST_RESULT_FAILED;
                            descriptor.stability = scoring::on_failure(descriptor.stability);
                        }
                    }
                }
            }));
        }

        // Synchronous barrier: nothing is published until every job drains.
        futures::future::join_all(workers).await;

        match Arc::try_unwrap(shared) {
            Ok(slots) => slots.into_iter().map(Mutex::into_inner).collect(),
            Err(shared) => shared.iter().map(|slot| slot.lock().clone()).collect(),
        }
    }
}
