//! Ingest Queue (C7, spec §4.7): a bounded queue of [`ImageJob`]s drained by
//! a fixed worker pool, decoupled from the [`Vision Pipeline`](crate::vision)
//! via [`ImageJobProcessor`] so this module owns only the queueing and
//! concurrency policy.
//!
//! The metrics struct mirrors the teacher's `process::health` counters
//! (attempt/success/failure tallies polled rather than pushed) generalized
//! to ingest depth and overflow outcomes. Cancellation is keyed by
//! `session_id`, grounded on the teacher's `McpManager` pattern of an
//! `Arc<RwLock<HashMap<Id, Running>>>` registry of live work that a later
//! call can look up and cancel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opencane_core::domain::ImageJob;
use opencane_core::settings::OverflowPolicy;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingest queue is full")]
    QueueFull,
    #[error("image job canceled")]
    Canceled,
    #[error("vision processor error: {0}")]
    Processor(String),
}

/// Decouples queueing from vision processing (spec §4.8 is a separate
/// component); implemented by `vision::VisionPipeline`.
#[async_trait]
pub trait ImageJobProcessor: Send + Sync {
    async fn process(&self, job: ImageJob, cancel: CancellationToken);
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    rejected: AtomicU64,
    dropped_oldest: AtomicU64,
    canceled: AtomicU64,
}

/// A point-in-time snapshot of ingest queue health (spec §4.7 "observable
/// metrics").
#[derive(Debug, Clone, Copy)]
pub struct IngestMetrics {
    pub depth: u64,
    pub capacity: u64,
    pub workers: u64,
    pub processed: u64,
    pub rejected: u64,
    pub dropped_oldest: u64,
    pub canceled: u64,
}

struct Shared {
    jobs: Mutex<VecDeque<ImageJob>>,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    notify_push: Notify,
    notify_pop: Notify,
    counters: Counters,
    running: RwLock<HashMap<String, CancellationToken>>,
    processor: Arc<dyn ImageJobProcessor>,
    shutdown: CancellationToken,
}

/// The ingest queue's handle: cloneable, cheap, shared by the worker tasks
/// and by whichever dispatcher code enqueues jobs.
#[derive(Clone)]
pub struct IngestQueue {
    shared: Arc<Shared>,
    workers: usize,
}

impl IngestQueue {
    #[must_use]
    pub fn new(
        capacity: usize,
        workers: usize,
        overflow_policy: OverflowPolicy,
        processor: Arc<dyn ImageJobProcessor>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                overflow_policy,
                notify_push: Notify::new(),
                notify_pop: Notify::new(),
                counters: Counters::default(),
                running: RwLock::new(HashMap::new()),
                processor,
                shutdown: CancellationToken::new(),
            }),
            workers: workers.max(1),
        }
    }

    /// Spawns the fixed worker pool. Each worker loops until `shutdown`.
    pub fn spawn_workers(&self) {
        for _ in 0..self.workers {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                worker_loop(shared).await;
            });
        }
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.notify_pop.notify_waiters();
    }

    /// Enqueue per the configured [`OverflowPolicy`] (spec §4.7).
    pub async fn enqueue(&self, job: ImageJob) -> Result<(), IngestError> {
        loop {
            let mut jobs = self.shared.jobs.lock().await;
            if jobs.len() < self.shared.capacity {
                jobs.push_back(job);
                drop(jobs);
                self.shared.notify_pop.notify_one();
                return Ok(());
            }
            match self.shared.overflow_policy {
                OverflowPolicy::Reject => {
                    self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(IngestError::QueueFull);
                }
                OverflowPolicy::DropOldest => {
                    jobs.pop_front();
                    jobs.push_back(job);
                    self.shared.counters.dropped_oldest.fetch_add(1, Ordering::Relaxed);
                    drop(jobs);
                    self.shared.notify_pop.notify_one();
                    return Ok(());
                }
                OverflowPolicy::Wait => {
                    drop(jobs);
                    self.shared.notify_push.notified().await;
                }
            }
        }
    }

    /// Cancel the in-flight job for a session, if any (spec §4.6 `abort`).
    pub async fn cancel_session(&self, session_id: &str) {
        if let Some(token) = self.shared.running.read().await.get(session_id) {
            token.cancel();
            self.shared.counters.canceled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn metrics(&self) -> IngestMetrics {
        let depth = self.shared.jobs.lock().await.len() as u64;
        IngestMetrics {
            depth,
            capacity: self.shared.capacity as u64,
            workers: self.workers as u64,
            processed: self.shared.counters.processed.load(Ordering::Relaxed),
            rejected: self.shared.counters.rejected.load(Ordering::Relaxed),
            dropped_oldest: self.shared.counters.dropped_oldest.load(Ordering::Relaxed),
            canceled: self.shared.counters.canceled.load(Ordering::Relaxed),
        }
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            loop {
                if shared.shutdown.is_cancelled() {
                    return;
                }
                let mut jobs = shared.jobs.lock().await;
                if let Some(job) = jobs.pop_front() {
                    drop(jobs);
                    shared.notify_push.notify_one();
                    break job;
                }
                drop(jobs);
                tokio::select! {
                    () = shared.notify_pop.notified() => {}
                    () = shared.shutdown.cancelled() => return,
                }
            }
        };

        let token = CancellationToken::new();
        shared.running.write().await.insert(job.session_id.clone(), token.clone());
        shared.processor.process(job.clone(), token.clone()).await;
        shared.running.write().await.remove(&job.session_id);
        if !token.is_cancelled() {
            shared.counters.processed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    struct CountingProcessor {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ImageJobProcessor for CountingProcessor {
        async fn process(&self, _job: ImageJob, _cancel: CancellationToken) {
            self.seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn job(session_id: &str) -> ImageJob {
        ImageJob::new(
            format!("job-{session_id}"),
            session_id.to_string(),
            "dev-1".to_string(),
            vec![1, 2, 3],
            "image/jpeg".to_string(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn reject_policy_errors_when_full() {
        let seen = Arc::new(AtomicUsize::new(0));
        let queue = IngestQueue::new(1, 0, OverflowPolicy::Reject, Arc::new(CountingProcessor { seen }));
        queue.enqueue(job("s1")).await.unwrap();
        let result = queue.enqueue(job("s2")).await;
        assert!(matches!(result, Err(IngestError::QueueFull)));
    }

    #[tokio::test]
    async fn drop_oldest_policy_evicts_front() {
        let seen = Arc::new(AtomicUsize::new(0));
        let queue = IngestQueue::new(1, 0, OverflowPolicy::DropOldest, Arc::new(CountingProcessor { seen }));
        queue.enqueue(job("s1")).await.unwrap();
        queue.enqueue(job("s2")).await.unwrap();
        let metrics = queue.metrics().await;
        assert_eq!(metrics.depth, 1);
        assert_eq!(metrics.dropped_oldest, 1);
    }

    #[tokio::test]
    async fn workers_drain_the_queue() {
        let seen = Arc::new(AtomicUsize::new(0));
        let queue = IngestQueue::new(8, 2, OverflowPolicy::Reject, Arc::new(CountingProcessor { seen: Arc::clone(&seen) }));
        queue.spawn_workers();
        for i in 0..4 {
            queue.enqueue(job(&format!("s{i}"))).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::Relaxed), 4);
        queue.shutdown();
    }
}
