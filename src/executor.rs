//! Download Executor for Image Stash
//!
//! This module provides functionality for:
//! 1. Issuing one download request per plan entry, sequentially or with
//!    bounded concurrency
//! 2. Tracking completed/failed counts and surfacing a batch summary
//! 3. Enforcing single-flight batches via a busy flag
//! 4. Aborting a running batch: admission stops, in-flight items settle, the
//!    remainder is reported as cancelled
//!
//! The executor never fetches bytes itself; it drives an injected
//! [`DownloadService`] (the browser downloads API in the product). Sequential
//! mode guarantees issuance order; parallel mode guarantees admission order up
//! to the concurrency bound, but completion order is up to the browser.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conflict::PlanEntry;

/// Error types for batch execution
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("a download batch is already in flight")]
    Busy,
}

/// Result type for batch execution
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Opaque id returned by the download collaborator.
pub type DownloadId = u64;

/// Failure reported by the download collaborator for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("download request failed: {0}")]
pub struct DownloadServiceError(pub String);

/// What the browser should do when the target path already exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    Uniquify,
    Overwrite,
}

/// One fire-and-forget download call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub full_path: String,
    pub conflict_action: ConflictAction,
}

impl DownloadRequest {
    pub fn from_entry(entry: &PlanEntry) -> Self {
        Self {
            url: entry.url.clone(),
            full_path: entry.full_path(),
            conflict_action: if entry.rename.resolved(true) {
                ConflictAction::Uniquify
            } else {
                ConflictAction::Overwrite
            },
        }
    }
}

/// The injected "download one file" capability.
pub trait DownloadService: Send + Sync {
    fn request_download(
        &self,
        request: DownloadRequest,
    ) -> BoxFuture<'_, Result<DownloadId, DownloadServiceError>>;
}

/// One recorded per-item failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
}

/// Terminal state of a batch. Partial failure is a supported outcome, not a
/// fatal one: `failed > 0` carries the failing URLs for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Entries never admitted because the batch was aborted.
    pub cancelled: usize,
    pub errors: Vec<DownloadFailure>,
}

/// Observational progress callback: `(completed, failed, total)` after every
/// settled item. Has no effect on control flow.
pub type ProgressFn = dyn Fn(usize, usize, usize) + Send + Sync;

/// Cancellation token for a running batch.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Stop admitting further items. In-flight requests settle normally.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    completed: usize,
    failed: usize,
}

/// Drives a download plan through the injected service. Progress counters and
/// the busy flag live on the instance, so independent executors never share
/// state.
pub struct Executor {
    service: Arc<dyn DownloadService>,
    busy: AtomicBool,
    abort: Arc<AtomicBool>,
    counters: Mutex<Counters>,
}

/// Clears the busy flag when a batch ends, on every exit path.
struct BatchGuard<'a>(&'a AtomicBool);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Executor {
    pub fn new(service: Arc<dyn DownloadService>) -> Self {
        Self {
            service,
            busy: AtomicBool::new(false),
            abort: Arc::new(AtomicBool::new(false)),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Handle for aborting whichever batch is (or becomes) in flight.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    /// Current `(completed, failed)` counts of the in-flight batch.
    pub fn progress(&self) -> (usize, usize) {
        let counters = self.counters.lock();
        (counters.completed, counters.failed)
    }

    /// Execute the plan one request at a time, awaiting each before issuing
    /// the next. Issuance order follows plan order.
    pub async fn execute_sequential(
        &self,
        plan: &[PlanEntry],
        progress: Option<&ProgressFn>,
    ) -> ExecutorResult<BatchSummary> {
        let _guard = self.begin_batch()?;
        let total = plan.len();
        let mut errors = Vec::new();
        let mut admitted = 0usize;

        for entry in plan {
            if self.abort.load(Ordering::SeqCst) {
                break;
            }
            admitted += 1;
            let result = self
                .service
                .request_download(DownloadRequest::from_entry(entry))
                .await;
            self.settle(&entry.url, result, total, &mut errors, progress);
        }

        Ok(self.finish(total, admitted, errors))
    }

    /// Execute the plan with at most `concurrency` requests in flight.
    /// Admission follows plan order; a slot is refilled whenever an in-flight
    /// request settles. Completion order is nondeterministic.
    pub async fn execute_parallel(
        &self,
        plan: &[PlanEntry],
        concurrency: usize,
        progress: Option<&ProgressFn>,
    ) -> ExecutorResult<BatchSummary> {
        let _guard = self.begin_batch()?;
        let total = plan.len();
        let limit = concurrency.max(1);
        let mut errors = Vec::new();
        let admitted = AtomicUsize::new(0);

        let mut settled = stream::iter(plan.iter())
            .take_while(|_| futures::future::ready(!self.abort.load(Ordering::SeqCst)))
            .map(|entry| {
                admitted.fetch_add(1, Ordering::SeqCst);
                let request = DownloadRequest::from_entry(entry);
                let url = entry.url.clone();
                async move { (url, self.service.request_download(request).await) }
            })
            .buffer_unordered(limit);

        while let Some((url, result)) = settled.next().await {
            self.settle(&url, result, total, &mut errors, progress);
        }
        drop(settled);

        Ok(self.finish(total, admitted.into_inner(), errors))
    }

    fn begin_batch(&self) -> ExecutorResult<BatchGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExecutorError::Busy);
        }
        self.abort.store(false, Ordering::SeqCst);
        *self.counters.lock() = Counters::default();
        Ok(BatchGuard(&self.busy))
    }

    fn settle(
        &self,
        url: &str,
        result: Result<DownloadId, DownloadServiceError>,
        total: usize,
        errors: &mut Vec<DownloadFailure>,
        progress: Option<&ProgressFn>,
    ) {
        let (completed, failed) = {
            let mut counters = self.counters.lock();
            match result {
                Ok(id) => {
                    counters.completed += 1;
                    debug!(url, download_id = id, "download issued");
                }
                Err(error) => {
                    counters.failed += 1;
                    warn!(url, %error, "download request failed");
                    errors.push(DownloadFailure {
                        url: url.to_string(),
                        error: error.to_string(),
                    });
                }
            }
            (counters.completed, counters.failed)
        };
        if let Some(callback) = progress {
            callback(completed, failed, total);
        }
    }

    fn finish(&self, total: usize, admitted: usize, errors: Vec<DownloadFailure>) -> BatchSummary {
        let counters = *self.counters.lock();
        let summary = BatchSummary {
            total,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: total - admitted,
            errors,
        };
        info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "download batch finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{RenamePolicy, detect_conflicts};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn plan_of(urls: &[&str]) -> Vec<PlanEntry> {
        let entries = urls
            .iter()
            .enumerate()
            .map(|(i, url)| PlanEntry::new("dir", format!("file_{i}.jpg"), *url))
            .collect();
        detect_conflicts(entries, true)
    }

    #[derive(Default)]
    struct MockService {
        fail: HashSet<String>,
        requests: Mutex<Vec<DownloadRequest>>,
        delay_ms: u64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockService {
        fn failing(urls: &[&str]) -> Self {
            Self {
                fail: urls.iter().map(|u| u.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    impl DownloadService for MockService {
        fn request_download(
            &self,
            request: DownloadRequest,
        ) -> BoxFuture<'_, Result<DownloadId, DownloadServiceError>> {
            Box::pin(async move {
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);
                if self.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                let failed = self.fail.contains(&request.url);
                let id = {
                    let mut requests = self.requests.lock();
                    requests.push(request);
                    requests.len() as DownloadId
                };
                if failed {
                    Err(DownloadServiceError("blocked by test".to_string()))
                } else {
                    Ok(id)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_sequential_counts_and_errors() {
        let service = Arc::new(MockService::failing(&["u1"]));
        let executor = Executor::new(service.clone());
        let plan = plan_of(&["u0", "u1", "u2"]);

        let summary = executor.execute_sequential(&plan, None).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].url, "u1");

        // Issuance preserves plan order.
        let urls: Vec<String> = service.requests.lock().iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls, ["u0", "u1", "u2"]);
    }

    #[tokio::test]
    async fn test_conflict_action_mapping() {
        let service = Arc::new(MockService::default());
        let executor = Executor::new(service.clone());

        let mut plan = plan_of(&["u0", "u1"]);
        plan[1].rename = RenamePolicy::Overwrite;
        executor.execute_sequential(&plan, None).await.unwrap();

        let requests = service.requests.lock();
        assert_eq!(requests[0].conflict_action, ConflictAction::Uniquify);
        assert_eq!(requests[0].full_path, "dir/file_0.jpg");
        assert_eq!(requests[1].conflict_action, ConflictAction::Overwrite);
    }

    #[tokio::test]
    async fn test_parallel_one_matches_sequential_totals() {
        let plan = plan_of(&["u0", "u1", "u2", "u3"]);

        let sequential = Executor::new(Arc::new(MockService::failing(&["u2"])))
            .execute_sequential(&plan, None)
            .await
            .unwrap();
        let parallel = Executor::new(Arc::new(MockService::failing(&["u2"])))
            .execute_parallel(&plan, 1, None)
            .await
            .unwrap();

        assert_eq!(sequential.completed, parallel.completed);
        assert_eq!(sequential.failed, parallel.failed);
    }

    #[tokio::test]
    async fn test_parallel_respects_concurrency_bound() {
        let service = Arc::new(MockService {
            delay_ms: 5,
            ..Default::default()
        });
        let executor = Executor::new(service.clone());
        let plan = plan_of(&["u0", "u1", "u2", "u3", "u4", "u5"]);

        let summary = executor.execute_parallel(&plan, 2, None).await.unwrap();
        assert_eq!(summary.completed, 6);
        assert!(service.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_progress_callback_after_each_settle() {
        let service = Arc::new(MockService::failing(&["u1"]));
        let executor = Executor::new(service);
        let plan = plan_of(&["u0", "u1"]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = move |completed: usize, failed: usize, total: usize| {
            sink.lock().push((completed, failed, total));
        };
        executor
            .execute_sequential(&plan, Some(&progress))
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![(1, 0, 2), (1, 1, 2)]);
    }

    #[tokio::test]
    async fn test_abort_stops_admission() {
        let service = Arc::new(MockService::default());
        let executor = Executor::new(service);
        let plan = plan_of(&["u0", "u1", "u2"]);

        let handle = executor.abort_handle();
        let progress = move |completed: usize, _failed: usize, _total: usize| {
            if completed == 1 {
                handle.abort();
            }
        };
        let summary = executor
            .execute_sequential(&plan, Some(&progress))
            .await
            .unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.completed + summary.failed + summary.cancelled, summary.total);
    }

    struct GatedService {
        gate: Semaphore,
        started: AtomicUsize,
    }

    impl DownloadService for GatedService {
        fn request_download(
            &self,
            _request: DownloadRequest,
        ) -> BoxFuture<'_, Result<DownloadId, DownloadServiceError>> {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                let _permit = self.gate.acquire().await.map_err(|e| {
                    DownloadServiceError(e.to_string())
                })?;
                Ok(1)
            })
        }
    }

    #[tokio::test]
    async fn test_second_batch_rejected_while_busy() {
        let service = Arc::new(GatedService {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        });
        let executor = Arc::new(Executor::new(service.clone()));
        let plan = plan_of(&["u0"]);

        let running = {
            let executor = executor.clone();
            let plan = plan.clone();
            tokio::spawn(async move { executor.execute_sequential(&plan, None).await })
        };
        while service.started.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = executor.execute_parallel(&plan, 2, None).await;
        assert_eq!(second, Err(ExecutorError::Busy));

        service.gate.add_permits(1);
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.completed, 1);

        // The busy flag clears once the first batch returns.
        let again = executor.execute_sequential(&plan, None).await.unwrap();
        assert_eq!(again.completed, 1);
    }
}
