use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering},
};

use rama::{
    Service,
    error::BoxError,
    http::{Request, Response},
    telemetry::tracing::{self, Instrument as _},
};
use tokio::task::JoinHandle;

use crate::{
    http::{RequestOutcome, RequestTemplate},
    state::RunState,
};

/// Why a worker stopped issuing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// More failures than the error budget allows; permanent.
    ErrorBudgetExceeded,
    /// The run was stopped.
    Cancelled,
    /// The worker task panicked or was aborted.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Active,
    Stopped(StopReason),
}

impl WorkerStatus {
    const ACTIVE: u8 = 0;
    const ERROR_BUDGET_EXCEEDED: u8 = 1;
    const CANCELLED: u8 = 2;
    const ABORTED: u8 = 3;

    fn to_u8(self) -> u8 {
        match self {
            Self::Active => Self::ACTIVE,
            Self::Stopped(StopReason::ErrorBudgetExceeded) => Self::ERROR_BUDGET_EXCEEDED,
            Self::Stopped(StopReason::Cancelled) => Self::CANCELLED,
            Self::Stopped(StopReason::Aborted) => Self::ABORTED,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            Self::ACTIVE => Self::Active,
            Self::ERROR_BUDGET_EXCEEDED => Self::Stopped(StopReason::ErrorBudgetExceeded),
            Self::CANCELLED => Self::Stopped(StopReason::Cancelled),
            _ => Self::Stopped(StopReason::Aborted),
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// Final account of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub status: WorkerStatus,
    pub successes: u64,
    pub errors: u32,
}

/// Per worker counters, written by the worker, readable by the controller while it runs.
#[derive(Debug, Default)]
struct WorkerShared {
    status: AtomicU8,
    successes: AtomicU64,
    errors: AtomicU32,
}

impl WorkerShared {
    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    fn report(&self, id: usize) -> WorkerReport {
        WorkerReport {
            id,
            status: self.status(),
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A single sequential requester.
///
/// Loops while the run is active: one request at a time, no backoff.
/// Every 2xx response bumps the shared counter,
/// every other outcome bumps the local error count.
/// Once that count exceeds the error budget the worker stops for good;
/// errors are cumulative, successes in between don't reset them.
pub struct RequestWorker<S> {
    id: usize,
    client: Arc<S>,
    template: RequestTemplate,
    state: Arc<RunState>,
    error_budget: u32,
    shared: Arc<WorkerShared>,
}

impl<S> RequestWorker<S>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    pub fn new(
        id: usize,
        client: Arc<S>,
        template: RequestTemplate,
        state: Arc<RunState>,
        error_budget: u32,
    ) -> Self {
        Self {
            id,
            client,
            template,
            state,
            error_budget,
            shared: Default::default(),
        }
    }

    /// Spawn the worker on the tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let id = self.id;
        let shared = self.shared.clone();
        let join = tokio::spawn(
            self.run()
                .instrument(tracing::trace_span!("request worker", worker.id = id)),
        );
        WorkerHandle { id, shared, join }
    }

    /// Run the worker loop to completion.
    pub async fn run(self) -> WorkerReport {
        let reason = self.request_loop().await;
        self.shared.set_status(WorkerStatus::Stopped(reason));
        self.shared.report(self.id)
    }

    async fn request_loop(&self) -> StopReason {
        let mut errors: u32 = 0;

        loop {
            if !self.state.is_running() {
                return StopReason::Cancelled;
            }

            let result = tokio::select! {
                biased;

                _ = self.state.stopped() => {
                    tracing::trace!("in-flight request dropped: run stopped");
                    return StopReason::Cancelled;
                }
                result = self.client.serve(self.template.build()) => result,
            };

            match RequestOutcome::classify(&result) {
                RequestOutcome::Success => {
                    self.state.record_success();
                    self.shared.successes.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                RequestOutcome::HttpStatus(status) => {
                    tracing::trace!(%status, "request failed: unexpected status");
                }
                RequestOutcome::Failure => {
                    if let Err(err) = result {
                        tracing::trace!("request failed: {err}");
                    }
                }
            }

            errors += 1;
            self.shared.errors.store(errors, Ordering::Relaxed);

            if errors > self.error_budget {
                tracing::debug!(
                    errors,
                    budget = self.error_budget,
                    "worker exceeded its error budget: stop permanently"
                );
                return StopReason::ErrorBudgetExceeded;
            }
        }
    }
}

/// Controller side of a spawned [`RequestWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    shared: Arc<WorkerShared>,
    join: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    pub fn error_count(&self) -> u32 {
        self.shared.errors.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker to exit.
    ///
    /// A panicked worker is reported as [`StopReason::Aborted`].
    pub async fn join(self) -> WorkerReport {
        match self.join.await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(worker.id = self.id, "request worker task failed: {err}");
                self.shared.set_status(WorkerStatus::Stopped(StopReason::Aborted));
                self.shared.report(self.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockClient, MockReply, test_template};

    use std::time::Duration;

    use rama::http::StatusCode;

    fn worker(
        client: &MockClient,
        state: &Arc<RunState>,
        budget: u32,
    ) -> RequestWorker<MockClient> {
        RequestWorker::new(
            0,
            Arc::new(client.clone()),
            test_template(),
            state.clone(),
            budget,
        )
    }

    fn running_state() -> Arc<RunState> {
        let state = Arc::new(RunState::new());
        assert!(state.start());
        state
    }

    #[test]
    fn test_status_roundtrips_through_u8() {
        for status in [
            WorkerStatus::Active,
            WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded),
            WorkerStatus::Stopped(StopReason::Cancelled),
            WorkerStatus::Stopped(StopReason::Aborted),
        ] {
            assert_eq!(WorkerStatus::from_u8(status.to_u8()), status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_after_exceeding_error_budget() {
        let client = MockClient::new(Duration::from_millis(1), MockReply::Error);
        let state = running_state();

        let report = worker(&client, &state, 3).run().await;

        assert_eq!(
            report.status,
            WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded)
        );
        assert_eq!(report.errors, 4);
        assert_eq!(report.successes, 0);
        assert_eq!(client.calls(), 4);
        assert_eq!(state.total_requests(), 0);

        // still running, but this worker is gone for good
        assert!(state.is_running());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_errors_are_cumulative() {
        let client = MockClient::new(Duration::from_millis(1), MockReply::Error).with_script([
            MockReply::Error,
            MockReply::Status(StatusCode::BAD_GATEWAY),
            MockReply::Status(StatusCode::OK),
            MockReply::Status(StatusCode::OK),
            MockReply::Status(StatusCode::OK),
            MockReply::Status(StatusCode::OK),
            MockReply::Status(StatusCode::OK),
            MockReply::Error,
        ]);
        let state = running_state();

        let report = worker(&client, &state, 3).run().await;

        assert_eq!(
            report.status,
            WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded)
        );
        assert_eq!(report.successes, 5);
        assert_eq!(report.errors, 4);
        assert_eq!(client.calls(), 9);
        assert_eq!(state.total_requests(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_with_zero_budget_stops_on_first_failure() {
        let client = MockClient::ok(Duration::from_millis(1))
            .with_script([MockReply::Status(StatusCode::OK), MockReply::Error]);
        let state = running_state();

        let report = worker(&client, &state, 0).run().await;

        assert_eq!(report.successes, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_does_not_start_when_not_running() {
        let client = MockClient::ok(Duration::from_millis(1));
        let state = Arc::new(RunState::new());

        let report = worker(&client, &state, 3).run().await;

        assert_eq!(report.status, WorkerStatus::Stopped(StopReason::Cancelled));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_counts_until_cancelled() {
        let client = MockClient::ok(Duration::from_millis(10));
        let state = running_state();

        let handle = worker(&client, &state, 3).spawn();
        assert_eq!(handle.id(), 0);

        tokio::time::sleep(Duration::from_millis(1_005)).await;
        assert_eq!(handle.status(), WorkerStatus::Active);
        assert!(!handle.is_finished());

        assert!(state.stop());
        let report = handle.join().await;

        assert_eq!(report.status, WorkerStatus::Stopped(StopReason::Cancelled));
        assert_eq!(report.errors, 0);
        assert_eq!(report.successes, 100);

        let total = state.total_requests();
        assert_eq!(total, 100);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(state.total_requests(), total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hanging_request() {
        let client = MockClient::new(Duration::ZERO, MockReply::Hang);
        let state = running_state();

        let handle = worker(&client, &state, 3).spawn();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.calls(), 1);
        assert!(!handle.is_finished());

        state.stop();
        let report = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
        assert_eq!(report.status, WorkerStatus::Stopped(StopReason::Cancelled));
        assert_eq!(report.successes, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_workers_lose_no_updates() {
        const WORKERS: usize = 8;
        const REQUESTS_PER_WORKER: usize = 250;

        let state = running_state();
        let handles: Vec<_> = (0..WORKERS)
            .map(|id| {
                // every worker gets its own scripted client: M successes, then failures
                let client = MockClient::new(Duration::ZERO, MockReply::Error).with_script(
                    std::iter::repeat_n(MockReply::Status(StatusCode::OK), REQUESTS_PER_WORKER),
                );
                RequestWorker::new(id, Arc::new(client), test_template(), state.clone(), 0)
                    .spawn()
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            let report = handle.join().await;
            assert_eq!(
                report.status,
                WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded)
            );
            assert_eq!(report.successes, REQUESTS_PER_WORKER as u64);
            successes += report.successes;
        }

        assert_eq!(successes, (WORKERS * REQUESTS_PER_WORKER) as u64);
        assert_eq!(state.total_requests(), (WORKERS * REQUESTS_PER_WORKER) as u64);
    }
}
