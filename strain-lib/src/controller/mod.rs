use std::{fmt, sync::Arc};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response},
    telemetry::tracing,
};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    config::RunConfig,
    monitor::ThroughputMonitor,
    probe::{ProbeReport, probe_latency},
    report::{Reporter, RunSummary},
    sizer::size_workers,
    state::RunState,
    worker::{RequestWorker, WorkerHandle},
};

/// Uncapped pools above this size are reported as a likely misconfiguration.
pub const LARGE_WORKER_POOL: usize = 10_000;

/// Lifecycle of a [`RunController`].
///
/// `Idle → Probing → Sizing → Running → Cancelling → Stopped`,
/// where cancelling while probing skips straight to `Cancelling`
/// and a failed probe goes straight to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Probing,
    Sizing,
    Running,
    Cancelling,
    Stopped,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Sizing => "sizing",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Drives a single run: probe, size, spawn workers, monitor until cancelled, join.
pub struct RunController<S, R> {
    config: RunConfig,
    client: Arc<S>,
    reporter: R,
    state: Arc<RunState>,
    phase: RunPhase,
}

impl<S, R> fmt::Debug for RunController<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .finish()
    }
}

impl<S, R> RunController<S, R>
where
    S: Service<Request, Output = Response, Error = BoxError>,
    R: Reporter,
{
    pub fn new(config: RunConfig, client: S, reporter: R) -> Self {
        Self {
            config,
            client: Arc::new(client),
            reporter,
            state: Arc::new(RunState::new()),
            phase: RunPhase::Idle,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    fn transition(&mut self, next: RunPhase) {
        tracing::debug!(from = %self.phase, to = %next, "run phase transition");
        self.phase = next;
    }

    /// Execute the run until `cancel` resolves.
    ///
    /// Only returns an error if the latency probe fails or the controller already ran;
    /// cancellation, at any phase, is a clean stop.
    pub async fn run<F>(&mut self, cancel: F) -> Result<RunSummary, BoxError>
    where
        F: Future,
    {
        if self.phase != RunPhase::Idle {
            return Err(BoxError::from("run controller can only be run once")
                .context_field("phase", self.phase));
        }

        let mut cancel = std::pin::pin!(cancel);

        tracing::info!(
            uri = %self.config.target_uri(),
            target_rps = self.config.target_rps(),
            "starting run",
        );
        self.reporter.on_start(&self.config);

        self.transition(RunPhase::Probing);
        let template = self.config.request_template();
        let client = self.client.clone();

        let maybe_probe = tokio::select! {
            _ = cancel.as_mut() => None,
            result = probe_latency(&*client, &template, self.config.probe()) => Some(result),
        };

        let probe = match maybe_probe {
            None => {
                tracing::info!("run cancelled while probing latency");
                return Ok(self.stop_run(Vec::new(), None, None).await);
            }
            Some(Err(err)) => {
                self.state.stop();
                self.transition(RunPhase::Stopped);
                return Err(err)
                    .context("probe average request latency")
                    .context_field("uri", self.config.target_uri().clone());
            }
            Some(Ok(probe)) => probe,
        };

        self.transition(RunPhase::Sizing);
        let workers = self.size_worker_pool(&probe);
        self.reporter.on_probe(&probe, workers);

        self.transition(RunPhase::Running);
        self.state.start();
        let handles: Vec<WorkerHandle> = (0..workers)
            .map(|id| {
                RequestWorker::new(
                    id,
                    self.client.clone(),
                    template.clone(),
                    self.state.clone(),
                    self.config.error_budget(),
                )
                .spawn()
            })
            .collect();
        let started = Instant::now();
        tracing::debug!(workers, "request workers spawned");

        self.monitor(&handles, started, cancel.as_mut()).await;

        Ok(self.stop_run(handles, Some(probe), Some(started)).await)
    }

    fn size_worker_pool(&self, probe: &ProbeReport) -> usize {
        let sized = size_workers(probe.avg_latency_secs(), self.config.target_rps());

        let workers = match self.config.max_workers() {
            Some(max) if sized > max => {
                tracing::warn!(
                    sized,
                    max,
                    "sized worker count exceeds the configured maximum: cap it",
                );
                max
            }
            Some(_) => sized,
            None => {
                if sized > LARGE_WORKER_POOL {
                    tracing::warn!(
                        sized,
                        "very large worker pool: use a worker cap to bound memory usage",
                    );
                }
                sized
            }
        };

        tracing::info!(
            avg_latency = ?probe.avg_latency,
            samples = probe.samples,
            attempts = probe.attempts,
            workers,
            "worker pool sized",
        );

        workers
    }

    /// Sample the counter every report interval until `cancel` resolves.
    async fn monitor<F>(
        &mut self,
        handles: &[WorkerHandle],
        started: Instant,
        mut cancel: std::pin::Pin<&mut F>,
    ) where
        F: Future,
    {
        let mut monitor =
            ThroughputMonitor::new(self.config.report_interval(), self.config.target_rps());

        let mut ticker =
            tokio::time::interval_at(started + monitor.interval(), monitor.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut all_stopped_reported = false;

        loop {
            tokio::select! {
                _ = cancel.as_mut() => {
                    tracing::debug!("cancellation received: stop monitoring");
                    return;
                }
                _ = ticker.tick() => {
                    // a panicked task never records its stop, only its join handle knows
                    let active = handles
                        .iter()
                        .filter(|h| h.status().is_active() && !h.is_finished())
                        .count();
                    let sample = monitor.sample(&self.state, started.elapsed(), active);
                    self.reporter.on_sample(&sample);

                    if active == 0 && !all_stopped_reported {
                        all_stopped_reported = true;
                        tracing::warn!(
                            workers = handles.len(),
                            "all workers stopped (error budget exceeded or task failed); keep monitoring until cancelled",
                        );
                    }
                }
            }
        }
    }

    async fn stop_run(
        &mut self,
        handles: Vec<WorkerHandle>,
        probe: Option<ProbeReport>,
        started: Option<Instant>,
    ) -> RunSummary {
        self.transition(RunPhase::Cancelling);
        self.state.stop();

        let mut workers = Vec::with_capacity(handles.len());
        for handle in handles {
            workers.push(handle.join().await);
        }

        let summary = RunSummary {
            probe,
            elapsed: started.map(|t| t.elapsed()).unwrap_or_default(),
            total_requests: self.state.total_requests(),
            workers,
        };

        tracing::info!(
            total_requests = summary.total_requests,
            elapsed = ?summary.elapsed,
            exhausted_workers = summary.exhausted_workers(),
            "all workers stopped",
        );

        self.transition(RunPhase::Stopped);
        self.reporter.finish(&summary);
        summary
    }
}
