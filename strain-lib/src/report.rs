use std::time::Duration;

use crate::{
    config::RunConfig,
    monitor::ThroughputSample,
    probe::ProbeReport,
    worker::{StopReason, WorkerReport, WorkerStatus},
};

/// Consumer of the run progress, driven by the run controller.
pub trait Reporter: Send + 'static {
    /// The run is about to start probing.
    fn on_start(&mut self, config: &RunConfig);
    /// Probing is done and the worker pool has been sized.
    fn on_probe(&mut self, probe: &ProbeReport, workers: usize);
    /// Called on every monitor tick while the workers run.
    fn on_sample(&mut self, sample: &ThroughputSample);
    /// All workers stopped; called exactly once per run that got started.
    fn finish(&mut self, summary: &RunSummary);
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn on_start(&mut self, config: &RunConfig) {
        (**self).on_start(config)
    }

    fn on_probe(&mut self, probe: &ProbeReport, workers: usize) {
        (**self).on_probe(probe, workers)
    }

    fn on_sample(&mut self, sample: &ThroughputSample) {
        (**self).on_sample(sample)
    }

    fn finish(&mut self, summary: &RunSummary) {
        (**self).finish(summary)
    }
}

/// Everything known about a run once it stopped.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// `None` when the run was cancelled while probing.
    pub probe: Option<ProbeReport>,
    /// Time spent with workers running.
    pub elapsed: Duration,
    pub total_requests: u64,
    pub workers: Vec<WorkerReport>,
}

impl RunSummary {
    pub fn workers_with_status(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    pub fn exhausted_workers(&self) -> usize {
        self.workers_with_status(WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded))
    }

    pub fn total_errors(&self) -> u64 {
        self.workers.iter().map(|w| w.errors as u64).sum()
    }

    /// Average rate over the whole run.
    pub fn average_rps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.total_requests as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_aggregates_workers() {
        let summary = RunSummary {
            probe: None,
            elapsed: Duration::from_secs(4),
            total_requests: 1_000,
            workers: vec![
                WorkerReport {
                    id: 0,
                    status: WorkerStatus::Stopped(StopReason::Cancelled),
                    successes: 600,
                    errors: 2,
                },
                WorkerReport {
                    id: 1,
                    status: WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded),
                    successes: 400,
                    errors: 4,
                },
            ],
        };

        assert_eq!(summary.exhausted_workers(), 1);
        assert_eq!(
            summary.workers_with_status(WorkerStatus::Stopped(StopReason::Cancelled)),
            1
        );
        assert_eq!(summary.total_errors(), 6);
        assert_eq!(summary.average_rps(), 250.0);
        assert_eq!(RunSummary::default().average_rps(), 0.0);
    }
}
