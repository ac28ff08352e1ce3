use std::time::Duration;

use crate::state::RunState;

/// One reading of the throughput monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Time since the workers were spawned.
    pub elapsed: Duration,
    /// Requests per second over the last interval.
    pub rps: f64,
    pub target_rps: u32,
    /// Successful requests since the previous sample.
    pub delta: u64,
    /// Successful requests since the start of the run.
    pub total_requests: u64,
    /// Workers that did not stop yet.
    pub active_workers: usize,
}

/// Rate over a single interval; zero for an empty interval.
pub fn compute_rps(delta: u64, interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    delta as f64 / secs
}

/// Turns successive readings of the shared counter into rates.
///
/// The rate is computed over the nominal interval,
/// not over the time that actually passed between two samples.
#[derive(Debug, Clone)]
pub struct ThroughputMonitor {
    interval: Duration,
    target_rps: u32,
    previous: u64,
}

impl ThroughputMonitor {
    pub fn new(interval: Duration, target_rps: u32) -> Self {
        Self {
            interval,
            target_rps,
            previous: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Read the counter, publish the new rate into `state` and return the sample.
    pub fn sample(
        &mut self,
        state: &RunState,
        elapsed: Duration,
        active_workers: usize,
    ) -> ThroughputSample {
        let total_requests = state.total_requests();
        // counter is monotonic, saturate anyway so a misuse can't underflow
        let delta = total_requests.saturating_sub(self.previous);
        self.previous = total_requests;

        let rps = compute_rps(delta, self.interval);
        state.set_current_rps(rps);

        ThroughputSample {
            elapsed,
            rps,
            target_rps: self.target_rps,
            delta,
            total_requests,
            active_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_rps() {
        for (delta, interval, expected) in [
            (50, Duration::from_millis(500), 100.0),
            (0, Duration::from_millis(500), 0.0),
            (1, Duration::from_secs(1), 1.0),
            (250, Duration::from_millis(250), 1000.0),
            (10, Duration::ZERO, 0.0),
        ] {
            assert_eq!(
                compute_rps(delta, interval),
                expected,
                "delta = {delta}, interval = {interval:?}"
            );
        }
    }

    #[test]
    fn test_monitor_samples_deltas() {
        let state = RunState::new();
        let mut monitor = ThroughputMonitor::new(Duration::from_millis(500), 100);

        for _ in 0..50 {
            state.record_success();
        }
        let sample = monitor.sample(&state, Duration::from_millis(500), 4);
        assert_eq!(sample.delta, 50);
        assert_eq!(sample.rps, 100.0);
        assert_eq!(sample.total_requests, 50);
        assert_eq!(sample.target_rps, 100);
        assert_eq!(sample.active_workers, 4);
        assert_eq!(state.current_rps(), 100.0);

        for _ in 0..20 {
            state.record_success();
        }
        let sample = monitor.sample(&state, Duration::from_secs(1), 4);
        assert_eq!(sample.delta, 20);
        assert_eq!(sample.rps, 40.0);
        assert_eq!(sample.total_requests, 70);

        let sample = monitor.sample(&state, Duration::from_millis(1_500), 0);
        assert_eq!(sample.delta, 0);
        assert_eq!(sample.rps, 0.0);
        assert_eq!(state.current_rps(), 0.0);
    }
}
