use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Mutable state shared between the controller, the monitor and every worker of a run.
///
/// Shared by `Arc`; all fields are atomics so no lock is ever taken on the hot path.
#[derive(Debug, Default)]
pub struct RunState {
    total_requests: AtomicU64,
    running: AtomicBool,
    stopped: AtomicBool,
    current_rps: AtomicU64,
    stop_notify: Notify,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful request. Only called by workers.
    pub fn record_success(&self) -> u64 {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark the run as started.
    ///
    /// Returns `false` (and changes nothing) if the run was already stopped,
    /// a stopped run never runs again.
    pub fn start(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        self.running.store(true, Ordering::Release);
        true
    }

    /// Flip `running` to false and wake every worker waiting on [`Self::stopped`].
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.running.store(false, Ordering::Release);
        self.stop_notify.notify_waiters();
        true
    }

    /// Resolves once [`Self::stop`] is called.
    ///
    /// The notification is registered before the flag is checked,
    /// so a stop racing with this call is never missed.
    pub async fn stopped(&self) {
        let notified = self.stop_notify.notified();
        let mut notified = std::pin::pin!(notified);
        notified.as_mut().enable();
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    pub fn current_rps(&self) -> f64 {
        f64::from_bits(self.current_rps.load(Ordering::Relaxed))
    }

    /// Store the latest computed rate. Only called by the throughput monitor.
    pub fn set_current_rps(&self, rps: f64) {
        self.current_rps.store(rps.to_bits(), Ordering::Relaxed);
    }
}
