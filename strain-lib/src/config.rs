use std::{num::NonZeroU32, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    http::{HeaderMap, Uri},
};

use crate::http::{RequestTemplate, headers::default_headers};

/// Default amount of successful requests averaged by the latency probe.
pub const DEFAULT_PROBE_SAMPLES: usize = 10;
/// Default ceiling on probe attempts (successful or not).
pub const DEFAULT_PROBE_MAX_ATTEMPTS: usize = 100;
/// Default amount of failed requests a worker tolerates.
pub const DEFAULT_ERROR_BUDGET: u32 = 3;
/// Default cadence of the throughput monitor.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Latency probe parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Successful samples to average.
    pub samples: usize,
    /// Attempts (successful or failed) after which the probe gives up.
    pub max_attempts: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_PROBE_SAMPLES,
            max_attempts: DEFAULT_PROBE_MAX_ATTEMPTS,
        }
    }
}

/// Immutable parameters of a single run.
///
/// Validated on creation, never mutated once the run has started.
#[derive(Debug, Clone)]
pub struct RunConfig {
    target_uri: Uri,
    target_rps: NonZeroU32,
    headers: HeaderMap,
    probe: ProbeConfig,
    error_budget: u32,
    report_interval: Duration,
    max_workers: Option<usize>,
}

impl RunConfig {
    /// Create a config for the given target, using the defaults for everything else.
    ///
    /// Fails if the uri is not an absolute `http(s)` uri or the rate is zero.
    pub fn try_new(target_uri: Uri, target_rps: u32) -> Result<Self, BoxError> {
        match target_uri.scheme_str() {
            Some("http" | "https") => (),
            Some(_) => {
                return Err(BoxError::from("target uri scheme is not http(s)")
                    .context_debug_field("uri", target_uri));
            }
            None => {
                return Err(BoxError::from("target uri is missing a scheme")
                    .context_debug_field("uri", target_uri));
            }
        }
        if target_uri.host().is_none_or(str::is_empty) {
            return Err(BoxError::from("target uri is missing a host")
                .context_debug_field("uri", target_uri));
        }

        let target_rps = NonZeroU32::new(target_rps)
            .ok_or_else(|| BoxError::from("target requests per second must be positive"))?;

        Ok(Self {
            target_uri,
            target_rps,
            headers: default_headers(),
            probe: ProbeConfig::default(),
            error_budget: DEFAULT_ERROR_BUDGET,
            report_interval: DEFAULT_REPORT_INTERVAL,
            max_workers: None,
        })
    }

    pub fn target_uri(&self) -> &Uri {
        &self.target_uri
    }

    pub fn target_rps(&self) -> u32 {
        self.target_rps.get()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn probe(&self) -> ProbeConfig {
        self.probe
    }

    pub fn error_budget(&self) -> u32 {
        self.error_budget
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }

    pub fn max_workers(&self) -> Option<usize> {
        self.max_workers
    }

    /// Replace the header set sent with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the probe parameters; both values are raised to at least 1
    /// and the attempt cap to at least the sample count.
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        let samples = probe.samples.max(1);
        self.probe = ProbeConfig {
            samples,
            max_attempts: probe.max_attempts.max(samples),
        };
        self
    }

    pub fn with_error_budget(mut self, budget: u32) -> Self {
        self.error_budget = budget;
        self
    }

    /// Set the monitor cadence, zero is replaced by the default.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = if interval.is_zero() {
            DEFAULT_REPORT_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Cap the sized worker count; `Some(0)` is treated as `Some(1)`.
    pub fn with_max_workers(mut self, max: Option<usize>) -> Self {
        self.max_workers = max.map(|n| n.max(1));
        self
    }

    pub fn request_template(&self) -> RequestTemplate {
        RequestTemplate::new(self.target_uri.clone(), self.headers.clone())
    }
}
