use std::{fmt, time::Duration};

use rama::{
    Service,
    error::BoxError,
    http::{Request, Response},
    telemetry::tracing,
};
use tokio::time::Instant;

use crate::{
    config::ProbeConfig,
    http::{RequestOutcome, RequestTemplate},
};

/// Result of a successful latency probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReport {
    /// Mean duration of the successful requests, always strictly positive.
    pub avg_latency: Duration,
    /// Successful requests the mean is computed over.
    pub samples: usize,
    /// Requests sent in total, failed ones included.
    pub attempts: usize,
}

impl ProbeReport {
    pub fn avg_latency_secs(&self) -> f64 {
        self.avg_latency.as_secs_f64()
    }
}

/// Why the latency probe could not produce a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The attempt cap was reached before enough successful samples were collected.
    AttemptsExhausted { successes: usize, attempts: usize },
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptsExhausted {
                successes,
                attempts,
            } => write!(
                f,
                "latency probe gave up after {attempts} attempts with only {successes} successful responses"
            ),
        }
    }
}

impl std::error::Error for ProbeFailure {}

/// Measure the average latency of sequential requests to the target.
///
/// Only successful responses are sampled; failed attempts are retried
/// until `cfg.samples` samples are collected or `cfg.max_attempts` requests were sent.
pub async fn probe_latency<S>(
    client: &S,
    template: &RequestTemplate,
    cfg: ProbeConfig,
) -> Result<ProbeReport, ProbeFailure>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    let samples_wanted = cfg.samples.max(1);
    let max_attempts = cfg.max_attempts.max(samples_wanted);

    let mut total = Duration::ZERO;
    let mut samples = 0;
    let mut attempts = 0;

    while samples < samples_wanted {
        if attempts >= max_attempts {
            return Err(ProbeFailure::AttemptsExhausted {
                successes: samples,
                attempts,
            });
        }
        attempts += 1;

        let start = Instant::now();
        let result = client.serve(template.build()).await;
        let elapsed = start.elapsed();

        match RequestOutcome::classify(&result) {
            RequestOutcome::Success => {
                total += elapsed;
                samples += 1;
                tracing::trace!(attempt = attempts, ?elapsed, "probe sample collected");
            }
            RequestOutcome::HttpStatus(status) => {
                tracing::debug!(attempt = attempts, %status, "probe request rejected: retry");
            }
            RequestOutcome::Failure => {
                if let Err(err) = result {
                    tracing::debug!(attempt = attempts, "probe request failed: retry: {err}");
                }
            }
        }
    }

    // u32 is plenty: samples is bounded by the attempt cap
    let divisor = u32::try_from(samples).unwrap_or(u32::MAX);
    let avg_latency = (total / divisor).max(Duration::from_nanos(1));

    tracing::debug!(?avg_latency, samples, attempts, "latency probe finished");

    Ok(ProbeReport {
        avg_latency,
        samples,
        attempts,
    })
}
