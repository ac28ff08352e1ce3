use std::io::Write;

use strainbench_lib::{
    config::RunConfig,
    monitor::ThroughputSample,
    probe::ProbeReport,
    report::{Reporter, RunSummary},
};

use super::status_label;

/// One json object per line, discriminated by its `type` field.
pub struct JsonlReporter<W> {
    out: W,
}

impl<W: Write> JsonlReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: serde_json::Value) {
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send + 'static> Reporter for JsonlReporter<W> {
    fn on_start(&mut self, config: &RunConfig) {
        self.emit(serde_json::json!({
            "type": "start",
            "url": config.target_uri().to_string(),
            "target_rps": config.target_rps(),
            "error_budget": config.error_budget(),
            "interval_ms": config.report_interval().as_millis(),
        }));
    }

    fn on_probe(&mut self, probe: &ProbeReport, workers: usize) {
        self.emit(serde_json::json!({
            "type": "probe",
            "avg_latency_ms": probe.avg_latency.as_micros() as f64 / 1000.,
            "samples": probe.samples,
            "attempts": probe.attempts,
            "workers": workers,
        }));
    }

    fn on_sample(&mut self, sample: &ThroughputSample) {
        self.emit(serde_json::json!({
            "type": "sample",
            "t_ms": sample.elapsed.as_millis(),
            "rps": sample.rps,
            "target_rps": sample.target_rps,
            "delta": sample.delta,
            "total": sample.total_requests,
            "active_workers": sample.active_workers,
        }));
    }

    fn finish(&mut self, summary: &RunSummary) {
        let workers: Vec<_> = summary
            .workers
            .iter()
            .map(|w| {
                serde_json::json!({
                    "id": w.id,
                    "status": status_label(w.status),
                    "successes": w.successes,
                    "errors": w.errors,
                })
            })
            .collect();

        self.emit(serde_json::json!({
            "type": "final",
            "elapsed_ms": summary.elapsed.as_millis(),
            "total": summary.total_requests,
            "avg_rps": summary.average_rps(),
            "errors": summary.total_errors(),
            "probed": summary.probe.is_some(),
            "workers": workers,
        }));
    }
}
