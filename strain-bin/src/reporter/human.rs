use std::io::Write;

use strainbench_lib::{
    config::RunConfig,
    monitor::ThroughputSample,
    probe::ProbeReport,
    report::{Reporter, RunSummary},
};

/// Console output for humans, the rate is rewritten in place on every sample.
pub struct HumanReporter<W> {
    out: W,
    rate_line_open: bool,
}

impl<W: Write> HumanReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rate_line_open: false,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn close_rate_line(&mut self) {
        if self.rate_line_open {
            self.rate_line_open = false;
            let _ = writeln!(self.out);
        }
    }
}

impl<W: Write + Send + 'static> Reporter for HumanReporter<W> {
    fn on_start(&mut self, config: &RunConfig) {
        let _ = writeln!(self.out, "Target requests/second: {}", config.target_rps());
        let _ = writeln!(self.out, "Target website: {}", config.target_uri());
        let _ = self.out.flush();
    }

    fn on_probe(&mut self, probe: &ProbeReport, workers: usize) {
        let _ = writeln!(
            self.out,
            "Average Request Time: {:.4}s",
            probe.avg_latency_secs()
        );
        let _ = writeln!(self.out, "Thread Count: {workers}");
        let _ = writeln!(self.out, "Press Ctrl + C to exit");
        let _ = self.out.flush();
    }

    fn on_sample(&mut self, sample: &ThroughputSample) {
        let _ = write!(
            self.out,
            "\rRequests per second: {:.2} / {}",
            sample.rps, sample.target_rps,
        );
        let _ = self.out.flush();
        self.rate_line_open = true;
    }

    fn finish(&mut self, summary: &RunSummary) {
        self.close_rate_line();
        let _ = writeln!(self.out, "Quitting...");
        let _ = writeln!(
            self.out,
            "Total requests: {} in {:.2}s ({:.2} requests/second, {} errors)",
            summary.total_requests,
            summary.elapsed.as_secs_f64(),
            summary.average_rps(),
            summary.total_errors(),
        );
        let exhausted = summary.exhausted_workers();
        if exhausted > 0 {
            let _ = writeln!(
                self.out,
                "{exhausted} of {} workers stopped after exceeding their error budget",
                summary.workers.len(),
            );
        }
        let _ = self.out.flush();
    }
}
