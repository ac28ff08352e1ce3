use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::Notify;

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful,
    http::{HeaderName, HeaderValue, Uri},
    telemetry::tracing,
};

use clap::Parser;
use strainbench_lib::{
    config::{
        DEFAULT_ERROR_BUDGET, DEFAULT_PROBE_MAX_ATTEMPTS, DEFAULT_PROBE_SAMPLES, ProbeConfig,
        RunConfig,
    },
    controller::RunController,
    http::headers::{default_headers, merge_headers, parse_header},
    report::Reporter,
    utils,
};

pub mod client;
pub mod reporter;

use self::reporter::{HumanReporter, JsonlReporter};

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Estimate the sustainable request throughput of an HTTP server.
///
/// Measures the latency of a few sequential requests, sizes a pool of
/// concurrent workers to reach the target rate and reports the achieved
/// requests per second until interrupted (Ctrl + C).
#[derive(Debug, Clone, Parser)]
#[command(name = "strainbench")]
#[command(bin_name = "strainbench")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// the full URL to load, e.g. http://localhost:3000/
    #[arg(long, value_name = "URL", required = true)]
    pub url: Uri,

    /// target number of (successful) requests per second;
    /// combine a high rate with --max-workers to bound the amount of spawned workers
    #[arg(
        long,
        value_name = "N",
        required = true,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub rps: u32,

    /// extra request header, can be repeated; replaces the default of the same name
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// successful sequential requests used to measure the average latency
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PROBE_SAMPLES)]
    pub probe_samples: usize,

    /// requests (failed ones included) after which the latency probe gives up
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PROBE_MAX_ATTEMPTS)]
    pub probe_attempts: usize,

    /// failed requests a worker tolerates before it stops for good
    #[arg(long, value_name = "N", default_value_t = DEFAULT_ERROR_BUDGET)]
    pub error_budget: u32,

    /// upper limit for the amount of concurrent workers
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    #[arg(long, value_name = "SECONDS", default_value_t = 30.)]
    /// timeout of a single request (<= 0.0 = default of 30s)
    pub timeout: f64,

    #[arg(long, value_name = "SECONDS", default_value_t = 0.5)]
    /// interval at which the requests per second are reported
    pub interval: f64,

    /// report json lines instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144)]
    pub ulimit: utils::os::rlim_t,
}

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl Args {
    fn run_config(&self) -> Result<RunConfig, BoxError> {
        let mut headers = default_headers();
        merge_headers(&mut headers, self.headers.iter().cloned());

        let interval = positive_secs(self.interval).unwrap_or_default();

        Ok(RunConfig::try_new(self.url.clone(), self.rps)
            .context("validate run config")?
            .with_headers(headers)
            .with_probe(ProbeConfig {
                samples: self.probe_samples,
                max_attempts: self.probe_attempts,
            })
            .with_error_budget(self.error_budget)
            .with_report_interval(interval)
            .with_max_workers(self.max_workers))
    }

    fn request_timeout(&self) -> Duration {
        positive_secs(self.timeout).unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0. {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(Some(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    }))?;

    #[cfg(target_family = "unix")]
    utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Run the load test with the given args until
/// the shutdown signal fires or the run fails.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = positive_secs(args.graceful);

    let config = args.run_config()?;
    let client = self::client::new_web_client(args.request_timeout())
        .context("create HTTP(S) client")?;

    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonlReporter::new(std::io::stdout()))
    } else {
        Box::new(HumanReporter::new(std::io::stdout()))
    };

    let run_finished = Arc::new(Notify::new());
    let (result_tx, result_rx) = tokio::sync::oneshot::channel::<Result<(), BoxError>>();
    let graceful = graceful::Shutdown::new(new_shutdown_signal(
        run_finished.clone(),
        base_shutdown_signal,
    ));

    graceful.spawn_task_fn(async move |guard| {
        let mut controller = RunController::new(config, client, reporter);
        let result = controller.run(guard.cancelled()).await.map(|summary| {
            tracing::debug!(
                total_requests = summary.total_requests,
                workers = summary.workers.len(),
                "run finished",
            );
        });
        if let Err(err) = &result {
            tracing::error!("run failed: {err}");
        }
        let _ = result_tx.send(result);
        run_finished.notify_one();
    });

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };
    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    match result_rx.await {
        Ok(result) => result,
        Err(_) => Err(BoxError::from("run task stopped without reporting a result")),
    }
}

fn new_shutdown_signal(
    run_finished: Arc<Notify>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        tokio::select! {
            _ = base_shutdown_signal => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            _ = run_finished.notified() => {
                tracing::debug!("run task is done, return control");
            }
        }
    }
}
