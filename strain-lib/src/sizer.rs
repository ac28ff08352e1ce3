/// Amount of workers needed to reach `target_rps`,
/// given the average latency of a single sequential request.
///
/// One worker achieves at most `1 / avg_latency_secs` requests per second,
/// so `target_rps / (1 / avg_latency_secs)` workers are needed, rounded.
/// The result is never below 1, whatever the input.
pub fn size_workers(avg_latency_secs: f64, target_rps: u32) -> usize {
    if !avg_latency_secs.is_finite() || avg_latency_secs <= 0.0 {
        return 1;
    }

    let single_worker_max_rps = 1.0 / avg_latency_secs;
    let workers = (target_rps as f64 / single_worker_max_rps).round();

    // `as` saturates for out of range floats
    (workers as usize).max(1)
}
