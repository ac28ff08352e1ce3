mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

use strainbench_lib::worker::{StopReason, WorkerStatus};

fn status_label(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Active => "active",
        WorkerStatus::Stopped(StopReason::ErrorBudgetExceeded) => "error_budget_exceeded",
        WorkerStatus::Stopped(StopReason::Cancelled) => "cancelled",
        WorkerStatus::Stopped(StopReason::Aborted) => "aborted",
    }
}
