use std::time::Duration;

use tracing::warn;

use crate::debts::Portfolio;
use crate::planner::{optimize, PlanError, PlanSettings, RepaymentPlan, SolveStatus};

/// Extra wall time past `solve_timeout` before the request gives up on the
/// blocking task. The solver stops itself at `solve_timeout`; this covers
/// model building, extraction and a solver that overruns its own limit.
pub const SOLVE_GRACE: Duration = Duration::from_secs(5);

/// Runs [`optimize`] on the blocking pool, bounded by `settings.solve_timeout`.
pub async fn optimize_with_budget(
    portfolio: Portfolio,
    settings: PlanSettings,
) -> Result<RepaymentPlan, PlanError> {
    let budget = settings.solve_timeout.map(|limit| limit + SOLVE_GRACE);
    run_blocking_with_budget(budget, move || optimize(&portfolio, &settings)).await
}

pub(crate) async fn run_blocking_with_budget<T, F>(
    budget: Option<Duration>,
    work: F,
) -> Result<T, PlanError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PlanError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    let joined = match budget {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(budget_ms = limit.as_millis() as u64, "solve exceeded its time budget");
                return Err(PlanError::Solver {
                    status: SolveStatus::SolverTimeout,
                    detail: format!("no solution within {} ms", limit.as_millis()),
                });
            }
        },
        None => task.await,
    };

    joined.map_err(|err| PlanError::Solver {
        status: SolveStatus::SolverError,
        detail: format!("solver task failed: {err}"),
    })?
}
