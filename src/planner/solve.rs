use std::time::{Duration, Instant};

use good_lp::solvers::highs::highs;
use good_lp::{ResolutionError, Solution, SolverModel};
use tracing::{debug, warn};

use crate::planner::model::{RepaymentModel, VariableIndex};
use crate::planner::SolveStatus;

/// Slack allowed between the month-zero outlay and the budget before the
/// model is declared infeasible without calling the solver.
const OUTLAY_TOLERANCE: f64 = 1e-9;

/// Relative optimality gap at which branch-and-bound stops.
const MIP_RELATIVE_GAP: f64 = 1e-6;

/// Payoff indicators scale balances of several thousand, so they must come
/// back much closer to 0 or 1 than HiGHS' default of 1e-6.
const MIP_INTEGRALITY_TOLERANCE: f64 = 1e-9;

/// Largest scaled constraint violation accepted from the solver.
const FEASIBILITY_TOLERANCE: f64 = 1e-5;

/// Solved values of every balance and payment variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    /// `balance[d][t]`, t in `0..=horizon`.
    pub balance: Vec<Vec<f64>>,
    /// `payment[d][t]`, t in `0..horizon`.
    pub payment: Vec<Vec<f64>>,
    /// Total interest over the horizon: `sum r_d * balance[d][t]`, t < horizon.
    pub objective: f64,
}

impl Valuation {
    fn read(index: &VariableIndex, solution: &impl Solution) -> Self {
        let horizon = index.horizon();
        let mut balance = Vec::with_capacity(index.debt_count());
        let mut payment = Vec::with_capacity(index.debt_count());
        let mut objective = 0.0;

        for d in 0..index.debt_count() {
            let b: Vec<f64> = (0..=horizon)
                .map(|t| solution.value(index.balance(d, t)))
                .collect();
            let p: Vec<f64> = (0..horizon)
                .map(|t| solution.value(index.payment(d, t)))
                .collect();
            objective += index.periodic_rate(d) * b[..horizon].iter().sum::<f64>();
            balance.push(b);
            payment.push(p);
        }

        Self {
            balance,
            payment,
            objective,
        }
    }

    pub fn horizon(&self) -> usize {
        self.payment.first().map(Vec::len).unwrap_or(0)
    }

    /// Worst violation of the transition, cap, minimum-payment and budget
    /// rules. Per-debt rules are scaled by that debt's largest amount owed,
    /// the budget rule by the budget.
    pub fn max_violation(&self, index: &VariableIndex, budget: f64) -> f64 {
        let mut worst: f64 = 0.0;

        for (d, (balance, payment)) in self.balance.iter().zip(&self.payment).enumerate() {
            let growth = 1.0 + index.periodic_rate(d);
            let minimum = index.minimum_payment(d);
            let scale = 1.0 + balance.iter().fold(0.0_f64, |m, b| m.max(b.abs())) * growth;
            for (t, &p) in payment.iter().enumerate() {
                let b = balance[t];
                let owed = b * growth;
                let excess = [
                    -b,
                    -p,
                    (balance[t + 1] - (owed - p)).abs(),
                    p - owed,
                    minimum.min(b) - p,
                ]
                .into_iter()
                .fold(0.0_f64, f64::max);
                worst = worst.max(excess / scale);
            }
        }

        for t in 0..self.horizon() {
            let spent: f64 = self.payment.iter().map(|p| p[t]).sum();
            worst = worst.max((spent - budget).max(0.0) / (1.0 + budget.abs()));
        }
        worst
    }
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub valuation: Option<Valuation>,
    pub detail: Option<String>,
}

impl SolveOutcome {
    fn failed(status: SolveStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            valuation: None,
            detail: Some(detail.into()),
        }
    }
}

/// Solves the model with HiGHS. `time_limit` is handed to the solver, which
/// stops branch-and-bound once it is spent.
pub fn solve(model: RepaymentModel, time_limit: Option<Duration>) -> SolveOutcome {
    let outlay = model.month_zero_outlay();
    let budget = model.monthly_budget();
    if outlay > budget + OUTLAY_TOLERANCE {
        debug!(outlay, budget, "month-zero minimums exceed the budget");
        return SolveOutcome::failed(
            SolveStatus::Infeasible,
            format!("first month needs {outlay:.2} but the budget is {budget:.2}"),
        );
    }

    let (variables, constraints, objective, index) = model.into_parts();
    let mut problem = variables
        .minimise(objective)
        .using(highs)
        .set_option("mip_rel_gap", MIP_RELATIVE_GAP)
        .set_option("mip_feasibility_tolerance", MIP_INTEGRALITY_TOLERANCE);
    if let Some(limit) = time_limit {
        problem = problem.set_time_limit(limit.as_secs_f64());
    }
    for constraint in constraints {
        problem = problem.with(constraint);
    }

    let started = Instant::now();
    let result = problem.solve();
    let elapsed = started.elapsed();

    // HiGHS hands back its incumbent when the limit hits, optimal or not.
    if let Some(limit) = time_limit.filter(|limit| elapsed >= *limit) {
        warn!(elapsed_ms = elapsed.as_millis() as u64, "solver stopped at its time limit");
        return SolveOutcome::failed(
            SolveStatus::SolverTimeout,
            format!("no proven optimum within {} ms", limit.as_millis()),
        );
    }

    match result {
        Ok(solution) => {
            let valuation = Valuation::read(&index, &solution);
            let violation = valuation.max_violation(&index, budget);
            if violation > FEASIBILITY_TOLERANCE {
                warn!(violation, "solver returned a point outside the model");
                return SolveOutcome::failed(
                    SolveStatus::SolverError,
                    format!("solution violates the model by {violation:.3e}"),
                );
            }
            debug!(elapsed_ms = elapsed.as_millis() as u64, "solver finished");
            SolveOutcome {
                status: SolveStatus::Optimal,
                valuation: Some(valuation),
                detail: None,
            }
        }
        Err(ResolutionError::Infeasible) => {
            SolveOutcome::failed(SolveStatus::Infeasible, "solver reported infeasible")
        }
        Err(ResolutionError::Unbounded) => {
            SolveOutcome::failed(SolveStatus::Unbounded, "solver reported unbounded")
        }
        Err(err) => {
            warn!("solver failed: {err}");
            SolveOutcome::failed(SolveStatus::SolverError, err.to_string())
        }
    }
}
