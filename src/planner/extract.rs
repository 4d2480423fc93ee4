use std::iter::FusedIterator;

use tracing::warn;

use crate::debts::Debt;
use crate::planner::solve::{SolveOutcome, Valuation};
use crate::planner::{
    DebtSchedule, HorizonPolicy, MonthlyPayment, PlanError, RepaymentPlan, SolveStatus,
};

/// Balances and payments below one cent count as zero.
pub const PAID_OFF_THRESHOLD: f64 = 0.01;

/// Monthly entries of one debt, ending at the first month where nothing is
/// owed and nothing is paid.
#[derive(Debug, Clone)]
pub struct ScheduleIter<'a> {
    balance: &'a [f64],
    payment: &'a [f64],
    month: usize,
    finished: bool,
}

impl<'a> ScheduleIter<'a> {
    pub fn new(balance: &'a [f64], payment: &'a [f64]) -> Self {
        Self {
            balance,
            payment,
            month: 0,
            finished: false,
        }
    }
}

impl Iterator for ScheduleIter<'_> {
    type Item = MonthlyPayment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.month >= self.payment.len() {
            self.finished = true;
            return None;
        }
        let t = self.month;
        let (balance, payment) = (self.balance[t], self.payment[t]);
        if balance < PAID_OFF_THRESHOLD && payment < PAID_OFF_THRESHOLD {
            self.finished = true;
            return None;
        }
        self.month += 1;
        Some(MonthlyPayment {
            payment_number: t + 1,
            payment_amount: round_cents(payment),
            remaining_balance: round_cents(self.balance[t + 1]),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.payment.len() - self.month))
        }
    }
}

impl FusedIterator for ScheduleIter<'_> {}

impl Valuation {
    pub fn schedule(&self, debt: usize) -> ScheduleIter<'_> {
        ScheduleIter::new(&self.balance[debt], &self.payment[debt])
    }

    pub fn is_paid_off(&self, debt: usize) -> bool {
        self.balance[debt]
            .last()
            .map(|b| *b < PAID_OFF_THRESHOLD)
            .unwrap_or(true)
    }
}

/// Rounds to cents; solver noise such as `-1e-12` comes out as `0.0`.
pub fn round_cents(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn extract_plan(
    debts: &[Debt],
    outcome: SolveOutcome,
    policy: HorizonPolicy,
) -> Result<RepaymentPlan, PlanError> {
    let SolveOutcome {
        status,
        valuation,
        detail,
    } = outcome;

    let valuation = match (status, valuation) {
        (SolveStatus::Optimal, Some(valuation)) => valuation,
        (SolveStatus::Optimal, None) => {
            return Err(PlanError::Solver {
                status: SolveStatus::SolverError,
                detail: "solver returned no values".to_string(),
            })
        }
        (SolveStatus::Infeasible | SolveStatus::Unbounded, _) => {
            warn!(%status, detail = detail.as_deref().unwrap_or(""), "no repayment plan");
            return Err(PlanError::Optimization { status });
        }
        (SolveStatus::SolverError | SolveStatus::SolverTimeout, _) => {
            return Err(PlanError::Solver {
                status,
                detail: detail.unwrap_or_else(|| status.to_string()),
            })
        }
    };

    let horizon = valuation.horizon();
    let payment_plans: Vec<DebtSchedule> = debts
        .iter()
        .enumerate()
        .map(|(d, debt)| DebtSchedule {
            name: debt.name.clone(),
            monthly_payments: valuation.schedule(d).collect(),
            paid_off: valuation.is_paid_off(d),
        })
        .collect();

    let unfinished: Vec<String> = payment_plans
        .iter()
        .filter(|p| !p.paid_off)
        .map(|p| p.name.clone())
        .collect();
    if !unfinished.is_empty() {
        match policy {
            HorizonPolicy::Truncate => warn!(
                horizon,
                debts = %unfinished.join(", "),
                "plan ends with unpaid balances"
            ),
            HorizonPolicy::Reject => {
                return Err(PlanError::HorizonExceeded {
                    horizon,
                    debts: unfinished,
                })
            }
        }
    }

    Ok(RepaymentPlan {
        total_interest_paid: valuation.objective,
        payment_plans,
        horizon_months: horizon,
    })
}
