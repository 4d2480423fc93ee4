pub mod baseline;
pub mod extract;
pub mod model;
pub mod runner;
pub mod solve;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::debts::{Portfolio, ValidationError};

pub use baseline::{minimum_payment_baseline, BaselineSummary};
pub use extract::{extract_plan, ScheduleIter};
pub use model::{build_model, ModelStats, RepaymentModel, VariableIndex};
pub use runner::optimize_with_budget;
pub use solve::{solve, SolveOutcome, Valuation};

pub const DEFAULT_HORIZON_MONTHS: usize = 24;
/// Fifty years of monthly payments.
pub const MAX_HORIZON_MONTHS: usize = 600;
pub const DEFAULT_SOLVE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    SolverError,
    SolverTimeout,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::SolverError => "solver_error",
            Self::SolverTimeout => "solver_timeout",
        }
    }
}

impl Display for SolveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with debts still owing money when the horizon ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HorizonPolicy {
    /// Return the plan as computed; the unpaid tail is simply not shown.
    #[default]
    Truncate,
    /// Fail with [`PlanError::HorizonExceeded`].
    Reject,
}

#[derive(Debug, Error)]
#[error("unknown horizon policy: {0}")]
pub struct HorizonPolicyParseError(pub String);

impl FromStr for HorizonPolicy {
    type Err = HorizonPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "reject" | "error" => Ok(Self::Reject),
            _ => Err(HorizonPolicyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PlanSettings {
    pub horizon_months: usize,
    pub horizon_policy: HorizonPolicy,
    pub solve_timeout: Option<Duration>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            horizon_months: DEFAULT_HORIZON_MONTHS,
            horizon_policy: HorizonPolicy::Truncate,
            solve_timeout: Some(Duration::from_secs(DEFAULT_SOLVE_TIMEOUT_SECS)),
        }
    }
}

impl PlanSettings {
    pub fn with_horizon(mut self, months: usize) -> Self {
        self.horizon_months = months;
        self
    }

    pub fn with_policy(mut self, policy: HorizonPolicy) -> Self {
        self.horizon_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.solve_timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("planning horizon must be at least one month")]
    InvalidHorizon,
    #[error("no repayment plan: optimization ended {status}")]
    Optimization { status: SolveStatus },
    #[error("solver failed ({status}): {detail}")]
    Solver { status: SolveStatus, detail: String },
    #[error("debts not repaid within {horizon} months: {}", debts.join(", "))]
    HorizonExceeded { horizon: usize, debts: Vec<String> },
}

impl PlanError {
    pub fn status(&self) -> Option<SolveStatus> {
        match self {
            Self::Optimization { status } | Self::Solver { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPayment {
    pub payment_number: usize,
    pub payment_amount: f64,
    pub remaining_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebtSchedule {
    pub name: String,
    pub monthly_payments: Vec<MonthlyPayment>,
    #[serde(skip)]
    pub paid_off: bool,
}

impl DebtSchedule {
    pub fn total_paid(&self) -> f64 {
        self.monthly_payments.iter().map(|m| m.payment_amount).sum()
    }

    /// Month in which the balance reaches zero, if it does within the plan.
    /// A debt that owed nothing to begin with is paid off in month 0.
    pub fn payoff_month(&self) -> Option<usize> {
        if !self.paid_off {
            return None;
        }
        Some(self.monthly_payments.last().map_or(0, |m| m.payment_number))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentPlan {
    pub total_interest_paid: f64,
    pub payment_plans: Vec<DebtSchedule>,
    #[serde(skip)]
    pub horizon_months: usize,
}

impl RepaymentPlan {
    pub fn unfinished_debts(&self) -> Vec<&str> {
        self.payment_plans
            .iter()
            .filter(|p| !p.paid_off)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Builds, solves and extracts one plan synchronously.
pub fn optimize(portfolio: &Portfolio, settings: &PlanSettings) -> Result<RepaymentPlan, PlanError> {
    let model = build_model(portfolio, settings.horizon_months)?;
    let stats = model.stats();
    debug!(
        variables = stats.variables(),
        constraints = stats.constraints(),
        payoff_indicators = stats.payoff_indicators,
        "built repayment model"
    );

    let outcome = solve(model, settings.solve_timeout);
    let plan = extract_plan(&portfolio.debts, outcome, settings.horizon_policy)?;
    info!(
        debts = plan.payment_plans.len(),
        total_interest = plan.total_interest_paid,
        "repayment plan ready"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::debts::{Debt, User};

    fn tol(magnitude: f64) -> f64 {
        1e-6 * (1.0 + magnitude.abs())
    }

    fn reference_portfolio() -> Portfolio {
        Portfolio {
            user: User::new(1500.0, 3000.0),
            debts: vec![
                Debt::new("Fast Credit Card", 2500.0, 0.22, 100.0),
                Debt::new("Student Loan", 15000.0, 0.06, 200.0),
                Debt::new("Auto Loan", 8000.0, 0.09, 250.0),
            ],
        }
    }

    fn solved(portfolio: &Portfolio, horizon: usize) -> (Valuation, f64) {
        let model = build_model(portfolio, horizon).expect("model");
        let outcome = solve(model, None);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let valuation = outcome.valuation.expect("valuation");
        let objective = valuation.objective;
        (valuation, objective)
    }

    #[test]
    fn reference_scenario_beats_minimum_payments() {
        let portfolio = reference_portfolio();
        let plan = optimize(&portfolio, &PlanSettings::default()).expect("plan");
        let baseline = minimum_payment_baseline(&portfolio.debts, DEFAULT_HORIZON_MONTHS);

        assert!(plan.total_interest_paid > 0.0);
        assert!(plan.total_interest_paid < baseline.total_interest);
        let names: Vec<&str> = plan.payment_plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Fast Credit Card", "Student Loan", "Auto Loan"]);

        let card = &plan.payment_plans[0];
        assert!(card.monthly_payments[0].payment_amount > 100.0 + 0.01);
        assert!(plan.unfinished_debts().is_empty());
    }

    #[test]
    fn reference_scenario_respects_every_invariant() {
        let portfolio = reference_portfolio();
        let horizon = DEFAULT_HORIZON_MONTHS;
        let (valuation, objective) = solved(&portfolio, horizon);
        let budget = portfolio.monthly_budget();

        for (d, debt) in portfolio.debts.iter().enumerate() {
            let growth = 1.0 + debt.periodic_rate();
            let initial = debt.initial_balance;
            assert!((valuation.balance[d][0] - initial).abs() < tol(initial));
            for t in 0..horizon {
                let b = valuation.balance[d][t];
                let p = valuation.payment[d][t];
                let tol = tol(initial.max(b));
                assert!(b >= -tol && p >= -tol);
                assert!((valuation.balance[d][t + 1] - (b * growth - p)).abs() < tol);
                assert!(p <= b * growth + tol);
                assert!(p >= debt.minimum_monthly_payment.min(b) - tol);
            }
        }
        for t in 0..horizon {
            let spent: f64 = (0..portfolio.debts.len())
                .map(|d| valuation.payment[d][t])
                .sum();
            assert!(spent <= budget + tol(budget));
        }
        assert!(objective >= 0.0);
    }

    #[test]
    fn high_rate_debt_gets_extra_first() {
        let portfolio = reference_portfolio();
        let (valuation, _) = solved(&portfolio, DEFAULT_HORIZON_MONTHS);
        let extra = |d: usize| valuation.payment[d][0] - portfolio.debts[d].minimum_monthly_payment;
        assert!(extra(0) > extra(1));
        assert!(extra(0) > extra(2));
    }

    #[rstest]
    #[case::just_below(549.99)]
    #[case::far_below(100.0)]
    fn budget_under_minimums_is_infeasible(#[case] budget: f64) {
        let mut portfolio = reference_portfolio();
        portfolio.user = portfolio.user.with_monthly_budget(budget);
        let err = optimize(&portfolio, &PlanSettings::default()).expect_err("infeasible");
        assert!(matches!(
            err,
            PlanError::Optimization {
                status: SolveStatus::Infeasible
            }
        ));
    }

    #[test]
    fn full_minimum_repays_in_one_month() {
        let portfolio = Portfolio {
            user: User::new(0.0, 2000.0),
            debts: vec![Debt::new("Bridge Loan", 1000.0, 0.12, 1000.0)],
        };
        let plan = optimize(&portfolio, &PlanSettings::default()).expect("plan");
        let schedule = &plan.payment_plans[0];
        assert_eq!(schedule.monthly_payments.len(), 1);
        assert_eq!(schedule.monthly_payments[0].payment_number, 1);
        assert!((schedule.monthly_payments[0].payment_amount - 1010.0).abs() < 0.011);
        assert_eq!(schedule.monthly_payments[0].remaining_balance, 0.0);
        assert_eq!(schedule.payoff_month(), Some(1));
        assert!((plan.total_interest_paid - 10.0).abs() < 1e-5);
    }

    #[test]
    fn interest_never_rises_with_budget() {
        let mut previous = f64::INFINITY;
        for budget in [600.0, 900.0, 1500.0, 3000.0] {
            let mut portfolio = reference_portfolio();
            portfolio.user = portfolio.user.with_monthly_budget(budget);
            let plan = optimize(&portfolio, &PlanSettings::default().with_horizon(12))
                .expect("feasible budget");
            assert!(plan.total_interest_paid <= previous + 1e-5 * (1.0 + previous.abs()));
            previous = plan.total_interest_paid;
        }
    }

    #[test]
    fn small_balance_only_owes_itself() {
        // 40 left on a card with a 100 minimum: paying 40 plus interest is enough.
        let portfolio = Portfolio {
            user: User::new(0.0, 350.0),
            debts: vec![
                Debt::new("Nearly Done", 40.0, 0.18, 100.0),
                Debt::new("Mortgage", 50000.0, 0.04, 300.0),
            ],
        };
        let plan = optimize(&portfolio, &PlanSettings::default().with_horizon(6)).expect("plan");
        assert_eq!(plan.payment_plans[0].monthly_payments.len(), 1);
        assert!(plan.payment_plans[0].paid_off);
    }

    #[test]
    fn reject_policy_surfaces_unfinished_debts() {
        let portfolio = Portfolio {
            user: User::new(0.0, 300.0),
            debts: vec![Debt::new("Mortgage", 50000.0, 0.04, 300.0)],
        };
        let settings = PlanSettings::default()
            .with_horizon(6)
            .with_policy(HorizonPolicy::Reject);
        match optimize(&portfolio, &settings) {
            Err(PlanError::HorizonExceeded { horizon, debts }) => {
                assert_eq!(horizon, 6);
                assert_eq!(debts, vec!["Mortgage".to_string()]);
            }
            other => panic!("expected horizon error, got {other:?}"),
        }
    }

    #[test]
    fn cleared_debt_reports_month_zero_payoff() {
        let portfolio = Portfolio {
            user: User::new(0.0, 500.0),
            debts: vec![
                Debt::new("Settled", 0.004, 0.2, 50.0),
                Debt::new("Card", 900.0, 0.2, 50.0),
            ],
        };
        let plan = optimize(&portfolio, &PlanSettings::default().with_horizon(6)).expect("plan");
        let settled = &plan.payment_plans[0];
        assert!(settled.monthly_payments.is_empty());
        assert_eq!(settled.payoff_month(), Some(0));
        let baseline = minimum_payment_baseline(&portfolio.debts, 6);
        assert_eq!(baseline.payoff_months[0], settled.payoff_month());
    }

    #[test]
    fn parses_horizon_policy() {
        assert_eq!("truncate".parse::<HorizonPolicy>().ok(), Some(HorizonPolicy::Truncate));
        assert_eq!(" Reject ".parse::<HorizonPolicy>().ok(), Some(HorizonPolicy::Reject));
        assert!("later".parse::<HorizonPolicy>().is_err());
    }

    #[test]
    fn plan_serializes_with_wire_names() {
        let plan = RepaymentPlan {
            total_interest_paid: 12.5,
            payment_plans: vec![DebtSchedule {
                name: "Card".to_string(),
                monthly_payments: vec![MonthlyPayment {
                    payment_number: 1,
                    payment_amount: 50.0,
                    remaining_balance: 0.0,
                }],
                paid_off: true,
            }],
            horizon_months: 24,
        };
        let value = serde_json::to_value(&plan).expect("serialize");
        assert_eq!(value["totalInterestPaid"], 12.5);
        assert_eq!(value["paymentPlans"][0]["name"], "Card");
        let month = &value["paymentPlans"][0]["monthlyPayments"][0];
        assert_eq!(month["paymentNumber"], 1);
        assert_eq!(month["paymentAmount"], 50.0);
        assert_eq!(month["remainingBalance"], 0.0);
        assert!(value.get("horizonMonths").is_none());
        assert!(value["paymentPlans"][0].get("paidOff").is_none());
    }
}
