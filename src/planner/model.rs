//! Time-expanded repayment model.
//!
//! For every debt `d` and month `t` the model carries a balance variable
//! `B[d,t]` (t = 0..=T) and a payment variable `P[d,t]` (t = 0..T), linked by
//!
//! ```text
//! B[d,0]   = initial balance
//! B[d,t+1] = B[d,t] * (1 + r_d) - P[d,t]
//! P[d,t]  <= B[d,t] * (1 + r_d)
//! P[d,t]  >= min(m_d, B[d,t])
//! sum_d P[d,t] <= monthly budget
//! ```
//!
//! and the objective `sum_{d,t<T} r_d * B[d,t]`, which is exactly the interest
//! charged over the horizon.
//!
//! The minimum-payment rule is not convex. Month zero has a known balance, so
//! it becomes a constant bound. Later months use a binary payoff indicator
//! `y[d,t]` ("pay the whole balance instead of the minimum"), unless the
//! propagated balance bounds already decide which branch applies.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};

use crate::debts::{Debt, Portfolio};
use crate::planner::PlanError;

/// Handles to every balance and payment variable of one run.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    horizon: usize,
    rates: Vec<f64>,
    minimums: Vec<f64>,
    balance: Vec<Vec<Variable>>,
    payment: Vec<Vec<Variable>>,
}

impl VariableIndex {
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn debt_count(&self) -> usize {
        self.rates.len()
    }

    pub fn periodic_rate(&self, debt: usize) -> f64 {
        self.rates[debt]
    }

    pub fn minimum_payment(&self, debt: usize) -> f64 {
        self.minimums[debt]
    }

    /// `B[debt, month]`, month in `0..=horizon`.
    pub fn balance(&self, debt: usize, month: usize) -> Variable {
        self.balance[debt][month]
    }

    /// `P[debt, month]`, month in `0..horizon`.
    pub fn payment(&self, debt: usize, month: usize) -> Variable {
        self.payment[debt][month]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub balance_variables: usize,
    pub payment_variables: usize,
    pub payoff_indicators: usize,
    pub initial_balance: usize,
    pub transition: usize,
    pub payment_cap: usize,
    pub minimum_payment: usize,
    pub budget: usize,
    /// Two per payoff indicator.
    pub payoff_bounds: usize,
    pub payoff_cuts: usize,
}

impl ModelStats {
    pub fn variables(&self) -> usize {
        self.balance_variables + self.payment_variables + self.payoff_indicators
    }

    pub fn constraints(&self) -> usize {
        self.initial_balance
            + self.transition
            + self.payment_cap
            + self.minimum_payment
            + self.budget
            + self.payoff_bounds
            + self.payoff_cuts
    }
}

/// Balance bounds implied by the budget and the minimum-payment rule alone.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceBounds {
    pub lower: Vec<Vec<f64>>,
    pub upper: Vec<Vec<f64>>,
}

pub struct RepaymentModel {
    pub(crate) variables: ProblemVariables,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) objective: Expression,
    index: VariableIndex,
    stats: ModelStats,
    monthly_budget: f64,
    month_zero_outlay: f64,
}

impl RepaymentModel {
    pub fn index(&self) -> &VariableIndex {
        &self.index
    }

    pub fn stats(&self) -> ModelStats {
        self.stats
    }

    pub fn horizon(&self) -> usize {
        self.index.horizon
    }

    pub fn monthly_budget(&self) -> f64 {
        self.monthly_budget
    }

    /// What month zero must pay across all debts. Balances are known in month
    /// zero, so a budget below this makes the model infeasible.
    pub fn month_zero_outlay(&self) -> f64 {
        self.month_zero_outlay
    }

    pub(crate) fn into_parts(self) -> (ProblemVariables, Vec<Constraint>, Expression, VariableIndex) {
        (self.variables, self.constraints, self.objective, self.index)
    }
}

pub fn build_model(portfolio: &Portfolio, horizon: usize) -> Result<RepaymentModel, PlanError> {
    if horizon == 0 {
        return Err(PlanError::InvalidHorizon);
    }

    let debts = &portfolio.debts;
    let budget = portfolio.monthly_budget();
    let bounds = propagate_balance_bounds(debts, budget, horizon);

    let mut variables = ProblemVariables::new();
    let mut constraints = Vec::new();
    let mut objective = Expression::default();
    let mut stats = ModelStats::default();

    let mut rates = Vec::with_capacity(debts.len());
    let mut minimums = Vec::with_capacity(debts.len());
    let mut balance = Vec::with_capacity(debts.len());
    let mut payment = Vec::with_capacity(debts.len());

    for (d, debt) in debts.iter().enumerate() {
        let rate = debt.periodic_rate();
        let growth = 1.0 + rate;

        let b: Vec<Variable> = (0..=horizon)
            .map(|_| variables.add(variable().min(0.0)))
            .collect();
        let p: Vec<Variable> = (0..horizon)
            .map(|_| variables.add(variable().min(0.0)))
            .collect();
        stats.balance_variables += b.len();
        stats.payment_variables += p.len();

        constraints.push(constraint::eq(b[0], debt.initial_balance));
        stats.initial_balance += 1;

        for t in 0..horizon {
            constraints.push(constraint::eq(b[t + 1], growth * b[t] - p[t]));
            stats.transition += 1;

            constraints.push(constraint::leq(p[t], growth * b[t]));
            stats.payment_cap += 1;

            objective.add_mul(rate, b[t]);
        }

        let mut rule = MinimumPaymentRule {
            debt,
            balance: &b,
            payment: &p,
            lower: &bounds.lower[d],
            upper: &bounds.upper[d],
            previous_indicator: None,
        };
        for t in 0..horizon {
            rule.emit(t, &mut variables, &mut constraints, &mut stats);
        }

        rates.push(rate);
        minimums.push(debt.minimum_monthly_payment);
        balance.push(b);
        payment.push(p);
    }

    for t in 0..horizon {
        let mut spent = Expression::with_capacity(debts.len());
        for p in &payment {
            spent.add_mul(1.0, p[t]);
        }
        constraints.push(constraint::leq(spent, budget));
        stats.budget += 1;
    }

    let month_zero_outlay = debts.iter().map(Debt::first_month_minimum).sum();

    Ok(RepaymentModel {
        variables,
        constraints,
        objective,
        index: VariableIndex {
            horizon,
            rates,
            minimums,
            balance,
            payment,
        },
        stats,
        monthly_budget: budget,
        month_zero_outlay,
    })
}

struct MinimumPaymentRule<'a> {
    debt: &'a Debt,
    balance: &'a [Variable],
    payment: &'a [Variable],
    lower: &'a [f64],
    upper: &'a [f64],
    previous_indicator: Option<Variable>,
}

impl MinimumPaymentRule<'_> {
    fn emit(
        &mut self,
        t: usize,
        variables: &mut ProblemVariables,
        constraints: &mut Vec<Constraint>,
        stats: &mut ModelStats,
    ) {
        let minimum = self.debt.minimum_monthly_payment;
        let (b, p) = (self.balance[t], self.payment[t]);

        if t == 0 {
            stats.minimum_payment += 1;
            constraints.push(constraint::geq(p, self.debt.first_month_minimum()));
            return;
        }
        if minimum <= 0.0 || self.lower[t] >= minimum {
            stats.minimum_payment += 1;
            constraints.push(constraint::geq(p, minimum));
            return;
        }
        let upper = self.upper[t];
        if upper <= minimum {
            stats.minimum_payment += 1;
            constraints.push(constraint::geq(p, b));
            return;
        }

        // y = 1: the balance fell under the minimum and must be paid instead.
        let y = variables.add(variable().binary());
        stats.payoff_indicators += 1;
        constraints.push(constraint::geq(Expression::from(p) + minimum * y, minimum));
        constraints.push(constraint::geq(
            Expression::from(p) - b - upper * y,
            -upper,
        ));
        stats.payoff_bounds += 2;

        // Setting y exactly when B < m keeps every feasible schedule, and that
        // choice is monotone in t while the monthly rate stays below 100%.
        if self.debt.periodic_rate() < 1.0 {
            constraints.push(constraint::geq(Expression::from(b) + minimum * y, minimum));
            constraints.push(constraint::leq(
                Expression::from(b) + (upper - minimum) * y,
                upper,
            ));
            stats.payoff_cuts += 2;
            if let Some(previous) = self.previous_indicator {
                constraints.push(constraint::leq(previous, y));
                stats.payoff_cuts += 1;
            }
            self.previous_indicator = Some(y);
        }
    }
}

/// Forward-propagates per-debt balance bounds.
///
/// The upper bound assumes each debt only ever receives its forced minimum;
/// the lower bound assumes it receives everything the budget leaves after the
/// other debts' forced minimums.
pub fn propagate_balance_bounds(debts: &[Debt], budget: f64, horizon: usize) -> BalanceBounds {
    let mut lower: Vec<Vec<f64>> = debts
        .iter()
        .map(|d| {
            let mut row = Vec::with_capacity(horizon + 1);
            row.push(d.initial_balance);
            row
        })
        .collect();
    let mut upper = lower.clone();

    for t in 0..horizon {
        let floors: Vec<f64> = debts
            .iter()
            .zip(&lower)
            .map(|(debt, lo)| debt.minimum_monthly_payment.min(lo[t]))
            .collect();
        let forced_total: f64 = floors.iter().sum();

        for (d, debt) in debts.iter().enumerate() {
            let growth = 1.0 + debt.periodic_rate();
            let room = (budget - (forced_total - floors[d])).max(0.0);
            let next_lower = (lower[d][t] * growth - room).max(0.0);
            let next_upper = (upper[d][t] * growth - floors[d]).max(next_lower);
            lower[d].push(next_lower);
            upper[d].push(next_upper);
        }
    }

    BalanceBounds { lower, upper }
}

#[cfg(test)]
mod tests {
    use crate::debts::{Debt, Portfolio, User};
    use crate::planner::PlanError;

    use super::{build_model, propagate_balance_bounds};

    fn portfolio(budget: f64, debts: Vec<Debt>) -> Portfolio {
        Portfolio {
            user: User::new(0.0, budget),
            debts,
        }
    }

    #[test]
    fn emits_one_constraint_family_per_month() {
        let horizon = 24;
        let model = build_model(
            &portfolio(
                3000.0,
                vec![
                    Debt::new("Card", 2500.0, 0.22, 100.0),
                    Debt::new("Student", 15000.0, 0.06, 200.0),
                    Debt::new("Auto", 8000.0, 0.09, 250.0),
                ],
            ),
            horizon,
        )
        .expect("model");

        let stats = model.stats();
        assert_eq!(stats.balance_variables, 3 * (horizon + 1));
        assert_eq!(stats.payment_variables, 3 * horizon);
        assert_eq!(stats.initial_balance, 3);
        assert_eq!(stats.transition, 3 * horizon);
        assert_eq!(stats.payment_cap, 3 * horizon);
        // Each month's rule is either one direct bound or one indicator pair.
        assert_eq!(stats.minimum_payment + stats.payoff_indicators, 3 * horizon);
        assert_eq!(stats.payoff_bounds, 2 * stats.payoff_indicators);
        assert_eq!(stats.budget, horizon);
        assert!(stats.payoff_indicators > 0);
        assert!(stats.payoff_indicators < 3 * (horizon - 1));
        assert_eq!(model.constraints.len(), stats.constraints());
        assert_eq!(model.index().debt_count(), 3);
        assert_eq!(model.index().horizon(), horizon);
    }

    #[test]
    fn month_zero_outlay_caps_minimums_by_balance() {
        let model = build_model(
            &portfolio(
                100.0,
                vec![
                    Debt::new("Small", 30.0, 0.1, 50.0),
                    Debt::new("Large", 900.0, 0.1, 40.0),
                ],
            ),
            6,
        )
        .expect("model");
        assert!((model.month_zero_outlay() - 70.0).abs() < 1e-12);
        assert_eq!(model.monthly_budget(), 100.0);
    }

    #[test]
    fn zero_minimum_needs_no_indicator() {
        let model = build_model(
            &portfolio(100.0, vec![Debt::new("Friend", 500.0, 0.0, 0.0)]),
            12,
        )
        .expect("model");
        assert_eq!(model.stats().payoff_indicators, 0);
        assert_eq!(model.stats().payoff_cuts, 0);
    }

    #[test]
    fn rejects_empty_horizon() {
        let result = build_model(&portfolio(100.0, vec![Debt::new("a", 1.0, 0.0, 1.0)]), 0);
        assert!(matches!(result, Err(PlanError::InvalidHorizon)));
    }

    #[test]
    fn bounds_bracket_reachable_balances() {
        let debts = vec![
            Debt::new("Card", 1000.0, 0.12, 100.0),
            Debt::new("Loan", 5000.0, 0.06, 150.0),
        ];
        let bounds = propagate_balance_bounds(&debts, 400.0, 4);

        // Card alone can receive at most 400 - 150 = 250 per month.
        assert!((bounds.lower[0][1] - (1000.0 * 1.01 - 250.0)).abs() < 1e-9);
        // Card receives at least its minimum each month.
        assert!((bounds.upper[0][1] - (1000.0 * 1.01 - 100.0)).abs() < 1e-9);
        for d in 0..debts.len() {
            for t in 0..=4 {
                assert!(bounds.lower[d][t] <= bounds.upper[d][t] + 1e-9);
                assert!(bounds.lower[d][t] >= 0.0);
            }
        }
    }

    #[test]
    fn bounds_reach_zero_when_budget_clears_debt() {
        let debts = vec![Debt::new("Tiny", 50.0, 0.0, 10.0)];
        let bounds = propagate_balance_bounds(&debts, 100.0, 2);
        assert_eq!(bounds.lower[0][1], 0.0);
        assert!((bounds.upper[0][1] - 40.0).abs() < 1e-12);
    }
}
