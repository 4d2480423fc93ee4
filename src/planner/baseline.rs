use serde::Serialize;

use crate::debts::Debt;
use crate::planner::extract::PAID_OFF_THRESHOLD;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BaselineSummary {
    pub horizon_months: usize,
    pub total_interest: f64,
    /// Month (1-based) in which each debt is cleared, in input order.
    pub payoff_months: Vec<Option<usize>>,
}

/// Interest paid when every debt only ever receives its minimum payment.
///
/// Uses the same accounting as the optimizer: month `t` charges
/// `balance * rate` and then pays `min(minimum, balance * (1 + rate))`.
pub fn minimum_payment_baseline(debts: &[Debt], horizon: usize) -> BaselineSummary {
    let mut total_interest = 0.0;
    let mut payoff_months = Vec::with_capacity(debts.len());

    for debt in debts {
        let rate = debt.periodic_rate();
        let mut balance = debt.initial_balance;
        let mut payoff = (balance < PAID_OFF_THRESHOLD).then_some(0);

        for month in 0..horizon {
            if payoff.is_some() {
                break;
            }
            let interest = balance * rate;
            total_interest += interest;
            let owed = balance + interest;
            balance = owed - debt.minimum_monthly_payment.min(owed);
            if balance < PAID_OFF_THRESHOLD {
                payoff = Some(month + 1);
            }
        }
        payoff_months.push(payoff);
    }

    BaselineSummary {
        horizon_months: horizon,
        total_interest,
        payoff_months,
    }
}
