pub mod normalize;

use serde::{Deserialize, Serialize};

pub use normalize::{normalize_request, ValidationError};

pub const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub balance: f64,
    pub average_income: f64,
    pub monthly_budget: f64,
}

impl User {
    pub fn new(balance: f64, average_income: f64) -> Self {
        Self {
            balance,
            average_income,
            monthly_budget: average_income,
        }
    }

    pub fn with_monthly_budget(mut self, monthly_budget: f64) -> Self {
        self.monthly_budget = monthly_budget;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debt {
    pub name: String,
    pub initial_balance: f64,
    pub annual_interest_rate: f64,
    pub minimum_monthly_payment: f64,
}

impl Debt {
    pub fn new(
        name: impl Into<String>,
        initial_balance: f64,
        annual_interest_rate: f64,
        minimum_monthly_payment: f64,
    ) -> Self {
        Self {
            name: name.into(),
            initial_balance,
            annual_interest_rate,
            minimum_monthly_payment,
        }
    }

    pub fn periodic_rate(&self) -> f64 {
        self.annual_interest_rate / MONTHS_PER_YEAR
    }

    /// What month zero must pay: the minimum, or the whole balance when smaller.
    pub fn first_month_minimum(&self) -> f64 {
        self.minimum_monthly_payment.min(self.initial_balance)
    }
}

/// A validated request: one user and the debts in the order they were given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Portfolio {
    pub user: User,
    pub debts: Vec<Debt>,
}

impl Portfolio {
    pub fn monthly_budget(&self) -> f64 {
        self.user.monthly_budget
    }

    pub fn total_minimums(&self) -> f64 {
        self.debts.iter().map(|d| d.minimum_monthly_payment).sum()
    }

    pub fn total_balance(&self) -> f64 {
        self.debts.iter().map(|d| d.initial_balance).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_rate_is_annual_over_twelve() {
        let debt = Debt::new("Card", 1000.0, 0.24, 50.0);
        assert!((debt.periodic_rate() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn first_month_minimum_is_capped_by_balance() {
        assert_eq!(Debt::new("a", 40.0, 0.1, 100.0).first_month_minimum(), 40.0);
        assert_eq!(Debt::new("b", 400.0, 0.1, 100.0).first_month_minimum(), 100.0);
    }

    #[test]
    fn budget_defaults_to_income_until_overridden() {
        let user = User::new(10.0, 3000.0);
        assert_eq!(user.monthly_budget, 3000.0);
        assert_eq!(user.with_monthly_budget(1200.0).monthly_budget, 1200.0);
    }

    #[test]
    fn portfolio_totals_sum_over_debts() {
        let portfolio = Portfolio {
            user: User::new(0.0, 3000.0),
            debts: vec![
                Debt::new("Card", 2500.0, 0.22, 100.0),
                Debt::new("Auto", 8000.0, 0.09, 250.0),
            ],
        };
        assert_eq!(portfolio.total_balance(), 10500.0);
        assert_eq!(portfolio.total_minimums(), 350.0);
    }
}
