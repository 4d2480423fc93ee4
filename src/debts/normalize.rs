use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::debts::{Debt, Portfolio, User};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{path} must be a JSON object")]
    NotAnObject { path: String },
    #[error("missing required field: {path}")]
    MissingField { path: String },
    #[error("{path} must be a number")]
    NotNumeric { path: String },
    #[error("{path} must not be negative (got {value})")]
    Negative { path: String, value: f64 },
    #[error("{path} must be a non-empty string")]
    InvalidName { path: String },
    #[error("debts must be an array")]
    DebtsNotArray,
    #[error("at least one debt is required")]
    EmptyDebts,
    #[error("duplicate debt name: {name}")]
    DuplicateName { name: String },
}

impl ValidationError {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotAnObject { path }
            | Self::MissingField { path }
            | Self::NotNumeric { path }
            | Self::Negative { path, .. }
            | Self::InvalidName { path } => Some(path),
            Self::DebtsNotArray | Self::EmptyDebts | Self::DuplicateName { .. } => None,
        }
    }
}

/// Turns an untyped optimize request into a validated [`Portfolio`].
///
/// Expected shape:
///
/// ```json
/// { "user": { "balance": 1500.0, "averageIncome": 3000.0, "monthlyBudget": 2500.0 },
///   "debts": [ { "name": "Card", "balance": 2500.0, "interestRate": 0.22, "minimumPayment": 100.0 } ] }
/// ```
///
/// `monthlyBudget` is optional and falls back to `averageIncome`.
pub fn normalize_request(raw: &Value) -> Result<Portfolio, ValidationError> {
    let root = as_object(raw, "request")?;

    let user_value = root.get("user").ok_or_else(|| ValidationError::MissingField {
        path: "user".to_string(),
    })?;
    let user = normalize_user(as_object(user_value, "user")?)?;

    let debts_value = root
        .get("debts")
        .ok_or_else(|| ValidationError::MissingField {
            path: "debts".to_string(),
        })?;
    let entries = debts_value
        .as_array()
        .ok_or(ValidationError::DebtsNotArray)?;
    if entries.is_empty() {
        return Err(ValidationError::EmptyDebts);
    }

    let mut seen = BTreeSet::new();
    let mut debts = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let prefix = format!("debts[{idx}]");
        let debt = normalize_debt(as_object(entry, &prefix)?, &prefix)?;
        if !seen.insert(debt.name.clone()) {
            return Err(ValidationError::DuplicateName { name: debt.name });
        }
        debts.push(debt);
    }

    Ok(Portfolio { user, debts })
}

fn normalize_user(object: &Map<String, Value>) -> Result<User, ValidationError> {
    let balance = non_negative(object, "user", "balance")?;
    let average_income = non_negative(object, "user", "averageIncome")?;
    let user = User::new(balance, average_income);
    match object.get("monthlyBudget") {
        None | Some(Value::Null) => Ok(user),
        Some(_) => Ok(user.with_monthly_budget(non_negative(object, "user", "monthlyBudget")?)),
    }
}

fn normalize_debt(object: &Map<String, Value>, prefix: &str) -> Result<Debt, ValidationError> {
    let name_path = format!("{prefix}.name");
    let name = match object.get("name") {
        None => return Err(ValidationError::MissingField { path: name_path }),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err(ValidationError::InvalidName { path: name_path }),
    };

    Ok(Debt {
        name,
        initial_balance: non_negative(object, prefix, "balance")?,
        annual_interest_rate: non_negative(object, prefix, "interestRate")?,
        minimum_monthly_payment: non_negative(object, prefix, "minimumPayment")?,
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| ValidationError::NotAnObject {
        path: path.to_string(),
    })
}

fn non_negative(
    object: &Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<f64, ValidationError> {
    let path = format!("{prefix}.{key}");
    let value = match object.get(key) {
        None | Some(Value::Null) => return Err(ValidationError::MissingField { path }),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| ValidationError::NotNumeric { path: path.clone() })?;

    if value < 0.0 {
        return Err(ValidationError::Negative { path, value });
    }
    Ok(value)
}
