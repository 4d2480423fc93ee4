use anyhow::Result;

use crate::planner::RepaymentPlan;

/// One row per debt month.
pub fn plan_to_csv(plan: &RepaymentPlan) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "debt",
        "payment_number",
        "payment_amount",
        "remaining_balance",
    ])?;
    for schedule in &plan.payment_plans {
        for month in &schedule.monthly_payments {
            writer.write_record([
                schedule.name.clone(),
                month.payment_number.to_string(),
                format!("{:.2}", month.payment_amount),
                format!("{:.2}", month.remaining_balance),
            ])?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
