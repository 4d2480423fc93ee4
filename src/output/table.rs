use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::planner::{BaselineSummary, DebtSchedule, RepaymentPlan};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_schedule_table(schedule: &DebtSchedule) -> String {
    let mut table = new_table();
    table.set_header(vec!["Month", "Payment", "Remaining"]);
    for month in &schedule.monthly_payments {
        table.add_row(vec![
            month.payment_number.to_string(),
            format!("{:.2}", month.payment_amount),
            format!("{:.2}", month.remaining_balance),
        ]);
    }
    table.to_string()
}

/// One section per debt, in input order.
pub fn render_plan_tables(plan: &RepaymentPlan) -> String {
    plan.payment_plans
        .iter()
        .map(|schedule| format!("{}\n{}", schedule.name, render_schedule_table(schedule)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_summary_table(plan: &RepaymentPlan, baseline: &BaselineSummary) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Debt",
        "Total Paid",
        "Paid Off",
        "Minimum-only Payoff",
    ]);

    for (i, schedule) in plan.payment_plans.iter().enumerate() {
        let paid_off = match schedule.payoff_month() {
            Some(month) => Cell::new(format!("month {month}")).fg(Color::Green),
            None => Cell::new("NO").fg(Color::Red),
        };
        let baseline_payoff = baseline
            .payoff_months
            .get(i)
            .copied()
            .flatten()
            .map(|m| format!("month {m}"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(Row::from(vec![
            Cell::new(&schedule.name),
            Cell::new(format!("{:.2}", schedule.total_paid())),
            paid_off,
            Cell::new(baseline_payoff),
        ]));
    }

    let saved = baseline.total_interest - plan.total_interest_paid;
    let mut footer = format!(
        "Total interest: {:.2} (minimum payments only: {:.2}, saved {:.2}) over {} months",
        plan.total_interest_paid, baseline.total_interest, saved, baseline.horizon_months
    );
    let unfinished = plan.unfinished_debts();
    if !unfinished.is_empty() {
        footer.push_str(&format!("\nStill owing at horizon: {}", unfinished.join(", ")));
    }
    format!("{table}\n{footer}")
}
