use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::budgets::{budget_status, create_budget, delete_budget, list_budgets, update_budget_amount, BudgetStatus};
use crate::cli::{open_session, parse_date_arg, parse_date_opt, today};
use crate::error::Result;
use crate::fmt::{money, percent};

pub fn add(category: &str, amount: f64, period: &str, start: Option<&str>, end: Option<&str>) -> Result<()> {
    let s = open_session()?;
    let start = parse_date_opt(start)?.unwrap_or_else(today);
    let budget = create_budget(&s.conn, category, amount, period.parse()?, start, parse_date_opt(end)?)?;
    println!(
        "Added {} budget #{} for {}: {}",
        budget.period,
        budget.id,
        budget.category_name,
        money(budget.amount, &s.settings.default_currency)
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let s = open_session()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Category", "Period", "Amount", "Starts", "Ends"]);
    for b in list_budgets(&s.conn)? {
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(&b.category_name),
            Cell::new(b.period),
            Cell::new(money(b.amount, &s.settings.default_currency)).set_alignment(CellAlignment::Right),
            Cell::new(b.start_date),
            Cell::new(b.end_date.map(|d| d.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Budgets\n{table}");
    Ok(())
}

pub(crate) fn status_table(statuses: &[BudgetStatus], currency: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Period", "Window", "Budget", "Spent", "Remaining", "Used"]);
    for st in statuses {
        let used = percent(st.percent_used);
        let used = if st.over_budget {
            used.red().bold().to_string()
        } else if st.percent_used >= 80.0 {
            used.yellow().to_string()
        } else {
            used.green().to_string()
        };
        table.add_row(vec![
            Cell::new(&st.budget.category_name),
            Cell::new(st.budget.period),
            Cell::new(format!("{} .. {}", st.window_start, st.window_end)),
            Cell::new(money(st.budget.amount, currency)).set_alignment(CellAlignment::Right),
            Cell::new(money(st.spent, currency)).set_alignment(CellAlignment::Right),
            Cell::new(money(st.remaining, currency)).set_alignment(CellAlignment::Right),
            Cell::new(used).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn status(date: Option<&str>, json: bool) -> Result<()> {
    let s = open_session()?;
    let as_of = match date {
        Some(d) => parse_date_arg(d)?,
        None => today(),
    };
    let statuses = budget_status(&s.conn, as_of)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("No active budgets on {as_of}.");
        return Ok(());
    }
    println!("Budgets as of {as_of}\n{}", status_table(&statuses, &s.settings.default_currency));
    Ok(())
}

pub fn edit(id: i64, amount: f64) -> Result<()> {
    let s = open_session()?;
    let budget = update_budget_amount(&s.conn, id, amount)?;
    println!(
        "Budget #{} for {} is now {}",
        budget.id,
        budget.category_name,
        money(budget.amount, &s.settings.default_currency)
    );
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let s = open_session()?;
    let budget = delete_budget(&s.conn, id)?;
    println!("Deleted {} budget for {}", budget.period, budget.category_name);
    Ok(())
}
