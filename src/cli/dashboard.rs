use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::budgets::status_table;
use crate::cli::transactions::transactions_table;
use crate::cli::{open_session, today};
use crate::error::Result;
use crate::fmt::{money, percent};
use crate::reports::{dashboard, Month};

pub fn run(month: Option<&str>, months: u32, json: bool) -> Result<()> {
    let s = open_session()?;
    let today = today();
    let month = match month {
        Some(m) => Month::parse(m)?,
        None => Month::containing(today),
    };
    let dash = dashboard(&s.conn, month, months, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dash)?);
        return Ok(());
    }

    let cur = s.settings.default_currency.as_str();
    let o = &dash.overview;
    let net = money(o.net, cur);
    let net = if o.net < 0.0 { net.red() } else { net.green() };

    println!("{}", format!("Dashboard for {} ({})", s.user.username, o.month).bold());
    println!();
    println!("  Net worth:    {}", money(o.net_worth, cur).bold());
    println!("  Income:       {}", money(o.income, cur));
    println!("  Expenses:     {}", money(o.expenses, cur));
    println!("  Net:          {net}");
    println!("  Savings rate: {}", percent(o.savings_rate));

    if !o.accounts.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Account", "Type", "Balance"]);
        for a in &o.accounts {
            table.add_row(vec![
                Cell::new(&a.name),
                Cell::new(a.account_type),
                Cell::new(money(a.balance, &a.currency)).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("\nAccounts\n{table}");
    }

    if !dash.spending.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Category", "Transactions", "Spent", "Share"]);
        for c in &dash.spending {
            table.add_row(vec![
                Cell::new(&c.category),
                Cell::new(c.count).set_alignment(CellAlignment::Right),
                Cell::new(money(c.total, cur)).set_alignment(CellAlignment::Right),
                Cell::new(percent(c.percent)).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("\nSpending by category\n{table}");
    }

    if !dash.trend.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Month", "Income", "Expenses", "Net"]);
        for m in &dash.trend {
            table.add_row(vec![
                Cell::new(m.month),
                Cell::new(money(m.income, cur)).set_alignment(CellAlignment::Right),
                Cell::new(money(m.expenses, cur)).set_alignment(CellAlignment::Right),
                Cell::new(money(m.net, cur)).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("\nMonthly trend\n{table}");
    }

    if !dash.budgets.is_empty() {
        println!("\nBudgets\n{}", status_table(&dash.budgets, cur));
    }

    if !dash.recent.is_empty() {
        println!("\nRecent transactions\n{}", transactions_table(&dash.recent, cur));
    }
    Ok(())
}
