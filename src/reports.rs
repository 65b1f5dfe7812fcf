use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::accounts::list_accounts;
use crate::budgets::{budget_status, period_window, BudgetStatus};
use crate::error::{Result, TallyError};
use crate::models::{round_cents, AccountType, BudgetPeriod, Transaction};
use crate::transactions::{list_transactions, TransactionFilter};

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(TallyError::Validation(format!("Invalid month: {month}")));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `YYYY-MM`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || TallyError::Validation(format!("Invalid month '{raw}' (expected YYYY-MM)"));
        let (y, m) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }

    pub fn shift(self, delta: i32) -> Self {
        let idx = self.year * 12 + self.month as i32 - 1 + delta;
        Self {
            year: idx.div_euclid(12),
            month: idx.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn first_day(self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or_else(|| TallyError::Validation(format!("Invalid month: {self}")))
    }

    /// Inclusive first and last day.
    pub fn bounds(self) -> Result<(NaiveDate, NaiveDate)> {
        Ok(period_window(BudgetPeriod::Monthly, self.first_day()?))
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub month: Month,
    pub net_worth: f64,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    /// Percent of income not spent; 0 when there was no income.
    pub savings_rate: f64,
    pub accounts: Vec<AccountBalance>,
}

fn income_and_expenses(conn: &Connection, from: NaiveDate, to: NaiveDate) -> Result<(f64, f64)> {
    let (income, expenses): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN kind = 'income' THEN amount END), 0), \
                COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount END), 0) \
         FROM my_transactions WHERE date BETWEEN ?1 AND ?2",
        rusqlite::params![from, to],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((round_cents(income), round_cents(expenses)))
}

pub fn overview(conn: &Connection, month: Month) -> Result<Overview> {
    let accounts: Vec<AccountBalance> = list_accounts(conn, false)?
        .into_iter()
        .map(|a| AccountBalance {
            name: a.name,
            account_type: a.account_type,
            currency: a.currency,
            balance: a.balance,
        })
        .collect();
    let net_worth = round_cents(accounts.iter().map(|a| a.balance).sum());

    let (from, to) = month.bounds()?;
    let (income, expenses) = income_and_expenses(conn, from, to)?;
    let net = round_cents(income - expenses);
    let savings_rate = if income > 0.0 {
        (net / income * 1000.0).round() / 10.0
    } else {
        0.0
    };

    Ok(Overview {
        month,
        net_worth,
        income,
        expenses,
        net,
        savings_rate,
        accounts,
    })
}

// ---------------------------------------------------------------------------
// Spending by category
// ---------------------------------------------------------------------------

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize)]
pub struct CategorySpend {
    pub category: String,
    pub color: Option<String>,
    pub total: f64,
    pub count: i64,
    pub percent: f64,
}

/// Expense totals per category between `from` and `to` inclusive, largest first.
pub fn spending_by_category(conn: &Connection, from: NaiveDate, to: NaiveDate) -> Result<Vec<CategorySpend>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(c.name, ?3), c.color, SUM(t.amount), COUNT(*) \
         FROM my_transactions t LEFT JOIN my_categories c ON c.id = t.category_id \
         WHERE t.kind = 'expense' AND t.date BETWEEN ?1 AND ?2 \
         GROUP BY t.category_id ORDER BY SUM(t.amount) DESC, 1",
    )?;
    let mut rows = stmt
        .query_map(rusqlite::params![from, to, UNCATEGORIZED], |row| {
            Ok(CategorySpend {
                category: row.get(0)?,
                color: row.get(1)?,
                total: round_cents(row.get(2)?),
                count: row.get(3)?,
                percent: 0.0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let grand: f64 = rows.iter().map(|r| r.total).sum();
    if grand > 0.0 {
        for row in &mut rows {
            row.percent = (row.total / grand * 1000.0).round() / 10.0;
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Monthly trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MonthTotals {
    pub month: Month,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

/// Longest trend a dashboard will compute: one hundred years.
pub const MAX_TREND_MONTHS: u32 = 1200;

/// Income and expenses for the `months` months ending with `end`, oldest first.
/// Months without transactions are included as zeros.
pub fn monthly_trend(conn: &Connection, end: Month, months: u32) -> Result<Vec<MonthTotals>> {
    if months == 0 {
        return Ok(Vec::new());
    }
    if months > MAX_TREND_MONTHS {
        return Err(TallyError::Validation(format!(
            "Trend length must be at most {MAX_TREND_MONTHS} months, got {months}"
        )));
    }
    let start = end.shift(1 - months as i32);
    let (from, _) = start.bounds()?;
    let (_, to) = end.bounds()?;

    let mut stmt = conn.prepare(
        "SELECT substr(date, 1, 7), \
                COALESCE(SUM(CASE WHEN kind = 'income' THEN amount END), 0), \
                COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount END), 0) \
         FROM my_transactions WHERE date BETWEEN ?1 AND ?2 GROUP BY 1",
    )?;
    let totals: HashMap<String, (f64, f64)> = stmt
        .query_map(rusqlite::params![from, to], |row| {
            Ok((row.get(0)?, (row.get(1)?, row.get(2)?)))
        })?
        .collect::<std::result::Result<_, _>>()?;

    Ok((0..months as i32)
        .map(|i| {
            let month = start.shift(i);
            let (income, expenses) = totals.get(&month.to_string()).copied().unwrap_or((0.0, 0.0));
            MonthTotals {
                month,
                income: round_cents(income),
                expenses: round_cents(expenses),
                net: round_cents(income - expenses),
            }
        })
        .collect())
}

pub fn recent_transactions(conn: &Connection, limit: usize) -> Result<Vec<Transaction>> {
    list_transactions(
        conn,
        &TransactionFilter {
            limit: Some(limit),
            ..Default::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub overview: Overview,
    pub spending: Vec<CategorySpend>,
    pub trend: Vec<MonthTotals>,
    pub budgets: Vec<BudgetStatus>,
    pub recent: Vec<Transaction>,
}

pub const RECENT_LIMIT: usize = 10;

/// Everything the dashboard shows for `month`. Budgets are measured as of
/// `today` when it falls inside the month, otherwise as of the month's last day.
pub fn dashboard(conn: &Connection, month: Month, trend_months: u32, today: NaiveDate) -> Result<Dashboard> {
    let (from, to) = month.bounds()?;
    let as_of = if (from..=to).contains(&today) { today } else { to };
    Ok(Dashboard {
        overview: overview(conn, month)?,
        spending: spending_by_category(conn, from, to)?,
        trend: monthly_trend(conn, month, trend_months)?,
        budgets: budget_status(conn, as_of)?,
        recent: recent_transactions(conn, RECENT_LIMIT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budgets::create_budget;
    use crate::db::test_db;
    use crate::importer::{import_bytes, ImportOptions};

    const LEDGER: &str = "\
Date,Description,Amount,Account,Category
2025-01-15,January pay,2000.00,Checking,Salary
2025-01-20,Rent,-900.00,Checking,Rent & Mortgage
2025-03-01,March pay,2000.00,Checking,Salary
2025-03-03,Groceries run,-150.00,Checking,Groceries
2025-03-09,Groceries again,-50.00,Checking,Groceries
2025-03-12,Cinema,-30.00,Cash,Entertainment
2025-03-14,Mystery,-20.00,Cash,
2025-04-01,April pay,2000.00,Checking,Salary
";

    fn seeded() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = test_db();
        let report = import_bytes(&conn, LEDGER.as_bytes(), "ledger.csv", &ImportOptions::default()).unwrap();
        assert!(report.is_success(), "{:?}", report.errors);
        (dir, conn)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_month_helpers() {
        let m = Month::parse("2025-03").unwrap();
        assert_eq!(m.to_string(), "2025-03");
        assert_eq!(m.shift(-3).to_string(), "2024-12");
        assert_eq!(m.shift(10).to_string(), "2026-01");
        assert_eq!(m.bounds().unwrap(), (d("2025-03-01"), d("2025-03-31")));
        assert_eq!(Month::new(2024, 2).unwrap().bounds().unwrap().1, d("2024-02-29"));
        assert!(Month::parse("2025-13").is_err());
        assert!(Month::parse("March").is_err());
    }

    #[test]
    fn test_overview() {
        let (_dir, conn) = seeded();
        let o = overview(&conn, Month::new(2025, 3).unwrap()).unwrap();
        assert_eq!(o.income, 2000.0);
        assert_eq!(o.expenses, 250.0);
        assert_eq!(o.net, 1750.0);
        assert_eq!(o.savings_rate, 87.5);
        assert_eq!(o.net_worth, 4850.0);
        let names: Vec<&str> = o.accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Cash", "Checking"]);
    }

    #[test]
    fn test_overview_without_income() {
        let (_dir, conn) = seeded();
        let o = overview(&conn, Month::new(2025, 2).unwrap()).unwrap();
        assert_eq!(o.income, 0.0);
        assert_eq!(o.savings_rate, 0.0);
    }

    #[test]
    fn test_spending_by_category() {
        let (_dir, conn) = seeded();
        let rows = spending_by_category(&conn, d("2025-03-01"), d("2025-03-31")).unwrap();
        let summary: Vec<(&str, f64, i64, f64)> = rows
            .iter()
            .map(|r| (r.category.as_str(), r.total, r.count, r.percent))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Groceries", 200.0, 2, 80.0),
                ("Entertainment", 30.0, 1, 12.0),
                ("Uncategorized", 20.0, 1, 8.0),
            ]
        );
    }

    #[test]
    fn test_monthly_trend_fills_gaps() {
        let (_dir, conn) = seeded();
        let trend = monthly_trend(&conn, Month::new(2025, 3).unwrap(), 4).unwrap();
        let rows: Vec<(String, f64, f64, f64)> = trend
            .iter()
            .map(|t| (t.month.to_string(), t.income, t.expenses, t.net))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2024-12".to_string(), 0.0, 0.0, 0.0),
                ("2025-01".to_string(), 2000.0, 900.0, 1100.0),
                ("2025-02".to_string(), 0.0, 0.0, 0.0),
                ("2025-03".to_string(), 2000.0, 250.0, 1750.0),
            ]
        );
        assert!(monthly_trend(&conn, Month::new(2025, 3).unwrap(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_monthly_trend_length_is_bounded() {
        let (_dir, conn) = seeded();
        let end = Month::new(2025, 3).unwrap();

        let longest = monthly_trend(&conn, end, MAX_TREND_MONTHS).unwrap();
        assert_eq!(longest.len(), MAX_TREND_MONTHS as usize);
        assert_eq!(longest[0].month, Month::new(1925, 4).unwrap());

        let err = monthly_trend(&conn, end, u32::MAX).unwrap_err();
        assert!(err.to_string().contains("at most 1200 months"));
        assert!(monthly_trend(&conn, end, 2_147_483_648).is_err());
    }

    #[test]
    fn test_dashboard_budget_as_of() {
        let (_dir, conn) = seeded();
        create_budget(&conn, "Groceries", 300.0, BudgetPeriod::Monthly, d("2025-01-01"), None).unwrap();

        let march = Month::new(2025, 3).unwrap();
        let past = dashboard(&conn, march, 3, d("2025-06-10")).unwrap();
        assert_eq!(past.budgets.len(), 1);
        assert_eq!(past.budgets[0].window_start, d("2025-03-01"));
        assert_eq!(past.budgets[0].spent, 200.0);
        assert_eq!(past.trend.len(), 3);
        assert_eq!(past.recent.len(), 8);
        assert_eq!(past.recent[0].description, "April pay");

        let current = dashboard(&conn, march, 3, d("2025-03-05")).unwrap();
        assert_eq!(current.budgets[0].spent, 200.0);
        assert_eq!(current.budgets[0].window_end, d("2025-03-31"));
    }

    #[test]
    fn test_dashboard_serializes() {
        let (_dir, conn) = seeded();
        let dash = dashboard(&conn, Month::new(2025, 3).unwrap(), 2, d("2025-03-20")).unwrap();
        let json = serde_json::to_value(&dash).unwrap();
        assert_eq!(json["overview"]["month"], "2025-03");
        assert_eq!(json["trend"][0]["month"], "2025-02");
        assert_eq!(json["spending"][0]["category"], "Groceries");
    }
}
