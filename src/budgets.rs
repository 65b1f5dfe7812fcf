use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::categories::{check_kind, get_category};
use crate::error::{Result, TallyError};
use crate::models::{round_cents, Budget, BudgetPeriod, EntryKind};
use crate::session::current_user_id;
use crate::validate;

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub spent: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub over_budget: bool,
}

const SELECT: &str = "SELECT b.id, b.category_id, c.name, b.amount, b.period, b.start_date, b.end_date \
     FROM my_budgets b JOIN my_categories c ON c.id = b.category_id";

fn row_to_budget(row: &rusqlite::Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        amount: row.get(3)?,
        period: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
    })
}

/// The inclusive date window of `period` containing `as_of`.
/// Weeks run Monday to Sunday; months and years follow the calendar.
pub fn period_window(period: BudgetPeriod, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
    match period {
        BudgetPeriod::Weekly => {
            let start = as_of - Duration::days(as_of.weekday().num_days_from_monday() as i64);
            (start, start + Duration::days(6))
        }
        BudgetPeriod::Monthly => {
            let start = as_of.with_day(1).unwrap_or(as_of);
            let next = if start.month() == 12 {
                NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
            };
            let end = next.map(|n| n - Duration::days(1)).unwrap_or(as_of);
            (start, end)
        }
        BudgetPeriod::Yearly => {
            let start = NaiveDate::from_ymd_opt(as_of.year(), 1, 1).unwrap_or(as_of);
            let end = NaiveDate::from_ymd_opt(as_of.year(), 12, 31).unwrap_or(as_of);
            (start, end)
        }
    }
}

pub fn create_budget(
    conn: &Connection,
    category: &str,
    amount: f64,
    period: BudgetPeriod,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> Result<Budget> {
    let user_id = current_user_id(conn)?;
    let category = get_category(conn, category)?;
    check_kind(&category, EntryKind::Expense)?;
    let amount = validate::positive_amount(amount)?;
    if let Some(end) = end_date {
        if end < start_date {
            return Err(TallyError::Validation(format!(
                "Budget end date {end} is before its start date {start_date}"
            )));
        }
    }
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM my_budgets WHERE category_id = ?1 AND period = ?2)",
        rusqlite::params![category.id, period],
        |row| row.get(0),
    )?;
    if exists {
        return Err(TallyError::duplicate(
            "Budget",
            format!("{period} budget for {}", category.name),
        ));
    }
    conn.execute(
        "INSERT INTO budgets (user_id, category_id, amount, period, start_date, end_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![user_id, category.id, amount, period, start_date, end_date],
    )?;
    get_budget(conn, conn.last_insert_rowid())
}

pub fn get_budget(conn: &Connection, id: i64) -> Result<Budget> {
    let sql = format!("{SELECT} WHERE b.id = ?1");
    conn.query_row(&sql, [id], row_to_budget)
        .optional()?
        .ok_or_else(|| TallyError::not_found("Budget", format!("id {id}")))
}

pub fn list_budgets(conn: &Connection) -> Result<Vec<Budget>> {
    let sql = format!(
        "{SELECT} ORDER BY c.name COLLATE NAMECASE, \
         CASE b.period WHEN 'weekly' THEN 0 WHEN 'monthly' THEN 1 ELSE 2 END"
    );
    let mut stmt = conn.prepare(&sql)?;
    let budgets = stmt
        .query_map([], row_to_budget)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(budgets)
}

pub fn update_budget_amount(conn: &Connection, id: i64, amount: f64) -> Result<Budget> {
    let amount = validate::positive_amount(amount)?;
    let budget = get_budget(conn, id)?;
    conn.execute(
        "UPDATE budgets SET amount = ?1 WHERE id = ?2",
        rusqlite::params![amount, budget.id],
    )?;
    get_budget(conn, id)
}

pub fn delete_budget(conn: &Connection, id: i64) -> Result<Budget> {
    let budget = get_budget(conn, id)?;
    conn.execute("DELETE FROM budgets WHERE id = ?1", [id])?;
    Ok(budget)
}

/// Spending against every budget active on `as_of`, over the period window containing it.
pub fn budget_status(conn: &Connection, as_of: NaiveDate) -> Result<Vec<BudgetStatus>> {
    let mut spent_stmt = conn.prepare(
        "SELECT COALESCE(SUM(amount), 0) FROM my_transactions \
         WHERE category_id = ?1 AND kind = 'expense' AND date BETWEEN ?2 AND ?3",
    )?;

    let mut statuses = Vec::new();
    for budget in list_budgets(conn)? {
        if budget.start_date > as_of || budget.end_date.is_some_and(|end| end < as_of) {
            continue;
        }
        let (window_start, window_end) = period_window(budget.period, as_of);
        let spent: f64 = spent_stmt.query_row(
            rusqlite::params![budget.category_id, window_start, window_end],
            |row| row.get(0),
        )?;
        let spent = round_cents(spent);
        let remaining = round_cents(budget.amount - spent);
        let percent_used = if budget.amount > 0.0 {
            (spent / budget.amount * 1000.0).round() / 10.0
        } else {
            0.0
        };
        statuses.push(BudgetStatus {
            over_budget: spent > budget.amount,
            budget,
            window_start,
            window_end,
            spent,
            remaining,
            percent_used,
        });
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_account, NewAccount};
    use crate::db::test_db;
    use crate::models::AccountType;
    use crate::transactions::{insert_transaction, NewTransaction};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn spend(conn: &Connection, account_id: i64, category: &str, day: &str, amount: f64) {
        let category_id = get_category(conn, category).unwrap().id;
        insert_transaction(
            conn,
            &NewTransaction {
                account_id,
                category_id: Some(category_id),
                date: d(day),
                description: format!("{category} purchase"),
                amount,
                kind: EntryKind::Expense,
                notes: None,
                import_id: None,
            },
        )
        .unwrap();
    }

    fn account(conn: &Connection) -> i64 {
        create_account(
            conn,
            &NewAccount {
                name: "Card".into(),
                account_type: AccountType::CreditCard,
                currency: "USD".into(),
                opening_balance: 0.0,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_period_windows() {
        // 2025-03-13 is a Thursday
        assert_eq!(
            period_window(BudgetPeriod::Weekly, d("2025-03-13")),
            (d("2025-03-10"), d("2025-03-16"))
        );
        assert_eq!(
            period_window(BudgetPeriod::Weekly, d("2025-03-10")),
            (d("2025-03-10"), d("2025-03-16"))
        );
        assert_eq!(
            period_window(BudgetPeriod::Monthly, d("2024-02-15")),
            (d("2024-02-01"), d("2024-02-29"))
        );
        assert_eq!(
            period_window(BudgetPeriod::Monthly, d("2025-12-31")),
            (d("2025-12-01"), d("2025-12-31"))
        );
        assert_eq!(
            period_window(BudgetPeriod::Yearly, d("2025-06-01")),
            (d("2025-01-01"), d("2025-12-31"))
        );
    }

    #[test]
    fn test_budget_requires_expense_category() {
        let (_dir, conn) = test_db();
        let err = create_budget(&conn, "Salary", 100.0, BudgetPeriod::Monthly, d("2025-01-01"), None)
            .unwrap_err();
        assert!(matches!(err, TallyError::KindMismatch { .. }));
    }

    #[test]
    fn test_one_budget_per_category_and_period() {
        let (_dir, conn) = test_db();
        create_budget(&conn, "Groceries", 400.0, BudgetPeriod::Monthly, d("2025-01-01"), None).unwrap();
        let err = create_budget(&conn, "groceries", 300.0, BudgetPeriod::Monthly, d("2025-01-01"), None)
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        create_budget(&conn, "Groceries", 100.0, BudgetPeriod::Weekly, d("2025-01-01"), None).unwrap();
        assert_eq!(list_budgets(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_end_before_start_rejected() {
        let (_dir, conn) = test_db();
        let err = create_budget(
            &conn,
            "Groceries",
            100.0,
            BudgetPeriod::Monthly,
            d("2025-05-01"),
            Some(d("2025-04-01")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("before its start date"));
    }

    #[test]
    fn test_budget_status_tracks_window_spending() {
        let (_dir, conn) = test_db();
        let acct = account(&conn);
        create_budget(&conn, "Groceries", 200.0, BudgetPeriod::Monthly, d("2025-01-01"), None).unwrap();
        create_budget(&conn, "Dining Out", 50.0, BudgetPeriod::Weekly, d("2025-01-01"), None).unwrap();

        spend(&conn, acct, "Groceries", "2025-03-02", 120.0);
        spend(&conn, acct, "Groceries", "2025-03-20", 100.5);
        spend(&conn, acct, "Groceries", "2025-02-27", 75.0); // previous month
        spend(&conn, acct, "Dining Out", "2025-03-18", 20.0);
        spend(&conn, acct, "Dining Out", "2025-03-16", 99.0); // previous week

        let statuses = budget_status(&conn, d("2025-03-20")).unwrap();
        assert_eq!(statuses.len(), 2);

        let dining = statuses.iter().find(|s| s.budget.category_name == "Dining Out").unwrap();
        assert_eq!(dining.spent, 20.0);
        assert_eq!(dining.remaining, 30.0);
        assert_eq!(dining.percent_used, 40.0);
        assert!(!dining.over_budget);

        let groceries = statuses.iter().find(|s| s.budget.category_name == "Groceries").unwrap();
        assert_eq!(groceries.spent, 220.5);
        assert_eq!(groceries.remaining, -20.5);
        assert!(groceries.over_budget);
        assert_eq!(groceries.window_start, d("2025-03-01"));
        assert_eq!(groceries.window_end, d("2025-03-31"));
    }

    #[test]
    fn test_inactive_budgets_skipped() {
        let (_dir, conn) = test_db();
        create_budget(&conn, "Travel", 500.0, BudgetPeriod::Yearly, d("2026-01-01"), None).unwrap();
        create_budget(
            &conn,
            "Health",
            80.0,
            BudgetPeriod::Monthly,
            d("2024-01-01"),
            Some(d("2024-12-31")),
        )
        .unwrap();
        assert!(budget_status(&conn, d("2025-06-01")).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let (_dir, conn) = test_db();
        let budget = create_budget(&conn, "Groceries", 200.0, BudgetPeriod::Monthly, d("2025-01-01"), None).unwrap();
        assert_eq!(update_budget_amount(&conn, budget.id, 250.0).unwrap().amount, 250.0);
        assert!(update_budget_amount(&conn, budget.id, -1.0).is_err());
        delete_budget(&conn, budget.id).unwrap();
        assert!(get_budget(&conn, budget.id).is_err());
    }
}
