use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{EntryKind, Transaction};
use crate::session::current_user_id;
use crate::validate;

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub kind: EntryKind,
    pub notes: Option<String>,
    pub import_id: Option<i64>,
}

/// Fields to change on an existing transaction. `category_id: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub account_id: Option<i64>,
    pub category_id: Option<Option<i64>>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub kind: Option<EntryKind>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub kind: Option<EntryKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

/// Unit separator; cannot appear in a tag name typed on a keyboard.
const TAG_SEPARATOR: char = '\u{1f}';

const SELECT: &str = "SELECT t.id, t.account_id, a.name, t.category_id, c.name, t.date, \
     t.description, t.amount, t.kind, t.notes, t.import_id, \
     (SELECT group_concat(g.name, char(31)) FROM my_transaction_tags tt \
        JOIN my_tags g ON g.id = tt.tag_id WHERE tt.transaction_id = t.id) \
     FROM my_transactions t \
     JOIN my_accounts a ON a.id = t.account_id \
     LEFT JOIN my_categories c ON c.id = t.category_id";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let tags: Option<String> = row.get(11)?;
    let mut tags: Vec<String> = tags
        .map(|t| t.split(TAG_SEPARATOR).map(str::to_string).collect())
        .unwrap_or_default();
    tags.sort_by_key(|t| t.to_lowercase());
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        account_name: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        date: row.get(5)?,
        description: row.get(6)?,
        amount: row.get(7)?,
        kind: row.get(8)?,
        notes: row.get(9)?,
        import_id: row.get(10)?,
        tags,
    })
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

/// A categorized transaction must have the same kind as its category.
fn ensure_category_kind(conn: &Connection, category_id: Option<i64>, kind: EntryKind) -> Result<()> {
    let Some(id) = category_id else {
        return Ok(());
    };
    let (name, category_kind): (String, EntryKind) = conn
        .query_row(
            "SELECT name, kind FROM my_categories WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| TallyError::not_found("Category", format!("id {id}")))?;
    if category_kind != kind {
        return Err(TallyError::KindMismatch {
            name,
            expected: kind.to_string(),
            actual: category_kind.to_string(),
        });
    }
    Ok(())
}

pub fn insert_transaction(conn: &Connection, new: &NewTransaction) -> Result<i64> {
    let user_id = current_user_id(conn)?;
    let description = validate::description(&new.description)?;
    let amount = validate::positive_amount(new.amount)?;
    ensure_category_kind(conn, new.category_id, new.kind)?;
    conn.execute(
        "INSERT INTO transactions (user_id, account_id, category_id, date, description, amount, kind, notes, import_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            user_id,
            new.account_id,
            new.category_id,
            new.date,
            description,
            amount,
            new.kind,
            clean_notes(new.notes.as_deref()),
            new.import_id,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(transaction_id = id, amount, kind = %new.kind, "inserted transaction");
    Ok(id)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    let sql = format!("{SELECT} WHERE t.id = ?1");
    conn.query_row(&sql, [id], row_to_transaction)
        .optional()?
        .ok_or_else(|| TallyError::not_found("Transaction", format!("id {id}")))
}

/// Newest first. Name filters are case-insensitive; `search` matches description and notes.
pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(account) = &filter.account {
        params.push(Box::new(account.trim().to_string()));
        clauses.push(format!("a.name = ?{} COLLATE NAMECASE", params.len()));
    }
    if let Some(category) = &filter.category {
        params.push(Box::new(category.trim().to_string()));
        clauses.push(format!("c.name = ?{} COLLATE NAMECASE", params.len()));
    }
    if let Some(tag) = &filter.tag {
        params.push(Box::new(tag.trim().to_string()));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM my_transaction_tags tt JOIN my_tags g ON g.id = tt.tag_id \
             WHERE tt.transaction_id = t.id AND g.name = ?{} COLLATE NAMECASE)",
            params.len()
        ));
    }
    if let Some(kind) = filter.kind {
        params.push(Box::new(kind));
        clauses.push(format!("t.kind = ?{}", params.len()));
    }
    if let Some(from) = filter.from {
        params.push(Box::new(from));
        clauses.push(format!("t.date >= ?{}", params.len()));
    }
    if let Some(to) = filter.to {
        params.push(Box::new(to));
        clauses.push(format!("t.date <= ?{}", params.len()));
    }
    if let Some(search) = &filter.search {
        params.push(Box::new(format!("%{}%", search.trim())));
        let n = params.len();
        clauses.push(format!(
            "(t.description LIKE ?{n} OR COALESCE(t.notes, '') LIKE ?{n})"
        ));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let limit_clause = filter
        .limit
        .map(|l| format!(" LIMIT {l}"))
        .unwrap_or_default();
    let sql = format!("{SELECT}{where_clause} ORDER BY t.date DESC, t.id DESC{limit_clause}");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_transaction(conn: &Connection, id: i64, update: &TransactionUpdate) -> Result<Transaction> {
    let current = get_transaction(conn, id)?;

    let description = match &update.description {
        Some(d) => validate::description(d)?,
        None => current.description.clone(),
    };
    let amount = match update.amount {
        Some(a) => validate::positive_amount(a)?,
        None => current.amount,
    };
    let notes = match &update.notes {
        Some(n) => clean_notes(n.as_deref()),
        None => current.notes.clone(),
    };
    let category_id = update.category_id.unwrap_or(current.category_id);
    let kind = update.kind.unwrap_or(current.kind);
    ensure_category_kind(conn, category_id, kind)?;

    conn.execute(
        "UPDATE transactions SET account_id = ?1, category_id = ?2, date = ?3, description = ?4, \
         amount = ?5, kind = ?6, notes = ?7 WHERE id = ?8",
        rusqlite::params![
            update.account_id.unwrap_or(current.account_id),
            category_id,
            update.date.unwrap_or(current.date),
            description,
            amount,
            kind,
            notes,
            id,
        ],
    )?;
    get_transaction(conn, id)
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    let current = get_transaction(conn, id)?;
    conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    Ok(current)
}

/// Same account, date, amount, kind and description as an existing row.
pub fn is_duplicate(
    conn: &Connection,
    account_id: i64,
    date: NaiveDate,
    amount: f64,
    kind: EntryKind,
    description: &str,
) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM my_transactions WHERE account_id = ?1 AND date = ?2 AND amount = ?3 \
         AND kind = ?4 AND description = ?5",
    )?;
    Ok(stmt.exists(rusqlite::params![account_id, date, amount, kind, description])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_account, get_account, NewAccount};
    use crate::categories::get_category;
    use crate::models::AccountType;
    use crate::tags::set_transaction_tags;
    use crate::db::test_db;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn setup(conn: &Connection) -> i64 {
        create_account(
            conn,
            &NewAccount {
                name: "Checking".into(),
                account_type: AccountType::Checking,
                currency: "USD".into(),
                opening_balance: 1000.0,
            },
        )
        .unwrap()
        .id
    }

    fn expense(account_id: i64, day: &str, desc: &str, amount: f64) -> NewTransaction {
        NewTransaction {
            account_id,
            category_id: None,
            date: date(day),
            description: desc.into(),
            amount,
            kind: EntryKind::Expense,
            notes: None,
            import_id: None,
        }
    }

    #[test]
    fn test_insert_updates_balance_and_reads_back() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        let groceries = get_category(&conn, "Groceries").unwrap();
        let mut new = expense(acct, "2025-03-02", "  Market  ", 54.321);
        new.category_id = Some(groceries.id);
        new.notes = Some("   ".into());
        let id = insert_transaction(&conn, &new).unwrap();

        let txn = get_transaction(&conn, id).unwrap();
        assert_eq!(txn.description, "Market");
        assert_eq!(txn.amount, 54.32);
        assert_eq!(txn.category_name.as_deref(), Some("Groceries"));
        assert_eq!(txn.account_name, "Checking");
        assert!(txn.notes.is_none());
        assert_eq!(get_account(&conn, "Checking").unwrap().balance, 945.68);
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        assert!(insert_transaction(&conn, &expense(acct, "2025-03-02", "x", 0.0)).is_err());
        assert!(insert_transaction(&conn, &expense(acct, "2025-03-02", " ", 5.0)).is_err());
    }

    #[test]
    fn test_list_filters_and_ordering() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        let a = insert_transaction(&conn, &expense(acct, "2025-01-10", "Coffee beans", 12.0)).unwrap();
        let b = insert_transaction(&conn, &expense(acct, "2025-02-10", "Train ticket", 30.0)).unwrap();
        let mut pay = expense(acct, "2025-02-28", "Payroll", 2500.0);
        pay.kind = EntryKind::Income;
        let c = insert_transaction(&conn, &pay).unwrap();
        set_transaction_tags(&conn, b, &["commute".into()]).unwrap();

        let all = list_transactions(&conn, &TransactionFilter::default()).unwrap();
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![c, b, a]);

        let feb = list_transactions(
            &conn,
            &TransactionFilter {
                from: Some(date("2025-02-01")),
                to: Some(date("2025-02-28")),
                kind: Some(EntryKind::Expense),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].id, b);
        assert_eq!(feb[0].tags, vec!["commute"]);

        let tagged = list_transactions(
            &conn,
            &TransactionFilter {
                tag: Some("COMMUTE".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(tagged.len(), 1);

        let search = list_transactions(
            &conn,
            &TransactionFilter {
                search: Some("coffee".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].id, a);

        let limited = list_transactions(
            &conn,
            &TransactionFilter {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_update_and_delete_keep_balance_in_sync() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        let id = insert_transaction(&conn, &expense(acct, "2025-01-10", "Shoes", 80.0)).unwrap();

        let updated = update_transaction(
            &conn,
            id,
            &TransactionUpdate {
                amount: Some(60.0),
                notes: Some(Some("returned one pair".into())),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.amount, 60.0);
        assert_eq!(updated.notes.as_deref(), Some("returned one pair"));
        assert_eq!(get_account(&conn, "Checking").unwrap().balance, 940.0);

        delete_transaction(&conn, id).unwrap();
        assert_eq!(get_account(&conn, "Checking").unwrap().balance, 1000.0);
        assert!(get_transaction(&conn, id).is_err());
    }

    #[test]
    fn test_update_can_clear_category() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        let mut new = expense(acct, "2025-01-10", "Shoes", 80.0);
        new.category_id = Some(get_category(&conn, "Shopping").unwrap().id);
        let id = insert_transaction(&conn, &new).unwrap();
        let updated = update_transaction(
            &conn,
            id,
            &TransactionUpdate {
                category_id: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(updated.category_id.is_none());
    }

    #[test]
    fn test_category_kind_must_match_transaction() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        let mut new = expense(acct, "2025-01-10", "Mislabelled", 10.0);
        new.category_id = Some(get_category(&conn, "Salary").unwrap().id);
        let err = insert_transaction(&conn, &new).unwrap_err();
        assert!(matches!(err, TallyError::KindMismatch { .. }));

        new.category_id = Some(get_category(&conn, "Groceries").unwrap().id);
        let id = insert_transaction(&conn, &new).unwrap();
        let err = update_transaction(
            &conn,
            id,
            &TransactionUpdate {
                kind: Some(EntryKind::Income),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Category 'Groceries' is an expense category, not income"
        );
    }

    #[test]
    fn test_is_duplicate() {
        let (_dir, conn) = test_db();
        let acct = setup(&conn);
        insert_transaction(&conn, &expense(acct, "2025-01-10", "Shoes", 80.0)).unwrap();
        assert!(is_duplicate(&conn, acct, date("2025-01-10"), 80.0, EntryKind::Expense, "Shoes").unwrap());
        assert!(!is_duplicate(&conn, acct, date("2025-01-10"), 80.0, EntryKind::Income, "Shoes").unwrap());
        assert!(!is_duplicate(&conn, acct, date("2025-01-11"), 80.0, EntryKind::Expense, "Shoes").unwrap());
    }
}
