use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{round_cents, Account, AccountType};
use crate::session::current_user_id;
use crate::validate;

const COLUMNS: &str = "id, name, account_type, currency, opening_balance, balance, is_archived";

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub opening_balance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub account_type: Option<AccountType>,
    pub currency: Option<String>,
    pub opening_balance: Option<f64>,
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type: row.get(2)?,
        currency: row.get(3)?,
        opening_balance: row.get(4)?,
        balance: row.get(5)?,
        is_archived: row.get(6)?,
    })
}

pub fn create_account(conn: &Connection, new: &NewAccount) -> Result<Account> {
    let user_id = current_user_id(conn)?;
    let name = validate::name("Account", &new.name)?;
    let currency = validate::currency(&new.currency)?;
    if find_account(conn, &name)?.is_some() {
        return Err(TallyError::duplicate("Account", name));
    }
    conn.execute(
        "INSERT INTO accounts (user_id, name, account_type, currency, opening_balance) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user_id,
            name,
            new.account_type,
            currency,
            round_cents(new.opening_balance)
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(account_id = id, %name, "created account");
    get_account_by_id(conn, id)
}

pub fn list_accounts(conn: &Connection, include_archived: bool) -> Result<Vec<Account>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM my_accounts WHERE is_archived = 0 OR ?1 ORDER BY name COLLATE NAMECASE"
    );
    let mut stmt = conn.prepare(&sql)?;
    let accounts = stmt
        .query_map([include_archived], row_to_account)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(accounts)
}

pub fn find_account(conn: &Connection, name: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {COLUMNS} FROM my_accounts WHERE name = ?1 COLLATE NAMECASE");
    let account = conn
        .query_row(&sql, [name.trim()], row_to_account)
        .optional()?;
    Ok(account)
}

pub fn get_account(conn: &Connection, name: &str) -> Result<Account> {
    find_account(conn, name)?.ok_or_else(|| TallyError::not_found("Account", name))
}

pub fn get_account_by_id(conn: &Connection, id: i64) -> Result<Account> {
    let sql = format!("SELECT {COLUMNS} FROM my_accounts WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_account)
        .optional()?
        .ok_or_else(|| TallyError::not_found("Account", format!("id {id}")))
}

pub fn update_account(conn: &Connection, name: &str, update: &AccountUpdate) -> Result<Account> {
    let current = get_account(conn, name)?;

    let new_name = match &update.name {
        Some(n) => {
            let n = validate::name("Account", n)?;
            if let Some(other) = find_account(conn, &n)? {
                if other.id != current.id {
                    return Err(TallyError::duplicate("Account", n));
                }
            }
            n
        }
        None => current.name.clone(),
    };
    let currency = match &update.currency {
        Some(c) => validate::currency(c)?,
        None => current.currency.clone(),
    };
    let account_type = update.account_type.unwrap_or(current.account_type);
    let opening_balance = update
        .opening_balance
        .map(round_cents)
        .unwrap_or(current.opening_balance);

    conn.execute(
        "UPDATE accounts SET name = ?1, account_type = ?2, currency = ?3, opening_balance = ?4 \
         WHERE id = ?5",
        rusqlite::params![new_name, account_type, currency, opening_balance, current.id],
    )?;
    get_account_by_id(conn, current.id)
}

pub fn set_archived(conn: &Connection, name: &str, archived: bool) -> Result<Account> {
    let account = get_account(conn, name)?;
    conn.execute(
        "UPDATE accounts SET is_archived = ?1 WHERE id = ?2",
        rusqlite::params![archived, account.id],
    )?;
    get_account_by_id(conn, account.id)
}

/// Hide an account from lists and net worth. Its history is kept.
pub fn archive_account(conn: &Connection, name: &str) -> Result<Account> {
    set_archived(conn, name, true)
}

/// Delete an account together with all of its transactions.
pub fn delete_account(conn: &Connection, name: &str) -> Result<usize> {
    let account = get_account(conn, name)?;
    let txn_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM my_transactions WHERE account_id = ?1",
        [account.id],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM accounts WHERE id = ?1", [account.id])?;
    debug!(account_id = account.id, txn_count, "deleted account");
    Ok(txn_count as usize)
}

/// Look an account up by name, creating it with the given defaults if missing.
pub fn find_or_create_account(
    conn: &Connection,
    name: &str,
    account_type: AccountType,
    currency: &str,
) -> Result<(Account, bool)> {
    if let Some(existing) = find_account(conn, name)? {
        return Ok((existing, false));
    }
    let account = create_account(
        conn,
        &NewAccount {
            name: name.to_string(),
            account_type,
            currency: currency.to_string(),
            opening_balance: 0.0,
        },
    )?;
    Ok((account, true))
}
