use std::cmp::Ordering;
use std::path::Path;

use rusqlite::Connection;

use crate::error::{Result, TallyError};
use crate::validate;

pub const DB_FILE: &str = "tally.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    account_type TEXT NOT NULL CHECK (account_type IN ('checking', 'savings', 'credit_card', 'cash', 'investment', 'loan')),
    currency TEXT NOT NULL DEFAULT 'USD',
    opening_balance REAL NOT NULL DEFAULT 0,
    balance REAL NOT NULL DEFAULT 0,
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, name COLLATE NAMECASE),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
    color TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, name COLLATE NAMECASE),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    color TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, name COLLATE NAMECASE),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    amount REAL NOT NULL CHECK (amount > 0),
    period TEXT NOT NULL CHECK (period IN ('weekly', 'monthly', 'yearly')),
    start_date TEXT NOT NULL,
    end_date TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, category_id, period),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    checksum TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    date_range_start TEXT,
    date_range_end TEXT,
    imported_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, checksum),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    category_id INTEGER,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL CHECK (amount > 0),
    kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
    notes TEXT,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
    FOREIGN KEY (import_id) REFERENCES imports(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(account_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);

CREATE TABLE IF NOT EXISTS transaction_tags (
    transaction_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (transaction_id, tag_id),
    FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    table_name TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('INSERT', 'UPDATE', 'DELETE')),
    old_data TEXT,
    new_data TEXT,
    changed_at TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id, id);
";

/// Balance maintenance. Application code never writes `accounts.balance`.
const BALANCE_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS trg_accounts_opening_balance
AFTER INSERT ON accounts
BEGIN
    UPDATE accounts SET balance = ROUND(NEW.opening_balance, 2) WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_accounts_opening_balance_change
AFTER UPDATE OF opening_balance ON accounts
BEGIN
    UPDATE accounts
    SET balance = ROUND(balance + NEW.opening_balance - OLD.opening_balance, 2)
    WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_transactions_balance_insert
AFTER INSERT ON transactions
BEGIN
    UPDATE accounts
    SET balance = ROUND(balance + CASE NEW.kind WHEN 'income' THEN NEW.amount ELSE -NEW.amount END, 2)
    WHERE id = NEW.account_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_transactions_balance_delete
AFTER DELETE ON transactions
BEGIN
    UPDATE accounts
    SET balance = ROUND(balance - CASE OLD.kind WHEN 'income' THEN OLD.amount ELSE -OLD.amount END, 2)
    WHERE id = OLD.account_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_transactions_balance_update
AFTER UPDATE OF account_id, amount, kind ON transactions
BEGIN
    UPDATE accounts
    SET balance = ROUND(balance - CASE OLD.kind WHEN 'income' THEN OLD.amount ELSE -OLD.amount END, 2)
    WHERE id = OLD.account_id;
    UPDATE accounts
    SET balance = ROUND(balance + CASE NEW.kind WHEN 'income' THEN NEW.amount ELSE -NEW.amount END, 2)
    WHERE id = NEW.account_id;
END;
";

/// Cross-row ownership rules that hold regardless of which user is signed in.
const INTEGRITY_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS trg_transactions_owner_insert
BEFORE INSERT ON transactions
BEGIN
    SELECT RAISE(ABORT, 'account belongs to another user')
    WHERE (SELECT user_id FROM accounts WHERE id = NEW.account_id) IS NOT NEW.user_id;
    SELECT RAISE(ABORT, 'category belongs to another user')
    WHERE NEW.category_id IS NOT NULL
      AND (SELECT user_id FROM categories WHERE id = NEW.category_id) IS NOT NEW.user_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_transactions_owner_update
BEFORE UPDATE OF account_id, category_id, user_id ON transactions
BEGIN
    SELECT RAISE(ABORT, 'account belongs to another user')
    WHERE (SELECT user_id FROM accounts WHERE id = NEW.account_id) IS NOT NEW.user_id;
    SELECT RAISE(ABORT, 'category belongs to another user')
    WHERE NEW.category_id IS NOT NULL
      AND (SELECT user_id FROM categories WHERE id = NEW.category_id) IS NOT NEW.user_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_budgets_category_insert
BEFORE INSERT ON budgets
BEGIN
    SELECT RAISE(ABORT, 'category belongs to another user')
    WHERE (SELECT user_id FROM categories WHERE id = NEW.category_id) IS NOT NEW.user_id;
    SELECT RAISE(ABORT, 'budgets can only track expense categories')
    WHERE (SELECT kind FROM categories WHERE id = NEW.category_id) IS NOT 'expense';
END;

CREATE TRIGGER IF NOT EXISTS trg_budgets_category_update
BEFORE UPDATE OF category_id, user_id ON budgets
BEGIN
    SELECT RAISE(ABORT, 'category belongs to another user')
    WHERE (SELECT user_id FROM categories WHERE id = NEW.category_id) IS NOT NEW.user_id;
    SELECT RAISE(ABORT, 'budgets can only track expense categories')
    WHERE (SELECT kind FROM categories WHERE id = NEW.category_id) IS NOT 'expense';
END;

CREATE TRIGGER IF NOT EXISTS trg_transaction_tags_owner
BEFORE INSERT ON transaction_tags
BEGIN
    SELECT RAISE(ABORT, 'tag belongs to another user')
    WHERE (SELECT user_id FROM tags WHERE id = NEW.tag_id)
       IS NOT (SELECT user_id FROM transactions WHERE id = NEW.transaction_id);
END;

CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit log is append-only');
END;
";

/// (table, audited columns, columns whose change counts as an UPDATE)
const AUDITED_TABLES: &[(&str, &[&str], &[&str])] = &[
    (
        "accounts",
        &["name", "account_type", "currency", "opening_balance", "is_archived"],
        &["name", "account_type", "currency", "opening_balance", "is_archived"],
    ),
    ("categories", &["name", "kind", "color"], &["name", "kind", "color"]),
    ("tags", &["name", "color"], &["name", "color"]),
    (
        "budgets",
        &["category_id", "amount", "period", "start_date", "end_date"],
        &["category_id", "amount", "period", "start_date", "end_date"],
    ),
    (
        "transactions",
        &["account_id", "category_id", "date", "description", "amount", "kind", "notes"],
        &["account_id", "category_id", "date", "description", "amount", "kind", "notes"],
    ),
];

fn json_snapshot(row: &str, columns: &[&str]) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .map(|c| format!("'{c}', {row}.{c}"))
        .collect();
    format!("json_object({})", pairs.join(", "))
}

pub fn audited_tables() -> impl Iterator<Item = &'static str> {
    AUDITED_TABLES.iter().map(|(table, _, _)| *table)
}

/// Build the AFTER INSERT/UPDATE/DELETE audit triggers for every audited table.
pub fn audit_triggers() -> String {
    let mut sql = String::new();
    for (table, columns, watched) in AUDITED_TABLES {
        let old = json_snapshot("OLD", columns);
        let new = json_snapshot("NEW", columns);
        sql.push_str(&format!(
            "CREATE TRIGGER IF NOT EXISTS trg_{table}_audit_insert AFTER INSERT ON {table}
BEGIN
    INSERT INTO audit_log (user_id, table_name, record_id, action, new_data)
    VALUES (NEW.user_id, '{table}', NEW.id, 'INSERT', {new});
END;
CREATE TRIGGER IF NOT EXISTS trg_{table}_audit_update AFTER UPDATE OF {watched} ON {table}
BEGIN
    INSERT INTO audit_log (user_id, table_name, record_id, action, old_data, new_data)
    VALUES (NEW.user_id, '{table}', NEW.id, 'UPDATE', {old}, {new});
END;
CREATE TRIGGER IF NOT EXISTS trg_{table}_audit_delete AFTER DELETE ON {table}
BEGIN
    INSERT INTO audit_log (user_id, table_name, record_id, action, old_data)
    VALUES (OLD.user_id, '{table}', OLD.id, 'DELETE', {old});
END;
",
            watched = watched.join(", "),
        ));
    }
    sql
}

/// Case-insensitive collation for account, category and tag names. Unlike
/// `NOCASE` it folds non-ASCII letters too.
pub const NAME_COLLATION: &str = "NAMECASE";

fn compare_names(a: &str, b: &str) -> Ordering {
    validate::name_key(a).cmp(&validate::name_key(b))
}

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.create_collation(NAME_COLLATION, compare_names)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Open an existing database; refuses to create a fresh empty file.
pub fn open_existing(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(TallyError::NotInitialized(db_path.display().to_string()));
    }
    let conn = get_connection(db_path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute_batch(BALANCE_TRIGGERS)?;
    conn.execute_batch(INTEGRITY_TRIGGERS)?;
    conn.execute_batch(&audit_triggers())?;
    Ok(())
}

/// Fresh database with one signed-in user named `alice`.
#[cfg(test)]
pub fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    let user = crate::users::create_user(&conn, "alice", Some("Alice")).unwrap();
    crate::session::begin(&conn, user.id).unwrap();
    (dir, conn)
}
