//! Row-level security for a single connection.
//!
//! A session pins one user to the connection in `temp.session`. Reads go
//! through the `my_*` temp views, which only ever show that user's rows, and
//! temp triggers on the owned tables abort any write that touches a row owned
//! by someone else. Everything lives in the `temp` schema, so it disappears
//! with the connection and never reaches the database file.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, TallyError};

/// Tables that carry a `user_id` column of their own.
const OWNED_TABLES: &[&str] = &[
    "accounts",
    "categories",
    "tags",
    "budgets",
    "transactions",
    "imports",
];

fn policy_sql() -> String {
    let mut sql = String::new();
    for table in OWNED_TABLES {
        sql.push_str(&format!(
            "CREATE TEMP VIEW IF NOT EXISTS my_{table} AS
    SELECT * FROM main.{table} WHERE user_id = (SELECT user_id FROM temp.session);
CREATE TEMP TRIGGER IF NOT EXISTS rls_{table}_insert BEFORE INSERT ON {table}
WHEN NEW.user_id IS NOT (SELECT user_id FROM session)
BEGIN
    SELECT RAISE(ABORT, 'row-level security: {table} row belongs to another user');
END;
CREATE TEMP TRIGGER IF NOT EXISTS rls_{table}_update BEFORE UPDATE ON {table}
WHEN OLD.user_id IS NOT (SELECT user_id FROM session)
  OR NEW.user_id IS NOT (SELECT user_id FROM session)
BEGIN
    SELECT RAISE(ABORT, 'row-level security: {table} row belongs to another user');
END;
CREATE TEMP TRIGGER IF NOT EXISTS rls_{table}_delete BEFORE DELETE ON {table}
WHEN OLD.user_id IS NOT (SELECT user_id FROM session)
BEGIN
    SELECT RAISE(ABORT, 'row-level security: {table} row belongs to another user');
END;
"
        ));
    }

    sql.push_str(
        "CREATE TEMP VIEW IF NOT EXISTS my_transaction_tags AS
    SELECT tt.transaction_id, tt.tag_id
    FROM main.transaction_tags tt
    JOIN main.transactions t ON t.id = tt.transaction_id
    WHERE t.user_id = (SELECT user_id FROM temp.session);
CREATE TEMP VIEW IF NOT EXISTS my_audit_log AS
    SELECT * FROM main.audit_log WHERE user_id = (SELECT user_id FROM temp.session);
CREATE TEMP TRIGGER IF NOT EXISTS rls_transaction_tags_insert BEFORE INSERT ON transaction_tags
WHEN (SELECT user_id FROM transactions WHERE id = NEW.transaction_id)
     IS NOT (SELECT user_id FROM session)
BEGIN
    SELECT RAISE(ABORT, 'row-level security: transaction belongs to another user');
END;
CREATE TEMP TRIGGER IF NOT EXISTS rls_transaction_tags_delete BEFORE DELETE ON transaction_tags
WHEN COALESCE(
        (SELECT user_id FROM tags WHERE id = OLD.tag_id),
        (SELECT user_id FROM transactions WHERE id = OLD.transaction_id))
     IS NOT (SELECT user_id FROM session)
BEGIN
    SELECT RAISE(ABORT, 'row-level security: transaction belongs to another user');
END;
",
    );
    sql
}

/// Pin `user_id` to this connection. Calling it again switches user.
pub fn begin(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute_batch("CREATE TEMP TABLE IF NOT EXISTS session (user_id INTEGER NOT NULL);")?;
    conn.execute("DELETE FROM temp.session", [])?;
    conn.execute("INSERT INTO temp.session (user_id) VALUES (?1)", [user_id])?;
    conn.execute_batch(&policy_sql())?;
    debug!(user_id, "session started");
    Ok(())
}

pub fn current_user_id(conn: &Connection) -> Result<i64> {
    let has_session: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_temp_master WHERE type = 'table' AND name = 'session')",
        [],
        |row| row.get(0),
    )?;
    if !has_session {
        return Err(TallyError::NoSession);
    }
    conn.query_row("SELECT user_id FROM temp.session LIMIT 1", [], |row| row.get(0))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => TallyError::NoSession,
            other => TallyError::Db(other),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::users::create_user;

    fn two_user_db() -> (tempfile::TempDir, Connection, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        let alice = create_user(&conn, "alice", None).unwrap().id;
        let bob = create_user(&conn, "bob", None).unwrap().id;
        (dir, conn, alice, bob)
    }

    fn add_account(conn: &Connection, user_id: i64, name: &str) {
        conn.execute(
            "INSERT INTO accounts (user_id, name, account_type) VALUES (?1, ?2, 'checking')",
            rusqlite::params![user_id, name],
        )
        .unwrap();
    }

    fn visible_accounts(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM my_accounts ORDER BY name")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_no_session_is_reported() {
        let (_dir, conn, _, _) = two_user_db();
        assert!(matches!(current_user_id(&conn), Err(TallyError::NoSession)));
    }

    #[test]
    fn test_views_only_show_own_rows() {
        let (_dir, conn, alice, bob) = two_user_db();
        add_account(&conn, alice, "Alice Checking");
        add_account(&conn, bob, "Bob Checking");

        begin(&conn, alice).unwrap();
        assert_eq!(current_user_id(&conn).unwrap(), alice);
        assert_eq!(visible_accounts(&conn), vec!["Alice Checking"]);

        begin(&conn, bob).unwrap();
        assert_eq!(current_user_id(&conn).unwrap(), bob);
        assert_eq!(visible_accounts(&conn), vec!["Bob Checking"]);
    }

    #[test]
    fn test_writes_to_other_users_rows_abort() {
        let (_dir, conn, alice, bob) = two_user_db();
        add_account(&conn, bob, "Bob Checking");
        begin(&conn, alice).unwrap();

        let err = conn
            .execute(
                "INSERT INTO accounts (user_id, name, account_type) VALUES (?1, 'Sneaky', 'cash')",
                [bob],
            )
            .unwrap_err();
        assert!(err.to_string().contains("row-level security"));

        let err = conn
            .execute("UPDATE accounts SET name = 'Mine now' WHERE user_id = ?1", [bob])
            .unwrap_err();
        assert!(err.to_string().contains("row-level security"));

        let err = conn
            .execute("DELETE FROM accounts WHERE user_id = ?1", [bob])
            .unwrap_err();
        assert!(err.to_string().contains("row-level security"));
    }

    #[test]
    fn test_session_does_not_persist_in_file() {
        let (dir, conn, alice, _) = two_user_db();
        begin(&conn, alice).unwrap();
        drop(conn);
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        assert!(matches!(current_user_id(&conn), Err(TallyError::NoSession)));
    }
}
