use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, TallyError};
use crate::models::User;
use crate::validate;

// (name, kind, color)
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    // Income
    ("Salary", "income", "#2e7d32"),
    ("Interest", "income", "#558b2f"),
    ("Gifts Received", "income", "#9e9d24"),
    ("Other Income", "income", "#827717"),
    // Expenses
    ("Groceries", "expense", "#c62828"),
    ("Rent & Mortgage", "expense", "#ad1457"),
    ("Utilities", "expense", "#6a1b9a"),
    ("Transport", "expense", "#4527a0"),
    ("Dining Out", "expense", "#283593"),
    ("Entertainment", "expense", "#1565c0"),
    ("Health", "expense", "#0277bd"),
    ("Shopping", "expense", "#00838f"),
    ("Travel", "expense", "#00695c"),
    ("Subscriptions", "expense", "#ef6c00"),
    ("Other Expenses", "expense", "#4e342e"),
];

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
    })
}

/// Register a user and give them a starter set of categories.
pub fn create_user(conn: &Connection, username: &str, display_name: Option<&str>) -> Result<User> {
    let username = validate::username(username)?;
    if find_user(conn, &username)?.is_some() {
        return Err(TallyError::duplicate("User", username));
    }
    let display_name = display_name.map(str::trim).filter(|s| !s.is_empty());

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO users (username, display_name) VALUES (?1, ?2)",
        rusqlite::params![username, display_name],
    )?;
    let id = tx.last_insert_rowid();
    for (name, kind, color) in DEFAULT_CATEGORIES {
        tx.execute(
            "INSERT INTO categories (user_id, name, kind, color) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, kind, color],
        )?;
    }
    tx.commit()?;

    info!(user_id = id, %username, "created user");
    Ok(User {
        id,
        username,
        display_name: display_name.map(str::to_string),
    })
}

pub fn find_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, display_name FROM users WHERE username = ?1 COLLATE NOCASE",
            [username.trim()],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, username: &str) -> Result<User> {
    find_user(conn, username)?.ok_or_else(|| TallyError::UnknownUser(username.to_string()))
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, username, display_name FROM users ORDER BY username")?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_conn() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_create_user_seeds_categories() {
        let (_dir, conn) = test_conn();
        let user = create_user(&conn, "Alice", Some("Alice Liddell")).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.display_name.as_deref(), Some("Alice Liddell"));

        let (income, expense): (i64, i64) = conn
            .query_row(
                "SELECT SUM(kind = 'income'), SUM(kind = 'expense') FROM categories WHERE user_id = ?1",
                [user.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(income, 4);
        assert_eq!(expense, 11);
    }

    #[test]
    fn test_duplicate_username_rejected_case_insensitively() {
        let (_dir, conn) = test_conn();
        create_user(&conn, "alice", None).unwrap();
        let err = create_user(&conn, "ALICE", None).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_get_unknown_user() {
        let (_dir, conn) = test_conn();
        let err = get_user(&conn, "nobody").unwrap_err();
        assert!(matches!(err, TallyError::UnknownUser(_)));
    }

    #[test]
    fn test_list_users_sorted() {
        let (_dir, conn) = test_conn();
        create_user(&conn, "zed", None).unwrap();
        create_user(&conn, "amy", None).unwrap();
        let names: Vec<String> = list_users(&conn).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }
}
