use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{Category, EntryKind};
use crate::session::current_user_id;
use crate::validate;

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        color: row.get(3)?,
    })
}

pub fn create_category(
    conn: &Connection,
    name: &str,
    kind: EntryKind,
    color: Option<&str>,
) -> Result<Category> {
    let user_id = current_user_id(conn)?;
    let name = validate::name("Category", name)?;
    let color = validate::color(color)?;
    if find_category(conn, &name)?.is_some() {
        return Err(TallyError::duplicate("Category", name));
    }
    conn.execute(
        "INSERT INTO categories (user_id, name, kind, color) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, name, kind, color],
    )?;
    let id = conn.last_insert_rowid();
    debug!(category_id = id, %name, %kind, "created category");
    Ok(Category {
        id,
        name,
        kind,
        color,
    })
}

/// Income categories first, then expenses, alphabetical within each.
pub fn list_categories(conn: &Connection, kind: Option<EntryKind>) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, color FROM my_categories \
         WHERE ?1 IS NULL OR kind = ?1 \
         ORDER BY CASE kind WHEN 'income' THEN 0 ELSE 1 END, name COLLATE NAMECASE",
    )?;
    let categories = stmt
        .query_map([kind], row_to_category)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub fn find_category(conn: &Connection, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, kind, color FROM my_categories WHERE name = ?1 COLLATE NAMECASE",
            [name.trim()],
            row_to_category,
        )
        .optional()?;
    Ok(category)
}

pub fn get_category(conn: &Connection, name: &str) -> Result<Category> {
    find_category(conn, name)?.ok_or_else(|| TallyError::not_found("Category", name))
}

/// Rename and/or recolor. A category's kind is fixed once created.
pub fn update_category(
    conn: &Connection,
    name: &str,
    new_name: Option<&str>,
    color: Option<&str>,
) -> Result<Category> {
    let current = get_category(conn, name)?;
    let new_name = match new_name {
        Some(n) => {
            let n = validate::name("Category", n)?;
            if let Some(other) = find_category(conn, &n)? {
                if other.id != current.id {
                    return Err(TallyError::duplicate("Category", n));
                }
            }
            n
        }
        None => current.name.clone(),
    };
    let color = match color {
        Some(c) => validate::color(Some(c))?,
        None => current.color.clone(),
    };
    conn.execute(
        "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3",
        rusqlite::params![new_name, color, current.id],
    )?;
    Ok(Category {
        id: current.id,
        name: new_name,
        kind: current.kind,
        color,
    })
}

/// Delete a category. Its transactions become uncategorized and its budgets go with it.
/// Returns the number of transactions that lost their category.
pub fn delete_category(conn: &Connection, name: &str) -> Result<usize> {
    let category = get_category(conn, name)?;
    let used: i64 = conn.query_row(
        "SELECT COUNT(*) FROM my_transactions WHERE category_id = ?1",
        [category.id],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM categories WHERE id = ?1", [category.id])?;
    Ok(used as usize)
}

/// Look a category up by name, creating it with `kind` if missing.
/// An existing category of the other kind is an error rather than a silent reuse.
pub fn find_or_create_category(
    conn: &Connection,
    name: &str,
    kind: EntryKind,
) -> Result<(Category, bool)> {
    if let Some(existing) = find_category(conn, name)? {
        check_kind(&existing, kind)?;
        return Ok((existing, false));
    }
    let category = create_category(conn, name, kind, None)?;
    Ok((category, true))
}

pub fn check_kind(category: &Category, expected: EntryKind) -> Result<()> {
    if category.kind != expected {
        return Err(TallyError::KindMismatch {
            name: category.name.clone(),
            expected: expected.to_string(),
            actual: category.kind.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[test]
    fn test_seeded_categories_ordered_income_first() {
        let (_dir, conn) = test_db();
        let categories = list_categories(&conn, None).unwrap();
        let first_expense = categories.iter().position(|c| c.kind == EntryKind::Expense).unwrap();
        let last_income = categories.iter().rposition(|c| c.kind == EntryKind::Income).unwrap();
        assert!(last_income < first_expense);
        assert!(categories.iter().any(|c| c.name == "Groceries"));
    }

    #[test]
    fn test_filter_by_kind() {
        let (_dir, conn) = test_db();
        let income = list_categories(&conn, Some(EntryKind::Income)).unwrap();
        assert!(!income.is_empty());
        assert!(income.iter().all(|c| c.kind == EntryKind::Income));
    }

    #[test]
    fn test_create_and_duplicate() {
        let (_dir, conn) = test_db();
        let cat = create_category(&conn, "Pets", EntryKind::Expense, Some("#AABBCC")).unwrap();
        assert_eq!(cat.color.as_deref(), Some("#aabbcc"));
        let err = create_category(&conn, "PETS", EntryKind::Income, None).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_update_keeps_kind() {
        let (_dir, conn) = test_db();
        create_category(&conn, "Pets", EntryKind::Expense, None).unwrap();
        let updated = update_category(&conn, "pets", Some("Pet Care"), Some("#112233")).unwrap();
        assert_eq!(updated.name, "Pet Care");
        assert_eq!(updated.kind, EntryKind::Expense);
        assert_eq!(get_category(&conn, "Pet Care").unwrap().color.as_deref(), Some("#112233"));
    }

    #[test]
    fn test_delete_uncategorizes_transactions() {
        let (_dir, conn) = test_db();
        let cat = create_category(&conn, "Pets", EntryKind::Expense, None).unwrap();
        conn.execute(
            "INSERT INTO accounts (user_id, name, account_type) VALUES (1, 'Cash', 'cash')",
            [],
        )
        .unwrap();
        let acct = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO transactions (user_id, account_id, category_id, date, description, amount, kind) \
             VALUES (1, ?1, ?2, '2025-02-01', 'Vet', 80, 'expense')",
            [acct, cat.id],
        )
        .unwrap();

        assert_eq!(delete_category(&conn, "Pets").unwrap(), 1);
        let category_id: Option<i64> = conn
            .query_row("SELECT category_id FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert!(category_id.is_none());
    }

    #[test]
    fn test_find_or_create_kind_mismatch() {
        let (_dir, conn) = test_db();
        let err = find_or_create_category(&conn, "Salary", EntryKind::Expense).unwrap_err();
        assert!(matches!(err, TallyError::KindMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "Category 'Salary' is an income category, not expense"
        );

        let (cat, created) = find_or_create_category(&conn, "Side Gig", EntryKind::Income).unwrap();
        assert!(created);
        assert_eq!(cat.kind, EntryKind::Income);
    }

    #[test]
    fn test_delete_missing_category() {
        let (_dir, conn) = test_db();
        let err = delete_category(&conn, "Nope").unwrap_err();
        assert_eq!(err.to_string(), "Category not found: Nope");
    }
}
