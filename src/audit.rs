use rusqlite::types::ToSql;
use rusqlite::Connection;

use crate::db::audited_tables;
use crate::error::{Result, TallyError};
use crate::models::AuditEntry;

pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub table: Option<String>,
    pub record_id: Option<i64>,
    pub limit: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            table: None,
            record_id: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn parse_snapshot(raw: Option<String>) -> rusqlite::Result<Option<serde_json::Value>> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    })
    .transpose()
}

/// The session user's audit trail, newest first.
pub fn list_audit(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(table) = &filter.table {
        let table = table.trim().to_lowercase();
        if !audited_tables().any(|t| t == table) {
            let known: Vec<&str> = audited_tables().collect();
            return Err(TallyError::Validation(format!(
                "Unknown audit table '{table}' (expected one of: {})",
                known.join(", ")
            )));
        }
        clauses.push("table_name = ?");
        params.push(Box::new(table));
    }
    if let Some(record_id) = filter.record_id {
        clauses.push("record_id = ?");
        params.push(Box::new(record_id));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, table_name, record_id, action, old_data, new_data, changed_at \
         FROM my_audit_log {where_sql} ORDER BY id DESC LIMIT {}",
        filter.limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                table_name: row.get(1)?,
                record_id: row.get(2)?,
                action: row.get(3)?,
                old_data: parse_snapshot(row.get(4)?)?,
                new_data: parse_snapshot(row.get(5)?)?,
                changed_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_account, update_account, AccountUpdate, NewAccount};
    use crate::models::{AccountType, AuditAction};
    use crate::db::test_db;

    fn checking(conn: &Connection) -> i64 {
        create_account(
            conn,
            &NewAccount {
                name: "Checking".into(),
                account_type: AccountType::Checking,
                currency: "USD".into(),
                opening_balance: 100.0,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_account_history_newest_first() {
        let (_dir, conn) = test_db();
        let id = checking(&conn);
        update_account(
            &conn,
            "Checking",
            &AccountUpdate {
                name: Some("Main".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let entries = list_audit(
            &conn,
            &AuditFilter {
                table: Some("Accounts".into()),
                record_id: Some(id),
                ..Default::default()
            },
        )
        .unwrap();
        let actions: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Update, AuditAction::Insert]);
        assert_eq!(entries[0].old_data.as_ref().unwrap()["name"], "Checking");
        assert_eq!(entries[0].new_data.as_ref().unwrap()["name"], "Main");
        assert!(entries[1].old_data.is_none());
        assert_eq!(entries[1].new_data.as_ref().unwrap()["opening_balance"], 100.0);
    }

    #[test]
    fn test_limit_and_unknown_table() {
        let (_dir, conn) = test_db();
        // seeding default categories already produced entries
        let entries = list_audit(
            &conn,
            &AuditFilter {
                limit: 3,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].id > entries[1].id);

        let err = list_audit(
            &conn,
            &AuditFilter {
                table: Some("users".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown audit table 'users'"));
    }

    #[test]
    fn test_other_users_entries_are_hidden() {
        let (dir, conn) = test_db();
        checking(&conn);

        let other = crate::db::get_connection(&dir.path().join("test.db")).unwrap();
        let bob = crate::users::create_user(&other, "bob", None).unwrap();
        crate::session::begin(&other, bob.id).unwrap();
        let entries = list_audit(
            &other,
            &AuditFilter {
                table: Some("accounts".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(entries.is_empty());
    }
}
