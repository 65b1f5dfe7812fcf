use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::audit::{list_audit, AuditFilter};
use crate::cli::open_session;
use crate::error::Result;
use crate::models::AuditAction;

fn snapshot(value: &Option<serde_json::Value>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

pub fn run(table: Option<String>, record_id: Option<i64>, limit: usize, json: bool) -> Result<()> {
    let s = open_session()?;
    let entries = list_audit(
        &s.conn,
        &AuditFilter {
            table,
            record_id,
            limit,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    let mut out = Table::new();
    out.set_header(vec!["ID", "When", "Table", "Record", "Action", "Before", "After"]);
    for e in &entries {
        let action = match e.action {
            AuditAction::Insert => e.action.as_str().green(),
            AuditAction::Update => e.action.as_str().yellow(),
            AuditAction::Delete => e.action.as_str().red(),
        };
        out.add_row(vec![
            Cell::new(e.id),
            Cell::new(&e.changed_at),
            Cell::new(&e.table_name),
            Cell::new(e.record_id),
            Cell::new(action),
            Cell::new(snapshot(&e.old_data)),
            Cell::new(snapshot(&e.new_data)),
        ]);
    }
    println!("Audit log\n{out}");
    Ok(())
}
