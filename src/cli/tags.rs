use comfy_table::{Cell, Table};

use crate::cli::open_session;
use crate::error::Result;
use crate::tags::{create_tag, delete_tag, list_tags};

pub fn add(name: &str, color: Option<&str>) -> Result<()> {
    let s = open_session()?;
    let tag = create_tag(&s.conn, name, color)?;
    println!("Added tag: {}", tag.name);
    Ok(())
}

pub fn list() -> Result<()> {
    let s = open_session()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Color", "Transactions"]);
    for usage in list_tags(&s.conn)? {
        table.add_row(vec![
            Cell::new(usage.tag.id),
            Cell::new(usage.tag.name),
            Cell::new(usage.tag.color.unwrap_or_default()),
            Cell::new(usage.transaction_count),
        ]);
    }
    println!("Tags\n{table}");
    Ok(())
}

pub fn delete(name: &str) -> Result<()> {
    let s = open_session()?;
    delete_tag(&s.conn, name)?;
    println!("Deleted tag: {name}");
    Ok(())
}
