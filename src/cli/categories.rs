use comfy_table::{Cell, Table};

use crate::categories::{create_category, delete_category, list_categories, update_category};
use crate::cli::open_session;
use crate::error::Result;
use crate::models::EntryKind;

pub fn add(name: &str, kind: &str, color: Option<&str>) -> Result<()> {
    let s = open_session()?;
    let category = create_category(&s.conn, name, kind.parse()?, color)?;
    println!("Added {} category: {}", category.kind, category.name);
    Ok(())
}

pub fn list(kind: Option<&str>) -> Result<()> {
    let s = open_session()?;
    let kind = kind.map(str::parse::<EntryKind>).transpose()?;
    let categories = list_categories(&s.conn, kind)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Kind", "Color"]);
    for c in categories {
        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(c.name),
            Cell::new(c.kind),
            Cell::new(c.color.unwrap_or_default()),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn edit(name: &str, new_name: Option<&str>, color: Option<&str>) -> Result<()> {
    let s = open_session()?;
    let category = update_category(&s.conn, name, new_name, color)?;
    println!("Updated category: {}", category.name);
    Ok(())
}

pub fn delete(name: &str) -> Result<()> {
    let s = open_session()?;
    let uncategorized = delete_category(&s.conn, name)?;
    println!("Deleted category: {name} ({uncategorized} transactions now uncategorized)");
    Ok(())
}
