use std::io::Write;

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::transactions::{list_transactions, TransactionFilter};

pub const EXPORT_HEADER: [&str; 8] = [
    "Date",
    "Description",
    "Amount",
    "Type",
    "Account",
    "Category",
    "Tags",
    "Notes",
];

/// Write the filtered transactions as CSV in the layout the importer reads back.
/// Returns the number of rows written.
pub fn export_transactions<W: Write>(conn: &Connection, filter: &TransactionFilter, out: W) -> Result<usize> {
    let txns = list_transactions(conn, filter)?;
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(EXPORT_HEADER)?;
    for t in &txns {
        wtr.write_record([
            t.date.format("%Y-%m-%d").to_string(),
            t.description.clone(),
            format!("{:.2}", t.amount),
            t.kind.to_string(),
            t.account_name.clone(),
            t.category_name.clone().unwrap_or_default(),
            t.tags.join(";"),
            t.notes.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    debug!(rows = txns.len(), "exported transactions");
    Ok(txns.len())
}
