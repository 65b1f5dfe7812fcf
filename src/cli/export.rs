use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use crate::cli::{open_session, parse_date_opt};
use crate::error::Result;
use crate::exporter::export_transactions;
use crate::transactions::TransactionFilter;

pub fn run(
    output: Option<String>,
    account: Option<String>,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<()> {
    let s = open_session()?;
    let filter = TransactionFilter {
        account,
        from: parse_date_opt(from_date)?,
        to: parse_date_opt(to_date)?,
        ..Default::default()
    };

    match output {
        Some(p) => {
            let path = PathBuf::from(p);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let rows = export_transactions(&s.conn, &filter, BufWriter::new(File::create(&path)?))?;
            eprintln!("Wrote {rows} transactions to {}", path.display());
        }
        None => {
            export_transactions(&s.conn, &filter, std::io::stdout().lock())?;
        }
    }
    Ok(())
}
