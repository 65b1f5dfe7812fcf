use std::path::Path;

use colored::Colorize;

use crate::cli::open_session;
use crate::error::{Result, TallyError};
use crate::importer::{import_file, ImportOptions, ImportReport};

pub struct ImportArgs {
    pub account: Option<String>,
    pub no_create: bool,
    pub dry_run: bool,
    pub delimiter: char,
    pub json: bool,
}

fn print_created(label: &str, names: &[String], dry_run: bool) {
    if names.is_empty() {
        return;
    }
    let verb = if dry_run { "Would create" } else { "Created" };
    println!("  {verb} {label}: {}", names.join(", "));
}

fn print_report(report: &ImportReport) {
    if report.duplicate_file {
        println!("{} {} was already imported; nothing to do.", "Skipped:".yellow(), report.filename);
        return;
    }
    if !report.errors.is_empty() {
        println!(
            "{} {} of {} rows have problems; nothing was imported.",
            "Rejected:".red().bold(),
            report.errors.iter().map(|e| e.line).collect::<std::collections::BTreeSet<_>>().len(),
            report.total_rows
        );
        for err in &report.errors {
            println!("  {err}");
        }
        return;
    }

    let header = if report.dry_run { "Dry run:".cyan() } else { "Imported:".green() };
    println!("{header} {}", report.filename);
    println!("  Rows:       {}", report.total_rows);
    println!("  Imported:   {}", report.imported);
    println!("  Duplicates: {}", report.skipped_duplicates);
    print_created("accounts", &report.created_accounts, report.dry_run);
    print_created("categories", &report.created_categories, report.dry_run);
    print_created("tags", &report.created_tags, report.dry_run);
    if !report.ignored_columns.is_empty() {
        println!("  Ignored columns: {}", report.ignored_columns.join(", "));
    }
}

pub fn run(file: &str, args: ImportArgs) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        return Err(TallyError::not_found("File", file));
    }
    if !args.delimiter.is_ascii() {
        return Err(TallyError::Validation(format!(
            "Delimiter must be a single ASCII character, got '{}'",
            args.delimiter
        )));
    }

    let s = open_session()?;
    let opts = ImportOptions {
        default_account: args.account,
        create_missing: !args.no_create,
        dry_run: args.dry_run,
        delimiter: args.delimiter as u8,
        currency: s.settings.default_currency.clone(),
        ..Default::default()
    };
    let report = import_file(&s.conn, path, &opts)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if report.is_success() || report.duplicate_file {
        return Ok(());
    }
    Err(TallyError::Validation(format!(
        "import rejected with {} error(s)",
        report.errors.len()
    )))
}
