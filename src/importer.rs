//! CSV import: normalize headers, validate and plan every row, then write the
//! whole file in one database transaction or not at all.

mod headers;
mod parse;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::accounts;
use crate::categories;
use crate::error::{Result, TallyError};
use crate::models::{AccountType, EntryKind};
use crate::session::current_user_id;
use crate::tags;
use crate::transactions::{self, NewTransaction};
use crate::validate;

pub use headers::{ColumnMap, Field};
pub use parse::{parse_amount, parse_date, parse_kind};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Used for rows whose account cell is blank, or when there is no account column.
    pub default_account: Option<String>,
    /// Create accounts, categories and tags the file mentions but the user lacks.
    pub create_missing: bool,
    pub dry_run: bool,
    pub delimiter: u8,
    /// Currency and type given to accounts the import creates.
    pub currency: String,
    pub account_type: AccountType,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_account: None,
            create_missing: true,
            dry_run: false,
            delimiter: b',',
            currency: "USD".to_string(),
            account_type: AccountType::Checking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based line in the file, header included.
    pub line: u64,
    pub field: Option<&'static str>,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "line {}: {}: {}", self.line, field, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

/// Outcome of an import. On a dry run `imported` and the `created_*` lists
/// describe what would have been written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub filename: String,
    pub total_rows: usize,
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub created_accounts: Vec<String>,
    pub created_categories: Vec<String>,
    pub created_tags: Vec<String>,
    pub ignored_columns: Vec<String>,
    pub errors: Vec<RowError>,
    pub duplicate_file: bool,
    pub dry_run: bool,
    pub import_id: Option<i64>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.duplicate_file
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn already_imported(conn: &Connection, checksum: &str) -> Result<bool> {
    let seen = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM my_imports WHERE checksum = ?1)",
        [checksum],
        |row| row.get(0),
    )?;
    Ok(seen)
}

/// Storage failures abort the import; anything else is a problem with the row.
fn row_problem(err: TallyError) -> Result<String> {
    match err {
        TallyError::Db(_) | TallyError::Io(_) | TallyError::NoSession => Err(err),
        other => Ok(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// An entity that already exists, or the index of one the import will create.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EntityRef {
    Existing(i64),
    Planned(usize),
}

impl EntityRef {
    fn resolve(self, created: &[i64]) -> i64 {
        match self {
            EntityRef::Existing(id) => id,
            EntityRef::Planned(idx) => created[idx],
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedRow {
    date: NaiveDate,
    description: String,
    amount: f64,
    kind: EntryKind,
    notes: Option<String>,
    account: EntityRef,
    category: Option<EntityRef>,
    tags: Vec<EntityRef>,
}

struct Planner<'a> {
    conn: &'a Connection,
    opts: &'a ImportOptions,
    accounts: HashMap<String, EntityRef>,
    categories: HashMap<String, (EntityRef, EntryKind, String)>,
    tags: HashMap<String, EntityRef>,
    new_accounts: Vec<String>,
    new_categories: Vec<(String, EntryKind)>,
    new_tags: Vec<String>,
}

impl<'a> Planner<'a> {
    fn new(conn: &'a Connection, opts: &'a ImportOptions) -> Self {
        Self {
            conn,
            opts,
            accounts: HashMap::new(),
            categories: HashMap::new(),
            tags: HashMap::new(),
            new_accounts: Vec::new(),
            new_categories: Vec::new(),
            new_tags: Vec::new(),
        }
    }

    fn account(&mut self, name: &str) -> Result<EntityRef> {
        let key = validate::name_key(name);
        if let Some(found) = self.accounts.get(&key) {
            return Ok(*found);
        }
        let found = match accounts::find_account(self.conn, name)? {
            Some(a) if a.is_archived => {
                return Err(TallyError::Validation(format!("Account '{}' is archived", a.name)))
            }
            Some(a) => EntityRef::Existing(a.id),
            None if self.opts.create_missing => {
                self.new_accounts.push(validate::name("Account", name)?);
                EntityRef::Planned(self.new_accounts.len() - 1)
            }
            None => return Err(TallyError::not_found("Account", name.trim())),
        };
        self.accounts.insert(key, found);
        Ok(found)
    }

    fn category(&mut self, name: &str, kind: EntryKind) -> Result<EntityRef> {
        let key = validate::name_key(name);
        if !self.categories.contains_key(&key) {
            let entry = match categories::find_category(self.conn, name)? {
                Some(c) => (EntityRef::Existing(c.id), c.kind, c.name),
                None if self.opts.create_missing => {
                    let name = validate::name("Category", name)?;
                    self.new_categories.push((name.clone(), kind));
                    (EntityRef::Planned(self.new_categories.len() - 1), kind, name)
                }
                None => return Err(TallyError::not_found("Category", name.trim())),
            };
            self.categories.insert(key.clone(), entry);
        }
        let (found, category_kind, display) = &self.categories[&key];
        if *category_kind != kind {
            return Err(TallyError::KindMismatch {
                name: display.clone(),
                expected: kind.to_string(),
                actual: category_kind.to_string(),
            });
        }
        Ok(*found)
    }

    fn tag(&mut self, name: &str) -> Result<EntityRef> {
        let key = validate::name_key(name);
        if let Some(found) = self.tags.get(&key) {
            return Ok(*found);
        }
        let found = match tags::find_tag(self.conn, name)? {
            Some(t) => EntityRef::Existing(t.id),
            None if self.opts.create_missing => {
                self.new_tags.push(validate::name("Tag", name)?);
                EntityRef::Planned(self.new_tags.len() - 1)
            }
            None => return Err(TallyError::not_found("Tag", name.trim())),
        };
        self.tags.insert(key, found);
        Ok(found)
    }

    /// Validate one record. Problems are appended to `errors` and the row is dropped.
    fn plan_row(
        &mut self,
        line: u64,
        map: &ColumnMap,
        record: &csv::StringRecord,
        errors: &mut Vec<RowError>,
    ) -> Result<Option<PlannedRow>> {
        let before = errors.len();
        let mut fail = |field: Field, message: String| {
            errors.push(RowError {
                line,
                field: Some(field.label()),
                message,
            });
        };

        let date = match map.value(record, Field::Date) {
            None => {
                fail(Field::Date, "date is required".into());
                None
            }
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    fail(Field::Date, format!("unrecognised date '{raw}'"));
                }
                parsed
            }
        };

        let description = match validate::description(map.value(record, Field::Description).unwrap_or("")) {
            Ok(d) => Some(d),
            Err(e) => {
                fail(Field::Description, row_problem(e)?);
                None
            }
        };

        let mut kind_ok = true;
        let typed_kind = match map.value(record, Field::Kind) {
            Some(raw) => {
                let kind = parse_kind(raw);
                if kind.is_none() {
                    kind_ok = false;
                    fail(Field::Kind, format!("unknown transaction type '{raw}'"));
                }
                kind
            }
            None => None,
        };

        let signed = match (
            map.value(record, Field::Amount),
            map.value(record, Field::Debit),
            map.value(record, Field::Credit),
        ) {
            (Some(raw), _, _) => parse_amount(raw).ok_or((Field::Amount, format!("invalid amount '{raw}'"))),
            (None, Some(_), Some(_)) => Err((Field::Amount, "both debit and credit are filled in".to_string())),
            (None, Some(raw), None) => parse_amount(raw)
                .map(|v| -v.abs())
                .ok_or((Field::Debit, format!("invalid amount '{raw}'"))),
            (None, None, Some(raw)) => parse_amount(raw)
                .map(f64::abs)
                .ok_or((Field::Credit, format!("invalid amount '{raw}'"))),
            (None, None, None) => Err((Field::Amount, "amount is required".to_string())),
        };
        let amount_and_kind = match signed {
            Ok(v) if v == 0.0 => {
                fail(Field::Amount, "amount must not be zero".into());
                None
            }
            Ok(v) => {
                let kind = typed_kind.unwrap_or(if v < 0.0 { EntryKind::Expense } else { EntryKind::Income });
                kind_ok.then_some((v.abs(), kind))
            }
            Err((field, message)) => {
                fail(field, message);
                None
            }
        };

        let opts = self.opts;
        let account_name = map
            .value(record, Field::Account)
            .or(opts.default_account.as_deref());
        let account = match account_name {
            None => {
                fail(Field::Account, "account is required".into());
                None
            }
            Some(name) => match self.account(name) {
                Ok(found) => Some(found),
                Err(e) => {
                    fail(Field::Account, row_problem(e)?);
                    None
                }
            },
        };

        let mut category = None;
        if let (Some(name), Some((_, kind))) = (map.value(record, Field::Category), amount_and_kind) {
            match self.category(name, kind) {
                Ok(found) => category = Some(found),
                Err(e) => fail(Field::Category, row_problem(e)?),
            }
        }

        let mut tag_refs = Vec::new();
        if let Some(raw) = map.value(record, Field::Tags) {
            for name in tags::split_tag_list(raw) {
                match self.tag(&name) {
                    Ok(found) => tag_refs.push(found),
                    Err(e) => fail(Field::Tags, row_problem(e)?),
                }
            }
        }
        tag_refs.dedup();

        if errors.len() > before {
            return Ok(None);
        }
        match (date, description, amount_and_kind, account) {
            (Some(date), Some(description), Some((amount, kind)), Some(account)) => Ok(Some(PlannedRow {
                date,
                description,
                amount,
                kind,
                notes: map.value(record, Field::Notes).map(str::to_string),
                account,
                category,
                tags: tag_refs,
            })),
            _ => Ok(None),
        }
    }

    fn is_duplicate(&self, row: &PlannedRow) -> Result<bool> {
        match row.account {
            EntityRef::Existing(account_id) => transactions::is_duplicate(
                self.conn,
                account_id,
                row.date,
                row.amount,
                row.kind,
                &row.description,
            ),
            EntityRef::Planned(_) => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

pub fn import_file(conn: &Connection, path: &Path, opts: &ImportOptions) -> Result<ImportReport> {
    let data = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    import_bytes(conn, &data, &filename, opts)
}

/// Import CSV content. A missing required column is an `Err`; row-level
/// problems come back in `ImportReport::errors` with nothing written.
pub fn import_bytes(conn: &Connection, data: &[u8], filename: &str, opts: &ImportOptions) -> Result<ImportReport> {
    let mut report = ImportReport {
        filename: filename.to_string(),
        dry_run: opts.dry_run,
        ..Default::default()
    };

    let checksum = compute_checksum(data);
    if already_imported(conn, &checksum)? {
        warn!(%filename, "file already imported");
        report.duplicate_file = true;
        return Ok(report);
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(opts.delimiter)
        .flexible(true)
        .from_reader(data);
    let headers = rdr.headers()?.clone();
    let map = ColumnMap::detect(&headers);
    let missing = map.missing(opts.default_account.is_some());
    if !missing.is_empty() {
        return Err(TallyError::MissingColumns(missing));
    }
    report.ignored_columns = map.ignored.clone();

    let mut planner = Planner::new(conn, opts);
    let mut planned = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let fallback_line = idx as u64 + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                report.total_rows += 1;
                report.errors.push(RowError {
                    line: e.position().map_or(fallback_line, |p| p.line()),
                    field: None,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        report.total_rows += 1;
        let line = record.position().map_or(fallback_line, |p| p.line());
        if let Some(row) = planner.plan_row(line, &map, &record, &mut report.errors)? {
            if planner.is_duplicate(&row)? {
                report.skipped_duplicates += 1;
            } else {
                planned.push(row);
            }
        }
    }

    report.created_accounts = planner.new_accounts.clone();
    report.created_categories = planner.new_categories.iter().map(|(n, _)| n.clone()).collect();
    report.created_tags = planner.new_tags.clone();

    if !report.errors.is_empty() {
        warn!(%filename, errors = report.errors.len(), "import rejected");
        return Ok(report);
    }
    report.imported = planned.len();
    if opts.dry_run {
        debug!(%filename, would_import = planned.len(), "dry run");
        return Ok(report);
    }

    let import_id = commit(conn, &planner, &planned, filename, &checksum)?;
    report.import_id = Some(import_id);
    info!(
        %filename,
        import_id,
        imported = report.imported,
        skipped = report.skipped_duplicates,
        "import committed"
    );
    Ok(report)
}

fn commit(
    conn: &Connection,
    planner: &Planner<'_>,
    rows: &[PlannedRow],
    filename: &str,
    checksum: &str,
) -> Result<i64> {
    let user_id = current_user_id(conn)?;
    let tx = conn.unchecked_transaction()?;

    let mut account_ids = Vec::with_capacity(planner.new_accounts.len());
    for name in &planner.new_accounts {
        let (account, _) =
            accounts::find_or_create_account(&tx, name, planner.opts.account_type, &planner.opts.currency)?;
        debug!(account = %account.name, id = account.id, "created account");
        account_ids.push(account.id);
    }
    let mut category_ids = Vec::with_capacity(planner.new_categories.len());
    for (name, kind) in &planner.new_categories {
        let (category, _) = categories::find_or_create_category(&tx, name, *kind)?;
        debug!(category = %category.name, kind = %category.kind, "created category");
        category_ids.push(category.id);
    }
    let mut tag_ids = Vec::with_capacity(planner.new_tags.len());
    for name in &planner.new_tags {
        let (tag, _) = tags::find_or_create_tag(&tx, name)?;
        debug!(tag = %tag.name, "created tag");
        tag_ids.push(tag.id);
    }

    let first = rows.iter().map(|r| r.date).min();
    let last = rows.iter().map(|r| r.date).max();
    tx.execute(
        "INSERT INTO imports (user_id, filename, checksum, record_count, date_range_start, date_range_end) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![user_id, filename, checksum, rows.len() as i64, first, last],
    )?;
    let import_id = tx.last_insert_rowid();

    for row in rows {
        let txn_id = transactions::insert_transaction(
            &tx,
            &NewTransaction {
                account_id: row.account.resolve(&account_ids),
                category_id: row.category.map(|c| c.resolve(&category_ids)),
                date: row.date,
                description: row.description.clone(),
                amount: row.amount,
                kind: row.kind,
                notes: row.notes.clone(),
                import_id: Some(import_id),
            },
        )?;
        for tag in &row.tags {
            tags::attach_tag(&tx, txn_id, tag.resolve(&tag_ids))?;
        }
    }

    tx.commit()?;
    Ok(import_id)
}
