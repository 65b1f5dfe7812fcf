//! Header normalization and column mapping for CSV imports.
//!
//! Bank exports disagree on almost every column name, so headers are first
//! reduced to a canonical `snake_case` form and then matched exactly against a
//! per-field alias list.

use std::collections::HashMap;

use csv::StringRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Description,
    Amount,
    Debit,
    Credit,
    Kind,
    Account,
    Category,
    Tags,
    Notes,
}

impl Field {
    pub const ALL: &'static [Field] = &[
        Field::Date,
        Field::Description,
        Field::Amount,
        Field::Debit,
        Field::Credit,
        Field::Kind,
        Field::Account,
        Field::Category,
        Field::Tags,
        Field::Notes,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Description => "description",
            Field::Amount => "amount",
            Field::Debit => "debit",
            Field::Credit => "credit",
            Field::Kind => "type",
            Field::Account => "account",
            Field::Category => "category",
            Field::Tags => "tags",
            Field::Notes => "notes",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Date => &[
                "date",
                "transaction_date",
                "txn_date",
                "posted",
                "posted_date",
                "posting_date",
                "booking_date",
                "value_date",
            ],
            Field::Description => &[
                "description",
                "desc",
                "memo",
                "payee",
                "details",
                "narrative",
                "name",
                "merchant",
                "transaction_description",
            ],
            Field::Amount => &["amount", "value", "sum", "transaction_amount", "total"],
            Field::Debit => &["debit", "debits", "withdrawal", "withdrawals", "outflow", "money_out", "paid_out"],
            Field::Credit => &["credit", "credits", "deposit", "deposits", "inflow", "money_in", "paid_in"],
            Field::Kind => &["type", "kind", "transaction_type", "direction"],
            Field::Account => &["account", "account_name"],
            Field::Category => &["category", "category_name"],
            Field::Tags => &["tags", "tag", "labels", "label"],
            Field::Notes => &["notes", "note", "comment", "comments", "remarks"],
        }
    }
}

/// `"\u{feff}Posting Date (UTC)"` becomes `"posting_date"`.
pub fn normalize_header(raw: &str) -> String {
    let mut without_parens = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.trim_start_matches('\u{feff}').chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => without_parens.push(c),
            _ => {}
        }
    }

    let mut out = String::with_capacity(without_parens.len());
    for c in without_parens.trim().to_lowercase().chars() {
        let mapped = match c {
            ' ' | '-' | '.' | '/' | '_' | '\t' => Some('_'),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        };
        if let Some(m) = mapped {
            if m == '_' && (out.is_empty() || out.ends_with('_')) {
                continue;
            }
            out.push(m);
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Which column index feeds which field. The first column matching a field wins.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: HashMap<Field, usize>,
    pub ignored: Vec<String>,
}

impl ColumnMap {
    pub fn detect(headers: &StringRecord) -> Self {
        let mut map = ColumnMap::default();
        for (idx, raw) in headers.iter().enumerate() {
            let normalized = normalize_header(raw);
            let field = Field::ALL
                .iter()
                .find(|f| f.aliases().contains(&normalized.as_str()))
                .copied();
            match field {
                Some(f) if !map.columns.contains_key(&f) => {
                    map.columns.insert(f, idx);
                }
                _ => {
                    if !raw.trim().is_empty() {
                        map.ignored.push(raw.trim().trim_start_matches('\u{feff}').to_string());
                    }
                }
            }
        }
        map
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Descriptions of required columns that no header mapped to.
    pub fn missing(&self, has_default_account: bool) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.has(Field::Date) {
            missing.push("date".to_string());
        }
        if !self.has(Field::Description) {
            missing.push("description".to_string());
        }
        if !self.has(Field::Amount) && !(self.has(Field::Debit) && self.has(Field::Credit)) {
            missing.push("amount (or debit/credit)".to_string());
        }
        if !self.has(Field::Account) && !has_default_account {
            missing.push("account (or a default account)".to_string());
        }
        missing
    }

    /// Trimmed cell value for `field`, `None` when the column is absent or the cell blank.
    pub fn value<'r>(&self, record: &'r StringRecord, field: Field) -> Option<&'r str> {
        let idx = *self.columns.get(&field)?;
        record.get(idx).map(str::trim).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("\u{feff}Date"), "date");
        assert_eq!(normalize_header("  Posting Date "), "posting_date");
        assert_eq!(normalize_header("Amount (USD)"), "amount");
        assert_eq!(normalize_header("Transaction-Type"), "transaction_type");
        assert_eq!(normalize_header("Money Out [£]"), "money_out");
        assert_eq!(normalize_header("Account  Name:"), "account_name");
        assert_eq!(normalize_header("Txn. Date"), "txn_date");
        assert_eq!(normalize_header("__Notes__"), "notes");
    }

    #[test]
    fn test_detect_maps_aliases_first_match_wins() {
        let headers = StringRecord::from(vec![
            "Posted Date",
            "Payee",
            "Memo",
            "Amount (EUR)",
            "Running Balance",
            "Category",
        ]);
        let map = ColumnMap::detect(&headers);
        let record = StringRecord::from(vec!["2025-01-02", "ACME", "lunch", "-12.00", "100", ""]);
        assert_eq!(map.value(&record, Field::Date), Some("2025-01-02"));
        assert_eq!(map.value(&record, Field::Description), Some("ACME"));
        assert_eq!(map.value(&record, Field::Amount), Some("-12.00"));
        assert_eq!(map.value(&record, Field::Category), None);
        assert_eq!(map.ignored, vec!["Memo", "Running Balance"]);
    }

    #[test]
    fn test_missing_required_columns() {
        let map = ColumnMap::detect(&StringRecord::from(vec!["When", "Payee"]));
        assert_eq!(
            map.missing(false),
            vec!["date", "amount (or debit/credit)", "account (or a default account)"]
        );
        assert_eq!(map.missing(true), vec!["date", "amount (or debit/credit)"]);
    }

    #[test]
    fn test_debit_credit_satisfies_amount() {
        let map = ColumnMap::detect(&StringRecord::from(vec![
            "Date",
            "Description",
            "Withdrawals",
            "Deposits",
            "Account",
        ]));
        assert!(map.missing(false).is_empty());
        assert!(map.has(Field::Debit));
        assert!(map.has(Field::Credit));
        assert!(!map.has(Field::Amount));

        let debit_only = ColumnMap::detect(&StringRecord::from(vec!["Date", "Description", "Debit"]));
        assert_eq!(debit_only.missing(true), vec!["amount (or debit/credit)"]);
    }

    #[test]
    fn test_short_record_yields_none() {
        let map = ColumnMap::detect(&StringRecord::from(vec!["Date", "Description", "Amount", "Notes"]));
        let record = StringRecord::from(vec!["2025-01-02", "ACME"]);
        assert_eq!(map.value(&record, Field::Notes), None);
    }
}
