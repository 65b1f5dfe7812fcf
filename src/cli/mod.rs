pub mod accounts;
pub mod audit;
pub mod backup;
pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod export;
pub mod import;
pub mod init;
pub mod status;
pub mod tags;
pub mod transactions;
pub mod users;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::open_existing;
use crate::error::{Result, TallyError};
use crate::models::User;
use crate::settings::{load_settings, Settings};

/// An open database with the active user's row-level security in place.
pub(crate) struct Session {
    pub conn: Connection,
    pub user: User,
    pub settings: Settings,
}

pub(crate) fn effective_settings() -> Result<Settings> {
    Ok(load_settings()?.with_env_overrides())
}

pub(crate) fn open_session() -> Result<Session> {
    let settings = effective_settings()?;
    let conn = open_existing(&settings.db_path())?;
    let username = settings.active_user.clone().ok_or(TallyError::NoSession)?;
    let user = crate::users::get_user(&conn, &username)?;
    crate::session::begin(&conn, user.id)?;
    Ok(Session {
        conn,
        user,
        settings,
    })
}

pub(crate) fn parse_date_arg(raw: &str) -> Result<NaiveDate> {
    crate::importer::parse_date(raw)
        .ok_or_else(|| TallyError::Validation(format!("Invalid date '{raw}' (expected YYYY-MM-DD)")))
}

pub(crate) fn parse_date_opt(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(parse_date_arg).transpose()
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Personal finance tracker: accounts, transactions, budgets and CSV import."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for tally data (default: platform data dir)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Create this user and sign in as them
        #[arg(long)]
        user: Option<String>,
    },
    /// Show the data directory, active user and row counts.
    Status,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/tally-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Manage users.
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Switch the active user.
    Login {
        username: String,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage tags.
    Tags {
        #[command(subcommand)]
        command: TagsCommands,
    },
    /// Manage budgets.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Add, list, edit and delete transactions.
    Tx {
        #[command(subcommand)]
        command: TxCommands,
    },
    /// Import transactions from a CSV file.
    Import {
        /// Path to the CSV file
        file: String,
        /// Account for rows without an account column
        #[arg(long)]
        account: Option<String>,
        /// Fail on unknown accounts, categories and tags instead of creating them
        #[arg(long = "no-create")]
        no_create: bool,
        /// Validate and show what would be imported without writing
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,
        /// Print the import report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export transactions to CSV (stdout unless --output is given).
    Export {
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        account: Option<String>,
        /// Start date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Monthly overview, spending, trend, budgets and recent activity.
    Dashboard {
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
        /// Number of months in the trend
        #[arg(
            long,
            default_value = "6",
            value_parser = clap::value_parser!(u32).range(1..=crate::reports::MAX_TREND_MONTHS as i64)
        )]
        months: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show the change history.
    Audit {
        /// Table: accounts, categories, tags, budgets, transactions
        #[arg(long)]
        table: Option<String>,
        /// Record id within the table
        #[arg(long)]
        record: Option<i64>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// Register a user (seeded with default categories).
    Add {
        username: String,
        #[arg(long = "display-name")]
        display_name: Option<String>,
    },
    /// List users.
    List,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'Everyday Checking'
        name: String,
        /// checking, savings, credit_card, cash, investment, loan
        #[arg(long = "type", default_value = "checking")]
        account_type: String,
        /// ISO currency code (default from settings)
        #[arg(long)]
        currency: Option<String>,
        #[arg(long = "opening-balance", default_value = "0", allow_negative_numbers = true)]
        opening_balance: f64,
    },
    /// List accounts.
    List {
        /// Include archived accounts
        #[arg(long)]
        all: bool,
    },
    /// Change an account's details.
    Edit {
        name: String,
        #[arg(long = "name")]
        new_name: Option<String>,
        #[arg(long = "type")]
        account_type: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long = "opening-balance", allow_negative_numbers = true)]
        opening_balance: Option<f64>,
    },
    /// Hide an account from lists and net worth.
    Archive { name: String },
    /// Restore an archived account.
    Unarchive { name: String },
    /// Delete an account and all of its transactions.
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        name: String,
        /// income or expense
        #[arg(long)]
        kind: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// List categories.
    List {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Rename or recolor a category.
    Edit {
        name: String,
        #[arg(long = "name")]
        new_name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a category; its transactions become uncategorized.
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum TagsCommands {
    /// Add a tag.
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// List tags with usage counts.
    List,
    /// Delete a tag.
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Add a budget for an expense category.
    Add {
        category: String,
        #[arg(long)]
        amount: f64,
        /// weekly, monthly or yearly
        #[arg(long, default_value = "monthly")]
        period: String,
        /// First day the budget applies (default: today)
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List budgets.
    List,
    /// Spending against each active budget.
    Status {
        /// Reference date (default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Change a budget's amount.
    Edit {
        id: i64,
        #[arg(long)]
        amount: f64,
    },
    /// Delete a budget.
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Record a transaction. A negative amount without --kind is an expense.
    Add {
        #[arg(long)]
        account: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        description: String,
        /// Date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// income or expense
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tag names
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List transactions, newest first.
    List {
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Text to find in description or notes
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Change a transaction.
    Edit {
        id: i64,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,
        #[arg(long = "clear-category")]
        clear_category: bool,
        /// Replace the tag set (comma-separated; empty string clears)
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a transaction.
    Delete { id: i64 },
}
