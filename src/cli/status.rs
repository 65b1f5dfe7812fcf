use crate::cli::effective_settings;
use crate::db::open_existing;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{settings_file_exists, settings_path};

pub fn run() -> Result<()> {
    let settings = effective_settings()?;
    let db_path = settings.db_path();

    println!("User:       {}", settings.active_user.as_deref().unwrap_or("(not set)"));
    println!("Data dir:   {}", settings.data_path().display());
    println!("Database:   {}", db_path.display());
    println!("Currency:   {}", settings.default_currency);
    if !settings_file_exists() {
        println!("Settings:   {} (not saved yet)", settings_path().display());
    }

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `tally init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {}", format_bytes(size));

    let conn = open_existing(&db_path)?;
    let users: i64 = conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0))?;
    println!("Users:      {users}");

    let Some(username) = settings.active_user.as_deref() else {
        return Ok(());
    };
    let Some(user) = crate::users::find_user(&conn, username)? else {
        println!();
        println!("Active user '{username}' does not exist. Run `tally users add {username}`.");
        return Ok(());
    };
    crate::session::begin(&conn, user.id)?;

    let count = |view: &str| -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT count(*) FROM {view}"), [], |r| r.get(0))?)
    };
    println!();
    println!("Accounts:      {}", count("my_accounts")?);
    println!("Categories:    {}", count("my_categories")?);
    println!("Tags:          {}", count("my_tags")?);
    println!("Budgets:       {}", count("my_budgets")?);
    println!("Transactions:  {}", count("my_transactions")?);
    println!("Imports:       {}", count("my_imports")?);
    Ok(())
}
