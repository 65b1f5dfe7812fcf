use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::effective_settings;
use crate::db::open_existing;
use crate::error::Result;
use crate::settings::{load_settings, save_settings};

pub fn add(username: &str, display_name: Option<&str>) -> Result<()> {
    let settings = effective_settings()?;
    let conn = open_existing(&settings.db_path())?;
    let user = crate::users::create_user(&conn, username, display_name)?;
    println!("Added user: {}", user.username);

    // the first user becomes the active one
    let mut stored = load_settings()?;
    if stored.active_user.is_none() {
        stored.active_user = Some(user.username.clone());
        save_settings(&stored)?;
        println!("Active user: {}", user.username);
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = effective_settings()?;
    let conn = open_existing(&settings.db_path())?;
    let users = crate::users::list_users(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Username", "Display Name", ""]);
    for user in users {
        let active = settings
            .active_user
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(&user.username));
        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(&user.username),
            Cell::new(user.display_name.unwrap_or_default()),
            Cell::new(if active { "active" } else { "" }),
        ]);
    }
    println!("Users\n{table}");
    Ok(())
}

pub fn login(username: &str) -> Result<()> {
    let settings = effective_settings()?;
    let conn = open_existing(&settings.db_path())?;
    let user = crate::users::get_user(&conn, username)?;

    let mut stored = load_settings()?;
    stored.active_user = Some(user.username.clone());
    save_settings(&stored)?;
    println!("Signed in as {}", user.username.bold());
    Ok(())
}
