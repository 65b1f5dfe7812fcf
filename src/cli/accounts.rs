use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::accounts::{
    archive_account, create_account, delete_account, list_accounts, set_archived, update_account, AccountUpdate,
    NewAccount,
};
use crate::cli::open_session;
use crate::error::Result;
use crate::fmt::money;
use crate::models::AccountType;

pub fn add(name: &str, account_type: &str, currency: Option<&str>, opening_balance: f64) -> Result<()> {
    let s = open_session()?;
    let account = create_account(
        &s.conn,
        &NewAccount {
            name: name.to_string(),
            account_type: account_type.parse()?,
            currency: currency.unwrap_or(&s.settings.default_currency).to_string(),
            opening_balance,
        },
    )?;
    println!(
        "Added account: {} ({}, {})",
        account.name,
        account.account_type,
        money(account.balance, &account.currency)
    );
    Ok(())
}

pub fn list(include_archived: bool) -> Result<()> {
    let s = open_session()?;
    let accounts = list_accounts(&s.conn, include_archived)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Currency", "Balance", ""]);
    for a in &accounts {
        let balance = money(a.balance, &a.currency);
        let balance = if a.balance < 0.0 {
            balance.red().to_string()
        } else {
            balance
        };
        table.add_row(vec![
            Cell::new(a.id),
            Cell::new(&a.name),
            Cell::new(a.account_type),
            Cell::new(&a.currency),
            Cell::new(balance).set_alignment(CellAlignment::Right),
            Cell::new(if a.is_archived { "archived" } else { "" }),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}

pub fn edit(
    name: &str,
    new_name: Option<String>,
    account_type: Option<&str>,
    currency: Option<String>,
    opening_balance: Option<f64>,
) -> Result<()> {
    let s = open_session()?;
    let account_type = account_type.map(str::parse::<AccountType>).transpose()?;
    let account = update_account(
        &s.conn,
        name,
        &AccountUpdate {
            name: new_name,
            account_type,
            currency,
            opening_balance,
        },
    )?;
    println!(
        "Updated account: {} (balance {})",
        account.name,
        money(account.balance, &account.currency)
    );
    Ok(())
}

pub fn archive(name: &str, archived: bool) -> Result<()> {
    let s = open_session()?;
    let account = if archived {
        archive_account(&s.conn, name)?
    } else {
        set_archived(&s.conn, name, false)?
    };
    let verb = if archived { "Archived" } else { "Restored" };
    println!("{verb} account: {}", account.name);
    Ok(())
}

pub fn delete(name: &str) -> Result<()> {
    let s = open_session()?;
    let removed = delete_account(&s.conn, name)?;
    println!("Deleted account: {name} ({removed} transactions removed)");
    Ok(())
}
