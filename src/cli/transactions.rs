use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::accounts::get_account;
use crate::categories::{check_kind, get_category};
use crate::cli::{open_session, parse_date_arg, parse_date_opt, today};
use crate::error::Result;
use crate::fmt::money;
use crate::models::{EntryKind, Transaction};
use crate::tags::{set_transaction_tags, split_tag_list, tags_for_transaction};
use crate::transactions::{
    delete_transaction, get_transaction, insert_transaction, list_transactions, update_transaction, NewTransaction,
    TransactionFilter, TransactionUpdate,
};

pub struct AddArgs {
    pub account: String,
    pub amount: f64,
    pub description: String,
    pub date: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub notes: Option<String>,
}

pub struct ListArgs {
    pub account: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub kind: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub search: Option<String>,
    pub limit: usize,
    pub json: bool,
}

pub struct EditArgs {
    pub account: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub clear_category: bool,
    pub tags: Option<String>,
    pub notes: Option<String>,
}

pub(crate) fn transactions_table(txns: &[Transaction], currency: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Account", "Category", "Tags", "Amount"]);
    for t in txns {
        let amount = money(t.signed_amount(), currency);
        let amount = match t.kind {
            EntryKind::Income => amount.green().to_string(),
            EntryKind::Expense => amount.red().to_string(),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.date),
            Cell::new(&t.description),
            Cell::new(&t.account_name),
            Cell::new(t.category_name.as_deref().unwrap_or("")),
            Cell::new(t.tags.join(", ")),
            Cell::new(amount).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn add(args: AddArgs) -> Result<()> {
    let s = open_session()?;
    let account = get_account(&s.conn, &args.account)?;
    let kind = match &args.kind {
        Some(k) => k.parse()?,
        None if args.amount < 0.0 => EntryKind::Expense,
        None => EntryKind::Income,
    };
    let category_id = match &args.category {
        Some(name) => {
            let category = get_category(&s.conn, name)?;
            check_kind(&category, kind)?;
            Some(category.id)
        }
        None => None,
    };
    let date = match &args.date {
        Some(d) => parse_date_arg(d)?,
        None => today(),
    };

    let tx = s.conn.unchecked_transaction()?;
    let id = insert_transaction(
        &tx,
        &NewTransaction {
            account_id: account.id,
            category_id,
            date,
            description: args.description,
            amount: args.amount.abs(),
            kind,
            notes: args.notes,
            import_id: None,
        },
    )?;
    if let Some(raw) = &args.tags {
        set_transaction_tags(&tx, id, &split_tag_list(raw))?;
    }
    tx.commit()?;

    let txn = get_transaction(&s.conn, id)?;
    println!(
        "Added transaction #{}: {} {} on {}",
        txn.id,
        txn.description,
        money(txn.signed_amount(), &account.currency),
        txn.date
    );
    Ok(())
}

pub fn list(args: ListArgs) -> Result<()> {
    let s = open_session()?;
    let filter = TransactionFilter {
        account: args.account,
        category: args.category,
        tag: args.tag,
        kind: args.kind.as_deref().map(str::parse).transpose()?,
        from: parse_date_opt(args.from_date.as_deref())?,
        to: parse_date_opt(args.to_date.as_deref())?,
        search: args.search,
        limit: Some(args.limit),
    };
    let txns = list_transactions(&s.conn, &filter)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&txns)?);
        return Ok(());
    }
    if txns.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }
    println!(
        "Transactions ({})\n{}",
        txns.len(),
        transactions_table(&txns, &s.settings.default_currency)
    );
    Ok(())
}

pub fn edit(id: i64, args: EditArgs) -> Result<()> {
    let s = open_session()?;
    let current = get_transaction(&s.conn, id)?;

    let account_id = match &args.account {
        Some(name) => Some(get_account(&s.conn, name)?.id),
        None => None,
    };
    let kind: Option<EntryKind> = args.kind.as_deref().map(str::parse).transpose()?;
    let category_id = if args.clear_category {
        Some(None)
    } else {
        match &args.category {
            Some(name) => {
                let category = get_category(&s.conn, name)?;
                check_kind(&category, kind.unwrap_or(current.kind))?;
                Some(Some(category.id))
            }
            None => None,
        }
    };

    let tx = s.conn.unchecked_transaction()?;
    update_transaction(
        &tx,
        id,
        &TransactionUpdate {
            account_id,
            category_id,
            date: parse_date_opt(args.date.as_deref())?,
            description: args.description,
            amount: args.amount,
            kind,
            notes: args.notes.map(Some),
        },
    )?;
    let tags_changed = args.tags.is_some();
    if let Some(raw) = &args.tags {
        set_transaction_tags(&tx, id, &split_tag_list(raw))?;
    }
    tx.commit()?;

    let txn = get_transaction(&s.conn, id)?;
    println!(
        "Updated transaction #{}: {} {} on {}",
        txn.id,
        txn.description,
        money(txn.signed_amount(), &s.settings.default_currency),
        txn.date
    );
    if tags_changed {
        let names: Vec<String> = tags_for_transaction(&s.conn, id)?.into_iter().map(|t| t.name).collect();
        if names.is_empty() {
            println!("  Tags cleared");
        } else {
            println!("  Tags: {}", names.join(", "));
        }
    }
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let s = open_session()?;
    let txn = delete_transaction(&s.conn, id)?;
    println!("Deleted transaction #{}: {}", txn.id, txn.description);
    Ok(())
}
