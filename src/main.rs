mod accounts;
mod audit;
mod budgets;
mod categories;
mod cli;
mod db;
mod error;
mod exporter;
mod fmt;
mod importer;
mod logging;
mod models;
mod reports;
mod session;
mod settings;
mod tags;
mod transactions;
mod users;
mod validate;

use std::io::IsTerminal;

use clap::Parser;

use cli::{
    AccountsCommands, BudgetsCommands, CategoriesCommands, Cli, Commands, TagsCommands, TxCommands, UsersCommands,
};

fn main() {
    let cli = Cli::parse();

    let settings = settings::load_settings()
        .map(|s| s.with_env_overrides())
        .unwrap_or_default();
    logging::init_tracing(&settings.log_level, std::io::stderr().is_terminal());

    let result = match cli.command {
        Commands::Init { data_dir, user } => cli::init::run(data_dir, user),
        Commands::Status => cli::status::run(),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Users { command } => match command {
            UsersCommands::Add {
                username,
                display_name,
            } => cli::users::add(&username, display_name.as_deref()),
            UsersCommands::List => cli::users::list(),
        },
        Commands::Login { username } => cli::users::login(&username),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                currency,
                opening_balance,
            } => cli::accounts::add(&name, &account_type, currency.as_deref(), opening_balance),
            AccountsCommands::List { all } => cli::accounts::list(all),
            AccountsCommands::Edit {
                name,
                new_name,
                account_type,
                currency,
                opening_balance,
            } => cli::accounts::edit(&name, new_name, account_type.as_deref(), currency, opening_balance),
            AccountsCommands::Archive { name } => cli::accounts::archive(&name, true),
            AccountsCommands::Unarchive { name } => cli::accounts::archive(&name, false),
            AccountsCommands::Delete { name } => cli::accounts::delete(&name),
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add { name, kind, color } => cli::categories::add(&name, &kind, color.as_deref()),
            CategoriesCommands::List { kind } => cli::categories::list(kind.as_deref()),
            CategoriesCommands::Edit {
                name,
                new_name,
                color,
            } => cli::categories::edit(&name, new_name.as_deref(), color.as_deref()),
            CategoriesCommands::Delete { name } => cli::categories::delete(&name),
        },
        Commands::Tags { command } => match command {
            TagsCommands::Add { name, color } => cli::tags::add(&name, color.as_deref()),
            TagsCommands::List => cli::tags::list(),
            TagsCommands::Delete { name } => cli::tags::delete(&name),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Add {
                category,
                amount,
                period,
                start,
                end,
            } => cli::budgets::add(&category, amount, &period, start.as_deref(), end.as_deref()),
            BudgetsCommands::List => cli::budgets::list(),
            BudgetsCommands::Status { date, json } => cli::budgets::status(date.as_deref(), json),
            BudgetsCommands::Edit { id, amount } => cli::budgets::edit(id, amount),
            BudgetsCommands::Delete { id } => cli::budgets::delete(id),
        },
        Commands::Tx { command } => match command {
            TxCommands::Add {
                account,
                amount,
                description,
                date,
                kind,
                category,
                tags,
                notes,
            } => cli::transactions::add(cli::transactions::AddArgs {
                account,
                amount,
                description,
                date,
                kind,
                category,
                tags,
                notes,
            }),
            TxCommands::List {
                account,
                category,
                tag,
                kind,
                from_date,
                to_date,
                search,
                limit,
                json,
            } => cli::transactions::list(cli::transactions::ListArgs {
                account,
                category,
                tag,
                kind,
                from_date,
                to_date,
                search,
                limit,
                json,
            }),
            TxCommands::Edit {
                id,
                account,
                amount,
                description,
                date,
                kind,
                category,
                clear_category,
                tags,
                notes,
            } => cli::transactions::edit(
                id,
                cli::transactions::EditArgs {
                    account,
                    amount,
                    description,
                    date,
                    kind,
                    category,
                    clear_category,
                    tags,
                    notes,
                },
            ),
            TxCommands::Delete { id } => cli::transactions::delete(id),
        },
        Commands::Import {
            file,
            account,
            no_create,
            dry_run,
            delimiter,
            json,
        } => cli::import::run(
            &file,
            cli::import::ImportArgs {
                account,
                no_create,
                dry_run,
                delimiter,
                json,
            },
        ),
        Commands::Export {
            output,
            account,
            from_date,
            to_date,
        } => cli::export::run(output, account, from_date.as_deref(), to_date.as_deref()),
        Commands::Dashboard { month, months, json } => cli::dashboard::run(month.as_deref(), months, json),
        Commands::Audit {
            table,
            record,
            limit,
            json,
        } => cli::audit::run(table, record, limit, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
