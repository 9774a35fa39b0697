use std::{error::Error, io::Write, sync::Arc};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{
    AccountSnapshot, BalanceChange, Coins, EconomySettings, Engine, EngineError, Ledger,
    store::{AccountStore, DEFAULT_COPY_BATCH, SqlStore, copy_accounts},
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use crate::settings::Settings;

mod settings;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "economy_admin")]
#[command(about = "Admin utilities for the economy database (inspect and fix balances)")]
struct Cli {
    /// Settings file shared with the service, without extension.
    #[arg(long, default_value = "settings")]
    settings: String,

    /// Database connection string (also read from `DATABASE_URL`); overrides
    /// `database.url` from the settings.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Richest accounts.
    Top(TopArgs),
    /// Balances of one account.
    Show(ShowArgs),
    /// Overwrite a balance.
    Set(BalanceArgs),
    /// Add to a balance (capped at the ledger maximum).
    Add(BalanceArgs),
    /// Remove from a balance.
    Remove(BalanceArgs),
    /// Copy every account from another database into this one.
    Copy(CopyArgs),
}

#[derive(Args, Debug)]
struct TopArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
    #[arg(long, default_value = "liquid", value_parser = parse_ledger)]
    ledger: Ledger,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Account id or display name.
    account: String,
}

#[derive(Args, Debug)]
struct BalanceArgs {
    /// Account id or display name.
    account: String,
    #[arg(long, value_parser = parse_ledger)]
    ledger: Ledger,
    #[arg(long, allow_negative_numbers = true)]
    amount: Coins,
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct CopyArgs {
    /// Connection string of the source database.
    #[arg(long)]
    from_url: String,
    #[arg(long, default_value_t = DEFAULT_COPY_BATCH)]
    batch: usize,
}

fn parse_ledger(raw: &str) -> Result<Ledger, String> {
    Ledger::try_from(raw).map_err(|err| err.to_string())
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, BoxError> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Asks a y/N question on stderr; anything but `y` means no.
fn confirm(prompt: &str) -> Result<bool, BoxError> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(format!("{prompt} [y/N] "))
    )?;
    out.flush()?;

    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        let answer = match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                return Err("interrupted".into());
            }
            KeyCode::Char('y' | 'Y') => true,
            KeyCode::Char(_) | KeyCode::Enter | KeyCode::Esc => false,
            _ => continue,
        };
        execute!(out, Print(if answer { "y\r\n" } else { "n\r\n" }))?;
        out.flush()?;
        return Ok(answer);
    }
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection, BoxError> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Opens the database and builds an engine bounded by the configured caps.
async fn open_engine(
    database_url: &str,
    economy: EconomySettings,
) -> Result<(Engine, DatabaseConnection), BoxError> {
    let db = connect_db(database_url).await?;
    let engine = Engine::builder()
        .store(Arc::new(SqlStore::new(db.clone())))
        .settings(economy)
        .build()?;
    Ok((engine, db))
}

async fn resolve(engine: &Engine, account: &str) -> Result<AccountSnapshot, BoxError> {
    if let Ok(id) = Uuid::parse_str(account) {
        return Ok(engine.account(id).await?);
    }
    match engine.account_by_name(account).await? {
        Some(snapshot) => Ok(snapshot),
        None => Err(EngineError::KeyNotFound(account.to_string()).into()),
    }
}

fn print_account(snapshot: &AccountSnapshot) {
    println!(
        "{} {:<16} liquid {:>14} vault {:>14} total {:>14}",
        snapshot.id,
        snapshot.name,
        snapshot.liquid,
        snapshot.vault,
        snapshot.total_wealth()
    );
}

fn print_change(change: &BalanceChange) {
    println!(
        "{} {}: {} -> {}{}",
        change.account,
        change.ledger.as_str(),
        change.old,
        change.new,
        if change.capped() { " (capped)" } else { "" }
    );
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let settings = Settings::new(&cli.settings)?;
    let database_url = cli.database_url.unwrap_or(settings.database.url);

    let (engine, db) = open_engine(&database_url, settings.economy).await?;

    if let Command::Set(args) | Command::Add(args) | Command::Remove(args) = &cli.command
        && !args.yes
        && !confirm(&format!(
            "Change the {} balance of {}?",
            args.ledger.as_str(),
            args.account
        ))?
    {
        eprintln!("aborted");
        std::process::exit(1);
    }

    match cli.command {
        Command::Copy(args) => {
            let source = SqlStore::new(connect_db(&args.from_url).await?);
            let target = SqlStore::new(db);
            let existing = target.count().await?;
            if existing > 0 {
                eprintln!("target already holds {existing} accounts, nothing copied");
                std::process::exit(1);
            }
            let copied = copy_accounts(&source, &target, args.batch).await?;
            println!("copied {copied} accounts");
            return Ok(());
        }
        Command::Top(args) => {
            let top = engine.top(args.limit, args.ledger).await?;
            for (rank, snapshot) in top.iter().enumerate() {
                print!("{:>3}. ", rank + 1);
                print_account(snapshot);
            }
        }
        Command::Show(args) => {
            print_account(&resolve(&engine, &args.account).await?);
        }
        Command::Set(args) => {
            let id = resolve(&engine, &args.account).await?.id;
            let change = match args.ledger {
                Ledger::Liquid => engine.set_liquid(id, args.amount).await?,
                Ledger::Vault => engine.set_vault(id, args.amount).await?,
            };
            print_change(&change);
        }
        Command::Add(args) => {
            let id = resolve(&engine, &args.account).await?.id;
            let change = match args.ledger {
                Ledger::Liquid => engine.add_liquid(id, args.amount).await?,
                Ledger::Vault => engine.add_vault(id, args.amount).await?,
            };
            print_change(&change);
        }
        Command::Remove(args) => {
            let id = resolve(&engine, &args.account).await?.id;
            let change = match args.ledger {
                Ledger::Liquid => engine.remove_liquid(id, args.amount).await?,
                Ledger::Vault => engine.remove_vault(id, args.amount).await?,
            };
            print_change(&change);
        }
    }

    let report = engine.cache().flush_dirty().await;
    if report.failed > 0 {
        return Err(format!("{} accounts were not saved", report.failed).into());
    }
    Ok(())
}
