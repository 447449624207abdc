use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use txbridge::application::system::TransferSystem;
use txbridge::config::Config;
use txbridge::domain::ports::AccountStoreBox;
use txbridge::infrastructure::in_memory::InMemoryAccountStore;
use txbridge::interfaces::csv::account_reader::AccountReader;
use txbridge::interfaces::csv::account_writer::AccountWriter;
use txbridge::interfaces::csv::message_reader::MessageReader;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Seed accounts CSV file (name,balance)
    accounts: PathBuf,

    /// Messages to enqueue, CSV file (queue,amount)
    messages: PathBuf,

    /// JSON configuration file. Defaults to the three sample transfer routes.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn open_store(db_path: Option<PathBuf>) -> Result<AccountStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = txbridge::infrastructure::rocksdb::RocksDBAccountStore::open(path)
                .into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Box::new(InMemoryAccountStore::new()))
        }
        None => Ok(Box::new(InMemoryAccountStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    };
    let store = open_store(cli.db_path)?;
    let system = TransferSystem::new(config, store).into_diagnostic()?;

    // Seed accounts; rows already present in a persistent store are kept.
    let file = File::open(&cli.accounts).into_diagnostic()?;
    for account in AccountReader::new(file).accounts() {
        let account = match account {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Error reading account");
                continue;
            }
        };
        if let Ok(balance) = system.ledger.balance(&account.name).await {
            info!(account = %account.name, balance = balance.0, "Account already exists, keeping stored balance");
            continue;
        }
        system
            .ledger
            .open_account(&account.name, account.balance)
            .await
            .into_diagnostic()?;
    }

    let file = File::open(&cli.messages).into_diagnostic()?;
    for record in MessageReader::new(file).messages() {
        match record {
            Ok((queue, message)) => {
                if system.route_from(&queue).is_none() {
                    warn!(queue = %queue, "No route consumes from this queue");
                }
                if let Err(e) = system.queues.enqueue(&queue, message) {
                    warn!(queue = %queue, error = %e, "Error enqueuing message");
                }
            }
            Err(e) => warn!(error = %e, "Error reading message"),
        }
    }

    // One task per route; each drains its own queue sequentially.
    let mut handles = Vec::new();
    for route in system.routes.iter().cloned() {
        let executor = system.executor.clone();
        handles.push(tokio::spawn(async move {
            executor.run_until_idle(&route).await
        }));
    }
    for handle in handles {
        let outcomes = handle.await.into_diagnostic()?.into_diagnostic()?;
        for outcome in outcomes {
            info!(
                route = %outcome.route,
                message = %outcome.message_id,
                state = ?outcome.state,
                error = outcome.error.as_deref().unwrap_or(""),
                "Message processed"
            );
        }
    }

    let accounts = system.ledger.accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    for queue in system.queues.queue_names().into_diagnostic()? {
        let depth = system.queues.depth(&queue).await.into_diagnostic()?;
        info!(queue = %queue, depth, "Queue summary");
    }

    Ok(())
}
