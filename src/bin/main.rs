use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledger_engine::{reconstruct, AccountBalance, Currency, Transfer, Uint128};

/// Reconstructs an account statement from ledger CSV exports
#[derive(Debug, Parser)]
#[clap(version)]
struct Args {
    /// The path to the transfer CSV export of the account
    #[clap(long)]
    transfers: PathBuf,
    /// The path to the balance snapshot CSV export of the account
    #[clap(long)]
    balances: PathBuf,
    /// The account id, as hex
    #[clap(long, env = "LEDGER_ACCOUNT_ID")]
    account: Uint128,
    /// The currency code of the account
    #[clap(long, env = "LEDGER_CURRENCY")]
    currency: String,
    /// The decimal places of a currency that is not built in
    #[clap(long, env = "LEDGER_DECIMALS")]
    decimals: Option<u8>,
}

impl Args {
    fn currency(&self) -> anyhow::Result<Currency> {
        match self.decimals {
            Some(decimals) => Ok(Currency::new(&self.currency, decimals)?),
            None => Currency::lookup(&self.currency)
                .cloned()
                .with_context(|| format!("Unknown currency {}, pass --decimals for custom currencies", self.currency)),
        }
    }
}

fn read<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let currency = args.currency()?;
    let transfers = read::<Transfer>(&args.transfers)?;
    let balances = read::<AccountBalance>(&args.balances)?;
    tracing::info!(
        account = %args.account,
        currency = %currency,
        transfers = transfers.len(),
        balances = balances.len(),
        "reconstructing statement"
    );

    let statement = reconstruct(args.account, &currency, &transfers, &balances);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(std::io::stdout());

    for line in &statement.lines {
        writer.serialize(line)?;
    }
    writer.flush()?;

    for skipped in &statement.skipped {
        tracing::warn!(id = %skipped.id, reason = %skipped.reason, "transfer missing from the statement");
    }

    Ok(())
}
