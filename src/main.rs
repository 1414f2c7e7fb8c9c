// src/main.rs
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod account;
mod bundler;
mod config;
mod contracts;
mod error;
mod runner;
mod types;

use crate::account::{ReceiptPolling, SimpleAccount, SmartAccountClient};
use crate::bundler::BundlerClient;
use crate::config::{Config, ARBITRUM_RPC_URL};
use crate::error::TransferError;
use crate::runner::{token_amount, Transfer};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Token amount in whole units
    #[clap(long, default_value = "0.1")]
    amount: String,

    #[clap(long, default_value_t = 6)]
    decimals: u32,

    /// Ask the bundler's paymaster to sponsor the operation
    #[clap(long)]
    sponsor: bool,

    #[clap(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    receipt_timeout_secs: u64,

    #[clap(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match send_transfer(&args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Transfer failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    // Logs go to stderr; stdout carries the report.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn send_transfer(args: &Args) -> Result<(), TransferError> {
    let config = Config::from_env()?;
    let amount = token_amount(&args.amount, args.decimals)?;
    info!("Loaded configuration: {:?}", config);

    let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
        TransferError::InvalidConfig { var: ARBITRUM_RPC_URL, reason: e.to_string() }
    })?;

    let account = SimpleAccount::resolve(
        Arc::new(provider),
        config.owner.clone(),
        config.entry_point,
        config.smart_account,
    )
    .await?;
    info!(
        "Sending from smart account {:?} (owner {:?}) via entry point {:?}",
        account.address(),
        account.owner(),
        account.entry_point()
    );

    let bundler = Arc::new(BundlerClient::new(&config.bundler_endpoint())?);
    let polling = ReceiptPolling {
        interval: Duration::from_millis(args.poll_interval_ms),
        timeout: Duration::from_secs(args.receipt_timeout_secs),
    };
    let smart_account = SmartAccountClient::new(account, bundler.clone(), args.sponsor, polling);

    let transfer = Transfer { token: config.token, recipient: config.recipient, amount };
    let mut stdout = std::io::stdout();
    runner::run(&transfer, bundler.as_ref(), &smart_account, &mut stdout).await?;

    Ok(())
}
