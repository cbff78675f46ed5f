//! Operator tooling for the token treasury.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use humantime_serde::re::humantime::parse_duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use treasury_chain::Address;
use treasury_core::{
    deadline_in, load_authority, BalanceReading, Config, Faucet, FundingOutcome,
    RpcLedgerClient, TokenAmount, Treasury,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Treasury-funded token transfers")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "TREASURY_CONFIG", default_value = "treasury.toml")]
    config: PathBuf,

    /// Overall deadline for each ledger operation.
    #[arg(long, global = true, default_value = "90s", value_parser = parse_duration)]
    timeout: Duration,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the authority's address.
    Address,
    /// Write the authority keypair as a JSON byte array.
    ExportKeypair {
        #[arg(long)]
        out: PathBuf,
    },
    /// Create a new mint owned by the authority.
    CreateMint {
        #[arg(long, default_value_t = 9)]
        decimals: u8,
    },
    /// Create an owner's token account if it is missing.
    InitAccount {
        /// Defaults to the authority.
        #[arg(long)]
        owner: Option<Address>,
    },
    /// Transfer tokens from the authority to a recipient.
    Transfer {
        #[arg(long)]
        to: Address,
        /// Amount in base units.
        #[arg(long)]
        amount: u64,
    },
    /// Top up the authority's native balance from the configured faucets.
    FundNative {
        /// Lamports; defaults to `funding.minimum_native_balance`.
        #[arg(long)]
        minimum: Option<u64>,
    },
    /// Show an owner's token balance.
    Balance {
        /// Defaults to the authority.
        #[arg(long)]
        owner: Option<Address>,
        /// Keep polling and print every change.
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        interval: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.stdout_log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let authority =
        load_authority(&config.treasury.authority).context("Failed to load signing authority")?;
    let ledger = Arc::new(
        RpcLedgerClient::new(config.network.rpc_url.clone(), config.network.commitment)
            .context("Failed to build RPC client")?,
    );
    info!(
        cluster = ?config.network.cluster,
        rpc_url = %config.network.rpc_url,
        authority = %authority.address(),
        "Treasury ready."
    );
    let treasury = Treasury::from_config(ledger, authority, &config);

    match args.command {
        Command::Address => println!("{}", treasury.authority().address()),
        Command::ExportKeypair { out } => {
            let json = treasury.authority().to_json_bytes();
            std::fs::write(&out, json.as_bytes())
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote keypair for {} to {}", treasury.authority().address(), out.display());
        }
        Command::CreateMint { decimals } => {
            let (mint, signature) = treasury
                .create_mint(decimals, deadline_in(args.timeout))
                .await?;
            println!("Created mint {mint} ({signature})");
            println!("Set treasury.mint = \"{mint}\" in the configuration.");
        }
        Command::InitAccount { owner } => {
            let owner = owner.unwrap_or_else(|| treasury.authority().address());
            let account = treasury.sub_account(&owner)?;
            match treasury.init_account(&owner, deadline_in(args.timeout)).await? {
                Some(signature) => println!("Created {account} for {owner} ({signature})"),
                None => println!("{account} already exists for {owner}"),
            }
        }
        Command::Transfer { to, amount } => {
            let signature = treasury
                .payout(&to, amount, deadline_in(args.timeout))
                .await?;
            println!("Transferred {amount} to {to} ({signature})");
        }
        Command::FundNative { minimum } => {
            if !config.network.cluster.allows_faucets() {
                bail!("Supplemental funding is not available on {:?}", config.network.cluster);
            }
            let faucets = faucets(&config)?;
            let minimum = minimum.unwrap_or(config.funding.minimum_native_balance);
            match treasury
                .fund_native(
                    minimum,
                    config.funding.airdrop_lamports,
                    &faucets,
                    deadline_in(args.timeout),
                )
                .await?
            {
                FundingOutcome::AlreadyFunded { balance } => {
                    println!("Already funded: {balance} lamports")
                }
                FundingOutcome::Funded {
                    faucet,
                    signature,
                    balance,
                } => println!("Funded from {faucet} ({signature}): {balance} lamports"),
            }
        }
        Command::Balance {
            owner,
            watch,
            interval,
        } => {
            let owner = owner.unwrap_or_else(|| treasury.authority().address());
            if !watch {
                print_balance(&owner, treasury.token_balance(&owner).await?);
                return Ok(());
            }

            let mut watcher = treasury.watch_balance(&owner, interval)?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    reading = watcher.changed() => match reading {
                        Some(BalanceReading::Balance(amount)) => print_balance(&owner, Some(amount)),
                        Some(BalanceReading::Missing) => print_balance(&owner, None),
                        Some(BalanceReading::Unknown) => {}
                        None => break,
                    },
                }
            }
            watcher.stop();
        }
    }

    Ok(())
}

/// One faucet per configured endpoint, in order, falling back to the main
/// RPC endpoint when none are listed.
fn faucets(config: &Config) -> Result<Vec<Box<dyn Faucet>>> {
    let endpoints = if config.funding.faucets.is_empty() {
        vec![config.network.rpc_url.clone()]
    } else {
        config.funding.faucets.clone()
    };

    endpoints
        .into_iter()
        .map(|url| {
            let faucet = RpcLedgerClient::new(url, config.network.commitment)
                .context("Failed to build faucet client")?;
            Ok(Box::new(faucet) as Box<dyn Faucet>)
        })
        .collect()
}

fn print_balance(owner: &Address, balance: Option<TokenAmount>) {
    match balance {
        Some(amount) => println!("{owner}: {} ({} base units)", amount.ui_amount(), amount.amount),
        None => println!("{owner}: no token account"),
    }
}
