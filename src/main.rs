// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Operator tool for the confidential balance protocol.
//!
//! ```text
//! nocturne balance <account>
//! nocturne mint <to> <amount>
//! nocturne reconcile <sender> <receiver> <amount>
//! ```
//!
//! Amounts are decimal token amounts (`"12.5"`), converted to base units
//! before encryption. Output is JSON on stdout; logs go to stderr.

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::json;

use nocturne_protocol::config::{
    reconciliation_key_from_env, signing_keys_from_env, ProtocolConfig, RECONCILIATION_KEY_ENV,
};
use nocturne_protocol::crypto::keys::parse_encryption_public_key;
use nocturne_protocol::crypto::{codec, ReconciliationKey};
use nocturne_protocol::ledger::{format_amount, parse_amount, EvmGateway, Ledger, NUSD_TOKEN};
use nocturne_protocol::reconcile::Reconciler;

const USAGE: &str = "usage: nocturne <balance|mint|reconcile> ...
  balance <account>                      decrypt and print an account balance
  mint <to> <amount>                     mint encrypted supply to an account
  reconcile <sender> <receiver> <amount> rewrite balances for a confirmed transfer";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    match (command, args.len()) {
        ("balance", 2) => balance(&args[1]).await,
        ("mint", 3) => mint(&args[1], &args[2]).await,
        ("reconcile", 4) => reconcile(&args[1], &args[2], &args[3]).await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn gateway(config: &ProtocolConfig) -> Result<EvmGateway, Box<dyn std::error::Error>> {
    let signers = signing_keys_from_env()?;
    let gateway = EvmGateway::new(
        config.network.clone(),
        config.token_address,
        signers,
        config.confirmation.clone(),
    )?;
    Ok(gateway)
}

fn required_reconciliation_key() -> Result<ReconciliationKey, Box<dyn std::error::Error>> {
    reconciliation_key_from_env()?
        .ok_or_else(|| format!("{RECONCILIATION_KEY_ENV} is not set").into())
}

fn parse_address(raw: &str) -> Result<Address, Box<dyn std::error::Error>> {
    Address::from_str(raw).map_err(|e| format!("invalid address '{raw}': {e}").into())
}

async fn balance(account: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProtocolConfig::from_env()?;
    let account = parse_address(account)?;
    let key = required_reconciliation_key()?;

    let ledger = Arc::new(gateway(&config)?);
    let reconciler = Reconciler::with_policy(ledger, key, config.retry.clone());

    let amount = reconciler.current_balance(account).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "account": format!("{account}"),
            "balance_raw": amount.to_string(),
            "balance_formatted": format_amount(amount, NUSD_TOKEN.decimals),
            "symbol": NUSD_TOKEN.symbol,
        }))?
    );
    Ok(())
}

async fn mint(to: &str, amount: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProtocolConfig::from_env()?;
    let to = parse_address(to)?;
    let amount = parse_amount(amount, NUSD_TOKEN.decimals)?;

    let gateway = gateway(&config)?;

    // Encrypt under the key the contract publishes, not a local copy.
    let key_bytes = gateway.encryption_public_key().await?;
    let encryption_key = parse_encryption_public_key(&key_bytes)?;
    let sealed = codec::encrypt(&encryption_key, amount)?;

    let handle = gateway.submit_mint(to, &sealed).await?;
    tracing::info!(tx_hash = %handle.tx_hash, "Mint submitted");

    let receipt = gateway.await_confirmation(&handle).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "to": format!("{to}"),
            "amount_raw": amount.to_string(),
            "tx_hash": receipt.tx_hash,
            "block_number": receipt.block_number,
            "explorer_url": handle.explorer_url,
        }))?
    );
    Ok(())
}

async fn reconcile(
    sender: &str,
    receiver: &str,
    amount: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProtocolConfig::from_env()?;
    let sender = parse_address(sender)?;
    let receiver = parse_address(receiver)?;
    let amount = parse_amount(amount, NUSD_TOKEN.decimals)?;
    let key = required_reconciliation_key()?;

    let ledger = Arc::new(gateway(&config)?);
    let reconciler = Reconciler::with_policy(ledger, key, config.retry.clone());

    let result = reconciler.reconcile(sender, receiver, amount).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
