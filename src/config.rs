// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! # Runtime Configuration
//!
//! This module defines environment variable names and the startup loader.
//! Configuration is read from the environment once, at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `NOCTURNE_CHAIN` | Target chain (`arbitrum-sepolia`, `ethereum-sepolia`, `base-sepolia`) | `arbitrum-sepolia` |
//! | `NOCTURNE_RPC_URL` | JSON-RPC endpoint override | Per-chain default |
//! | `NOCTURNE_TOKEN_ADDRESS` | Confidential token contract address | nUSD deployment |
//! | `NOCTURNE_PLATFORM_KEY` | Platform signing key (hex, no 0x) | Required for Buy/mint |
//! | `NOCTURNE_USER_KEY` | User signing key (hex, no 0x) | Required for Sell |
//! | `NOCTURNE_RECONCILIATION_KEY` | Reconciliation secret key (hex) | Required for reconcile |
//! | `NOCTURNE_CONFIRMATION_TIMEOUT_SECS` | Transfer confirmation deadline | `90` |
//! | `NOCTURNE_RETRY_ATTEMPTS` | Max reconciliation rewrite attempts | `3` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::crypto::keys::{signer_from_hex, KeyError, ReconciliationKey, SigningKeys};
use crate::ledger::{
    ConfirmationPolicy, NetworkConfig, ARBITRUM_SEPOLIA, BASE_SEPOLIA, ETHEREUM_SEPOLIA,
    NUSD_TOKEN,
};
use crate::reconcile::RetryPolicy;

/// Environment variable name for the target chain.
pub const CHAIN_ENV: &str = "NOCTURNE_CHAIN";

/// Environment variable name for the JSON-RPC endpoint override.
pub const RPC_URL_ENV: &str = "NOCTURNE_RPC_URL";

/// Environment variable name for the confidential token contract address.
pub const TOKEN_ADDRESS_ENV: &str = "NOCTURNE_TOKEN_ADDRESS";

/// Environment variable name for the platform signing key (hex).
pub const PLATFORM_KEY_ENV: &str = "NOCTURNE_PLATFORM_KEY";

/// Environment variable name for the user signing key (hex).
pub const USER_KEY_ENV: &str = "NOCTURNE_USER_KEY";

/// Environment variable name for the reconciliation secret key (hex).
///
/// The loaded key never leaves [`crate::reconcile::Reconciler`].
pub const RECONCILIATION_KEY_ENV: &str = "NOCTURNE_RECONCILIATION_KEY";

/// Environment variable name for the transfer confirmation deadline, seconds.
pub const CONFIRMATION_TIMEOUT_ENV: &str = "NOCTURNE_CONFIRMATION_TIMEOUT_SECS";

/// Environment variable name for the reconciliation retry attempt cap.
pub const RETRY_ATTEMPTS_ENV: &str = "NOCTURNE_RETRY_ATTEMPTS";

/// Errors raised while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown chain '{0}' in {CHAIN_ENV}")]
    UnknownChain(String),

    #[error("Invalid value in {var}: {message}")]
    InvalidValue { var: &'static str, message: String },

    #[error("{var} is required: {message}")]
    Missing { var: &'static str, message: String },

    #[error("Invalid key in {var}")]
    InvalidKey {
        var: &'static str,
        #[source]
        source: KeyError,
    },
}

/// Protocol configuration as loaded at startup.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub network: NetworkConfig,
    pub token_address: Address,
    pub confirmation: ConfirmationPolicy,
    pub retry: RetryPolicy,
}

impl ProtocolConfig {
    /// Load the non-secret configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut network = match env::var(CHAIN_ENV).as_deref() {
            Ok("ethereum-sepolia") => ETHEREUM_SEPOLIA,
            Ok("base-sepolia") => BASE_SEPOLIA,
            Ok("arbitrum-sepolia") | Err(_) => ARBITRUM_SEPOLIA,
            Ok(other) => return Err(ConfigError::UnknownChain(other.to_string())),
        };

        if let Ok(rpc_url) = env::var(RPC_URL_ENV) {
            let _: url::Url = rpc_url.parse().map_err(|e: url::ParseError| {
                ConfigError::InvalidValue {
                    var: RPC_URL_ENV,
                    message: e.to_string(),
                }
            })?;
            network.rpc_url = rpc_url.leak();
        }

        let raw_token = match env::var(TOKEN_ADDRESS_ENV) {
            Ok(raw) => raw,
            // Only the Arbitrum Sepolia deployment ships a default address.
            Err(_) if network.chain_id == ARBITRUM_SEPOLIA.chain_id => NUSD_TOKEN
                .arbitrum_sepolia_address
                .unwrap_or_default()
                .to_string(),
            Err(_) => {
                return Err(ConfigError::Missing {
                    var: TOKEN_ADDRESS_ENV,
                    message: format!("no default token deployment on {}", network.name),
                })
            }
        };
        let token_address =
            Address::from_str(&raw_token).map_err(|e| ConfigError::InvalidValue {
                var: TOKEN_ADDRESS_ENV,
                message: e.to_string(),
            })?;

        let mut confirmation = ConfirmationPolicy::default();
        if let Ok(raw) = env::var(CONFIRMATION_TIMEOUT_ENV) {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: CONFIRMATION_TIMEOUT_ENV,
                message: format!("'{raw}' is not a number of seconds"),
            })?;
            confirmation.timeout = Duration::from_secs(secs);
        }

        let mut retry = RetryPolicy::default();
        if let Ok(raw) = env::var(RETRY_ATTEMPTS_ENV) {
            retry.max_attempts = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: RETRY_ATTEMPTS_ENV,
                message: format!("'{raw}' is not a valid attempt count"),
            })?;
        }

        Ok(Self {
            network,
            token_address,
            confirmation,
            retry,
        })
    }
}

/// Load the transfer-leg signing keys from the environment.
///
/// Either role may be absent; requests that need a missing role fail with a
/// configuration error at request time.
pub fn signing_keys_from_env() -> Result<SigningKeys, ConfigError> {
    let platform = optional_signer(PLATFORM_KEY_ENV)?;
    let user = optional_signer(USER_KEY_ENV)?;
    Ok(SigningKeys::new(platform, user))
}

/// Load the reconciliation key pair from the environment, if configured.
pub fn reconciliation_key_from_env() -> Result<Option<ReconciliationKey>, ConfigError> {
    match env::var(RECONCILIATION_KEY_ENV) {
        Ok(hex) => ReconciliationKey::from_hex(&hex)
            .map(Some)
            .map_err(|source| ConfigError::InvalidKey {
                var: RECONCILIATION_KEY_ENV,
                source,
            }),
        Err(_) => Ok(None),
    }
}

fn optional_signer(var: &'static str) -> Result<Option<PrivateKeySigner>, ConfigError> {
    match env::var(var) {
        Ok(hex) => signer_from_hex(&hex)
            .map(Some)
            .map_err(|source| ConfigError::InvalidKey { var, source }),
        Err(_) => Ok(None),
    }
}
