// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Ledger types and network constants.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Arbitrum Sepolia testnet, where the confidential token is deployed.
pub const ARBITRUM_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Arbitrum Sepolia",
    chain_id: 421_614,
    rpc_url: "https://sepolia-rollup.arbitrum.io/rpc",
    explorer_url: "https://sepolia.arbiscan.io",
};

/// Ethereum Sepolia testnet.
pub const ETHEREUM_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Ethereum Sepolia",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_url: "https://sepolia.etherscan.io",
};

/// Base Sepolia testnet.
pub const BASE_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Base Sepolia",
    chain_id: 84_532,
    rpc_url: "https://sepolia.base.org",
    explorer_url: "https://sepolia.basescan.org",
};

/// Confidential token metadata.
#[derive(Debug, Clone)]
pub struct ConfidentialTokenInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    /// Arbitrum Sepolia contract address
    pub arbitrum_sepolia_address: Option<&'static str>,
}

/// The Nocturne confidential token (`nUSD`) deployed on Arbitrum Sepolia.
pub const NUSD_TOKEN: ConfidentialTokenInfo = ConfidentialTokenInfo {
    symbol: "nUSD",
    name: "Nocturne USD",
    decimals: 18,
    arbitrum_sepolia_address: Some("0x3b3C98D7AfF91b7032d81fC25dfe8d8ECFe546CC"),
};

/// Which key authorizes a transfer submission.
///
/// Sell legs are signed by the connected user wallet (the user is the source
/// of funds); buy legs are signed by the platform liquidity custodian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    User,
    Platform,
}

impl std::fmt::Display for SignerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerRole::User => write!(f, "user"),
            SignerRole::Platform => write!(f, "platform"),
        }
    }
}

/// Opaque on-chain balance ciphertext.
///
/// An empty byte sequence is the "never transacted" sentinel and stands for
/// plaintext zero; it must not be fed to the codec. Length and byte patterns
/// carry no information about the underlying amount.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct EncryptedBalance(Vec<u8>);

impl EncryptedBalance {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The zero-value sentinel for accounts that never transacted.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for EncryptedBalance {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Debug must not leak ciphertext bytes into logs.
impl std::fmt::Debug for EncryptedBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedBalance({} bytes)", self.0.len())
    }
}

impl Serialize for EncryptedBalance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", alloy::hex::encode(&self.0)))
    }
}

/// Handle to a submitted ledger transaction.
///
/// Awaiting a handle only polls the receipt; it never resubmits, so the same
/// handle can be awaited again after a timeout.
#[derive(Debug, Clone, Serialize)]
pub struct TxHandle {
    /// Transaction hash
    pub tx_hash: String,
    /// Explorer URL for the transaction
    pub explorer_url: String,
}

/// Receipt for a confirmed ledger transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block number where the transaction was included
    pub block_number: u64,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether the transaction succeeded (false means reverted)
    pub success: bool,
    /// When finality was observed locally
    pub confirmed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sentinel_is_detected() {
        assert!(EncryptedBalance::empty().is_empty_sentinel());
        assert!(!EncryptedBalance::new(vec![1, 2, 3]).is_empty_sentinel());
    }

    #[test]
    fn debug_does_not_print_ciphertext() {
        let balance = EncryptedBalance::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let rendered = format!("{balance:?}");
        assert_eq!(rendered, "EncryptedBalance(4 bytes)");
        assert!(!rendered.contains("de"));
    }

    #[test]
    fn serializes_as_hex() {
        let balance = EncryptedBalance::new(vec![0xab, 0xcd]);
        let json = serde_json::to_string(&balance).unwrap();
        assert_eq!(json, "\"0xabcd\"");
    }

    #[test]
    fn nusd_address_parses() {
        let addr = NUSD_TOKEN.arbitrum_sepolia_address.unwrap();
        assert!(addr.parse::<alloy::primitives::Address>().is_ok());
    }
}
