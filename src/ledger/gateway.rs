// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Ledger gateway: the thin client over the external ledger.
//!
//! The gateway reads stored balance ciphertexts, submits signed transfer and
//! privileged rewrite calls, and waits for finality. It holds no cache; every
//! `read_balance` goes to the chain so reconciliation never sees stale
//! ciphertext from this process.

use std::time::Duration;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{Address, TxHash},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use chrono::Utc;

use crate::crypto::keys::SigningKeys;

use super::contract::{self, ConfidentialToken};
use super::types::{EncryptedBalance, NetworkConfig, Receipt, SignerRole, TxHandle};

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Confirmation not observed within {0:?}")]
    Timeout(Duration),

    #[error("No {0} signing key configured")]
    MissingSigner(SignerRole),
}

/// How long to poll for a transaction receipt before giving up.
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    /// Total wait before `LedgerError::Timeout`
    pub timeout: Duration,
    /// Receipt poll interval
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Operations the reconciler and orchestrator need from the ledger.
///
/// `EvmGateway` is the production implementation; tests substitute an
/// in-memory ledger.
#[allow(async_fn_in_trait)]
pub trait Ledger: Send + Sync {
    /// Read the current stored balance ciphertext for an account.
    ///
    /// Implementations must re-read on every call; serving a cached value
    /// during reconciliation is a correctness hazard.
    async fn read_balance(&self, account: Address) -> Result<EncryptedBalance, LedgerError>;

    /// Whether a signing key is configured for the given role.
    fn signer_available(&self, role: SignerRole) -> bool;

    /// Submit a transfer call signed by the given role.
    async fn submit_transfer(
        &self,
        role: SignerRole,
        from: Address,
        to: Address,
        encrypted_amount: &[u8],
    ) -> Result<TxHandle, LedgerError>;

    /// Submit the privileged atomic balance overwrite, signed by the
    /// reconciliation key.
    async fn submit_rewrite(
        &self,
        signer: &PrivateKeySigner,
        sender: Address,
        receiver: Address,
        sender_new: &EncryptedBalance,
        receiver_new: &EncryptedBalance,
    ) -> Result<TxHandle, LedgerError>;

    /// Wait for finality of a submitted transaction.
    ///
    /// Polls the receipt until confirmed, reverted, or the policy timeout
    /// elapses. Idempotent: awaiting the same handle again never resubmits.
    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, LedgerError>;
}

/// Production gateway over an EVM chain via alloy.
pub struct EvmGateway {
    network: NetworkConfig,
    token_address: Address,
    provider: HttpProvider,
    signers: SigningKeys,
    policy: ConfirmationPolicy,
}

impl EvmGateway {
    /// Create a gateway for the given network and token contract.
    pub fn new(
        network: NetworkConfig,
        token_address: Address,
        signers: SigningKeys,
        policy: ConfirmationPolicy,
    ) -> Result<Self, LedgerError> {
        let url: url::Url = network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            network,
            token_address,
            provider,
            signers,
            policy,
        })
    }

    /// The network this gateway talks to.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn token(&self) -> ConfidentialToken<HttpProvider> {
        ConfidentialToken::new(&self.provider, self.token_address)
    }

    /// Fetch the reconciliation public key published by the contract.
    pub async fn encryption_public_key(&self) -> Result<Vec<u8>, LedgerError> {
        self.token().encryption_public_key().await
    }

    /// Submit a platform-signed `mint` call (initial supply path).
    pub async fn submit_mint(
        &self,
        to: Address,
        encrypted_amount: &[u8],
    ) -> Result<TxHandle, LedgerError> {
        let signer = self
            .signers
            .for_role(SignerRole::Platform)
            .ok_or(LedgerError::MissingSigner(SignerRole::Platform))?
            .clone();
        let calldata = contract::mint_calldata(to, encrypted_amount);
        self.send_calldata(&signer, calldata).await
    }

    /// Build a signing provider and send calldata to the token contract.
    async fn send_calldata(
        &self,
        signer: &PrivateKeySigner,
        calldata: Vec<u8>,
    ) -> Result<TxHandle, LedgerError> {
        let url: url::Url = self
            .network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))?;

        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        let tx = TransactionRequest::default()
            .to(self.token_address)
            .input(calldata.into());

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| LedgerError::Submission(e.to_string()))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        let explorer_url = format!("{}/tx/{}", self.network.explorer_url, tx_hash);

        tracing::debug!(%tx_hash, "Submitted ledger transaction");

        Ok(TxHandle {
            tx_hash,
            explorer_url,
        })
    }
}

impl Ledger for EvmGateway {
    async fn read_balance(&self, account: Address) -> Result<EncryptedBalance, LedgerError> {
        self.token().balance_of(account).await
    }

    fn signer_available(&self, role: SignerRole) -> bool {
        self.signers.for_role(role).is_some()
    }

    async fn submit_transfer(
        &self,
        role: SignerRole,
        from: Address,
        to: Address,
        encrypted_amount: &[u8],
    ) -> Result<TxHandle, LedgerError> {
        let signer = self
            .signers
            .for_role(role)
            .ok_or(LedgerError::MissingSigner(role))?
            .clone();

        if signer.address() != from {
            return Err(LedgerError::InvalidAddress(format!(
                "{role} signer {} does not own source account {from}",
                signer.address()
            )));
        }

        let calldata = contract::transfer_calldata(to, encrypted_amount);
        self.send_calldata(&signer, calldata).await
    }

    async fn submit_rewrite(
        &self,
        signer: &PrivateKeySigner,
        sender: Address,
        receiver: Address,
        sender_new: &EncryptedBalance,
        receiver_new: &EncryptedBalance,
    ) -> Result<TxHandle, LedgerError> {
        let calldata = contract::update_balance_calldata(sender, receiver, sender_new, receiver_new);
        self.send_calldata(signer, calldata).await
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, LedgerError> {
        let hash: TxHash = handle
            .tx_hash
            .parse()
            .map_err(|e| LedgerError::InvalidAddress(format!("invalid tx hash: {e}")))?;

        let deadline = tokio::time::Instant::now() + self.policy.timeout;

        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| LedgerError::Rpc(format!("failed to get receipt: {e}")))?;

            if let Some(r) = receipt {
                if !r.status() {
                    return Err(LedgerError::Reverted(handle.tx_hash.clone()));
                }
                return Ok(Receipt {
                    tx_hash: handle.tx_hash.clone(),
                    block_number: r.block_number.unwrap_or(0),
                    gas_used: r.gas_used as u64,
                    success: true,
                    confirmed_at: Utc::now(),
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::Timeout(self.policy.timeout));
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_bounded() {
        let policy = ConfirmationPolicy::default();
        assert!(policy.timeout > policy.poll_interval);
    }

    #[test]
    fn gateway_rejects_bad_rpc_url() {
        let network = NetworkConfig {
            rpc_url: "not a url",
            ..super::super::types::ARBITRUM_SEPOLIA
        };
        let result = EvmGateway::new(
            network,
            Address::ZERO,
            SigningKeys::default(),
            ConfirmationPolicy::default(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidRpcUrl(_))));
    }
}
