// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Confidential token contract interactions.
//!
//! The token stores every balance as an opaque ciphertext. `balanceOf`
//! returns bytes, `transfer` and `mint` take an encrypted amount, and the
//! privileged `updateBalance` overwrites both parties' ciphertexts in one
//! ledger operation.

use alloy::{
    primitives::{Address, Bytes},
    providers::Provider,
    sol,
    sol_types::SolCall,
};

use super::gateway::LedgerError;
use super::types::EncryptedBalance;

// Confidential token interface. Amounts are ciphertexts, never uint256.
sol! {
    #[sol(rpc)]
    interface IConfidentialToken {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function encryptionPublicKey() external view returns (bytes);
        function balanceOf(address account) external view returns (bytes);
        function transfer(address to, bytes encryptedAmount) external;
        function mint(address to, bytes encryptedAmount) external;
        function updateBalance(address sender, address receiver, bytes senderBalance, bytes receiverBalance) external;
    }
}

/// Confidential token contract wrapper.
pub struct ConfidentialToken<P> {
    contract: IConfidentialToken::IConfidentialTokenInstance<P>,
    address: Address,
}

impl<P: Provider + Clone> ConfidentialToken<P> {
    /// Create a new contract instance at the given address.
    pub fn new(provider: &P, address: Address) -> Self {
        let contract = IConfidentialToken::new(address, provider.clone());
        Self { contract, address }
    }

    /// The contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the token symbol.
    pub async fn symbol(&self) -> Result<String, LedgerError> {
        let result = self
            .contract
            .symbol()
            .call()
            .await
            .map_err(|e| LedgerError::Contract(e.to_string()))?;
        Ok(result.to_string())
    }

    /// Get the token decimals.
    pub async fn decimals(&self) -> Result<u8, LedgerError> {
        self.contract
            .decimals()
            .call()
            .await
            .map_err(|e| LedgerError::Contract(e.to_string()))
    }

    /// Read the reconciliation public key published by the contract.
    ///
    /// Returned as raw SEC1 bytes; parsing belongs to `crypto::keys`.
    pub async fn encryption_public_key(&self) -> Result<Vec<u8>, LedgerError> {
        let result = self
            .contract
            .encryptionPublicKey()
            .call()
            .await
            .map_err(|e| LedgerError::Contract(e.to_string()))?;
        Ok(result.to_vec())
    }

    /// Read the stored balance ciphertext for an account.
    ///
    /// Accounts that never transacted return the empty sentinel.
    pub async fn balance_of(&self, account: Address) -> Result<EncryptedBalance, LedgerError> {
        let result = self
            .contract
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| LedgerError::Contract(e.to_string()))?;
        Ok(EncryptedBalance::new(result.to_vec()))
    }
}

/// ABI-encode a `transfer(to, encryptedAmount)` call.
pub fn transfer_calldata(to: Address, encrypted_amount: &[u8]) -> Vec<u8> {
    IConfidentialToken::transferCall {
        to,
        encryptedAmount: Bytes::copy_from_slice(encrypted_amount),
    }
    .abi_encode()
}

/// ABI-encode a `mint(to, encryptedAmount)` call.
pub fn mint_calldata(to: Address, encrypted_amount: &[u8]) -> Vec<u8> {
    IConfidentialToken::mintCall {
        to,
        encryptedAmount: Bytes::copy_from_slice(encrypted_amount),
    }
    .abi_encode()
}

/// ABI-encode the privileged `updateBalance` call.
///
/// Both new ciphertexts land in a single ledger operation so no observer can
/// see a state where only one side has been rewritten.
pub fn update_balance_calldata(
    sender: Address,
    receiver: Address,
    sender_balance: &EncryptedBalance,
    receiver_balance: &EncryptedBalance,
) -> Vec<u8> {
    IConfidentialToken::updateBalanceCall {
        sender,
        receiver,
        senderBalance: Bytes::copy_from_slice(sender_balance.as_bytes()),
        receiverBalance: Bytes::copy_from_slice(receiver_balance.as_bytes()),
    }
    .abi_encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_calldata_has_selector_and_payload() {
        let to = Address::repeat_byte(0x11);
        let data = transfer_calldata(to, &[0xaa, 0xbb]);
        // 4-byte selector + two ABI words minimum
        assert!(data.len() > 4 + 64);
        assert_eq!(&data[..4], IConfidentialToken::transferCall::SELECTOR);
    }

    #[test]
    fn update_balance_calldata_distinct_from_transfer() {
        let a = Address::repeat_byte(0x11);
        let b = Address::repeat_byte(0x22);
        let data = update_balance_calldata(
            a,
            b,
            &EncryptedBalance::new(vec![1]),
            &EncryptedBalance::new(vec![2]),
        );
        assert_eq!(&data[..4], IConfidentialToken::updateBalanceCall::SELECTOR);
        assert_ne!(&data[..4], IConfidentialToken::transferCall::SELECTOR);
    }
}
