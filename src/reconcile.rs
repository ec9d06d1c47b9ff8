// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Balance reconciler.
//!
//! After a transfer is final on-chain, the encrypted bookkeeping still has to
//! catch up: read both parties' ciphertexts, decrypt, apply the delta,
//! re-encrypt, and overwrite both balances in one privileged ledger call.
//!
//! The ledger has no read locking, so the read-decrypt-recompute-write
//! sequence is guarded by an in-process lock per account; at most one
//! reconciliation is in flight per account at a time. Without this, two
//! concurrent transfers against the same account read the same pre-state and
//! one update is lost.
//!
//! Reconciliation is idempotent given the same accounts and pre-state, so
//! ledger failures are retried with exponential backoff. Every retry re-reads
//! the balances; stale ciphertexts are never resubmitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::crypto::keys::KeyError;
use crate::crypto::{codec, CodecError, ReconciliationKey};
use crate::ledger::{EncryptedBalance, Ledger, LedgerError};

/// Errors from a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Transfer between identical accounts")]
    SameAccount,

    #[error("Failed to read balance for {account}")]
    Read {
        account: Address,
        #[source]
        source: LedgerError,
    },

    /// A stored ciphertext could not be decrypted. The balance is unknown,
    /// not zero; nothing is applied.
    #[error("Balance ciphertext unreadable for {account}")]
    Decrypt {
        account: Address,
        #[source]
        source: CodecError,
    },

    #[error("Failed to re-encrypt balance")]
    Encrypt(#[source] CodecError),

    #[error("Receiver balance overflow")]
    BalanceOverflow,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Rewrite not confirmed after {attempts} attempt(s)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LedgerError,
    },
}

/// Outcome of a completed reconciliation. Write-once.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// New sender balance ciphertext as written on-chain
    pub sender_new_balance: EncryptedBalance,
    /// New receiver balance ciphertext as written on-chain
    pub receiver_new_balance: EncryptedBalance,
    /// The amount that was applied, in base units
    pub applied_amount: U256,
    /// Hash of the confirmed rewrite transaction
    pub rewrite_tx_hash: String,
}

/// Retry behavior for the rewrite leg.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Whether a failed attempt may be retried with fresh reads.
enum AttemptError {
    Fatal(ReconcileError),
    Retryable(LedgerError),
}

/// Reconciles encrypted ledger balances after confirmed transfers.
///
/// Sole holder of the reconciliation secret key.
pub struct Reconciler<L> {
    ledger: Arc<L>,
    key: ReconciliationKey,
    policy: RetryPolicy,
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl<L: Ledger> Reconciler<L> {
    pub fn new(ledger: Arc<L>, key: ReconciliationKey) -> Self {
        Self::with_policy(ledger, key, RetryPolicy::default())
    }

    pub fn with_policy(ledger: Arc<L>, key: ReconciliationKey, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            key,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The reconciliation public key (the encryption target for balances).
    pub fn encryption_key(&self) -> &k256::PublicKey {
        self.key.public()
    }

    /// Read and decrypt the current balance of an account.
    pub async fn current_balance(&self, account: Address) -> Result<U256, ReconcileError> {
        let cipher = self
            .ledger
            .read_balance(account)
            .await
            .map_err(|source| ReconcileError::Read { account, source })?;
        decrypt_balance(&self.key, account, &cipher)
    }

    /// Apply a confirmed transfer of `amount` from `sender` to `receiver` to
    /// the encrypted balances.
    pub async fn reconcile(
        &self,
        sender: Address,
        receiver: Address,
        amount: U256,
    ) -> Result<ReconciliationResult, ReconcileError> {
        if sender == receiver {
            return Err(ReconcileError::SameAccount);
        }

        // Lock both accounts in canonical order so concurrent reconciliations
        // touching the same pair cannot deadlock.
        let (first, second) = if sender < receiver {
            (sender, receiver)
        } else {
            (receiver, sender)
        };
        let first_guard = self.account_lock(first).await.lock_owned().await;
        let second_guard = self.account_lock(second).await.lock_owned().await;

        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            match self.attempt(sender, receiver, amount).await {
                Ok(result) => {
                    tracing::info!(
                        %sender,
                        %receiver,
                        amount = %amount,
                        tx_hash = %result.rewrite_tx_hash,
                        attempt,
                        "Reconciliation confirmed"
                    );
                    break Ok(result);
                }
                Err(AttemptError::Fatal(e)) => break Err(e),
                Err(AttemptError::Retryable(e)) => {
                    if attempt >= self.policy.max_attempts {
                        break Err(ReconcileError::RetriesExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = backoff_delay(&self.policy, attempt);
                    tracing::warn!(
                        %sender,
                        %receiver,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Rewrite failed, retrying from fresh reads"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        drop(second_guard);
        drop(first_guard);
        self.prune_locks([first, second]).await;

        result
    }

    /// One full read-decrypt-recompute-encrypt-write pass.
    async fn attempt(
        &self,
        sender: Address,
        receiver: Address,
        amount: U256,
    ) -> Result<ReconciliationResult, AttemptError> {
        let (sender_cipher, receiver_cipher) = tokio::join!(
            self.ledger.read_balance(sender),
            self.ledger.read_balance(receiver)
        );
        let sender_cipher = sender_cipher.map_err(AttemptError::Retryable)?;
        let receiver_cipher = receiver_cipher.map_err(AttemptError::Retryable)?;

        let sender_current =
            decrypt_balance(&self.key, sender, &sender_cipher).map_err(AttemptError::Fatal)?;
        let receiver_current =
            decrypt_balance(&self.key, receiver, &receiver_cipher).map_err(AttemptError::Fatal)?;

        // Clamp at zero: an external adjustment may have reduced the sender's
        // true balance below the debit. The shortfall is lost, so it is at
        // least made visible to operators.
        let sender_new = sender_current.saturating_sub(amount);
        if sender_current < amount {
            tracing::warn!(
                %sender,
                shortfall = %(amount - sender_current),
                "Sender balance clamped to zero during reconciliation"
            );
        }

        let receiver_new = receiver_current
            .checked_add(amount)
            .ok_or(AttemptError::Fatal(ReconcileError::BalanceOverflow))?;

        let sender_sealed = codec::encrypt(self.key.public(), sender_new)
            .map_err(|e| AttemptError::Fatal(ReconcileError::Encrypt(e)))?;
        let receiver_sealed = codec::encrypt(self.key.public(), receiver_new)
            .map_err(|e| AttemptError::Fatal(ReconcileError::Encrypt(e)))?;

        let sender_sealed = EncryptedBalance::new(sender_sealed);
        let receiver_sealed = EncryptedBalance::new(receiver_sealed);

        let signer = self
            .key
            .rewrite_signer()
            .map_err(|e| AttemptError::Fatal(ReconcileError::Key(e)))?;

        let handle = self
            .ledger
            .submit_rewrite(&signer, sender, receiver, &sender_sealed, &receiver_sealed)
            .await
            .map_err(AttemptError::Retryable)?;

        let receipt = self
            .ledger
            .await_confirmation(&handle)
            .await
            .map_err(AttemptError::Retryable)?;

        Ok(ReconciliationResult {
            sender_new_balance: sender_sealed,
            receiver_new_balance: receiver_sealed,
            applied_amount: amount,
            rewrite_tx_hash: receipt.tx_hash,
        })
    }

    async fn account_lock(&self, account: Address) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop registry entries no other task holds or waits on, so the map
    /// stays bounded by in-flight reconciliations rather than growing with
    /// every account ever seen.
    async fn prune_locks(&self, accounts: [Address; 2]) {
        let mut locks = self.locks.lock().await;
        for account in accounts {
            if locks
                .get(&account)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&account);
            }
        }
    }
}

/// Decrypt a stored balance, treating the empty sentinel as zero.
fn decrypt_balance(
    key: &ReconciliationKey,
    account: Address,
    cipher: &EncryptedBalance,
) -> Result<U256, ReconcileError> {
    if cipher.is_empty_sentinel() {
        return Ok(U256::ZERO);
    }
    codec::decrypt(key.secret(), cipher.as_bytes())
        .map_err(|source| ReconcileError::Decrypt { account, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::signers::local::PrivateKeySigner;

    use crate::ledger::{Receipt, SignerRole, TxHandle};

    /// Ledger whose RPC endpoint is unreachable.
    struct OfflineLedger;

    impl Ledger for OfflineLedger {
        async fn read_balance(&self, _: Address) -> Result<EncryptedBalance, LedgerError> {
            Err(LedgerError::Rpc("connection refused".to_string()))
        }

        fn signer_available(&self, _: SignerRole) -> bool {
            false
        }

        async fn submit_transfer(
            &self,
            _: SignerRole,
            _: Address,
            _: Address,
            _: &[u8],
        ) -> Result<TxHandle, LedgerError> {
            Err(LedgerError::Rpc("connection refused".to_string()))
        }

        async fn submit_rewrite(
            &self,
            _: &PrivateKeySigner,
            _: Address,
            _: Address,
            _: &EncryptedBalance,
            _: &EncryptedBalance,
        ) -> Result<TxHandle, LedgerError> {
            Err(LedgerError::Rpc("connection refused".to_string()))
        }

        async fn await_confirmation(&self, _: &TxHandle) -> Result<Receipt, LedgerError> {
            Err(LedgerError::Rpc("connection refused".to_string()))
        }
    }

    fn offline_reconciler() -> Reconciler<OfflineLedger> {
        Reconciler::with_policy(
            Arc::new(OfflineLedger),
            ReconciliationKey::random(),
            RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn read_failure_in_current_balance_is_a_read_error() {
        let reconciler = offline_reconciler();
        let account = Address::repeat_byte(0x04);
        let result = reconciler.current_balance(account).await;
        match result {
            Err(ReconcileError::Read { account: failed, .. }) => assert_eq!(failed, account),
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lock_registry_is_pruned_after_reconcile() {
        let reconciler = offline_reconciler();
        let sender = Address::repeat_byte(0x05);
        let receiver = Address::repeat_byte(0x06);

        let result = reconciler.reconcile(sender, receiver, U256::from(1u64)).await;
        assert!(matches!(result, Err(ReconcileError::RetriesExhausted { .. })));

        // No task holds either lock any more, so the registry is empty.
        assert!(reconciler.locks.lock().await.is_empty());
    }

    #[test]
    fn empty_sentinel_decrypts_to_zero() {
        let key = ReconciliationKey::random();
        let account = Address::repeat_byte(0x01);
        let balance = decrypt_balance(&key, account, &EncryptedBalance::empty()).unwrap();
        assert_eq!(balance, U256::ZERO);
    }

    #[test]
    fn unreadable_ciphertext_is_not_zero() {
        let key = ReconciliationKey::random();
        let account = Address::repeat_byte(0x02);
        let garbage = EncryptedBalance::new(vec![0xff; 80]);
        let result = decrypt_balance(&key, account, &garbage);
        assert!(matches!(result, Err(ReconcileError::Decrypt { .. })));
    }

    #[test]
    fn stored_ciphertext_round_trips() {
        let key = ReconciliationKey::random();
        let account = Address::repeat_byte(0x03);
        let cipher = EncryptedBalance::new(
            codec::encrypt(key.public(), U256::from(1234u64)).unwrap(),
        );
        let balance = decrypt_balance(&key, account, &cipher).unwrap();
        assert_eq!(balance, U256::from(1234u64));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(400));
    }
}
