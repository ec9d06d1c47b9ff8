// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Transaction orchestrator.
//!
//! Sequences an end-to-end confidential transfer as an explicit state
//! machine:
//!
//! ```text
//! Validating -> Signing -> AwaitingTransfer -> Reconciling -> Done
//!      \___________\____________\__________________\-> Failed(reason)
//! ```
//!
//! Transitions are a pure function of `(state, event)`; the driver performs
//! the effects and feeds the events. The transfer leg is submitted at most
//! once per request. A caller may abandon the local confirmation waits, but
//! a submitted transaction is never cancelled; its bookkeeping is then
//! reconciled out-of-band.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use k256::PublicKey;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crypto::codec;
use crate::ledger::{Ledger, LedgerError, NetworkConfig, SignerRole, TxHandle};
use crate::reconcile::{ReconcileError, ReconciliationResult, Reconciler};

/// Trade direction, resolved once during validation and carried through the
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Platform is the source of funds (liquidity custodian pays out).
    Buy,
    /// User is the source of funds.
    Sell,
}

impl Direction {
    pub fn signer_role(self) -> SignerRole {
        match self {
            Direction::Buy => SignerRole::Platform,
            Direction::Sell => SignerRole::User,
        }
    }
}

/// A single transfer request. Consumed once; never persisted.
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub from: Address,
    pub to: Address,
    /// Amount in token base units; must be positive
    pub amount: U256,
    pub direction: Direction,
}

/// The connected wallet session: account, active chain, and the ability to
/// request a chain switch. No signing happens through this seam; signers are
/// held by the ledger gateway.
#[allow(async_fn_in_trait)]
pub trait Wallet: Send + Sync {
    /// The connected account, if any.
    fn address(&self) -> Option<Address>;

    /// The currently active chain.
    fn chain_id(&self) -> u64;

    /// Ask the wallet to switch to the given chain. Returns whether the
    /// switch happened.
    async fn request_chain_switch(&self, chain_id: u64) -> bool;
}

/// Why a transfer request terminated in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    /// Bad user input; nothing was submitted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing key material; an operator fault, not retryable by the user.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The ledger rejected, reverted, or timed out the transfer leg. No
    /// funds moved; the whole request is safe to retry.
    #[error("Transfer leg failed")]
    TransferFailed(#[source] LedgerError),

    /// The transfer is final on-chain but the bookkeeping write failed.
    /// Never retry the transfer leg; re-run reconciliation alone.
    #[error("Reconciliation failed after confirmed transfer")]
    ReconciliationFailed(#[source] ReconcileError),
}

/// Per-request state machine states.
#[derive(Debug)]
pub enum TransferState {
    Validating,
    Signing,
    AwaitingTransfer { tx_hash: String },
    Reconciling { tx_hash: String },
    Done { tx_hash: String },
    Failed(FailureReason),
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Done { .. } | TransferState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Validating => "validating",
            TransferState::Signing => "signing",
            TransferState::AwaitingTransfer { .. } => "awaiting_transfer",
            TransferState::Reconciling { .. } => "reconciling",
            TransferState::Done { .. } => "done",
            TransferState::Failed(_) => "failed",
        }
    }
}

/// Events produced by the effectful driver.
#[derive(Debug)]
pub enum TransferEvent {
    Validated,
    Submitted(String),
    Confirmed,
    Reconciled,
    Failed(FailureReason),
}

/// Pure transition function of the transfer state machine.
pub fn transition(state: TransferState, event: TransferEvent) -> TransferState {
    use TransferEvent as E;
    use TransferState as S;

    match (state, event) {
        (S::Validating, E::Validated) => S::Signing,
        (S::Signing, E::Submitted(tx_hash)) => S::AwaitingTransfer { tx_hash },
        (S::AwaitingTransfer { tx_hash }, E::Confirmed) => S::Reconciling { tx_hash },
        (S::Reconciling { tx_hash }, E::Reconciled) => S::Done { tx_hash },
        (state, E::Failed(reason)) if !state.is_terminal() => S::Failed(reason),
        // Terminal states absorb; out-of-order events leave the state as is.
        (state, _) => state,
    }
}

/// Terminal report for one transfer request.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Transfer and reconciliation both confirmed.
    Done {
        request_id: Uuid,
        tx_hash: String,
        reconciliation: ReconciliationResult,
    },
    /// Terminal failure; `tx_hash` is set when the transfer leg was
    /// submitted before the failure.
    Failed {
        request_id: Uuid,
        reason: FailureReason,
        tx_hash: Option<String>,
    },
    /// The caller abandoned the local wait. The submitted transaction is
    /// still in flight and must be reconciled on next observation.
    Abandoned { request_id: Uuid, tx_hash: String },
}

impl TransferOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, TransferOutcome::Done { .. })
    }
}

/// Drives transfer requests through the state machine.
pub struct Orchestrator<L, W> {
    ledger: Arc<L>,
    wallet: W,
    reconciler: Reconciler<L>,
    /// Encryption target for transfer amounts; absent means misconfigured.
    encryption_key: Option<PublicKey>,
    network: NetworkConfig,
}

impl<L: Ledger, W: Wallet> Orchestrator<L, W> {
    pub fn new(
        ledger: Arc<L>,
        wallet: W,
        reconciler: Reconciler<L>,
        encryption_key: Option<PublicKey>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            ledger,
            wallet,
            reconciler,
            encryption_key,
            network,
        }
    }

    /// Execute one transfer request to a terminal outcome.
    ///
    /// `cancel` abandons the local confirmation waits only; it never cancels
    /// a transaction that has already been submitted.
    pub async fn execute(
        &self,
        intent: TransferIntent,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        let request_id = Uuid::new_v4();
        let mut state = TransferState::Validating;

        tracing::info!(
            %request_id,
            from = %intent.from,
            to = %intent.to,
            direction = ?intent.direction,
            "Transfer request received"
        );

        // Validating
        if let Err(reason) = self.validate(&intent).await {
            return self.fail(request_id, &state, reason, None);
        }
        state = self.advance(request_id, state, TransferEvent::Validated);

        // Signing
        let handle = match self.sign_and_submit(&intent).await {
            Ok(handle) => handle,
            Err(reason) => return self.fail(request_id, &state, reason, None),
        };
        let tx_hash = handle.tx_hash.clone();
        state = self.advance(request_id, state, TransferEvent::Submitted(tx_hash.clone()));

        // AwaitingTransfer
        let confirmation = tokio::select! {
            r = self.ledger.await_confirmation(&handle) => r,
            _ = cancel.cancelled() => {
                return self.abandon(request_id, tx_hash);
            }
        };
        if let Err(e) = confirmation {
            return self.fail(
                request_id,
                &state,
                FailureReason::TransferFailed(e),
                Some(tx_hash),
            );
        }
        state = self.advance(request_id, state, TransferEvent::Confirmed);

        // Reconciling, with the plaintext amount the orchestrator already
        // holds; never re-derived from the submitted ciphertext.
        let reconciliation = tokio::select! {
            r = self.reconciler.reconcile(intent.from, intent.to, intent.amount) => r,
            _ = cancel.cancelled() => {
                return self.abandon(request_id, tx_hash);
            }
        };
        let reconciliation = match reconciliation {
            Ok(result) => result,
            Err(e) => {
                return self.fail(
                    request_id,
                    &state,
                    FailureReason::ReconciliationFailed(e),
                    Some(tx_hash),
                );
            }
        };
        state = self.advance(request_id, state, TransferEvent::Reconciled);
        debug_assert!(state.is_terminal());

        tracing::info!(%request_id, %tx_hash, "Transfer complete");
        TransferOutcome::Done {
            request_id,
            tx_hash,
            reconciliation,
        }
    }

    async fn validate(&self, intent: &TransferIntent) -> Result<(), FailureReason> {
        if intent.amount.is_zero() {
            return Err(FailureReason::InvalidRequest(
                "transfer amount must be positive".to_string(),
            ));
        }

        if intent.from == intent.to {
            return Err(FailureReason::InvalidRequest(
                "sender and receiver must differ".to_string(),
            ));
        }

        let Some(wallet_address) = self.wallet.address() else {
            return Err(FailureReason::InvalidRequest(
                "no wallet connected".to_string(),
            ));
        };

        if intent.direction == Direction::Sell && wallet_address != intent.from {
            return Err(FailureReason::InvalidRequest(
                "connected wallet does not own the source account".to_string(),
            ));
        }

        if self.wallet.chain_id() != self.network.chain_id {
            let switched = self.wallet.request_chain_switch(self.network.chain_id).await;
            if !switched {
                return Err(FailureReason::InvalidRequest(format!(
                    "wrong chain active; {} (chain id {}) is required",
                    self.network.name, self.network.chain_id
                )));
            }
            tracing::info!(chain_id = self.network.chain_id, "Wallet switched chains");
        }

        Ok(())
    }

    async fn sign_and_submit(&self, intent: &TransferIntent) -> Result<TxHandle, FailureReason> {
        let role = intent.direction.signer_role();

        if !self.ledger.signer_available(role) {
            return Err(FailureReason::ConfigurationError(format!(
                "no {role} signing key configured"
            )));
        }

        let Some(key) = self.encryption_key.as_ref() else {
            return Err(FailureReason::ConfigurationError(
                "reconciliation public key not configured".to_string(),
            ));
        };

        let sealed = codec::encrypt(key, intent.amount).map_err(|e| {
            FailureReason::ConfigurationError(format!("failed to encrypt transfer amount: {e}"))
        })?;

        self.ledger
            .submit_transfer(role, intent.from, intent.to, &sealed)
            .await
            .map_err(FailureReason::TransferFailed)
    }

    fn advance(
        &self,
        request_id: Uuid,
        state: TransferState,
        event: TransferEvent,
    ) -> TransferState {
        let next = transition(state, event);
        tracing::debug!(%request_id, state = next.name(), "Transfer state advanced");
        next
    }

    fn fail(
        &self,
        request_id: Uuid,
        state: &TransferState,
        reason: FailureReason,
        tx_hash: Option<String>,
    ) -> TransferOutcome {
        tracing::warn!(
            %request_id,
            from_state = state.name(),
            error = %reason,
            "Transfer failed"
        );
        TransferOutcome::Failed {
            request_id,
            reason,
            tx_hash,
        }
    }

    fn abandon(&self, request_id: Uuid, tx_hash: String) -> TransferOutcome {
        tracing::info!(
            %request_id,
            %tx_hash,
            "Local wait abandoned; submitted transaction remains in flight"
        );
        TransferOutcome::Abandoned {
            request_id,
            tx_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason() -> FailureReason {
        FailureReason::InvalidRequest("test".to_string())
    }

    #[test]
    fn happy_path_transitions() {
        let state = TransferState::Validating;
        let state = transition(state, TransferEvent::Validated);
        assert!(matches!(state, TransferState::Signing));

        let state = transition(state, TransferEvent::Submitted("0xabc".to_string()));
        assert!(matches!(state, TransferState::AwaitingTransfer { .. }));

        let state = transition(state, TransferEvent::Confirmed);
        assert!(matches!(state, TransferState::Reconciling { .. }));

        let state = transition(state, TransferEvent::Reconciled);
        match state {
            TransferState::Done { tx_hash } => assert_eq!(tx_hash, "0xabc"),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn failure_reachable_from_any_non_terminal_state() {
        for state in [
            TransferState::Validating,
            TransferState::Signing,
            TransferState::AwaitingTransfer {
                tx_hash: "0x1".to_string(),
            },
            TransferState::Reconciling {
                tx_hash: "0x1".to_string(),
            },
        ] {
            let next = transition(state, TransferEvent::Failed(reason()));
            assert!(matches!(next, TransferState::Failed(_)));
        }
    }

    #[test]
    fn terminal_states_absorb_events() {
        let done = TransferState::Done {
            tx_hash: "0x1".to_string(),
        };
        let next = transition(done, TransferEvent::Failed(reason()));
        assert!(matches!(next, TransferState::Done { .. }));

        let failed = TransferState::Failed(reason());
        let next = transition(failed, TransferEvent::Confirmed);
        assert!(matches!(next, TransferState::Failed(_)));
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let state = transition(TransferState::Validating, TransferEvent::Confirmed);
        assert!(matches!(state, TransferState::Validating));
    }

    #[test]
    fn direction_resolves_signer_role() {
        assert_eq!(Direction::Buy.signer_role(), SignerRole::Platform);
        assert_eq!(Direction::Sell.signer_role(), SignerRole::User);
    }
}
