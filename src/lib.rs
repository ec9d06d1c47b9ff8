// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Nocturne - Confidential Balance Protocol
//!
//! This crate keeps per-account token balances encrypted on a public EVM
//! ledger. Balance ciphertexts are opaque to everyone except the holder of
//! the reconciliation key, which settles confirmed transfers by rewriting
//! both parties' ciphertexts atomically.
//!
//! ## Modules
//!
//! - `crypto` - ECIES codec and key material for the protocol roles
//! - `ledger` - Gateway to the confidential token contract (alloy)
//! - `reconcile` - Post-transfer encrypted balance reconciliation
//! - `orchestrator` - End-to-end transfer state machine
//! - `config` - Environment-driven runtime configuration

pub mod config;
pub mod crypto;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
