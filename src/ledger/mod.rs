// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Ledger integration module.
//!
//! This module provides functionality for:
//! - Reading stored balance ciphertexts from the confidential token
//! - Submitting signed transfer and privileged rewrite calls
//! - Waiting for transaction finality

pub mod contract;
pub mod gateway;
pub mod types;
pub mod units;

pub use gateway::{ConfirmationPolicy, EvmGateway, Ledger, LedgerError};
pub use types::*;
pub use units::{format_amount, parse_amount};
