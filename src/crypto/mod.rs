// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Cryptography for the confidential balance protocol.
//!
//! - `codec`: ECIES encryption/decryption of amounts
//! - `keys`: key material for the user, platform, and reconciliation roles

pub mod codec;
pub mod keys;

pub use codec::CodecError;
pub use keys::{KeyError, ReconciliationKey, SigningKeys};
