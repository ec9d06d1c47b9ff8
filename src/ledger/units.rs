// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Conversion between human-readable amounts and token base units.
//!
//! The codec encrypts base-unit integers rendered as decimal strings; these
//! helpers sit at the request boundary where users type "1.5".

use alloy::primitives::U256;

use super::gateway::LedgerError;

/// Parse a human-readable amount to token base units.
///
/// # Arguments
/// * `amount` - Amount as a string (e.g., "1.5")
/// * `decimals` - Number of decimals (18 for nUSD)
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, LedgerError> {
    let amount = amount.trim();
    if amount.starts_with('-') {
        return Err(LedgerError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }

    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 {
        return Err(LedgerError::InvalidAmount(
            "invalid amount format".to_string(),
        ));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| LedgerError::InvalidAmount("invalid whole number".to_string()))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.len() > decimals as usize {
            return Err(LedgerError::InvalidAmount(format!(
                "too many decimal places (max {decimals})"
            )));
        }
        // Pad with zeros to match decimals
        let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| LedgerError::InvalidAmount("invalid decimal".to_string()))?
    } else {
        0u128
    };

    let multiplier = 10u128.pow(decimals as u32);
    let total = whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(decimal_part))
        .ok_or_else(|| LedgerError::InvalidAmount("amount overflow".to_string()))?;

    Ok(U256::from(total))
}

/// Format token base units to a human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_whole() {
        let result = parse_amount("1", 18).unwrap();
        assert_eq!(result, U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn parse_amount_decimal() {
        let result = parse_amount("1.5", 18).unwrap();
        assert_eq!(result, U256::from(1_500_000_000_000_000_000u64));
    }

    #[test]
    fn parse_amount_small() {
        let result = parse_amount("0.001", 18).unwrap();
        assert_eq!(result, U256::from(1_000_000_000_000_000u64));
    }

    #[test]
    fn parse_amount_rejects_negative() {
        assert!(parse_amount("-3", 18).is_err());
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert!(parse_amount("1.2.3", 18).is_err());
        assert!(parse_amount("abc", 18).is_err());
    }

    #[test]
    fn format_amount_roundtrips() {
        let one = U256::from(1_000_000_000_000_000_000u64);
        assert_eq!(format_amount(one, 18), "1");

        let one_and_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_amount(one_and_half, 18), "1.5");

        assert_eq!(format_amount(U256::ZERO, 18), "0");
    }
}
