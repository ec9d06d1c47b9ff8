// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Nocturne Labs

//! Asymmetric codec for balance and transfer-amount values.
//!
//! ECIES over secp256k1: an ephemeral ECDH agreement per call, HKDF-SHA256
//! key derivation, AES-256-GCM with a random nonce. The plaintext is the
//! base-unit amount rendered as a decimal string.
//!
//! Ciphertext layout:
//!
//! ```text
//! compressed ephemeral public key (33) || nonce (12) || ciphertext + tag
//! ```
//!
//! Every call draws fresh randomness, so identical amounts never produce
//! identical ciphertexts. Pure and stateless; safe to call concurrently.

use aes_gcm::{
    aead::{Aead, OsRng},
    AeadCore, Aes256Gcm, KeyInit, Nonce,
};
use alloy::primitives::U256;
use hkdf::Hkdf;
use k256::{
    ecdh::{diffie_hellman, EphemeralSecret},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use sha2::Sha256;
use zeroize::Zeroize;

const EPHEMERAL_KEY_LEN: usize = 33;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KDF_INFO: &[u8] = b"nocturne-balance-v1";

/// Errors from the asymmetric codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Ciphertext framing is wrong before any cryptography runs.
    #[error("Malformed ciphertext: {0}")]
    Malformed(&'static str),

    /// Authentication failed, wrong key, or unreadable plaintext. The caller
    /// must treat the balance as unknown, never as zero.
    #[error("Decryption failed")]
    Decryption,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    Encryption,
}

/// Encrypt an amount under the reconciliation public key.
pub fn encrypt(public_key: &PublicKey, amount: U256) -> Result<Vec<u8>, CodecError> {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key();

    let shared = ephemeral.diffie_hellman(public_key);
    let mut key = derive_symmetric_key(shared.raw_secret_bytes());

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CodecError::Encryption)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, amount.to_string().as_bytes())
        .map_err(|_| CodecError::Encryption)?;
    key.zeroize();

    let ephemeral_point = ephemeral_public.to_encoded_point(true);
    let mut out = Vec::with_capacity(EPHEMERAL_KEY_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(ephemeral_point.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a balance ciphertext under the reconciliation secret key.
pub fn decrypt(secret_key: &SecretKey, ciphertext: &[u8]) -> Result<U256, CodecError> {
    if ciphertext.len() < EPHEMERAL_KEY_LEN + NONCE_LEN + TAG_LEN {
        return Err(CodecError::Malformed("ciphertext too short"));
    }

    let (ephemeral_bytes, rest) = ciphertext.split_at(EPHEMERAL_KEY_LEN);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

    let ephemeral_public = PublicKey::from_sec1_bytes(ephemeral_bytes)
        .map_err(|_| CodecError::Malformed("invalid ephemeral public key"))?;

    let shared = diffie_hellman(secret_key.to_nonzero_scalar(), ephemeral_public.as_affine());
    let mut key = derive_symmetric_key(shared.raw_secret_bytes());

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CodecError::Decryption)?;
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| CodecError::Decryption)?;
    key.zeroize();

    let text = std::str::from_utf8(&plain).map_err(|_| CodecError::Decryption)?;
    U256::from_str_radix(text, 10).map_err(|_| CodecError::Decryption)
}

fn derive_symmetric_key(shared_secret: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    // 32-byte output always fits the HKDF-SHA256 bound.
    let _ = Hkdf::<Sha256>::new(None, shared_secret).expand(KDF_INFO, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (SecretKey, PublicKey) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        (secret, public)
    }

    #[test]
    fn round_trip() {
        let (sk, pk) = keypair();
        for amount in [
            U256::ZERO,
            U256::from(1u64),
            U256::from(1_000_000_000_000_000_000u64),
            U256::MAX,
        ] {
            let ct = encrypt(&pk, amount).unwrap();
            assert_eq!(decrypt(&sk, &ct).unwrap(), amount);
        }
    }

    #[test]
    fn identical_plaintexts_yield_distinct_ciphertexts() {
        let (_, pk) = keypair();
        let amount = U256::from(42u64);
        let a = encrypt(&pk, amount).unwrap();
        let b = encrypt(&pk, amount).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let (_, pk) = keypair();
        let (other_sk, _) = keypair();
        let ct = encrypt(&pk, U256::from(100u64)).unwrap();
        assert!(matches!(
            decrypt(&other_sk, &ct),
            Err(CodecError::Decryption)
        ));
    }

    #[test]
    fn corrupted_ciphertext_fails() {
        let (sk, pk) = keypair();
        let mut ct = encrypt(&pk, U256::from(100u64)).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(matches!(decrypt(&sk, &ct), Err(CodecError::Decryption)));
    }

    #[test]
    fn truncated_ciphertext_is_malformed() {
        let (sk, _) = keypair();
        assert!(matches!(
            decrypt(&sk, &[0u8; 10]),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(decrypt(&sk, &[]), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn garbage_ephemeral_key_is_malformed() {
        let (sk, _) = keypair();
        let ct = vec![0xffu8; 80];
        assert!(matches!(decrypt(&sk, &ct), Err(CodecError::Malformed(_))));
    }
}
