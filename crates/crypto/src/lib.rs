//! Cryptographic primitives for peerset.
//!
//! Thin wrappers over the ecosystem crates: SHA-256 digests, BIP-340
//! Schnorr signatures over secp256k1 with x-only public keys, Bech32
//! credential decoding (`npub`/`nsec`), and constant-time comparison.
//! Secret key material is zeroized on drop.

use core::fmt;

use bech32::Hrp;
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const NPUB_HRP: &str = "npub";
pub const NSEC_HRP: &str = "nsec";

pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    #[error("bech32 decode failed: {0}")]
    Bech32(#[from] bech32::DecodeError),

    #[error("unexpected key prefix: expected {expected:?}, got {actual:?}")]
    BadHrp {
        expected: &'static str,
        actual: String,
    },

    #[error("expected a 32-byte key payload, got {0} bytes")]
    BadLength(usize),

    #[error("invalid secp256k1 key")]
    InvalidKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// SHA-256 of a byte string.
#[must_use]
pub fn sha256(bytes: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hasher.finalize().into()
}

/// SHA-256 of a byte string, lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(sha256(bytes))
}

/// Constant-time byte equality.
///
/// Slices of differing length compare unequal (the length itself is not
/// secret).
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// A secp256k1 secret scalar, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

fn decode_key(encoded: &str, expected_hrp: &'static str) -> Result<[u8; 32], CryptoError> {
    let (hrp, data) = bech32::decode(encoded)?;

    let expected = Hrp::parse(expected_hrp).unwrap_or_else(|_| unreachable!("static hrp"));
    if hrp != expected {
        return Err(CryptoError::BadHrp {
            expected: expected_hrp,
            actual: hrp.to_string(),
        });
    }

    let bytes: [u8; 32] = data
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::BadLength(data.len()))?;

    Ok(bytes)
}

/// Decode a Bech32 `npub` into the raw x-only public key.
pub fn decode_npub(encoded: &str) -> Result<[u8; 32], CryptoError> {
    decode_key(encoded, NPUB_HRP)
}

/// Decode a Bech32 `nsec` into a zeroizing secret key.
pub fn decode_nsec(encoded: &str) -> Result<SecretKey, CryptoError> {
    let mut bytes = decode_key(encoded, NSEC_HRP)?;

    let key = SecretKey::from_bytes(bytes);
    bytes.zeroize();

    Ok(key)
}

/// Derive the x-only public key for a secret key.
pub fn xonly_public_key(secret: &SecretKey) -> Result<[u8; 32], CryptoError> {
    let signing_key =
        SigningKey::from_bytes(secret.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;

    Ok(signing_key.verifying_key().to_bytes().into())
}

/// BIP-340 Schnorr signature over `msg`.
pub fn schnorr_sign(secret: &SecretKey, msg: &[u8]) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let signing_key =
        SigningKey::from_bytes(secret.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;

    let signature: Signature = signing_key.sign(msg);

    Ok(signature.to_bytes())
}

/// Verify a BIP-340 Schnorr signature against an x-only public key.
///
/// Any decoding failure verifies as `false`.
#[must_use]
pub fn schnorr_verify(public_key: &[u8; 32], msg: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };

    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };

    verifying_key.verify(msg, &signature).is_ok()
}
