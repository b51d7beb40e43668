//! Record signing and verification.
//!
//! A record's `integrity.hash` commits to its canonical serialization; the
//! author's Schnorr signature covers that 32-byte hash. Verification checks
//! both layers: the hash against the content and the signature against the
//! `author.npub` key.

use peerset_crypto::{schnorr_sign, schnorr_verify, CryptoError, SecretKey};
use peerset_primitives::{Record, RecordError};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Fill in a record's integrity fields: recompute the content hash and sign
/// it with the author's secret key.
pub fn sign_record(record: &mut Record, secret: &SecretKey) -> Result<(), SignError> {
    let hash = record.content_hash()?;
    record.integrity.hash = hash;

    let signature = schnorr_sign(secret, hash.as_bytes())?;
    record.integrity.signature = hex::encode(signature);

    Ok(())
}

/// Check a record's content hash and its author signature.
///
/// Any decoding failure (bad npub hex, bad signature hex) verifies as
/// `false`.
#[must_use]
pub fn verify_record(record: &Record) -> bool {
    if !record.verify_integrity() {
        return false;
    }

    let Ok(public_key) = hex::decode(&record.author.npub) else {
        return false;
    };
    let Ok(public_key) = <[u8; 32]>::try_from(public_key.as_slice()) else {
        return false;
    };

    let Ok(signature) = hex::decode(&record.integrity.signature) else {
        return false;
    };

    schnorr_verify(&public_key, record.integrity.hash.as_bytes(), &signature)
}
