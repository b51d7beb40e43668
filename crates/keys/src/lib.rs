//! Credential import and signature-backed sessions.
//!
//! A user logs in with a Bech32 `npub`/`nsec` pair. The manager checks the
//! two halves against each other, signs a timestamped token, and persists it
//! in the session table. A stored token restores the session while it is
//! younger than [`TOKEN_VALIDITY`] and its signature still verifies; any
//! failed check makes the token count as absent. Secret material lives only
//! inside the import call and is wiped when it returns.

pub mod signer;

use std::sync::Arc;
use std::time::Duration;

use peerset_crypto::{
    ct_eq, decode_npub, decode_nsec, schnorr_sign, schnorr_verify, sha256, xonly_public_key,
    CryptoError,
};
use peerset_primitives::now_ms;
use peerset_store::{Database, SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// How long a login token stays valid.
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Current token format version.
pub const TOKEN_VERSION: u8 = 1;

/// The persisted login token.
///
/// The signature covers `utf8(public_key ‖ decimal(timestamp))`, hashed with
/// SHA-256 before signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginToken {
    pub v: u8,
    pub public_key: String,
    pub timestamp: u64,
    pub signature: String,
}

/// A restored or freshly created session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// X-only public key, lowercase hex.
    pub public_key: String,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    #[error("credential decoding failed: {0}")]
    Credential(#[from] CryptoError),

    #[error("public key does not match the secret key")]
    KeyMismatch,

    #[error("login signature failed verification")]
    Signature,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Key manager over the session table.
#[derive(Debug)]
pub struct KeyManager<D> {
    sessions: SessionStore<D>,
}

impl<D: Database> KeyManager<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self {
            sessions: SessionStore::new(db),
        }
    }

    /// Import an `npub`/`nsec` pair and persist a signed login token.
    ///
    /// The secret key is decoded, checked against the public half in
    /// constant time, used once to sign the token, and zeroized on return.
    pub fn import(&self, npub: &str, nsec: &str) -> Result<Session, KeyError> {
        self.import_at(npub, nsec, now_ms())
    }

    pub fn import_at(&self, npub: &str, nsec: &str, timestamp: u64) -> Result<Session, KeyError> {
        let claimed = decode_npub(npub)?;
        let secret = decode_nsec(nsec)?;

        let derived = xonly_public_key(&secret)?;
        if !ct_eq(&derived, &claimed) {
            return Err(KeyError::KeyMismatch);
        }

        let public_key = hex::encode(derived);
        let message = token_message(&public_key, timestamp);
        let signature = schnorr_sign(&secret, &message)?;

        if !schnorr_verify(&derived, &message, &signature) {
            return Err(KeyError::Signature);
        }

        let token = LoginToken {
            v: TOKEN_VERSION,
            public_key: public_key.clone(),
            timestamp,
            signature: hex::encode(signature),
        };
        self.sessions.put_token(&token)?;

        debug!(%public_key, "login token issued");

        Ok(Session { public_key })
    }

    /// Restore the session from the stored token, if one is still valid.
    pub fn load(&self) -> Result<Option<Session>, KeyError> {
        self.load_at(now_ms())
    }

    pub fn load_at(&self, now: u64) -> Result<Option<Session>, KeyError> {
        let Some(token) = self.sessions.get_token::<LoginToken>()? else {
            return Ok(None);
        };

        if token.v != TOKEN_VERSION {
            debug!(version = token.v, "ignoring login token with unknown version");
            return Ok(None);
        }

        let age_ms = now.saturating_sub(token.timestamp);
        if age_ms > TOKEN_VALIDITY.as_millis() as u64 {
            debug!("login token expired");
            return Ok(None);
        }

        let Ok(public_key) = decode_hex32(&token.public_key) else {
            return Ok(None);
        };
        let Ok(signature) = hex::decode(&token.signature) else {
            return Ok(None);
        };

        let message = token_message(&token.public_key, token.timestamp);
        if !schnorr_verify(&public_key, &message, &signature) {
            debug!("login token signature no longer verifies");
            return Ok(None);
        }

        Ok(Some(Session {
            public_key: token.public_key,
        }))
    }

    /// Drop the session. Always succeeds from the caller's perspective;
    /// a storage failure is logged and the token is gone either way next
    /// time the store loads.
    pub fn logout(&self) {
        if let Err(err) = self.sessions.delete_token() {
            warn!(%err, "failed to delete login token");
        }
    }
}

fn token_message(public_key_hex: &str, timestamp: u64) -> [u8; 32] {
    sha256(format!("{public_key_hex}{timestamp}"))
}

fn decode_hex32(hex_str: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = hex::decode(hex_str)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::BadLength(bytes.len()))
}
