//! Server key material and per-session key derivation.
//!
//! The key pair and token are generated once at startup and shared read-only
//! by every session. Each encrypted session derives its own 32-byte key as
//! `SHA-256(token || ECDH(server_secret, client_public))`; applying the stream
//! cipher is left to the transport.

use crate::error::{ServerError, ServerResult};
use p384::{ecdh, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const TOKEN_LENGTH: usize = 128;

pub type SessionKey = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyExchangeError {
    #[error("client public key is not a valid P-384 point")]
    InvalidClientKey,
}

pub struct ServerKeys {
    secret: SecretKey,
    public_key: Vec<u8>,
    token: Vec<u8>,
}

impl ServerKeys {
    /// Generates the P-384 key pair and the random token.
    ///
    /// The public point is re-parsed from its SEC1 encoding, which rejects
    /// points that are not on the curve.
    pub fn generate() -> ServerResult<Self> {
        let secret = SecretKey::random(&mut OsRng);
        let public_key = secret.public_key().to_sec1_bytes().into_vec();
        PublicKey::from_sec1_bytes(&public_key).map_err(|e| {
            ServerError::EncryptionSetupFailure(format!("invalid public key generated: {e}"))
        })?;

        let mut token = vec![0u8; TOKEN_LENGTH];
        OsRng
            .try_fill_bytes(&mut token)
            .map_err(|e| ServerError::EncryptionSetupFailure(format!("token generation: {e}")))?;

        Ok(Self {
            secret,
            public_key,
            token,
        })
    }

    /// SEC1-encoded public key sent to clients.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn derive_session_key(&self, client_key: &[u8]) -> Result<SessionKey, KeyExchangeError> {
        let client =
            PublicKey::from_sec1_bytes(client_key).map_err(|_| KeyExchangeError::InvalidClientKey)?;
        Ok(derive_key(&self.secret, &client, &self.token))
    }
}

impl std::fmt::Debug for ServerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeys")
            .field("public_key_len", &self.public_key.len())
            .field("token_len", &self.token.len())
            .finish()
    }
}

/// Shared key derivation used by both ends of the exchange.
pub fn derive_key(secret: &SecretKey, peer: &PublicKey, token: &[u8]) -> SessionKey {
    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let mut hasher = Sha256::new();
    hasher.update(token);
    hasher.update(shared.raw_secret_bytes());
    hasher.finalize().into()
}
