//! Key and signature utilities for record submitters
//!
//! The ledger treats signatures as opaque strings and never calls into this
//! module. Clients use it to create key pairs and sign record payloads before
//! submission.

use crate::error::{ChainError, Result};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// Shared secp256k1 context, built on first use.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Lowercase hex SHA-256 of a string.
pub fn hash_data(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn message_for(data: &[u8]) -> Result<Message> {
    let digest = Sha256::digest(data);
    Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| ChainError::CryptoError(format!("Invalid hex secret key: {}", e)))?;
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key bytes: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Compressed public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        let bytes: [u8; PUBLIC_KEY_SIZE] = self.public_key.serialize();
        hex::encode(bytes)
    }

    /// ECDSA signature over SHA-256(`data`), DER encoded and hex rendered.
    pub fn sign(&self, data: &[u8]) -> Result<String> {
        let message = message_for(data)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(&signature.serialize_der()[..]))
    }
}

/// Checks a hex DER signature produced by [`KeyPair::sign`].
pub fn verify_signature(
    public_key_hex: &str,
    data: &[u8],
    signature_hex: &str,
) -> Result<()> {
    let public_key_bytes = hex::decode(public_key_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex public key: {}", e)))?;
    let public_key = PublicKey::from_slice(&public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex signature: {}", e)))?;
    let signature = Signature::from_der(&signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    let message = message_for(data)?;
    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
