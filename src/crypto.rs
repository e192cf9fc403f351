//! Cryptographic primitives for CinderChain
//!
//! Signatures are recoverable secp256k1 ECDSA signatures over the SHA-256
//! digest of a message. The signer's address can be recovered from the
//! signature alone, so transactions carry no public key.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Length of a recoverable signature: compact signature plus one recovery byte.
pub const RECOVERABLE_SIGNATURE_SIZE: usize = COMPACT_SIGNATURE_SIZE + 1;

/// Lower-case hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the address for a public key: hex SHA-256 of the compressed key.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = public_key.serialize();
    sha256_hex(&pubkey_bytes)
}

fn digest_message(message: &[u8]) -> Result<Message, ChainError> {
    let digest = Sha256::digest(message);
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

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key)
    }

    /// Signs `message` and returns the hex-encoded 65-byte recoverable signature.
    pub fn sign_recoverable(&self, message: &[u8]) -> Result<String, ChainError> {
        let message = digest_message(message)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = Vec::with_capacity(RECOVERABLE_SIGNATURE_SIZE);
        bytes.extend_from_slice(&compact);
        bytes.push(recovery_id.to_i32() as u8);
        Ok(hex::encode(bytes))
    }
}

/// Recovers the address that produced `signature_hex` over `message`.
pub fn recover_address(message: &[u8], signature_hex: &str) -> Result<String, ChainError> {
    let bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex signature: {}", e)))?;
    if bytes.len() != RECOVERABLE_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes, got {}",
            RECOVERABLE_SIGNATURE_SIZE,
            bytes.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(bytes[COMPACT_SIGNATURE_SIZE] as i32)
        .map_err(|e| ChainError::CryptoError(format!("Invalid recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&bytes[..COMPACT_SIGNATURE_SIZE], recovery_id)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    let message = digest_message(message)?;
    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&message, &signature)
        .map_err(|_| ChainError::CryptoError("Public key recovery failed".to_string()))?;

    Ok(address_from_public_key(&public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_generation() {
        let keypair = KeyPair::generate();
        let address = keypair.address();
        assert_eq!(address.len(), 64);
        assert!(address.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::generate();
        let message = b"100recipient";

        let signature = keypair.sign_recoverable(message).unwrap();
        assert_eq!(signature.len(), RECOVERABLE_SIGNATURE_SIZE * 2);

        let recovered = recover_address(message, &signature).unwrap();
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn test_tampered_message_recovers_other_address() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign_recoverable(b"Original message").unwrap();

        match recover_address(b"Tampered message", &signature) {
            Ok(address) => assert_ne!(address, keypair.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_invalid_signature_length() {
        let result = recover_address(b"Test", "abcd");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Signature must be exactly"));
    }

    #[test]
    fn test_from_secret_bytes_invalid_length() {
        let short_bytes = [0u8; SECRET_KEY_SIZE - 1];
        let result = KeyPair::from_secret_bytes(&short_bytes);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Secret key must be"));
    }

    #[test]
    fn test_from_secret_bytes_is_deterministic() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(&keypair.secret_key.secret_bytes()).unwrap();
        assert_eq!(keypair.address(), restored.address());
    }
}
