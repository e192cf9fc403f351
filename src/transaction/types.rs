/// Transaction types for CinderChain
use crate::contracts::ContractCall;
use crate::crypto::KeyPair;
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

use super::validation::signable_message;

/// Sender used by mining-reward transactions. Reward transactions carry no signature.
pub const REWARD_SENDER: &str = "00";

/// Maximum serialized transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// A value transfer between two addresses, optionally carrying a contract call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ContractCall>,
}

impl Transaction {
    /// Creates an unsigned transaction with a fresh id.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().simple().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            signature: None,
            payload: None,
        }
    }

    /// Mining-reward transaction crediting `recipient`.
    pub fn reward(recipient: impl Into<String>, amount: u64) -> Self {
        Self::new(REWARD_SENDER, recipient, amount)
    }

    pub fn with_payload(mut self, payload: ContractCall) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Signs the transaction with `keypair`. The sender field is not checked
    /// against the key; verification does that.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        let message = signable_message(self.amount, &self.recipient);
        self.signature = Some(keypair.sign_recoverable(message.as_bytes())?);
        Ok(())
    }

    /// Builds and signs a transfer from `keypair`'s address.
    pub fn signed(keypair: &KeyPair, recipient: impl Into<String>, amount: u64) -> Result<Self, ChainError> {
        let mut tx = Self::new(keypair.address(), recipient, amount);
        tx.sign(keypair)?;
        Ok(tx)
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = serde_json::to_vec(self)?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}
