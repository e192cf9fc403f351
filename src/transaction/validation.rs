/// Signature verification for transactions, separated from type definitions
use crate::crypto::recover_address;
use crate::error::ChainError;
use crate::transaction::types::Transaction;

/// The message a sender signs: the decimal amount immediately followed by the
/// recipient.
///
/// Known weakness: the message binds neither the sender nor a sequence number,
/// so a signature can be replayed any number of times. Swapping in a stronger
/// format only requires changing this function.
pub fn signable_message(amount: u64, recipient: &str) -> String {
    format!("{}{}", amount, recipient)
}

impl Transaction {
    /// Checks that a non-reward transaction is signed by its sender.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.is_reward() {
            return Ok(());
        }

        let signature = self.signature.as_deref().ok_or(ChainError::InvalidSignature)?;
        let message = signable_message(self.amount, &self.recipient);
        let recovered =
            recover_address(message.as_bytes(), signature).map_err(|_| ChainError::InvalidSignature)?;

        if recovered.eq_ignore_ascii_case(&self.sender) {
            Ok(())
        } else {
            Err(ChainError::InvalidSignature)
        }
    }

    pub fn verify(&self) -> bool {
        self.validate().is_ok()
    }
}
