use rayon::prelude::*;

use crate::blockchain::core::chain::{Block, Blockchain};
use crate::error::ChainError;
use crate::miner::meets_difficulty;
use crate::transaction::Transaction;

impl Blockchain {
    /// Checks `block` as the successor of `previous`: linkage, index, hash,
    /// proof-of-work and every transaction signature.
    pub fn validate_block(previous: &Block, block: &Block) -> Result<(), ChainError> {
        if block.index != previous.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                previous.index + 1,
                block.index
            )));
        }

        if block.previous_hash != previous.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid previous block hash at index {}. Expected {}, but got {}.",
                block.index, previous.hash, block.previous_hash
            )));
        }

        let expected_hash = block.calculate_hash();
        if expected_hash != block.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Hash mismatch at index {}. Expected {}, but got {}.",
                block.index, expected_hash, block.hash
            )));
        }

        // Difficulty is not covered by the hash; at least enforce the floor.
        if block.difficulty < 1 || !meets_difficulty(&block.hash, block.difficulty) {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid Proof-of-Work at index {}: hash does not have {} leading zeros.",
                block.index, block.difficulty
            )));
        }

        if !block.transactions.par_iter().all(Transaction::verify) {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} contains a transaction with an invalid signature.",
                block.index
            )));
        }

        Ok(())
    }

    /// Full validation of a candidate chain, reporting the first problem found.
    pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
        let genesis = chain
            .first()
            .ok_or_else(|| ChainError::InvalidChain("Chain is empty".to_string()))?;
        if !genesis.is_genesis() {
            return Err(ChainError::InvalidChain("Genesis block does not match".to_string()));
        }

        for pair in chain.windows(2) {
            Self::validate_block(&pair[0], &pair[1])
                .map_err(|e| ChainError::InvalidChain(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_chain_valid(chain: &[Block]) -> bool {
        Self::validate_chain(chain).is_ok()
    }
}
