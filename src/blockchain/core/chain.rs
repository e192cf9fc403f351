use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::miner::proof_of_work;
use crate::persistence::{InMemoryPersistence, Persistence};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_NONCE: u64 = 100;
pub const GENESIS_HASH: &str = "0";
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_TIMESTAMP: u64 = 1672531200000;

pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
pub const TARGET_BLOCK_TIME_MS: u64 = 10_000;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_MINING_REWARD: u64 = 100;
pub const DEFAULT_MAX_SUPPLY: u64 = 21_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub difficulty: u32,
}

/// The part of a block covered by its hash besides the previous hash and nonce.
/// Field order is part of the hash format.
#[derive(Debug, Serialize)]
pub struct BlockData<'a> {
    pub transactions: &'a [Transaction],
    pub index: u64,
}

impl BlockData<'_> {
    pub fn to_json(&self) -> String {
        // Plain structs with string map keys always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// SHA-256 over `previous_hash`, the decimal nonce and the JSON block data.
pub fn hash_block(previous_hash: &str, data: &BlockData<'_>, nonce: u64) -> String {
    hash_serialized(previous_hash, nonce, &data.to_json())
}

pub(crate) fn hash_serialized(previous_hash: &str, nonce: u64, data_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(data_json.as_bytes());
    hex::encode(hasher.finalize())
}

impl Block {
    pub fn genesis() -> Self {
        Block {
            index: GENESIS_INDEX,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            nonce: GENESIS_NONCE,
            difficulty: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX
            && self.previous_hash == GENESIS_PREVIOUS_HASH
            && self.hash == GENESIS_HASH
            && self.nonce == GENESIS_NONCE
            && self.transactions.is_empty()
    }

    pub fn data(&self) -> BlockData<'_> {
        BlockData {
            transactions: &self.transactions,
            index: self.index,
        }
    }

    /// Recomputes the hash from the block's own fields.
    pub fn calculate_hash(&self) -> String {
        hash_block(&self.previous_hash, &self.data(), self.nonce)
    }
}

/// Tunables of a chain instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub difficulty: u32,
    pub mining_reward: u64,
    pub max_supply: u64,
    pub adjustment_interval: u64,
    pub target_block_time_ms: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            max_supply: DEFAULT_MAX_SUPPLY,
            adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_time_ms: TARGET_BLOCK_TIME_MS,
        }
    }
}

pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub mempool: Mempool,
    pub difficulty: u32,
    pub mining_reward: u64,
    pub total_supply: u64,
    pub max_supply: u64,
    pub params: ChainParams,
    pub persistence: Box<dyn Persistence>,
}

impl Clone for Blockchain {
    fn clone(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            mempool: self.mempool.clone(),
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            total_supply: self.total_supply,
            max_supply: self.max_supply,
            params: self.params,
            // Persistence cannot be cloned as a trait object; use a fresh in-memory backend for clones.
            persistence: Box::new(InMemoryPersistence::new()),
        }
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl Blockchain {
    /// Create a new `Blockchain` holding only the genesis block, backed by memory.
    pub fn new(params: ChainParams) -> Self {
        Self::from_blocks(params, vec![Block::genesis()], Box::new(InMemoryPersistence::new()))
    }

    /// Restores the snapshot held by `persistence`, or starts from genesis when
    /// there is none. A snapshot that fails validation is an error.
    pub fn new_with_persistence(params: ChainParams, persistence: Box<dyn Persistence>) -> Result<Self, ChainError> {
        match persistence.load_chain()? {
            Some(blocks) => {
                Self::validate_chain(&blocks)?;
                info!("Restored chain with {} blocks", blocks.len());
                Ok(Self::from_blocks(params, blocks, persistence))
            }
            None => {
                info!("No chain snapshot found; starting from genesis");
                let blockchain = Self::from_blocks(params, vec![Block::genesis()], persistence);
                blockchain.persist();
                Ok(blockchain)
            }
        }
    }

    fn from_blocks(params: ChainParams, blocks: Vec<Block>, persistence: Box<dyn Persistence>) -> Self {
        let mut blockchain = Blockchain {
            blocks,
            mempool: Mempool::new(),
            difficulty: params.difficulty.max(1),
            mining_reward: params.mining_reward,
            total_supply: 0,
            max_supply: params.max_supply,
            params,
            persistence,
        };
        blockchain.resync_derived_state();
        blockchain
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        self.mempool.transactions()
    }

    /// Accepts a signed transaction into the pending pool and returns the index
    /// of the block it should land in.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<u64, ChainError> {
        tx.validate()?;
        tx.validate_size()?;

        if !self.mempool.contains(&tx.id) {
            self.mempool.add_transaction(tx);
        }
        Ok(self.last_block().index + 1)
    }

    /// Mines every pending transaction into a new block and appends it.
    ///
    /// Blocks until a valid nonce is found. When supply allows, a reward for
    /// `miner_address` is queued for the next block.
    pub fn mine_block(&mut self, miner_address: &str) -> Block {
        let previous_hash = self.last_block().hash.clone();
        let index = self.last_block().index + 1;
        let transactions = self.mempool.drain();
        let difficulty = self.difficulty;

        let (nonce, hash) = proof_of_work(
            &previous_hash,
            &BlockData {
                transactions: &transactions,
                index,
            },
            difficulty,
        );

        let block = Block {
            index,
            timestamp: now_millis(),
            transactions,
            previous_hash,
            hash,
            nonce,
            difficulty,
        };
        info!(
            "Mined block {} with {} transactions (nonce {}, difficulty {})",
            block.index,
            block.transactions.len(),
            block.nonce,
            block.difficulty
        );
        self.blocks.push(block.clone());

        self.credit_mining_reward(miner_address);
        self.adjust_difficulty();
        self.persist();
        block
    }

    fn credit_mining_reward(&mut self, miner_address: &str) {
        // Credited while supply is below the cap; the last reward may overshoot it.
        let reward = self.mining_reward;
        if reward == 0 || self.total_supply >= self.max_supply {
            return;
        }
        self.mempool.add_transaction(Transaction::reward(miner_address, reward));
        self.total_supply = self.total_supply.saturating_add(reward);
    }

    /// Every `adjustment_interval` mined blocks, nudges difficulty by one step
    /// when the average block time is off target by more than a factor of two.
    pub fn adjust_difficulty(&mut self) {
        let interval = self.params.adjustment_interval.max(1) as usize;
        let len = self.blocks.len();
        let mined = len - 1;
        if mined == 0 || mined % interval != 0 {
            return;
        }

        // The genesis timestamp is a constant, so it never opens the window.
        let start = (len - 1).saturating_sub(interval).max(1);
        let spans = (len - 1 - start) as u64;
        if spans == 0 {
            return;
        }
        let elapsed = self.blocks[len - 1]
            .timestamp
            .saturating_sub(self.blocks[start].timestamp);
        let average = elapsed / spans;
        let target = self.params.target_block_time_ms;

        if average < target / 2 {
            self.difficulty += 1;
            info!("Average block time {}ms, raising difficulty to {}", average, self.difficulty);
        } else if average > target.saturating_mul(2) && self.difficulty > 1 {
            self.difficulty -= 1;
            info!("Average block time {}ms, lowering difficulty to {}", average, self.difficulty);
        }
    }

    /// Appends a block received from a peer if it directly extends the tip.
    pub fn receive_block(&mut self, block: Block) -> Result<(), ChainError> {
        let last = self.last_block();
        if block.previous_hash != last.hash || block.index != last.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} does not extend tip {} ({})",
                block.index, last.index, last.hash
            )));
        }
        Self::validate_block(last, &block)?;

        info!("Accepted block {} from peer", block.index);
        self.mempool.remove_included(&block.transactions);
        self.blocks.push(block);
        self.total_supply = self.count_issued_supply();
        self.adjust_difficulty();
        self.persist();
        Ok(())
    }

    /// Fork choice: adopt `candidate` only if it is strictly longer than the
    /// current chain and fully valid. Returns whether the chain was replaced.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.blocks.len() {
            info!(
                "Received chain of length {} is not longer than current length {}",
                candidate.len(),
                self.blocks.len()
            );
            return false;
        }
        if let Err(e) = Self::validate_chain(&candidate) {
            warn!("Rejected candidate chain: {}", e);
            return false;
        }

        for block in &candidate {
            self.mempool.remove_included(&block.transactions);
        }
        self.blocks = candidate;
        self.resync_derived_state();
        info!("Replaced chain; new length {}", self.blocks.len());
        self.persist();
        true
    }

    /// Rederives supply and difficulty from the blocks and pending pool.
    fn resync_derived_state(&mut self) {
        self.total_supply = self.count_issued_supply();
        self.difficulty = match self.blocks.last() {
            Some(last) if !last.is_genesis() => last.difficulty.max(1),
            _ => self.params.difficulty.max(1),
        };
        self.adjust_difficulty();
    }

    fn count_issued_supply(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .chain(self.mempool.transactions().iter())
            .filter(|tx| tx.is_reward())
            .fold(0u64, |sum, tx| sum.saturating_add(tx.amount))
    }

    fn persist(&self) {
        if let Err(e) = self.persistence.save_chain(&self.blocks) {
            warn!("Failed to persist chain snapshot: {}", e);
        }
    }
}
