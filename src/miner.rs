//! Proof-of-work nonce search

use crate::blockchain::core::chain::hash_serialized;
use crate::blockchain::BlockData;

/// True when the first `difficulty` hex digits of `hash` are all `0`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
}

/// Searches nonces upward from zero until the block hash meets `difficulty`.
///
/// Returns the first qualifying nonce and its hash. Runs to completion on the
/// calling thread.
pub fn proof_of_work(previous_hash: &str, data: &BlockData<'_>, difficulty: u32) -> (u64, String) {
    // Serialized block data does not depend on the nonce.
    let data_json = data.to_json();
    let mut nonce: u64 = 0;
    loop {
        let hash = hash_serialized(previous_hash, nonce, &data_json);
        if meets_difficulty(&hash, difficulty) {
            return (nonce, hash);
        }
        nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::hash_block;
    use crate::transaction::Transaction;

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_proof_of_work_returns_first_valid_nonce() {
        let txs = vec![Transaction::reward("X", 100)];
        let data = BlockData {
            transactions: &txs,
            index: 2,
        };
        let (nonce, hash) = proof_of_work("0", &data, 2);

        assert!(hash.starts_with("00"));
        assert_eq!(hash, hash_block("0", &data, nonce));
        for earlier in 0..nonce {
            assert!(!meets_difficulty(&hash_block("0", &data, earlier), 2));
        }
    }
}
