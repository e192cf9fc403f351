//! Fork choice over chains fetched from peers

use crate::blockchain::{Block, Blockchain};
use std::cmp::Ordering;
use tracing::warn;

/// Ranking of a candidate chain. Longer is better; nothing else breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusCriteria {
    pub length: usize,
}

impl ConsensusCriteria {
    pub fn from_chain(chain: &[Block]) -> Self {
        Self { length: chain.len() }
    }
}

impl PartialOrd for ConsensusCriteria {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.length.cmp(&other.length))
    }
}

/// Longest-valid-chain selection
pub struct Consensus;

impl Consensus {
    /// Picks the longest valid candidate that is strictly longer than
    /// `local_len`. Among equally long candidates the first one wins.
    pub fn select_longest(candidates: Vec<Vec<Block>>, local_len: usize) -> Option<Vec<Block>> {
        let local = ConsensusCriteria { length: local_len };
        let mut ranked: Vec<_> = candidates
            .into_iter()
            .filter(|chain| ConsensusCriteria::from_chain(chain) > local)
            .collect();
        // Stable sort keeps arrival order among ties.
        ranked.sort_by(|a, b| b.len().cmp(&a.len()));

        ranked.into_iter().find(|chain| match Blockchain::validate_chain(chain) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring peer chain of length {}: {}", chain.len(), e);
                false
            }
        })
    }
}
