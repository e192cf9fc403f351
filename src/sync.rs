//! Peer registry and pull-based chain synchronization for CinderChain
//!
//! This module provides:
//! - A registry of known peer URLs with per-peer sync bookkeeping
//! - Peer-list merging for the `PEERS` gossip exchange
//! - `consensus`, which fetches every peer's chain and adopts the longest valid one

use crate::blockchain::{Block, Blockchain};
use crate::consensus::Consensus;
use crate::contracts::ContractEngine;
use crate::network::request_chain;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Peer sync information
#[derive(Debug, Clone)]
pub struct PeerSyncInfo {
    pub url: String,
    /// Length of the chain last fetched from this peer.
    pub height: u64,
    pub last_seen: Option<Instant>,
    pub sync_failures: u32,
}

impl PeerSyncInfo {
    pub fn new(url: String) -> Self {
        Self {
            url,
            height: 0,
            last_seen: None,
            sync_failures: 0,
        }
    }

    /// Peers that failed three fetches in a row. They stay registered.
    pub fn is_unreliable(&self) -> bool {
        self.sync_failures >= 3
    }
}

/// Known peers, keyed by URL. Never contains this node's own URL.
pub struct PeerRegistry {
    self_url: parking_lot::RwLock<String>,
    peers: RwLock<HashMap<String, PeerSyncInfo>>,
}

impl PeerRegistry {
    pub fn new(self_url: impl Into<String>) -> Self {
        Self {
            self_url: parking_lot::RwLock::new(self_url.into()),
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn self_url(&self) -> String {
        self.self_url.read().clone()
    }

    pub fn set_self_url(&self, url: impl Into<String>) {
        *self.self_url.write() = url.into();
    }

    /// Adds `url` and returns whether it was new.
    pub async fn register(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || url == self.self_url() {
            return false;
        }
        let mut peers = self.peers.write().await;
        if peers.contains_key(url) {
            return false;
        }
        peers.insert(url.to_string(), PeerSyncInfo::new(url.to_string()));
        true
    }

    /// Unions `urls` into the registry. Returns whether anything was added.
    pub async fn merge<I>(&self, urls: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let mut grew = false;
        for url in urls {
            grew |= self.register(&url).await;
        }
        grew
    }

    /// Known peer URLs, sorted.
    pub async fn list(&self) -> Vec<String> {
        let peers = self.peers.read().await;
        let mut urls: Vec<String> = peers.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Known peers plus this node, as sent in a `PEERS` message.
    pub async fn advertised(&self) -> Vec<String> {
        let mut urls = self.list().await;
        let own = self.self_url();
        if !own.is_empty() {
            urls.push(own);
            urls.sort();
        }
        urls
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn get_peer_info(&self, url: &str) -> Option<PeerSyncInfo> {
        self.peers.read().await.get(url).cloned()
    }

    pub async fn record_height(&self, url: &str, height: u64) {
        if let Some(peer) = self.peers.write().await.get_mut(url) {
            peer.height = height;
            peer.last_seen = Some(Instant::now());
            peer.sync_failures = 0;
        }
    }

    pub async fn record_failure(&self, url: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(url) {
            peer.sync_failures += 1;
            if peer.is_unreliable() {
                warn!("Peer {} failed {} fetches in a row", url, peer.sync_failures);
            }
        }
    }
}

/// Result of a consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub replaced: bool,
    pub chain: Vec<Block>,
}

/// Node synchronizer
pub struct ChainSynchronizer {
    peers: Arc<PeerRegistry>,
    timeout: Duration,
}

impl ChainSynchronizer {
    pub fn new(peers: Arc<PeerRegistry>, timeout: Duration) -> Self {
        Self { peers, timeout }
    }

    /// Fetches every peer's chain concurrently. Peers that fail or time out
    /// are left out.
    pub async fn fetch_peer_chains(&self) -> Vec<Vec<Block>> {
        let urls = self.peers.list().await;
        let fetches = urls.iter().map(|url| request_chain(url, self.timeout));
        let results = join_all(fetches).await;

        let mut chains = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(chain) => {
                    self.peers.record_height(url, chain.len() as u64).await;
                    chains.push(chain);
                }
                Err(e) => {
                    debug!("Could not fetch chain from {}: {}", url, e);
                    self.peers.record_failure(url).await;
                }
            }
        }
        chains
    }

    /// Adopts the longest valid peer chain if it is strictly longer than the
    /// local one, then applies its contract payloads.
    pub async fn consensus(
        &self,
        blockchain: &RwLock<Blockchain>,
        contracts: &RwLock<ContractEngine>,
    ) -> ConsensusOutcome {
        let candidates = self.fetch_peer_chains().await;
        let local_len = blockchain.read().await.len();

        let selected = tokio::task::spawn_blocking(move || Consensus::select_longest(candidates, local_len))
            .await
            .unwrap_or_else(|e| {
                warn!("Chain selection task failed: {}", e);
                None
            });

        let mut local = blockchain.write().await;
        let replaced = match selected {
            Some(candidate) => local.replace_chain(candidate),
            None => false,
        };
        if replaced {
            let applied = contracts.write().await.apply_blocks(&local.blocks);
            info!(
                "Consensus adopted chain of length {} ({} contract calls applied)",
                local.len(),
                applied
            );
        }

        ConsensusOutcome {
            replaced,
            chain: local.blocks.clone(),
        }
    }
}
