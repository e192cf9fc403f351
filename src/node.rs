//! Node orchestrator: owns the shared chain and contract state and exposes the
//! operations the HTTP surface calls.

use crate::api::build_api_router;
use crate::blockchain::{AddressData, Block, Blockchain};
use crate::config::Config;
use crate::contracts::{Contract, ContractEngine, ContractType, ExecutionResult};
use crate::error::ChainError;
use crate::network::{Message, NetworkNode};
use crate::persistence::open_backend;
use crate::sync::ConsensusOutcome;
use crate::transaction::Transaction;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct Node {
    pub config: Config,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub contracts: Arc<RwLock<ContractEngine>>,
    pub network: Arc<NetworkNode>,
}

impl Node {
    /// Opens the configured storage backend and restores the chain from it.
    pub fn init(config: Config) -> Result<Self, ChainError> {
        let persistence = open_backend(config.storage.backend, &config.storage.path)?;
        let blockchain = Blockchain::new_with_persistence(config.chain.params(), persistence)?;
        info!(
            "Chain ready with {} blocks ({:?} storage at {})",
            blockchain.len(),
            config.storage.backend,
            config.storage.path
        );
        Ok(Self::with_blockchain(config, blockchain))
    }

    pub fn with_blockchain(config: Config, blockchain: Blockchain) -> Self {
        // Payloads already on a restored chain are replayed into the registry.
        let mut engine = ContractEngine::new();
        engine.apply_blocks(&blockchain.blocks);

        let blockchain = Arc::new(RwLock::new(blockchain));
        let contracts = Arc::new(RwLock::new(engine));
        let network = Arc::new(NetworkNode::new(
            blockchain.clone(),
            contracts.clone(),
            config.network.public_url(),
            Duration::from_millis(config.network.peer_timeout_ms),
        ));

        Self {
            config,
            blockchain,
            contracts,
            network,
        }
    }

    /// Validates and queues `tx`, then floods it to peers. Returns the index of
    /// the block it should land in.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<u64, ChainError> {
        let index = self.blockchain.write().await.add_transaction(tx.clone())?;
        self.network.broadcast(Message::Transaction { transaction: tx }).await;
        Ok(index)
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.blockchain.read().await.pending_transactions().to_vec()
    }

    /// Mines the pending pool, crediting the configured miner address.
    pub async fn mine(&self) -> Result<Block, ChainError> {
        self.mine_to(self.config.chain.miner_address.clone()).await
    }

    /// Mines on a blocking worker while holding the chain write lock, so no
    /// other mutation interleaves with the nonce search. Contract payloads are
    /// applied before that lock is released.
    pub async fn mine_to(&self, miner_address: String) -> Result<Block, ChainError> {
        let mut chain = self.blockchain.clone().write_owned().await;
        let (chain, block) = tokio::task::spawn_blocking(move || {
            let block = chain.mine_block(&miner_address);
            (chain, block)
        })
        .await
        .map_err(|e| ChainError::InvalidBlock(format!("Mining task failed: {}", e)))?;

        self.contracts.write().await.apply_blocks([&block]);
        drop(chain);
        self.network.broadcast(Message::Block { block: block.clone() }).await;
        Ok(block)
    }

    pub async fn get_chain(&self) -> Vec<Block> {
        self.blockchain.read().await.blocks.clone()
    }

    pub async fn get_address(&self, address: &str) -> AddressData {
        self.blockchain.read().await.get_address_data(address)
    }

    pub async fn deploy_contract(
        &self,
        contract_type: ContractType,
        creator: &str,
        params: Value,
    ) -> Result<Contract, ChainError> {
        self.contracts.write().await.deploy(contract_type, creator, params)
    }

    pub async fn execute_contract(&self, contract_id: &str, method: &str, params: Value, caller: &str) -> ExecutionResult {
        self.contracts.write().await.execute(contract_id, method, params, caller)
    }

    pub async fn get_contract(&self, contract_id: &str) -> Result<Contract, ChainError> {
        self.contracts
            .read()
            .await
            .get_contract(contract_id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("Contract {} not found", contract_id)))
    }

    pub async fn list_contracts(&self) -> Vec<Contract> {
        self.contracts.read().await.list_contracts().into_iter().cloned().collect()
    }

    pub async fn register_peer(&self, url: &str) -> Result<bool, ChainError> {
        self.network.register_peer(url).await
    }

    pub async fn peers(&self) -> Vec<String> {
        self.network.peers().list().await
    }

    pub async fn consensus(&self) -> ConsensusOutcome {
        self.network.consensus().await
    }

    /// Starts the P2P listener on `p2p_port`, returning the bound address. The
    /// public URL is rewritten when it was derived from a zero port.
    pub async fn start_p2p(&self) -> Result<std::net::SocketAddr, ChainError> {
        let addr = self.network.listen(self.config.network.p2p_port).await?;
        if self.config.network.public_url.is_empty() {
            self.network
                .peers()
                .set_self_url(format!("ws://127.0.0.1:{}", addr.port()));
        }
        Ok(addr)
    }

    /// Runs the node until the HTTP server stops: P2P listener, bootstrap
    /// peers, then the API.
    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        self.start_p2p().await?;

        for peer in &self.config.network.bootstrap_peers {
            if let Err(e) = self.register_peer(peer).await {
                warn!("Skipping bootstrap peer {}: {}", peer, e);
            }
        }
        if !self.config.network.bootstrap_peers.is_empty() {
            let outcome = self.consensus().await;
            info!(
                "Initial sync finished: replaced = {}, length = {}",
                outcome.replaced,
                outcome.chain.len()
            );
        }

        let api_port = self.config.network.api_port;
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", api_port))
            .await
            .map_err(|e| ChainError::NetworkError(format!("API port {} unavailable: {}", api_port, e)))?;
        info!("API server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, build_api_router(self))
            .await
            .map_err(|e| ChainError::NetworkError(format!("API server failed: {}", e)))
    }
}
