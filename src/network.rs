//! Node-to-node protocol over WebSocket
//!
//! Every frame is a JSON text message tagged by `type`. A node greets each
//! inbound connection with its full chain. Outbound traffic is best-effort:
//! one connection per message, bounded by the peer timeout, failures logged
//! and dropped.

use crate::blockchain::{Block, Blockchain};
use crate::contracts::ContractEngine;
use crate::error::ChainError;
use crate::sync::{ChainSynchronizer, ConsensusOutcome, PeerRegistry};
use crate::transaction::Transaction;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Full chain snapshot, sent on connect and in reply to `REQUEST_CHAIN`.
    Chain { chain: Vec<Block> },
    Transaction { transaction: Transaction },
    RequestChain,
    /// A newly mined block.
    Block { block: Block },
    /// Peer-list exchange.
    Peers { peers: Vec<String> },
}

impl Message {
    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ChainError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn network_error(context: &str, url: &str, e: impl std::fmt::Display) -> ChainError {
    ChainError::NetworkError(format!("{} {}: {}", context, url, e))
}

fn timeout_error(url: &str) -> ChainError {
    ChainError::NetworkError(format!("Timed out talking to {}", url))
}

/// Delivers one message to `url` and closes the connection.
pub async fn send(url: &str, message: &Message, timeout: Duration) -> Result<(), ChainError> {
    let text = message.to_json()?;
    send_text(url, text, timeout).await
}

async fn send_text(url: &str, text: String, timeout: Duration) -> Result<(), ChainError> {
    tokio::time::timeout(timeout, deliver(url, text))
        .await
        .map_err(|_| timeout_error(url))?
}

async fn deliver(url: &str, text: String) -> Result<(), ChainError> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| network_error("Failed to connect to", url, e))?;
    ws.send(Frame::Text(text))
        .await
        .map_err(|e| network_error("Failed to send to", url, e))?;
    // The peer may already be gone; the message is out either way.
    let _ = ws.close(None).await;
    Ok(())
}

/// Fetches the full chain of the peer at `url`.
pub async fn request_chain(url: &str, timeout: Duration) -> Result<Vec<Block>, ChainError> {
    tokio::time::timeout(timeout, fetch_chain(url))
        .await
        .map_err(|_| timeout_error(url))?
}

async fn fetch_chain(url: &str) -> Result<Vec<Block>, ChainError> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| network_error("Failed to connect to", url, e))?;
    ws.send(Frame::Text(Message::RequestChain.to_json()?))
        .await
        .map_err(|e| network_error("Failed to send to", url, e))?;

    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| network_error("Failed to read from", url, e))?;
        let Frame::Text(text) = frame else { continue };
        if let Ok(Message::Chain { chain }) = Message::from_json(&text) {
            let _ = ws.close(None).await;
            return Ok(chain);
        }
    }
    Err(ChainError::NetworkError(format!("{} closed without sending its chain", url)))
}

/// P2P endpoint of a node: serves inbound connections and pushes to peers.
pub struct NetworkNode {
    blockchain: Arc<RwLock<Blockchain>>,
    contracts: Arc<RwLock<ContractEngine>>,
    peers: Arc<PeerRegistry>,
    synchronizer: ChainSynchronizer,
    timeout: Duration,
}

impl NetworkNode {
    pub fn new(
        blockchain: Arc<RwLock<Blockchain>>,
        contracts: Arc<RwLock<ContractEngine>>,
        self_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let peers = Arc::new(PeerRegistry::new(self_url));
        Self {
            blockchain,
            contracts,
            synchronizer: ChainSynchronizer::new(peers.clone(), timeout),
            peers,
            timeout,
        }
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Binds the P2P listener and serves it in the background. Returns the
    /// bound address, which differs from `port` only when `port` is 0.
    pub async fn listen(self: &Arc<Self>, port: u16) -> Result<SocketAddr, ChainError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| ChainError::NetworkError(format!("P2P port {} unavailable: {}", port, e)))?;
        let addr = listener.local_addr()?;
        info!("P2P server listening on {}", addr);

        let node = Arc::clone(self);
        tokio::spawn(async move { node.accept_loop(listener).await });
        Ok(addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let node = Arc::clone(&self);
                    tokio::spawn(async move { node.handle_connection(stream, addr).await });
                }
                Err(e) => warn!("Failed to accept peer connection: {}", e),
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (mut sink, mut incoming) = ws.split();

        // Short-lived senders may hang up before the greeting lands.
        let greeting = self.chain_message().await;
        match greeting.to_json() {
            Ok(text) => {
                if let Err(e) = sink.send(Frame::Text(text)).await {
                    debug!("Could not greet {}: {}", addr, e);
                }
            }
            Err(e) => warn!("Failed to encode chain: {}", e),
        }

        while let Some(frame) = incoming.next().await {
            let text = match frame {
                Ok(Frame::Text(text)) => text,
                Ok(Frame::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Connection with {} dropped: {}", addr, e);
                    break;
                }
            };

            let message = match Message::from_json(&text) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring malformed message from {}: {}", addr, e);
                    continue;
                }
            };

            if let Some(reply) = self.handle_message(message).await {
                let sent = match reply.to_json() {
                    Ok(text) => sink.send(Frame::Text(text)).await.is_ok(),
                    Err(_) => false,
                };
                if !sent {
                    break;
                }
            }
        }
    }

    async fn chain_message(&self) -> Message {
        Message::Chain {
            chain: self.blockchain.read().await.blocks.clone(),
        }
    }

    /// Applies one inbound message to local state. Returns the reply to send
    /// back on the same connection, if any.
    pub async fn handle_message(&self, message: Message) -> Option<Message> {
        match message {
            Message::Transaction { transaction } => {
                let id = transaction.id.clone();
                if let Err(e) = self.blockchain.write().await.add_transaction(transaction) {
                    debug!("Rejected peer transaction {}: {}", id, e);
                }
                None
            }
            Message::Block { block } => {
                // Chain before contracts, both held, so payloads follow block order.
                let mut blockchain = self.blockchain.write().await;
                match blockchain.receive_block(block.clone()) {
                    Ok(()) => {
                        self.contracts.write().await.apply_blocks([&block]);
                    }
                    Err(e) => info!("Rejected peer block {}: {}", block.index, e),
                }
                None
            }
            Message::Chain { chain } => {
                let mut blockchain = self.blockchain.write().await;
                if blockchain.replace_chain(chain) {
                    self.contracts.write().await.apply_blocks(&blockchain.blocks);
                }
                None
            }
            Message::RequestChain => Some(self.chain_message().await),
            Message::Peers { peers } => {
                if self.peers.merge(peers).await {
                    info!("Peer list grew to {}", self.peers.peer_count().await);
                    let advertised = self.peers.advertised().await;
                    self.broadcast(Message::Peers { peers: advertised }).await;
                }
                None
            }
        }
    }

    /// Sends `message` to every known peer in the background.
    pub async fn broadcast(&self, message: Message) {
        let urls = self.peers.list().await;
        if urls.is_empty() {
            return;
        }
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };
        for url in urls {
            let text = text.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                if let Err(e) = send_text(&url, text, timeout).await {
                    debug!("Broadcast to {} failed: {}", url, e);
                }
            });
        }
    }

    /// Adds a peer and sends it every peer this node knows, itself included.
    pub async fn register_peer(&self, url: &str) -> Result<bool, ChainError> {
        let url = url.trim();
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(ChainError::NetworkError(format!(
                "Peer URL must start with ws:// or wss://, got {}",
                url
            )));
        }
        if !self.peers.register(url).await {
            return Ok(false);
        }
        info!("Registered peer {}", url);

        let message = Message::Peers {
            peers: self.peers.advertised().await,
        };
        let url = url.to_string();
        let timeout = self.timeout;
        tokio::spawn(async move {
            if let Err(e) = send(&url, &message, timeout).await {
                debug!("Peer exchange with {} failed: {}", url, e);
            }
        });
        Ok(true)
    }

    /// Pulls every peer's chain and adopts the longest valid one.
    pub async fn consensus(&self) -> ConsensusOutcome {
        self.synchronizer.consensus(&self.blockchain, &self.contracts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainParams;
    use serde_json::json;

    fn node() -> Arc<NetworkNode> {
        let blockchain = Blockchain::new(ChainParams {
            difficulty: 1,
            ..ChainParams::default()
        });
        Arc::new(NetworkNode::new(
            Arc::new(RwLock::new(blockchain)),
            Arc::new(RwLock::new(ContractEngine::new())),
            "ws://127.0.0.1:1",
            Duration::from_secs(2),
        ))
    }

    #[test]
    fn test_message_wire_format() {
        let request = serde_json::to_value(Message::RequestChain).unwrap();
        assert_eq!(request, json!({ "type": "REQUEST_CHAIN" }));

        let peers = serde_json::to_value(Message::Peers {
            peers: vec!["ws://a".to_string()],
        })
        .unwrap();
        assert_eq!(peers, json!({ "type": "PEERS", "peers": ["ws://a"] }));

        let parsed = Message::from_json(r#"{"type":"CHAIN","chain":[]}"#).unwrap();
        assert_eq!(parsed, Message::Chain { chain: Vec::new() });
    }

    #[tokio::test]
    async fn test_request_chain_is_answered_with_chain() {
        let node = node();
        let reply = node.handle_message(Message::RequestChain).await;
        assert!(matches!(reply, Some(Message::Chain { chain }) if chain.len() == 1));
    }

    #[tokio::test]
    async fn test_peer_transaction_is_queued() {
        let node = node();
        let tx = Transaction::reward("X", 10);
        node.handle_message(Message::Transaction { transaction: tx.clone() }).await;
        assert_eq!(node.blockchain.read().await.pending_transactions(), &[tx]);
    }

    #[tokio::test]
    async fn test_peer_block_extending_tip_is_appended_and_contracts_applied() {
        let node = node();
        let mut source = Blockchain::new(ChainParams {
            difficulty: 1,
            ..ChainParams::default()
        });
        let deploy = Transaction::reward("creator", 1).with_payload(crate::contracts::ContractCall::Deploy {
            contract_type: crate::contracts::ContractType::Token,
            params: json!({ "totalSupply": 5 }),
        });
        source.add_transaction(deploy.clone()).unwrap();
        let block = source.mine_block("miner");

        node.handle_message(Message::Block { block }).await;
        assert_eq!(node.blockchain.read().await.len(), 2);
        let contracts = node.contracts.read().await;
        assert!(contracts.get_contract(&format!("contract_{}", deploy.id)).is_some());
    }

    #[tokio::test]
    async fn test_peer_block_not_extending_tip_is_rejected() {
        let node = node();
        let mut source = Blockchain::new(ChainParams {
            difficulty: 1,
            ..ChainParams::default()
        });
        source.mine_block("miner");
        let second = source.mine_block("miner");

        node.handle_message(Message::Block { block: second }).await;
        assert_eq!(node.blockchain.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsolicited_longer_chain_is_adopted() {
        let node = node();
        let mut source = Blockchain::new(ChainParams {
            difficulty: 1,
            ..ChainParams::default()
        });
        source.mine_block("miner");

        node.handle_message(Message::Chain {
            chain: source.blocks.clone(),
        })
        .await;
        assert_eq!(node.blockchain.read().await.blocks, source.blocks);
    }

    #[tokio::test]
    async fn test_register_peer_requires_websocket_url() {
        let node = node();
        assert!(node.register_peer("http://127.0.0.1:6001").await.is_err());
        assert!(node.register_peer("ws://127.0.0.1:6002").await.unwrap());
        assert!(!node.register_peer("ws://127.0.0.1:6002").await.unwrap());
    }
}
