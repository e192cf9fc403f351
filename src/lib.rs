//! CinderChain - a replicated proof-of-work ledger with built-in contract types
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, hashing, fork choice and validation
//! - [`transaction`] - Transaction types and signature checks
//! - [`mempool`] - Pending transaction pool
//!
//! ## Contracts
//! - [`contracts`] - Token, escrow, voting and user-registry contracts
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work nonce search
//! - [`consensus`] - Longest-valid-chain selection
//!
//! ## Cryptography
//! - [`crypto`] - Recoverable secp256k1 signatures and addresses
//!
//! ## State Management
//! - [`persistence`] - Chain snapshots (JSON file, SQLite, memory)
//!
//! ## Networking & Integration
//! - [`network`] - WebSocket peer protocol
//! - [`sync`] - Peer registry and chain synchronization
//! - [`api`] - HTTP API
//! - [`node`] - Node orchestrator
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Contracts
// ============================================================================
pub mod contracts;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod sync;

// ============================================================================
// Integration
// ============================================================================
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
