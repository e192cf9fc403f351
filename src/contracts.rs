//! Built-in contract types executed beside the chain.
//!
//! Each kind (`TOKEN`, `ESCROW`, `VOTING`, `USER_REGISTRY`) is a variant of
//! [`ContractState`] with its own [`ContractLogic`] table; the
//! [`ContractEngine`] owns every deployed contract.

pub mod engine;
pub mod escrow;
pub mod registry;
pub mod token;
pub mod types;
pub mod voting;

pub use engine::ContractEngine;
pub use types::*;
