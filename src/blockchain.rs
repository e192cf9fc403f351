// Thin re-export module: implementation is in `blockchain/core.rs` so chain
// management, validation and address scans stay in separate files.

pub mod core;
pub use self::core::*;
