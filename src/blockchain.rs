// Thin re-export module: implementation is in `blockchain/core.rs`, split by
// responsibility (chain management, iteration, UTXO queries, validation).

pub mod core;
pub use self::core::*;
