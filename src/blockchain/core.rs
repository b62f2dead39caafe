// core.rs splits chain responsibilities into submodules: block types and
// orchestration, traversal, unspent-output queries, signing and verification.
pub mod chain;
pub mod iterator;
pub mod transfer;
pub mod utxo;
pub mod validation;

pub use chain::*;
pub use iterator::*;
pub use transfer::*;
pub use utxo::*;
pub use validation::*;
