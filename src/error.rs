//! Error types for LedgerChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The block store could not be opened. Nothing else can proceed.
    #[error("Block store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Blockchain already initialized")]
    AlreadyInitialized,
    #[error("Blockchain not initialized: no genesis block in store")]
    NotInitialized,
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    #[error("Insufficient funds for {address}: requested {requested}, available {available}")]
    InsufficientFunds {
        address: String,
        requested: u64,
        available: u64,
    },
    /// A predecessor hash is missing from the store; the chain on disk is corrupt.
    #[error("Broken chain: {0}")]
    BrokenChain(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Mining failed: {0}")]
    MiningFailed(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}
