//! LedgerChain - a minimal UTXO ledger over a durable block store
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, chain orchestration, traversal, UTXO queries, verification
//! - [`transaction`] - Transaction types plus per-input signing and verification
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work nonce search
//!
//! ## Cryptography
//! - [`crypto`] - secp256k1 keys and signatures, Base58Check addresses
//!
//! ## State Management
//! - [`persistence`] - Block store trait with SQLite and in-memory backends
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
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
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
