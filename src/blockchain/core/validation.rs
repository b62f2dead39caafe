use crate::crypto::KeyPair;
use crate::error::ChainError;
use crate::miner;
use crate::transaction::{PrevTransactions, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::chain::{Block, Blockchain, Sha256Hash};

/// Rejects a batch in which two inputs consume the same output.
pub fn validate_no_double_spend(txs: &[Transaction]) -> Result<(), ChainError> {
    let mut seen_inputs: HashMap<(Sha256Hash, usize), Sha256Hash> = HashMap::new();
    for tx in txs.iter().filter(|tx| !tx.is_coinbase()) {
        for outpoint in tx.inputs.iter().filter_map(|input| input.outpoint()) {
            if let Some(conflicting_tx_hash) = seen_inputs.insert(outpoint, tx.hash) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "output {}:{} is spent by both {} and {}",
                    hex::encode(outpoint.0),
                    outpoint.1,
                    hex::encode(conflicting_tx_hash),
                    tx.hash_str()
                )));
            }
        }
    }
    Ok(())
}

impl Blockchain {
    /// Looks in `pending` (newest first), then in the canonical chain from tip to genesis.
    pub fn find_transaction(
        &self,
        hash: &Sha256Hash,
        pending: &[Transaction],
    ) -> Result<Transaction, ChainError> {
        if let Some(tx) = pending.iter().rev().find(|tx| tx.hash == *hash) {
            return Ok(tx.clone());
        }

        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.hash == *hash) {
                return Ok(tx);
            }
        }

        Err(ChainError::TransactionNotFound(hex::encode(hash)))
    }

    /// Resolves the transaction behind every input of `tx`.
    pub fn prev_transactions(
        &self,
        tx: &Transaction,
        pending: &[Transaction],
    ) -> Result<PrevTransactions, ChainError> {
        let mut prev_txs = PrevTransactions::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }
        for input in &tx.inputs {
            if !prev_txs.contains_key(&input.prev_tx_hash) {
                let prev = self.find_transaction(&input.prev_tx_hash, pending)?;
                prev_txs.insert(input.prev_tx_hash, prev);
            }
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        keypair: &KeyPair,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.prev_transactions(tx, pending)?;
        tx.sign(keypair, &prev_txs)
    }

    pub fn verify_transaction(
        &self,
        tx: &Transaction,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.prev_transactions(tx, pending)?;
        tx.verify(&prev_txs).inspect_err(|e| {
            warn!(tx = %tx.hash_str(), error = %e, "transaction rejected");
        })
    }

    /// Checks `txs` as the body of a block extending `parent`.
    ///
    /// No output may be consumed twice. Every input must consume an output that
    /// is unspent on the branch ending at `parent`, or one created by an earlier
    /// transaction of the batch, and every transfer must verify.
    pub fn validate_block_transactions(
        &self,
        parent: &Sha256Hash,
        txs: &[Transaction],
    ) -> Result<(), ChainError> {
        validate_no_double_spend(txs)?;

        let wanted: HashSet<Sha256Hash> = txs
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| tx.inputs.iter().map(|input| input.prev_tx_hash))
            .collect();
        let (mut available, mut known) = self.unspent_on_branch(*parent, &wanted)?;

        for tx in txs {
            if !tx.is_coinbase() {
                let mut prev_txs = PrevTransactions::new();
                for input in &tx.inputs {
                    let Some(prev) = known.get(&input.prev_tx_hash) else {
                        continue;
                    };
                    if let Some((prev_hash, index)) = input.outpoint() {
                        if index < prev.outputs.len() && !available.contains(&(prev_hash, index)) {
                            warn!(tx = %tx.hash_str(), "input consumes a spent output");
                            return Err(ChainError::DoubleSpendDetected(format!(
                                "output {}:{} consumed by {} is already spent",
                                hex::encode(prev_hash),
                                index,
                                tx.hash_str()
                            )));
                        }
                    }
                    prev_txs.insert(prev.hash, prev.clone());
                }
                tx.verify(&prev_txs).inspect_err(|e| {
                    warn!(tx = %tx.hash_str(), error = %e, "transaction rejected");
                })?;
            }

            available.extend((0..tx.outputs.len()).map(|index| (tx.hash, index)));
            known.insert(tx.hash, tx.clone());
        }
        Ok(())
    }

    /// Acceptance rules for a block arriving at `add_block`.
    ///
    /// The block must meet the configured proof of work, commit to its
    /// transactions, extend a stored block by exactly one, and open with the
    /// single coinbase paying the block reward for its height.
    pub fn validate_block(&self, block: &Block) -> Result<(), ChainError> {
        let reject =
            |reason: String| ChainError::VerificationFailed(format!("block {}: {}", block.hash_str(), reason));
        let header = &block.header;

        if header.difficulty != self.config.difficulty {
            return Err(reject(format!(
                "difficulty {} differs from configured {}",
                header.difficulty, self.config.difficulty
            )));
        }
        if !miner::verify_pow(block) {
            return Err(reject("hash does not meet the proof-of-work target".to_string()));
        }
        if header.tx_root != Block::calculate_tx_root(&block.transactions) {
            return Err(reject("transaction root does not match the body".to_string()));
        }

        let parent = self.store.get_block(&header.previous_hash)?.ok_or_else(|| {
            reject(format!("unknown predecessor {}", hex::encode(header.previous_hash)))
        })?;
        if parent.header.height.checked_add(1) != Some(header.height) {
            return Err(reject(format!(
                "height {} does not follow predecessor height {}",
                header.height, parent.header.height
            )));
        }

        let coinbase = match block.transactions.split_first() {
            Some((first, rest)) if first.is_coinbase() && !rest.iter().any(Transaction::is_coinbase) => first,
            _ => return Err(reject("expected exactly one coinbase, placed first".to_string())),
        };
        if coinbase.hash != coinbase.compute_hash() {
            return Err(reject("coinbase content hash mismatch".to_string()));
        }
        if coinbase.coinbase_height() != Some(header.height) {
            return Err(reject("coinbase is not bound to the block height".to_string()));
        }
        if coinbase.total_output() != Some(self.config.block_reward) {
            return Err(reject(format!(
                "coinbase does not pay the block reward of {}",
                self.config.block_reward
            )));
        }

        self.validate_block_transactions(&header.previous_hash, &block.transactions)
    }
}
