//! Per-input signing and verification against the resolved prior transactions.

use super::types::{Transaction, TxOutput};
use crate::blockchain::Sha256Hash;
use crate::crypto::{verify_signature, KeyPair};
use crate::error::ChainError;
use std::collections::HashMap;

/// Prior transactions keyed by hash, as resolved for one transaction's inputs.
pub type PrevTransactions = HashMap<Sha256Hash, Transaction>;

impl Transaction {
    /// Copy with every signature and public key blanked.
    fn trimmed_copy(&self) -> Transaction {
        let mut trimmed = self.clone();
        for input in &mut trimmed.inputs {
            input.signature.clear();
            input.public_key.clear();
        }
        trimmed
    }

    /// Digest signed for input `index`: the trimmed copy with that input's key
    /// field set to the locking hash of the output it spends.
    fn input_digest<'a>(
        &self,
        trimmed: &mut Transaction,
        index: usize,
        prev_txs: &'a PrevTransactions,
    ) -> Result<(Sha256Hash, &'a TxOutput), ChainError> {
        let input = &self.inputs[index];
        let prev = prev_txs.get(&input.prev_tx_hash).ok_or_else(|| {
            ChainError::TransactionNotFound(hex::encode(input.prev_tx_hash))
        })?;
        let output = input
            .outpoint()
            .and_then(|(_, i)| prev.outputs.get(i))
            .ok_or_else(|| {
                ChainError::InvalidTransaction(format!(
                    "input {} of {} references missing output {} of {}",
                    index,
                    self.hash_str(),
                    input.output_index,
                    prev.hash_str()
                ))
            })?;

        trimmed.inputs[index].public_key = output.pub_key_hash.to_vec();
        let digest = trimmed.compute_hash();
        trimmed.inputs[index].public_key.clear();
        Ok((digest, output))
    }

    /// Signs every input with `keypair`. Coinbase transactions are left untouched.
    pub fn sign(&mut self, keypair: &KeyPair, prev_txs: &PrevTransactions) -> Result<(), ChainError> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut trimmed = self.trimmed_copy();
        for index in 0..self.inputs.len() {
            let (digest, _) = self.input_digest(&mut trimmed, index, prev_txs)?;
            self.inputs[index].signature = keypair.sign(&digest).to_vec();
        }
        Ok(())
    }

    /// Checks content hash, value balance, key ownership and every input signature.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<(), ChainError> {
        if self.is_coinbase() {
            return Ok(());
        }

        if self.hash != self.compute_hash() {
            return Err(ChainError::VerificationFailed(format!(
                "content hash mismatch for {}",
                self.hash_str()
            )));
        }
        if self.inputs.is_empty() {
            return Err(ChainError::VerificationFailed(format!(
                "{} has no inputs",
                self.hash_str()
            )));
        }

        let mut trimmed = self.trimmed_copy();
        let mut input_total: u64 = 0;
        for (index, input) in self.inputs.iter().enumerate() {
            let (digest, output) = self.input_digest(&mut trimmed, index, prev_txs)?;

            if !input.unlocks_with(&output.pub_key_hash) {
                return Err(ChainError::VerificationFailed(format!(
                    "input {} of {} is not unlocked by the spending key",
                    index,
                    self.hash_str()
                )));
            }
            verify_signature(&input.public_key, &digest, &input.signature).map_err(|e| {
                ChainError::VerificationFailed(format!("input {} of {}: {}", index, self.hash_str(), e))
            })?;
            input_total = input_total.checked_add(output.value).ok_or_else(|| {
                ChainError::VerificationFailed(format!("{} input values overflow", self.hash_str()))
            })?;
        }

        let output_total = self.total_output().ok_or_else(|| {
            ChainError::VerificationFailed(format!("{} output values overflow", self.hash_str()))
        })?;
        if input_total != output_total {
            return Err(ChainError::VerificationFailed(format!(
                "{} spends {} but creates {}",
                self.hash_str(),
                input_total,
                output_total
            )));
        }
        Ok(())
    }
}
