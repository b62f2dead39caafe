use crate::crypto::{decode_address, KeyPair};
use crate::error::ChainError;
use crate::transaction::{Transaction, TxInput, TxOutput};
use tracing::debug;

use super::chain::Blockchain;

/// One payment to build: `amount` from the owner of `from` to `to`.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: KeyPair,
    pub to: String,
    pub amount: u64,
}

impl Blockchain {
    /// Builds and signs a transfer of `amount` to `to`, returning change to the sender.
    ///
    /// `pending` holds transactions not yet in a block that this one may spend from
    /// or must not double-spend against.
    pub fn new_transfer(
        &self,
        from: &KeyPair,
        to: &str,
        amount: u64,
        pending: &[Transaction],
    ) -> Result<Transaction, ChainError> {
        if amount == 0 {
            return Err(ChainError::InvalidTransaction("transfer amount must be positive".to_string()));
        }
        let recipient = decode_address(to)?;
        let sender = from.address();
        let (total, selected) = self.spendable_utxos(&sender, amount, pending)?;

        let public_key = from.public_key_bytes().to_vec();
        let mut inputs = Vec::new();
        for (tx_hash, indices) in &selected {
            for index in indices {
                inputs.push(TxInput::new(*tx_hash, *index, public_key.clone()));
            }
        }

        let mut outputs = vec![TxOutput::new(amount, recipient)];
        if total > amount {
            outputs.push(TxOutput::new(total - amount, from.pub_key_hash()));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_transaction(&mut tx, from, pending)?;
        debug!(tx = %tx.hash_str(), from = %sender, to, amount, "built transfer");
        Ok(tx)
    }

    /// Builds transfers in order, each seeing the earlier ones as pending.
    pub fn build_transfers(&self, requests: &[TransferRequest]) -> Result<Vec<Transaction>, ChainError> {
        let mut txs: Vec<Transaction> = Vec::with_capacity(requests.len());
        for request in requests {
            let tx = self.new_transfer(&request.from, &request.to, request.amount, &txs)?;
            txs.push(tx);
        }
        Ok(txs)
    }
}
