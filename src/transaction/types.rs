/// Transaction types for LedgerChain
use crate::blockchain::Sha256Hash;
use crate::crypto::PubKeyHash;
use sha2::{Digest, Sha256};

/// Referenced-hash value carried by a coinbase input: no real predecessor.
pub const COINBASE_PREV_HASH: Sha256Hash = [0u8; 32];

/// Referenced-output index carried by a coinbase input.
pub const COINBASE_OUTPUT_INDEX: i64 = -1;

/// Spends one output of an earlier transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxInput {
    pub prev_tx_hash: Sha256Hash,
    pub output_index: i64,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl TxInput {
    pub fn new(prev_tx_hash: Sha256Hash, output_index: usize, public_key: Vec<u8>) -> Self {
        Self {
            prev_tx_hash,
            output_index: output_index as i64,
            signature: Vec::new(),
            public_key,
        }
    }

    /// True when this input's public key hashes to `pub_key_hash`.
    pub fn unlocks_with(&self, pub_key_hash: &PubKeyHash) -> bool {
        crate::crypto::hash_pub_key(&self.public_key) == *pub_key_hash
    }

    /// The (transaction hash, output index) this input consumes, if it names a real output.
    pub fn outpoint(&self) -> Option<(Sha256Hash, usize)> {
        usize::try_from(self.output_index)
            .ok()
            .map(|index| (self.prev_tx_hash, index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: PubKeyHash) -> Self {
        Self { value, pub_key_hash }
    }

    pub fn is_locked_to(&self, pub_key_hash: &PubKeyHash) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

/// A value transfer: ordered inputs consuming earlier outputs, ordered new outputs.
///
/// `hash` covers every input's outpoint and public key plus every output, but
/// not the signatures, so signing does not change a transaction's identity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub hash: Sha256Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Builds a transaction and stamps its content hash.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Transaction {
            hash: [0u8; 32],
            inputs,
            outputs,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Genesis grant or block reward paying `value` to `beneficiary`.
    ///
    /// The sentinel input's unlocking fields carry the block height and free-form
    /// data so coinbases minted at different heights hash differently.
    pub fn new_coinbase(beneficiary: PubKeyHash, value: u64, height: u64, data: &str) -> Self {
        let input = TxInput {
            prev_tx_hash: COINBASE_PREV_HASH,
            output_index: COINBASE_OUTPUT_INDEX,
            signature: height.to_le_bytes().to_vec(),
            public_key: data.as_bytes().to_vec(),
        };
        Transaction::new(vec![input], vec![TxOutput::new(value, beneficiary)])
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_hash == COINBASE_PREV_HASH
            && self.inputs[0].output_index == COINBASE_OUTPUT_INDEX
    }

    /// Block height a coinbase was minted for, as carried by its sentinel input.
    pub fn coinbase_height(&self) -> Option<u64> {
        if !self.is_coinbase() {
            return None;
        }
        let bytes: [u8; 8] = self.inputs[0].signature.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn compute_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.prev_tx_hash);
            hasher.update(input.output_index.to_le_bytes());
            hasher.update((input.public_key.len() as u64).to_le_bytes());
            hasher.update(&input.public_key);
            if self.is_coinbase() {
                hasher.update(&input.signature);
            }
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update(output.pub_key_hash);
        }
        hasher.finalize().into()
    }

    /// Sum of output values, `None` if it does not fit in a `u64`.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.value))
    }
}

/// An output not yet consumed, together with where it lives. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub tx_hash: Sha256Hash,
    pub index: usize,
    pub output: TxOutput,
}
