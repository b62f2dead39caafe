use crate::config::ChainConfig;
use crate::crypto::decode_address;
use crate::error::ChainError;
use crate::miner;
use crate::persistence::BlockStore;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::iterator::ChainIterator;

pub type Sha256Hash = [u8; 32];

/// Predecessor hash of the genesis block: "no predecessor".
pub const NULL_HASH: Sha256Hash = [0u8; 32];

const GENESIS_COINBASE_DATA: &str = "genesis";
const REWARD_COINBASE_DATA: &str = "block reward";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub timestamp: u64,
    pub previous_hash: Sha256Hash,
    pub tx_root: Sha256Hash,
    pub difficulty: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.tx_root);
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        height: u64,
        previous_hash: Sha256Hash,
        difficulty: u32,
        transactions: Vec<Transaction>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        let tx_root = Block::calculate_tx_root(&transactions);

        Block {
            header: BlockHeader {
                height,
                timestamp,
                previous_hash,
                tx_root,
                difficulty,
                nonce: 0,
            },
            transactions,
        }
    }

    /// Content hash over the header, which commits to every transaction hash.
    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    pub fn calculate_tx_root(transactions: &[Transaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash);
        }
        hasher.finalize().into()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.previous_hash == NULL_HASH
    }
}

/// What `add_block` did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockOutcome {
    /// Already stored; nothing was written.
    AlreadyKnown,
    /// Stored and promoted to tip.
    NewTip,
    /// Stored, but not higher than the current tip.
    Stored,
}

/// Handle on a persisted chain: the current tip plus the store holding it.
///
/// A single writer is assumed. Two handles appending to the same store can
/// each hold a stale tip.
pub struct Blockchain {
    pub(crate) tip: Sha256Hash,
    pub config: ChainConfig,
    pub(crate) store: Box<dyn BlockStore>,
}

impl Blockchain {
    /// Writes the genesis block paying `reward_address` into an empty store.
    pub fn create_genesis(
        store: Box<dyn BlockStore>,
        config: ChainConfig,
        reward_address: &str,
    ) -> Result<Self, ChainError> {
        if store.get_tip()?.is_some() {
            warn!("genesis requested on a store that already has a tip");
            return Err(ChainError::AlreadyInitialized);
        }

        let beneficiary = decode_address(reward_address)?;
        let coinbase = Transaction::new_coinbase(
            beneficiary,
            config.genesis_reward,
            0,
            GENESIS_COINBASE_DATA,
        );
        let genesis = miner::mine_block(Block::new(0, NULL_HASH, config.difficulty, vec![coinbase]))?;

        store.commit_block(&genesis, true)?;
        info!(hash = %genesis.hash_str(), to = reward_address, "created genesis block");

        Ok(Blockchain {
            tip: genesis.hash(),
            config,
            store,
        })
    }

    /// Opens an existing chain; fails with `NotInitialized` when the store has no tip.
    pub fn open(store: Box<dyn BlockStore>, config: ChainConfig) -> Result<Self, ChainError> {
        let tip = store.get_tip()?.ok_or(ChainError::NotInitialized)?;
        debug!(tip = %hex::encode(tip), "opened blockchain");
        Ok(Blockchain { tip, config, store })
    }

    pub fn tip(&self) -> Sha256Hash {
        self.tip
    }

    pub fn store(&self) -> &dyn BlockStore {
        self.store.as_ref()
    }

    /// Backward iterator from the current tip to genesis.
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator::new(self.store.as_ref(), self.tip)
    }

    pub fn tip_block(&self) -> Result<Block, ChainError> {
        self.store
            .get_block(&self.tip)?
            .ok_or_else(|| ChainError::BrokenChain(format!("tip block {} missing", hex::encode(self.tip))))
    }

    pub fn height(&self) -> Result<u64, ChainError> {
        Ok(self.tip_block()?.header.height)
    }

    pub fn block_by_hash(&self, hash: &Sha256Hash) -> Result<Block, ChainError> {
        self.store
            .get_block(hash)?
            .ok_or_else(|| ChainError::BlockNotFound(hex::encode(hash)))
    }

    /// Hashes of the canonical chain, tip first.
    pub fn block_hashes(&self) -> Result<Vec<Sha256Hash>, ChainError> {
        self.iter().map(|block| block.map(|b| b.hash())).collect()
    }

    /// Blocks of the canonical chain, tip first.
    pub fn blocks(&self) -> Result<Vec<Block>, ChainError> {
        self.iter().collect()
    }

    /// Validates and stores `block`, promoting it to tip when it is strictly
    /// higher than the current tip. Re-adding a stored block changes nothing;
    /// a block failing validation is never written.
    pub fn add_block(&mut self, block: &Block) -> Result<AddBlockOutcome, ChainError> {
        let hash = block.hash();
        if self.store.contains_block(&hash)? {
            debug!(hash = %hex::encode(hash), "block already stored");
            return Ok(AddBlockOutcome::AlreadyKnown);
        }

        self.validate_block(block).inspect_err(|e| {
            warn!(hash = %hex::encode(hash), error = %e, "block rejected");
        })?;

        let current_height = self.height()?;
        let promote = block.header.height > current_height;
        self.store.commit_block(block, promote)?;

        if promote {
            self.tip = hash;
            info!(height = block.header.height, hash = %hex::encode(hash), "new tip");
            Ok(AddBlockOutcome::NewTip)
        } else {
            info!(
                height = block.header.height,
                tip_height = current_height,
                hash = %hex::encode(hash),
                "stored block off the canonical chain"
            );
            Ok(AddBlockOutcome::Stored)
        }
    }

    /// Builds, verifies and mines the next block without persisting it.
    ///
    /// A reward paying `beneficiary` is placed first. Candidates are checked in
    /// order against the committed chain: each must verify, and each input must
    /// consume an output that is still unspent or was created earlier in the batch.
    pub fn mine_block(
        &self,
        beneficiary: &str,
        candidate_txs: Vec<Transaction>,
    ) -> Result<Block, ChainError> {
        let beneficiary = decode_address(beneficiary)?;
        let tip_block = self.tip_block()?;
        let height = tip_block.header.height + 1;

        let mut txs = Vec::with_capacity(candidate_txs.len() + 1);
        txs.push(Transaction::new_coinbase(
            beneficiary,
            self.config.block_reward,
            height,
            REWARD_COINBASE_DATA,
        ));
        txs.extend(candidate_txs);

        self.validate_block_transactions(&self.tip, &txs)?;

        let mut block = Block::new(height, self.tip, self.config.difficulty, txs);
        if block.header.timestamp <= tip_block.header.timestamp {
            block.header.timestamp = tip_block.header.timestamp + 1;
        }

        let block = miner::mine_block(block)?;
        info!(
            height,
            hash = %block.hash_str(),
            transactions = block.transactions.len(),
            "mined block"
        );
        Ok(block)
    }

    /// `mine_block` followed by `add_block`.
    pub fn mine_and_commit(
        &mut self,
        beneficiary: &str,
        candidate_txs: Vec<Transaction>,
    ) -> Result<Block, ChainError> {
        let block = self.mine_block(beneficiary, candidate_txs)?;
        self.add_block(&block)?;
        Ok(block)
    }
}
