use crate::error::ChainError;
use crate::persistence::BlockStore;

use super::chain::{Block, Sha256Hash};

/// Walks blocks from a starting hash back to genesis.
///
/// Yields the genesis block last and then ends. A predecessor missing from
/// the store yields one `BrokenChain` error and ends the walk.
pub struct ChainIterator<'a> {
    store: &'a dyn BlockStore,
    cursor: Option<Sha256Hash>,
}

impl<'a> ChainIterator<'a> {
    pub fn new(store: &'a dyn BlockStore, start: Sha256Hash) -> Self {
        Self {
            store,
            cursor: Some(start),
        }
    }
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.cursor.take()?;
        match self.store.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.cursor = Some(block.header.previous_hash);
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::BrokenChain(format!(
                "block {} missing from store",
                hex::encode(hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
