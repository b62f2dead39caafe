//! Durable block storage for LedgerChain
//!
//! One region maps a block's content hash to its serialized bytes; a reserved
//! metadata key holds the hash of the current tip.

use crate::blockchain::{Block, Sha256Hash};
use crate::error::ChainError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Reserved metadata key under which the tip hash is stored.
pub const TIP_KEY: &str = "tip";

/// Abstraction for block storage backends.
///
/// `commit_block` must apply the block write and the optional tip update as
/// one unit: after a crash either both are visible or neither is.
pub trait BlockStore: Send + Sync {
    fn get_block(&self, hash: &Sha256Hash) -> Result<Option<Block>, ChainError>;
    fn put_block(&self, block: &Block) -> Result<(), ChainError>;
    fn get_tip(&self) -> Result<Option<Sha256Hash>, ChainError>;
    fn set_tip(&self, hash: &Sha256Hash) -> Result<(), ChainError>;
    fn commit_block(&self, block: &Block, promote_to_tip: bool) -> Result<(), ChainError>;

    fn contains_block(&self, hash: &Sha256Hash) -> Result<bool, ChainError> {
        Ok(self.get_block(hash)?.is_some())
    }
}

fn encode_block(block: &Block) -> Result<Vec<u8>, ChainError> {
    Ok(bincode::serialize(block)?)
}

fn decode_block(bytes: &[u8]) -> Result<Block, ChainError> {
    Ok(bincode::deserialize(bytes)?)
}

fn hash_from_slice(bytes: &[u8]) -> Result<Sha256Hash, ChainError> {
    bytes.try_into().map_err(|_| {
        ChainError::DatabaseError(format!("stored hash has {} bytes, expected 32", bytes.len()))
    })
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (creating if needed) the SQLite store at `path`. `":memory:"` is accepted.
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::StoreUnavailable(format!("{}: {}", path, e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                hash BLOB PRIMARY KEY,
                height INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::StoreUnavailable(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::StoreUnavailable(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }

    fn insert_block(conn: &Connection, block: &Block) -> Result<(), ChainError> {
        conn.execute(
            "INSERT OR IGNORE INTO blocks (hash, height, data) VALUES (?1, ?2, ?3)",
            params![block.hash().to_vec(), block.header.height as i64, encode_block(block)?],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;
        Ok(())
    }

    fn write_tip(conn: &Connection, hash: &Sha256Hash) -> Result<(), ChainError> {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![TIP_KEY, hash.to_vec()],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save tip: {}", e)))?;
        Ok(())
    }
}

impl BlockStore for Database {
    fn get_block(&self, hash: &Sha256Hash) -> Result<Option<Block>, ChainError> {
        let conn = self.lock()?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM blocks WHERE hash = ?1",
                params![hash.to_vec()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;

        data.map(|bytes| decode_block(&bytes)).transpose()
    }

    fn contains_block(&self, hash: &Sha256Hash) -> Result<bool, ChainError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM blocks WHERE hash = ?1",
                params![hash.to_vec()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn put_block(&self, block: &Block) -> Result<(), ChainError> {
        let conn = self.lock()?;
        Self::insert_block(&conn, block)
    }

    fn get_tip(&self) -> Result<Option<Sha256Hash>, ChainError> {
        let conn = self.lock()?;
        let value: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![TIP_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to load tip: {}", e)))?;

        value.map(|bytes| hash_from_slice(&bytes)).transpose()
    }

    fn set_tip(&self, hash: &Sha256Hash) -> Result<(), ChainError> {
        let conn = self.lock()?;
        Self::write_tip(&conn, hash)
    }

    fn commit_block(&self, block: &Block, promote_to_tip: bool) -> Result<(), ChainError> {
        let conn_guard = self.lock()?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        Self::insert_block(&tx, block)?;
        if promote_to_tip {
            Self::write_tip(&tx, &block.hash())?;
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }
}

/// Simple in-memory block store useful for tests and ephemeral runs.
///
/// Clones share the same underlying maps, so a clone behaves like reopening
/// the same database.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    blocks: HashMap<Sha256Hash, Vec<u8>>,
    tip: Option<Sha256Hash>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ChainError> {
        self.inner
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }

    pub fn len(&self) -> Result<usize, ChainError> {
        Ok(self.lock()?.blocks.len())
    }

    pub fn is_empty(&self) -> Result<bool, ChainError> {
        Ok(self.len()? == 0)
    }
}

impl BlockStore for InMemoryPersistence {
    fn get_block(&self, hash: &Sha256Hash) -> Result<Option<Block>, ChainError> {
        let state = self.lock()?;
        state.blocks.get(hash).map(|bytes| decode_block(bytes)).transpose()
    }

    fn contains_block(&self, hash: &Sha256Hash) -> Result<bool, ChainError> {
        Ok(self.lock()?.blocks.contains_key(hash))
    }

    fn put_block(&self, block: &Block) -> Result<(), ChainError> {
        let bytes = encode_block(block)?;
        self.lock()?.blocks.entry(block.hash()).or_insert(bytes);
        Ok(())
    }

    fn get_tip(&self) -> Result<Option<Sha256Hash>, ChainError> {
        Ok(self.lock()?.tip)
    }

    fn set_tip(&self, hash: &Sha256Hash) -> Result<(), ChainError> {
        self.lock()?.tip = Some(*hash);
        Ok(())
    }

    fn commit_block(&self, block: &Block, promote_to_tip: bool) -> Result<(), ChainError> {
        // Serialize before taking the lock so a failure leaves nothing half-written.
        let bytes = encode_block(block)?;
        let hash = block.hash();
        let mut state = self.lock()?;
        state.blocks.entry(hash).or_insert(bytes);
        if promote_to_tip {
            state.tip = Some(hash);
        }
        Ok(())
    }
}
