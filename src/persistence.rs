//! Chain snapshot persistence for CinderChain
//!
//! Every backend stores the whole canonical chain and replaces the previous
//! snapshot in one step. Pending transactions are never persisted.

use crate::blockchain::Block;
use crate::config::StorageBackend;
use crate::error::ChainError;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstraction for persistence backends. `save_chain` must replace the previous
/// snapshot atomically.
pub trait Persistence: Send + Sync {
    fn save_chain(&self, chain: &[Block]) -> Result<(), ChainError>;
    /// Returns `None` when nothing has been saved yet.
    fn load_chain(&self) -> Result<Option<Vec<Block>>, ChainError>;
}

/// Opens the backend selected in the configuration.
pub fn open_backend(backend: StorageBackend, path: &str) -> Result<Box<dyn Persistence>, ChainError> {
    Ok(match backend {
        StorageBackend::Json => Box::new(JsonFileStore::new(path)),
        StorageBackend::Sqlite => Box::new(Database::open(path)?),
        StorageBackend::Memory => Box::new(InMemoryPersistence::new()),
    })
}

/// Snapshot stored as a JSON array of blocks in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_chain(&self, chain: &[Block]) -> Result<(), ChainError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write beside the target and rename over it so readers never see a partial file.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, chain)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| ChainError::IoError(e.to_string()))?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, ChainError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let chain: Vec<Block> = serde_json::from_str(&contents)?;
        Ok(Some(chain))
    }
}

/// SQLite-backed snapshot store: one row per block, rewritten in a single
/// SQL transaction on every save.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                idx INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                previous_hash TEXT NOT NULL,
                hash TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                difficulty INTEGER NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }
}

impl Persistence for Database {
    fn save_chain(&self, chain: &[Block]) -> Result<(), ChainError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to start transaction: {}", e)))?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear blocks: {}", e)))?;

        for block in chain {
            let transactions_json = serde_json::to_string(&block.transactions)?;
            tx.execute(
                "INSERT INTO blocks (idx, timestamp, previous_hash, hash, nonce, difficulty, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    block.index as i64,
                    block.timestamp as i64,
                    block.previous_hash,
                    block.hash,
                    block.nonce as i64,
                    block.difficulty as i64,
                    transactions_json,
                ],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to save block {}: {}", block.index, e)))?;
        }

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, ChainError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT idx, timestamp, previous_hash, hash, nonce, difficulty, transactions
                 FROM blocks ORDER BY idx ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index: i64 = row.get(0)?;
                let timestamp: i64 = row.get(1)?;
                let nonce: i64 = row.get(4)?;
                let difficulty: i64 = row.get(5)?;
                let transactions_json: String = row.get(6)?;
                Ok((
                    Block {
                        index: index as u64,
                        timestamp: timestamp as u64,
                        transactions: Vec::new(),
                        previous_hash: row.get(2)?,
                        hash: row.get(3)?,
                        nonce: nonce as u64,
                        difficulty: difficulty as u32,
                    },
                    transactions_json,
                ))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (mut block, transactions_json) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;
            let transactions: Vec<Transaction> = serde_json::from_str(&transactions_json)?;
            block.transactions = transactions;
            blocks.push(block);
        }

        if blocks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(blocks))
        }
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Clones share the same snapshot.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    snapshot: Arc<Mutex<Option<Vec<Block>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, chain: &[Block]) -> Result<(), ChainError> {
        *self.snapshot.lock() = Some(chain.to_vec());
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<Vec<Block>>, ChainError> {
        Ok(self.snapshot.lock().clone())
    }
}
