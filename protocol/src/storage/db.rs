//! # WardenDb: Persistent Storage Engine
//!
//! The persistence layer for the signing authority, built on sled's embedded
//! key-value store. The nonce ledger and the key vault both keep their state
//! here.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                    | Value                        |
//! |------------|------------------------|------------------------------|
//! | `ledger`   | `last_accepted_nonce`  | `u64` (8B BE)                |
//! | `keys`     | alias (UTF-8)          | `bincode(SealedKeyRecord)`   |
//! | `metadata` | key (UTF-8)            | value (bytes)                |
//!
//! ## Durability
//!
//! Writes that a caller is about to rely on (nonce commits, key replacement)
//! are followed by an explicit `flush` before control returns. sled buffers
//! writes in memory otherwise, and a crash would lose them.

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;

use crate::config::{KEYS_TREE, LEDGER_TREE, METADATA_TREE};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// WardenDb
// ---------------------------------------------------------------------------

/// Persistent storage for the signing authority.
///
/// Cheap to clone: every clone shares the same underlying sled database, so
/// a ledger and a custodian built from clones of one `WardenDb` see each
/// other's writes.
#[derive(Debug, Clone)]
pub struct WardenDb {
    db: Db,
    ledger: Tree,
    keys: Tree,
    metadata: Tree,
}

impl WardenDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when the last handle drops.
    ///
    /// Ideal for unit tests. No filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let ledger = db.open_tree(LEDGER_TREE)?;
        let keys = db.open_tree(KEYS_TREE)?;
        let metadata = db.open_tree(METADATA_TREE)?;

        Ok(Self {
            db,
            ledger,
            keys,
            metadata,
        })
    }

    /// The tree backing the nonce ledger.
    pub fn ledger_tree(&self) -> &Tree {
        &self.ledger
    }

    /// The tree backing sealed key records.
    pub fn keys_tree(&self) -> &Tree {
        &self.keys
    }

    // -- Typed record helpers -----------------------------------------------

    /// Fetch and decode a bincode record from `tree`.
    pub fn get_record<T: DeserializeOwned>(&self, tree: &Tree, key: &[u8]) -> DbResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Encode `value` with bincode, store it, and flush.
    pub fn put_record<T: Serialize>(&self, tree: &Tree, key: &[u8], value: &T) -> DbResult<()> {
        let bytes =
            bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))?;
        tree.insert(key, bytes)?;
        self.flush()
    }

    // -- Metadata operations ------------------------------------------------

    /// Read a raw metadata value.
    pub fn get_metadata(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Write a raw metadata value and flush.
    pub fn put_metadata(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        self.flush()
    }

    /// Block until all pending writes are durable on disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
