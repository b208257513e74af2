use crate::core::Block;
use crate::error::{LedgerError, Result};
use data_encoding::HEXLOWER;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};
use std::path::Path;

/// Key holding the hash of the most recently appended block
pub const TIP_BLOCK_HASH_KEY: &[u8] = b"1";

/// Transactional key-value collaborator backing a ledger.
#[derive(Clone)]
pub struct BlockStore {
    db: Db,
    tree: Tree,
}

impl BlockStore {
    pub fn open(path: &Path, tree_name: &str) -> Result<BlockStore> {
        let db = sled::open(path).map_err(|e| {
            LedgerError::StoreUnavailable(format!(
                "Failed to open database at {}: {e}",
                path.display()
            ))
        })?;
        Self::with_db(db, tree_name)
    }

    /// An in-memory store that disappears on drop.
    pub fn temporary(tree_name: &str) -> Result<BlockStore> {
        let db = sled::Config::new().temporary(true).open().map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to open temporary database: {e}"))
        })?;
        Self::with_db(db, tree_name)
    }

    fn with_db(db: Db, tree_name: &str) -> Result<BlockStore> {
        let tree = db.open_tree(tree_name).map_err(|e| {
            LedgerError::StoreUnavailable(format!("Failed to open tree '{tree_name}': {e}"))
        })?;
        Ok(BlockStore { db, tree })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.tree.get(key).map_err(|e| {
            LedgerError::StoreUnavailable(format!(
                "Failed to get key {}: {e}",
                HEXLOWER.encode(key)
            ))
        })?;
        Ok(value.map(|v| v.to_vec()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.insert(key, value).map_err(|e| {
            LedgerError::StoreUnavailable(format!(
                "Failed to put key {}: {e}",
                HEXLOWER.encode(key)
            ))
        })?;
        Ok(())
    }

    /// Run `f` against a consistent view of the tree. `f` must not write.
    pub fn with_read_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, LedgerError>,
    {
        self.tree
            .transaction(f)
            .map_err(|e| Self::transaction_error("read transaction", e))
    }

    /// Run `f` and commit all of its writes, or none of them.
    pub fn with_write_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, LedgerError>,
    {
        self.tree
            .transaction(f)
            .map_err(|e| Self::transaction_error("write transaction", e))
    }

    fn transaction_error(op: &str, err: TransactionError<LedgerError>) -> LedgerError {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => {
                LedgerError::StoreUnavailable(format!("Failed to commit {op}: {e}"))
            }
        }
    }

    pub fn read_tip(&self) -> Result<Option<Vec<u8>>> {
        self.get(TIP_BLOCK_HASH_KEY)
    }

    pub fn get_block(&self, hash: &[u8]) -> Result<Option<Block>> {
        match self.get(hash)? {
            Some(bytes) => {
                let block = Block::deserialize(&bytes).map_err(|e| {
                    LedgerError::Decode(format!("block {}: {e}", HEXLOWER.encode(hash)))
                })?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Persist `block` and make it the tip, provided the tip still equals
    /// `expected_tip`. The comparison and both writes form one transaction.
    ///
    /// `before_commit` runs inside the transaction; an error from it aborts
    /// without writing anything.
    pub fn commit_block(
        &self,
        block: &Block,
        expected_tip: Option<&[u8]>,
        before_commit: &dyn Fn(&Block) -> Result<()>,
    ) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        self.with_write_transaction(|tx_db| {
            let current_tip = tx_db.get(TIP_BLOCK_HASH_KEY)?;
            if current_tip.as_deref() != expected_tip {
                return Err(ConflictableTransactionError::Abort(LedgerError::StaleTip));
            }
            if let Err(e) = before_commit(block) {
                return Err(ConflictableTransactionError::Abort(e));
            }
            tx_db.insert(block_hash, block_data.as_slice())?;
            tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash)?;
            Ok(())
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}
