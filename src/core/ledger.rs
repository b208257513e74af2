// This is the ledger - an append-only chain of mined blocks plus a movable tip
// Blocks live in a sled tree keyed by their hash; the key "1" points at the newest one
// Appends read the tip, mine on top of it and commit block + tip in one transaction

use crate::config::LedgerConfig;
use crate::core::{Block, ProofOfWork, Transaction, UtxoDeriver};
use crate::error::{LedgerError, Result};
use crate::storage::BlockStore;
use data_encoding::HEXLOWER;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Memo carried by the genesis coinbase
pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

// How many times an append re-mines after losing the tip to another writer
const MAX_APPEND_ATTEMPTS: usize = 3;

type OutPoint = (Vec<u8>, usize);

fn no_hook(_: &Block) -> Result<()> {
    Ok(())
}

#[derive(Clone)]
pub struct Ledger {
    tip_hash: Arc<RwLock<Vec<u8>>>, // Hash of the most recent block in the chain
    store: BlockStore,
    pow: ProofOfWork,
    config: LedgerConfig,
    append_lock: Arc<Mutex<()>>, // Serialises appends made through clones of this ledger
}

impl Ledger {
    /// Open the ledger at `config.db_path`, creating a genesis block that
    /// rewards `genesis_address` when no chain exists there yet.
    pub fn open(config: &LedgerConfig, genesis_address: &str) -> Result<Ledger> {
        config.validate()?;
        let store = BlockStore::open(&config.db_path, &config.tree_name)?;
        Self::open_with_store(store, config, genesis_address)
    }

    /// Open an existing ledger; fails with [`LedgerError::NotFound`] if none exists.
    pub fn open_existing(config: &LedgerConfig) -> Result<Ledger> {
        config.validate()?;
        let store = BlockStore::open(&config.db_path, &config.tree_name)?;
        let tip_hash = store.read_tip()?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "No existing ledger found at {}. Create one first.",
                config.db_path.display()
            ))
        })?;
        Ok(Self::from_parts(store, config, tip_hash))
    }

    /// Open or initialise a ledger over an already opened store.
    pub fn open_with_store(
        store: BlockStore,
        config: &LedgerConfig,
        genesis_address: &str,
    ) -> Result<Ledger> {
        let tip_hash = match store.read_tip()? {
            Some(tip_hash) => tip_hash,
            None => Self::create_genesis(&store, config, genesis_address)?,
        };
        Ok(Self::from_parts(store, config, tip_hash))
    }

    fn from_parts(store: BlockStore, config: &LedgerConfig, tip_hash: Vec<u8>) -> Ledger {
        Ledger {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            store,
            pow: ProofOfWork::from_config(config),
            config: config.clone(),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    fn create_genesis(
        store: &BlockStore,
        config: &LedgerConfig,
        genesis_address: &str,
    ) -> Result<Vec<u8>> {
        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx =
            Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_DATA, config.subsidy)?;
        let genesis =
            Block::generate_genesis_block(&coinbase_tx, &ProofOfWork::from_config(config))?;

        match store.commit_block(&genesis, None, &no_hook) {
            Ok(()) => Ok(genesis.get_hash().to_vec()),
            // Someone initialised the store first; keep their chain
            Err(LedgerError::StaleTip) => store
                .read_tip()?
                .ok_or_else(|| LedgerError::NotFound("tip after genesis race".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Tip as last seen by this handle. Other handles on the same store may
    /// have moved it since; [`Ledger::refresh_tip`] re-reads it.
    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the tip from the store and remember it.
    pub fn refresh_tip(&self) -> Result<Vec<u8>> {
        let tip_hash = self
            .store
            .read_tip()?
            .ok_or_else(|| LedgerError::NotFound("tip block hash".to_string()))?;
        self.set_tip_hash(&tip_hash);
        Ok(tip_hash)
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *tip_hash = new_tip_hash.to_vec();
    }

    pub fn get_config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get_proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn get_store(&self) -> &BlockStore {
        &self.store
    }

    /// Mine `transactions` into a new block on top of the tip and append it.
    pub fn add_block(&self, transactions: &[Transaction]) -> Result<Block> {
        self.add_block_with_cancel(transactions, &AtomicBool::new(false))
    }

    /// Like [`Ledger::add_block`], but gives up with [`LedgerError::Cancelled`]
    /// once `cancel` is set. A cancelled append leaves the store untouched.
    pub fn add_block_with_cancel(
        &self,
        transactions: &[Transaction],
        cancel: &AtomicBool,
    ) -> Result<Block> {
        self.append(transactions, cancel, &no_hook, &no_hook)
    }

    /// Mine a block whose first transaction rewards `miner`.
    pub fn mine_block(
        &self,
        miner: &str,
        memo: &str,
        transactions: &[Transaction],
    ) -> Result<Block> {
        let mut block_transactions = vec![Transaction::new_coinbase_tx(
            miner,
            memo,
            self.config.subsidy,
        )?];
        block_transactions.extend_from_slice(transactions);
        self.add_block(&block_transactions)
    }

    // Each attempt verifies, mines and commits against one tip read from the store.
    // `after_mining` runs outside the commit transaction, `before_commit` inside it.
    fn append(
        &self,
        transactions: &[Transaction],
        cancel: &AtomicBool,
        after_mining: &dyn Fn(&Block) -> Result<()>,
        before_commit: &dyn Fn(&Block) -> Result<()>,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let tip_hash = self.refresh_tip()?;
            self.verify_transactions(transactions, &tip_hash)?;

            let block =
                Block::new_block_with_cancel(tip_hash.clone(), transactions, &self.pow, cancel)?;
            after_mining(&block)?;

            match self.store.commit_block(&block, Some(tip_hash.as_slice()), before_commit) {
                Ok(()) => {
                    self.set_tip_hash(block.get_hash());
                    info!(
                        "Appended block {} on top of {}",
                        block.get_hash_hex(),
                        HEXLOWER.encode(&tip_hash)
                    );
                    return Ok(block);
                }
                Err(LedgerError::StaleTip) => {
                    warn!(
                        "Tip moved while mining (attempt {attempt}/{MAX_APPEND_ATTEMPTS}); re-mining"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::StaleTip)
    }

    /// Walk the chain starting from the tip currently in the store.
    pub fn iterator(&self) -> ChainIterator {
        ChainIterator::from_store(self.store.clone())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        self.store.get_block(block_hash)
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        for block in self.iterator() {
            let block = block?;
            if let Some(transaction) = block
                .get_transactions()
                .iter()
                .find(|transaction| transaction.get_id() == txid)
            {
                return Ok(Some(transaction.clone()));
            }
        }
        Ok(None)
    }

    /// Sum of the unspent outputs locked to `address`.
    pub fn balance(&self, address: &str) -> Result<u64> {
        UtxoDeriver::new(self).balance(address)
    }

    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<()> {
        let tip_hash = self.refresh_tip()?;
        self.verify_transactions(std::slice::from_ref(transaction), &tip_hash)
    }

    // Checks a candidate block's transactions against the chain ending at `tip_hash`:
    // ids match content, coinbases pay exactly the subsidy, inputs exist, unlock
    // their outputs, are unspent, are not spent twice within the block, and cover
    // the outputs.
    fn verify_transactions(&self, transactions: &[Transaction], tip_hash: &[u8]) -> Result<()> {
        let mut referenced: HashSet<OutPoint> = HashSet::new();
        for (i, transaction) in transactions.iter().enumerate() {
            if !transaction.verify_id()? {
                return Err(LedgerError::Transaction(format!(
                    "Transaction {i} id does not match its content"
                )));
            }
            if transaction.is_coinbase() {
                let reward = transaction.get_output_value()?;
                if transaction.get_vout().len() != 1 || reward != self.config.subsidy {
                    return Err(LedgerError::Transaction(format!(
                        "Coinbase {i} pays {reward} over {} outputs, expected a single {} reward",
                        transaction.get_vout().len(),
                        self.config.subsidy
                    )));
                }
                continue;
            }
            for input in transaction.get_vin() {
                let outpoint = (input.get_txid().to_vec(), input.get_vout());
                if !referenced.insert(outpoint) {
                    return Err(LedgerError::Transaction(format!(
                        "Double-spend in transaction {i}: output {}:{} already spent in this block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        if referenced.is_empty() {
            return Ok(());
        }

        // One walk over the chain collects the referenced outputs and any spends of them
        let mut outputs = HashMap::new();
        let mut spent: HashSet<OutPoint> = HashSet::new();
        for block in ChainIterator::new(tip_hash.to_vec(), self.store.clone()) {
            let block = block?;
            for tx in block.get_transactions() {
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    let outpoint = (tx.get_id().to_vec(), idx);
                    if referenced.contains(&outpoint) {
                        outputs.insert(outpoint, out.clone());
                    }
                }
                if tx.is_coinbase() {
                    continue;
                }
                for input in tx.get_vin() {
                    let outpoint = (input.get_txid().to_vec(), input.get_vout());
                    if referenced.contains(&outpoint) {
                        spent.insert(outpoint);
                    }
                }
            }
        }

        for (i, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            let mut input_value = 0u64;
            for input in transaction.get_vin() {
                let outpoint = (input.get_txid().to_vec(), input.get_vout());
                let label = format!("{}:{}", HEXLOWER.encode(input.get_txid()), input.get_vout());
                let output = outputs.get(&outpoint).ok_or_else(|| {
                    LedgerError::Transaction(format!(
                        "Transaction {i} references unknown output {label}"
                    ))
                })?;
                if spent.contains(&outpoint) {
                    return Err(LedgerError::Transaction(format!(
                        "Transaction {i} spends already spent output {label}"
                    )));
                }
                if !output.can_be_unlocked_with(input.get_unlock_proof()) {
                    return Err(LedgerError::Transaction(format!(
                        "Transaction {i} cannot unlock output {label}"
                    )));
                }
                input_value = input_value.checked_add(output.get_value()).ok_or_else(|| {
                    LedgerError::Transaction(format!("Transaction {i} input value overflow"))
                })?;
            }

            let output_value = transaction.get_output_value()?;
            if input_value < output_value {
                return Err(LedgerError::Transaction(format!(
                    "Transaction {i} spends {output_value} but its inputs hold {input_value}"
                )));
            }
        }

        Ok(())
    }

    /// Walk tip to genesis re-checking proof-of-work, hash linkage and
    /// transaction ids. Returns the number of blocks.
    pub fn audit(&self) -> Result<usize> {
        let mut count = 0;
        let mut expected_hash = self.refresh_tip()?;
        for block in ChainIterator::new(expected_hash.clone(), self.store.clone()) {
            let block = block?;
            let block_hex = block.get_hash_hex();
            if block.get_hash() != expected_hash.as_slice() {
                return Err(LedgerError::InvalidBlock(format!(
                    "Block {block_hex} stored under a different key"
                )));
            }
            if !self.pow.validate(&block) {
                return Err(LedgerError::InvalidBlock(format!(
                    "Block {block_hex} fails proof-of-work"
                )));
            }
            for transaction in block.get_transactions() {
                if !transaction.verify_id()? {
                    return Err(LedgerError::InvalidBlock(format!(
                        "Block {block_hex} holds a transaction whose id does not match its content"
                    )));
                }
            }
            expected_hash = block.get_pre_block_hash().to_vec();
            count += 1;
        }
        Ok(count)
    }

    /// Flush and release the store handle.
    pub fn close(self) -> Result<()> {
        self.store.flush()
    }
}

/// Lazy cursor from the tip back to genesis, decoding one block per step.
pub struct ChainIterator {
    store: BlockStore,
    cursor: Cursor,
}

enum Cursor {
    StoredTip, // Read the tip from the store on the first step
    At(Vec<u8>),
    Done,
}

impl ChainIterator {
    /// Start at `tip_hash`.
    pub fn new(tip_hash: Vec<u8>, store: BlockStore) -> ChainIterator {
        ChainIterator {
            store,
            cursor: Cursor::At(tip_hash),
        }
    }

    /// Start at whatever tip the store holds when iteration begins.
    pub fn from_store(store: BlockStore) -> ChainIterator {
        ChainIterator {
            store,
            cursor: Cursor::StoredTip,
        }
    }
}

impl Iterator for ChainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let current_hash = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return None,
            Cursor::At(hash) => hash,
            Cursor::StoredTip => match self.store.read_tip() {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    return Some(Err(LedgerError::NotFound("tip block hash".to_string())));
                }
                Err(e) => return Some(Err(e)),
            },
        };
        match self.store.get_block(&current_hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.cursor = Cursor::At(block.get_pre_block_hash().to_vec());
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(LedgerError::NotFound(format!(
                "block {}",
                HEXLOWER.encode(&current_hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
