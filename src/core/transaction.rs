// This file implements the transaction model - how value moves through the ledger
// Each transaction consumes whole previous outputs and creates new ones
// Ownership is a plain string match between an input's unlock proof and an output's lock

use crate::core::UtxoDeriver;
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize, sha256_digest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default value of a coinbase output
pub const SUBSIDY: u64 = 10;

// This represents a transaction input - it references a previous transaction output
// Think of it as "I want to spend output #2 from transaction ABC123"
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,        // The ID of the transaction containing the output being spent
    vout: usize,          // The index of the output in that transaction
    unlock_proof: String, // Matched against the referenced output's lock condition
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize, unlock_proof: &str) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            unlock_proof: unlock_proof.to_string(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_unlock_proof(&self) -> &str {
        self.unlock_proof.as_str()
    }

    /// True when this input carries the given unlocking data.
    pub fn can_unlock_output_with(&self, unlocking_data: &str) -> bool {
        self.unlock_proof == unlocking_data
    }

    fn is_synthetic(&self) -> bool {
        self.txid.is_empty()
    }
}

// This represents a transaction output - an indivisible amount locked to an owner
// Spending it means consuming the whole value and optionally paying change back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    lock_condition: String,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> TXOutput {
        TXOutput {
            value,
            lock_condition: address.to_string(),
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_lock_condition(&self) -> &str {
        self.lock_condition.as_str()
    }

    /// True when the given unlocking data opens this output.
    pub fn can_be_unlocked_with(&self, unlocking_data: &str) -> bool {
        self.lock_condition == unlocking_data
    }
}

// A transaction is identified by the hash of its own content with the id cleared
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Build a coinbase paying `subsidy` to `to`.
    ///
    /// An empty memo is replaced by `Reward to '<to>'` plus a random suffix so
    /// that two rewards to the same address never share an id.
    pub fn new_coinbase_tx(to: &str, memo: &str, subsidy: u64) -> Result<Transaction> {
        let memo = if memo.is_empty() {
            format!("Reward to '{to}' ({})", Uuid::new_v4())
        } else {
            memo.to_string()
        };

        // Coinbase transactions have a single input with no previous transaction
        let tx_input = TXInput {
            txid: vec![],
            vout: 0,
            unlock_proof: memo,
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![TXOutput::new(subsidy, to)],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build a transfer from explicit inputs and outputs.
    pub fn new_transfer(inputs: Vec<TXInput>, outputs: Vec<TXOutput>) -> Result<Transaction> {
        if inputs.is_empty() {
            return Err(LedgerError::Transaction(
                "Transfer must have at least one input".to_string(),
            ));
        }
        if outputs.is_empty() {
            return Err(LedgerError::Transaction(
                "Transfer must have at least one output".to_string(),
            ));
        }
        if inputs.iter().any(TXInput::is_synthetic) {
            return Err(LedgerError::Transaction(
                "Transfer inputs must reference a previous transaction".to_string(),
            ));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Spend enough of `from`'s unspent outputs to pay `amount` to `to`,
    /// returning any excess to `from` as change.
    pub fn new_utxo_transaction(
        from: &str,
        to: &str,
        amount: u64,
        utxo: &UtxoDeriver,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }

        let (accumulated, spendable) = utxo.find_spendable_outputs(from, amount)?;
        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let inputs = spendable
            .iter()
            .map(|unspent| TXInput::new(&unspent.txid, unspent.index, from))
            .collect();

        let mut outputs = vec![TXOutput::new(amount, to)];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, from));
        }

        Self::new_transfer(inputs, outputs)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].is_synthetic()
    }

    /// Hash of the serialized transaction with its id cleared.
    pub fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    /// Recompute the id and compare it with the stored one.
    pub fn verify_id(&self) -> Result<bool> {
        Ok(self.hash()? == self.id)
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for vout in &self.vout {
            total = total
                .checked_add(vout.get_value())
                .ok_or_else(|| LedgerError::Transaction("Output value overflow".to_string()))?;
        }
        Ok(total)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
