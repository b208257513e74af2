// Unspent outputs are derived by scanning the whole chain, newest block first
// A spend always sits in a block at or after the output it consumes, so walking
// backwards records every spend before reaching the output it refers to

use crate::core::{Ledger, TXOutput};
use crate::error::{LedgerError, Result};
use std::collections::{HashMap, HashSet};

/// An unspent output together with where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: Vec<u8>,
    pub index: usize,
    pub output: TXOutput,
}

pub struct UtxoDeriver<'a> {
    ledger: &'a Ledger,
}

impl<'a> UtxoDeriver<'a> {
    pub fn new(ledger: &'a Ledger) -> UtxoDeriver<'a> {
        UtxoDeriver { ledger }
    }

    pub fn get_ledger(&self) -> &Ledger {
        self.ledger
    }

    /// All outputs locked to `address` that no input on the chain spends,
    /// newest first.
    pub fn find_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let mut unspent = vec![];
        // txid -> output indices already known to be spent
        let mut spent_txos: HashMap<Vec<u8>, HashSet<usize>> = HashMap::new();

        for block in self.ledger.iterator() {
            let block = block?;
            for tx in block.get_transactions() {
                let spent = spent_txos.get(tx.get_id());
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if spent.is_some_and(|indices| indices.contains(&idx)) {
                        continue;
                    }
                    if out.can_be_unlocked_with(address) {
                        unspent.push(UnspentOutput {
                            txid: tx.get_id().to_vec(),
                            index: idx,
                            output: out.clone(),
                        });
                    }
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos
                        .entry(txin.get_txid().to_vec())
                        .or_default()
                        .insert(txin.get_vout());
                }
            }
        }

        Ok(unspent)
    }

    pub fn unspent_outputs_for(&self, address: &str) -> Result<Vec<TXOutput>> {
        Ok(self
            .find_unspent(address)?
            .into_iter()
            .map(|unspent| unspent.output)
            .collect())
    }

    pub fn balance(&self, address: &str) -> Result<u64> {
        let mut balance = 0u64;
        for out in self.unspent_outputs_for(address)? {
            balance = balance.checked_add(out.get_value()).ok_or_else(|| {
                LedgerError::Transaction(format!("Balance of {address} overflows"))
            })?;
        }
        Ok(balance)
    }

    /// Pick unspent outputs of `address` until their sum reaches `amount`.
    /// Returns the accumulated value, which may fall short of `amount`.
    pub fn find_spendable_outputs(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<(u64, Vec<UnspentOutput>)> {
        let mut accumulated = 0u64;
        let mut selected = vec![];
        for unspent in self.find_unspent(address)? {
            if accumulated >= amount {
                break;
            }
            accumulated = accumulated
                .checked_add(unspent.output.get_value())
                .ok_or_else(|| {
                    LedgerError::Transaction(format!("Spendable value of {address} overflows"))
                })?;
            selected.push(unspent);
        }
        Ok((accumulated, selected))
    }
}
