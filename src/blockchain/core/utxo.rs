//! Unspent-output queries, recomputed by walking history newest first.
//!
//! There is no persistent UTXO index: every query scans pending transactions
//! and then the canonical chain, so cost grows with chain length.

use crate::crypto::{decode_address, PubKeyHash};
use crate::error::ChainError;
use crate::transaction::{PrevTransactions, Transaction, Utxo};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::ControlFlow;

use super::chain::{Blockchain, Sha256Hash};
use super::iterator::ChainIterator;

/// Output indices chosen for spending, keyed by owning transaction hash.
pub type SpendMap = BTreeMap<Sha256Hash, Vec<usize>>;

/// Set of (transaction hash, output index) pairs.
pub(super) type OutpointSet = HashSet<(Sha256Hash, usize)>;

/// Outpoints consumed by inputs seen so far.
type SpentIndex = OutpointSet;

/// Records the inputs of `tx` as spent, then returns its outputs that are
/// still unspent. With `owner` set, only that key's inputs and outputs count.
///
/// Sound only when called newest first: a spender must be seen before the
/// transaction whose output it spends.
fn classify(tx: &Transaction, owner: Option<&PubKeyHash>, spent: &mut SpentIndex) -> Vec<Utxo> {
    if !tx.is_coinbase() {
        for input in &tx.inputs {
            if owner.map_or(true, |pkh| input.unlocks_with(pkh)) {
                if let Some(outpoint) = input.outpoint() {
                    spent.insert(outpoint);
                }
            }
        }
    }

    tx.outputs
        .iter()
        .enumerate()
        .filter(|(_, output)| owner.map_or(true, |pkh| output.is_locked_to(pkh)))
        .filter(|(index, _)| !spent.contains(&(tx.hash, *index)))
        .map(|(index, output)| Utxo {
            tx_hash: tx.hash,
            index,
            output: output.clone(),
        })
        .collect()
}

impl Blockchain {
    /// Feeds `pending` (last element first) and then the transactions of every
    /// block from `head` back to genesis (each block back to front) to `visit`
    /// until it breaks.
    fn walk_newest_first<F>(
        &self,
        head: Sha256Hash,
        pending: &[Transaction],
        mut visit: F,
    ) -> Result<(), ChainError>
    where
        F: FnMut(&Transaction) -> ControlFlow<()>,
    {
        for tx in pending.iter().rev() {
            if visit(tx).is_break() {
                return Ok(());
            }
        }
        for block in ChainIterator::new(self.store.as_ref(), head) {
            for tx in block?.transactions.iter().rev() {
                if visit(tx).is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Greedily collects unspent outputs of `address`, in traversal order,
    /// until their total reaches `amount`.
    ///
    /// Returns the collected total and where the outputs live. Fails with
    /// `InsufficientFunds`, and no partial selection, when history runs out first.
    pub fn spendable_utxos(
        &self,
        address: &str,
        amount: u64,
        pending: &[Transaction],
    ) -> Result<(u64, SpendMap), ChainError> {
        let owner = decode_address(address)?;
        let mut spent = SpentIndex::new();
        let mut selected = SpendMap::new();
        let mut total: u64 = 0;

        if amount == 0 {
            return Ok((total, selected));
        }

        self.walk_newest_first(self.tip, pending, |tx| {
            for utxo in classify(tx, Some(&owner), &mut spent) {
                total = total.saturating_add(utxo.output.value);
                selected.entry(utxo.tx_hash).or_default().push(utxo.index);
                if total >= amount {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })?;

        if total < amount {
            return Err(ChainError::InsufficientFunds {
                address: address.to_string(),
                requested: amount,
                available: total,
            });
        }
        Ok((total, selected))
    }

    /// Every unspent output locked to `address`, newest first.
    pub fn utxos_for_address(
        &self,
        address: &str,
        pending: &[Transaction],
    ) -> Result<Vec<Utxo>, ChainError> {
        let owner = decode_address(address)?;
        let mut spent = SpentIndex::new();
        let mut utxos = Vec::new();

        self.walk_newest_first(self.tip, pending, |tx| {
            utxos.extend(classify(tx, Some(&owner), &mut spent));
            ControlFlow::Continue(())
        })?;
        Ok(utxos)
    }

    /// Unspent outputs of the committed chain, grouped by owning transaction.
    pub fn all_utxos(&self) -> Result<HashMap<Sha256Hash, Vec<Utxo>>, ChainError> {
        let mut spent = SpentIndex::new();
        let mut utxos: HashMap<Sha256Hash, Vec<Utxo>> = HashMap::new();

        self.walk_newest_first(self.tip, &[], |tx| {
            let unspent = classify(tx, None, &mut spent);
            if !unspent.is_empty() {
                utxos.entry(tx.hash).or_default().extend(unspent);
            }
            ControlFlow::Continue(())
        })?;
        Ok(utxos)
    }

    /// Unspent outpoints of the branch ending at `head`, together with the
    /// transactions named in `wanted` that were met along the way.
    pub(super) fn unspent_on_branch(
        &self,
        head: Sha256Hash,
        wanted: &HashSet<Sha256Hash>,
    ) -> Result<(OutpointSet, PrevTransactions), ChainError> {
        let mut spent = SpentIndex::new();
        let mut unspent = OutpointSet::new();
        let mut found = PrevTransactions::new();

        self.walk_newest_first(head, &[], |tx| {
            unspent.extend(
                classify(tx, None, &mut spent)
                    .into_iter()
                    .map(|utxo| (utxo.tx_hash, utxo.index)),
            );
            if wanted.contains(&tx.hash) {
                found.entry(tx.hash).or_insert_with(|| tx.clone());
            }
            ControlFlow::Continue(())
        })?;
        Ok((unspent, found))
    }

    pub fn balance(&self, address: &str) -> Result<u64, ChainError> {
        Ok(self
            .utxos_for_address(address, &[])?
            .iter()
            .map(|utxo| utxo.output.value)
            .sum())
    }
}
