//! Pending transaction pool
//!
//! Holds signature-checked transactions in arrival order until they are
//! mined into a block.

use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    /// Drops every pending transaction whose id appears in `included`.
    pub fn remove_included(&mut self, included: &[Transaction]) {
        self.transactions
            .retain(|pending| !included.iter().any(|tx| tx.id == pending.id));
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Empties the pool, returning its contents in arrival order.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let mut pool = Mempool::new();
        let a = Transaction::reward("a", 1);
        let b = Transaction::reward("b", 2);
        pool.add_transaction(a.clone());
        pool.add_transaction(b.clone());

        assert_eq!(pool.drain(), vec![a, b]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_included() {
        let mut pool = Mempool::new();
        let a = Transaction::reward("a", 1);
        let b = Transaction::reward("b", 2);
        pool.add_transaction(a.clone());
        pool.add_transaction(b.clone());

        pool.remove_included(std::slice::from_ref(&a));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&b.id));
        assert!(!pool.contains(&a.id));
    }
}
