use serde::{Deserialize, Serialize};

use crate::blockchain::core::chain::Blockchain;
use crate::transaction::Transaction;

/// Balance and history of one address, derived by scanning the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressData {
    pub address: String,
    /// Received minus sent over every mined block.
    pub balance: i128,
    pub transactions: Vec<Transaction>,
}

impl Blockchain {
    /// Full scan over every transaction in every block. Pending transactions
    /// are not counted.
    pub fn get_address_data(&self, address: &str) -> AddressData {
        let mut balance: i128 = 0;
        let mut transactions = Vec::new();

        for tx in self.blocks.iter().flat_map(|block| block.transactions.iter()) {
            let received = tx.recipient == address;
            let sent = tx.sender == address;
            if received {
                balance += tx.amount as i128;
            }
            if sent {
                balance -= tx.amount as i128;
            }
            if received || sent {
                transactions.push(tx.clone());
            }
        }

        AddressData {
            address: address.to_string(),
            balance,
            transactions,
        }
    }

    pub fn get_balance(&self, address: &str) -> i128 {
        self.get_address_data(address).balance
    }
}
