//! End-to-end checks of the ledger and contract engine through the public API

use cinderchain::blockchain::{Block, Blockchain, ChainParams};
use cinderchain::contracts::{ContractEngine, ContractState, ContractType};
use cinderchain::crypto::KeyPair;
use cinderchain::persistence::{Database, JsonFileStore, Persistence};
use cinderchain::transaction::Transaction;
use serde_json::json;
use tempfile::TempDir;

fn params() -> ChainParams {
    ChainParams {
        difficulty: 2,
        ..ChainParams::default()
    }
}

#[test]
fn test_genesis_constants() {
    let chain = Blockchain::new(params());
    let genesis = &chain.blocks[0];
    assert_eq!(genesis.index, 1);
    assert_eq!(genesis.nonce, 100);
    assert_eq!(genesis.previous_hash, "0");
    assert_eq!(genesis.hash, "0");
}

#[test]
fn test_unsigned_reward_is_spendable_after_mining() {
    let mut chain = Blockchain::new(params());
    chain.add_transaction(Transaction::reward("X", 100)).unwrap();
    chain.mine_block("miner");
    assert_eq!(chain.get_address_data("X").balance, 100);
}

#[test]
fn test_every_mined_block_meets_its_difficulty() {
    let mut chain = Blockchain::new(params());
    let alice = KeyPair::generate();
    for amount in 1..=3 {
        chain.add_transaction(Transaction::signed(&alice, "bob", amount).unwrap()).unwrap();
        chain.mine_block("miner");
    }

    assert!(Blockchain::is_chain_valid(&chain.blocks));
    for block in &chain.blocks[1..] {
        assert!(block.hash.starts_with(&"0".repeat(block.difficulty as usize)));
        assert_eq!(block.hash, block.calculate_hash());
    }
}

#[test]
fn test_balance_matches_received_minus_sent() {
    let mut chain = Blockchain::new(params());
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    chain.add_transaction(Transaction::reward(alice.address(), 50)).unwrap();
    chain.add_transaction(Transaction::signed(&alice, bob.address(), 20).unwrap()).unwrap();
    chain.add_transaction(Transaction::signed(&bob, alice.address(), 5).unwrap()).unwrap();
    chain.mine_block("miner");

    let data = chain.get_address_data(&alice.address());
    let received: i128 = data
        .transactions
        .iter()
        .filter(|tx| tx.recipient == alice.address())
        .map(|tx| tx.amount as i128)
        .sum();
    let sent: i128 = data
        .transactions
        .iter()
        .filter(|tx| tx.sender == alice.address())
        .map(|tx| tx.amount as i128)
        .sum();
    assert_eq!(data.balance, received - sent);
    assert_eq!(data.balance, 35);
}

#[test]
fn test_replace_chain_is_noop_unless_longer_and_valid() {
    let mut long = Blockchain::new(params());
    long.mine_block("a");
    long.mine_block("a");

    let mut local = Blockchain::new(params());
    local.mine_block("b");
    local.mine_block("b");
    let before = local.blocks.clone();

    // Same length.
    assert!(!local.replace_chain(long.blocks.clone()));
    assert_eq!(local.blocks, before);

    // Longer but tampered.
    long.mine_block("a");
    let mut tampered = long.blocks.clone();
    tampered[3].transactions.push(Transaction::reward("thief", 1));
    assert!(!local.replace_chain(tampered));
    assert_eq!(local.blocks, before);

    assert!(local.replace_chain(long.blocks.clone()));
    assert_eq!(local.blocks, long.blocks);
}

fn round_trip(store: &dyn Persistence, chain: &[Block]) {
    store.save_chain(chain).unwrap();
    assert_eq!(store.load_chain().unwrap().as_deref(), Some(chain));
}

#[test]
fn test_snapshot_round_trip_on_disk() {
    let mut blockchain = Blockchain::new(params());
    let alice = KeyPair::generate();
    blockchain
        .add_transaction(Transaction::signed(&alice, "bob", 9).unwrap())
        .unwrap();
    blockchain.mine_block("miner");
    blockchain.mine_block("miner");

    let dir = TempDir::new().unwrap();
    round_trip(&JsonFileStore::new(dir.path().join("chain.json")), &blockchain.blocks);
    let db_path = dir.path().join("chain.db");
    round_trip(&Database::open(db_path.to_str().unwrap()).unwrap(), &blockchain.blocks);
}

#[test]
fn test_token_transfer_above_balance_fails() {
    let mut engine = ContractEngine::new();
    let contract = engine
        .deploy(ContractType::Token, "creator", json!({ "totalSupply": 1000 }))
        .unwrap();

    let result = engine.execute(
        &contract.contract_id,
        "transfer",
        json!({ "to": "Y", "amount": 1001 }),
        "creator",
    );
    assert!(!result.success);
    assert!(engine.get_contract(&contract.contract_id).unwrap().execution_history.is_empty());
}

#[test]
fn test_voting_accepts_one_vote_per_caller_and_none_after_end() {
    let mut engine = ContractEngine::new();
    let contract = engine
        .deploy_with_id(
            "poll".to_string(),
            ContractType::Voting,
            "creator",
            json!({ "question": "Tabs?", "options": ["yes", "no"], "endTime": 10_000 }),
            1_000,
        )
        .unwrap();
    let id = contract.contract_id;

    assert!(engine.execute_at(&id, "vote", json!({ "option": "yes" }), "alice", 2_000).success);
    assert!(!engine.execute_at(&id, "vote", json!({ "option": "no" }), "alice", 3_000).success);
    assert!(!engine.execute_at(&id, "vote", json!({ "option": "no" }), "bob", 10_001).success);

    match &engine.get_contract(&id).unwrap().state {
        ContractState::Voting(state) => {
            assert_eq!(state.votes["yes"], 1);
            assert_eq!(state.votes["no"], 0);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_contract_payloads_apply_once_per_transaction() {
    let mut chain = Blockchain::new(ChainParams {
        difficulty: 1,
        ..ChainParams::default()
    });
    let creator = KeyPair::generate();
    let deploy = Transaction::signed(&creator, "contracts", 0)
        .unwrap()
        .with_payload(cinderchain::contracts::ContractCall::Deploy {
            contract_type: ContractType::Token,
            params: json!({ "totalSupply": 10 }),
        });
    chain.add_transaction(deploy.clone()).unwrap();
    chain.mine_block("miner");

    let contract_id = format!("contract_{}", deploy.id);
    let transfer = Transaction::signed(&creator, "contracts", 0)
        .unwrap()
        .with_payload(cinderchain::contracts::ContractCall::Execute {
            contract_id: contract_id.clone(),
            method: "transfer".to_string(),
            params: json!({ "to": "Y", "amount": 3 }),
        });
    chain.add_transaction(transfer).unwrap();
    chain.mine_block("miner");

    let mut engine = ContractEngine::new();
    assert_eq!(engine.apply_blocks(&chain.blocks), 2);
    assert_eq!(engine.apply_blocks(&chain.blocks), 0);

    match &engine.get_contract(&contract_id).unwrap().state {
        ContractState::Token(state) => {
            assert_eq!(state.balance_of("Y"), 3);
            assert_eq!(state.balance_of(&creator.address()), 7);
        }
        other => panic!("unexpected state {:?}", other),
    }
}
