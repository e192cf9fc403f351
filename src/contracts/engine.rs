//! Contract registry and executor.
//!
//! Contracts live outside the hashed chain. They are created by `deploy` and
//! mutated only through `execute`, which runs the method against a scratch
//! copy of the state and commits it on success.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::types::{CallContext, Contract, ContractCall, ContractState, ContractType, ExecutionRecord, ExecutionResult};
use crate::blockchain::Block;
use crate::error::ChainError;
use crate::transaction::Transaction;

#[derive(Debug, Default, Clone)]
pub struct ContractEngine {
    contracts: BTreeMap<String, Contract>,
    /// Ids of transactions whose payload has already been applied.
    applied_transactions: HashSet<String>,
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl ContractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&mut self, contract_type: ContractType, creator: &str, params: Value) -> Result<Contract, ChainError> {
        let contract_id = format!("contract_{}", uuid::Uuid::new_v4().simple());
        self.deploy_with_id(contract_id, contract_type, creator, params, now_millis())
    }

    pub fn deploy_with_id(
        &mut self,
        contract_id: String,
        contract_type: ContractType,
        creator: &str,
        params: Value,
        now: u64,
    ) -> Result<Contract, ChainError> {
        if self.contracts.contains_key(&contract_id) {
            return Err(ChainError::InvalidTransaction(format!(
                "Contract {} already exists",
                contract_id
            )));
        }
        let state = ContractState::deploy(contract_type, creator, &params, now)
            .map_err(ChainError::InvalidTransaction)?;

        let contract = Contract {
            contract_id: contract_id.clone(),
            contract_type,
            creator: creator.to_string(),
            params,
            state,
            execution_history: Vec::new(),
        };
        info!("Deployed {} contract {}", contract_type, contract_id);
        self.contracts.insert(contract_id, contract.clone());
        Ok(contract)
    }

    pub fn execute(&mut self, contract_id: &str, method: &str, params: Value, caller: &str) -> ExecutionResult {
        self.execute_at(contract_id, method, params, caller, now_millis())
    }

    /// Same as [`execute`](Self::execute) with an explicit clock, in milliseconds.
    pub fn execute_at(
        &mut self,
        contract_id: &str,
        method: &str,
        params: Value,
        caller: &str,
        now: u64,
    ) -> ExecutionResult {
        let contract = match self.contracts.get_mut(contract_id) {
            Some(contract) => contract,
            None => return ExecutionResult::failure(format!("Contract {} not found", contract_id)),
        };

        let ctx = CallContext {
            caller,
            creator: &contract.creator,
            now,
        };
        let mut scratch = contract.state.clone();
        let effect = match scratch.logic_mut().execute(method, &params, &ctx) {
            Ok(effect) => effect,
            Err(message) => {
                debug!("{}.{} by {} failed: {}", contract_id, method, caller, message);
                return ExecutionResult::failure(message);
            }
        };

        if !effect.mutated {
            return ExecutionResult {
                success: true,
                message: effect.message,
                data: effect.data,
                new_state: None,
            };
        }

        contract.state = scratch;
        contract.execution_history.push(ExecutionRecord {
            method: method.to_string(),
            params,
            caller: caller.to_string(),
            timestamp: now,
        });

        ExecutionResult {
            success: true,
            message: effect.message,
            data: effect.data,
            new_state: Some(contract.state.clone()),
        }
    }

    /// Applies the contract payloads carried by `blocks`, each transaction at
    /// most once, using the block timestamp as the clock so replays agree.
    /// Returns the number of payloads that were applied successfully.
    pub fn apply_blocks<'a, I>(&mut self, blocks: I) -> usize
    where
        I: IntoIterator<Item = &'a Block>,
    {
        blocks
            .into_iter()
            .map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| self.apply_payload(tx, block.timestamp))
                    .count()
            })
            .sum()
    }

    fn apply_payload(&mut self, tx: &Transaction, now: u64) -> bool {
        let Some(call) = &tx.payload else { return false };
        if self.applied_transactions.contains(&tx.id) {
            return false;
        }

        let ok = match call {
            ContractCall::Deploy { contract_type, params } => self
                .deploy_with_id(format!("contract_{}", tx.id), *contract_type, &tx.sender, params.clone(), now)
                .map_err(|e| debug!("Deploy payload in {} rejected: {}", tx.id, e))
                .is_ok(),
            ContractCall::Execute {
                contract_id,
                method,
                params,
            } => {
                // Left unmarked so a later pass can apply it once the deploy lands.
                if !self.contracts.contains_key(contract_id) {
                    debug!("Payload {} targets unknown contract {}", tx.id, contract_id);
                    return false;
                }
                self.execute_at(contract_id, method, params.clone(), &tx.sender, now).success
            }
        };
        self.applied_transactions.insert(tx.id.clone());
        ok
    }

    pub fn get_contract(&self, contract_id: &str) -> Option<&Contract> {
        self.contracts.get(contract_id)
    }

    pub fn list_contracts(&self) -> Vec<&Contract> {
        self.contracts.values().collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_transfer_over_supply_fails() {
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
        assert!(result.new_state.is_none());
        assert!(engine.get_contract(&contract.contract_id).unwrap().execution_history.is_empty());
    }

    #[test]
    fn test_successful_mutation_is_recorded() {
        let mut engine = ContractEngine::new();
        let id = engine
            .deploy(ContractType::Token, "creator", json!({ "totalSupply": 10 }))
            .unwrap()
            .contract_id;

        let result = engine.execute_at(&id, "transfer", json!({ "to": "Y", "amount": 4 }), "creator", 7);
        assert!(result.success);
        assert!(matches!(result.new_state, Some(ContractState::Token(ref t)) if t.balance_of("Y") == 4));

        let history = &engine.get_contract(&id).unwrap().execution_history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].method, "transfer");
        assert_eq!(history[0].caller, "creator");
        assert_eq!(history[0].timestamp, 7);
    }

    #[test]
    fn test_read_only_calls_are_not_recorded() {
        let mut engine = ContractEngine::new();
        let id = engine
            .deploy(ContractType::Token, "creator", json!({ "totalSupply": 10 }))
            .unwrap()
            .contract_id;

        let result = engine.execute(&id, "balanceOf", json!({ "address": "creator" }), "anyone");
        assert!(result.success);
        assert_eq!(result.data.unwrap()["balance"], 10);
        assert!(engine.get_contract(&id).unwrap().execution_history.is_empty());
    }

    #[test]
    fn test_unknown_contract_and_method() {
        let mut engine = ContractEngine::new();
        let missing = engine.execute("nope", "transfer", json!({}), "x");
        assert!(!missing.success);
        assert!(missing.message.contains("not found"));

        let id = engine
            .deploy(ContractType::UserRegistry, "creator", Value::Null)
            .unwrap()
            .contract_id;
        let before = engine.get_contract(&id).unwrap().clone();
        let result = engine.execute(&id, "selfDestruct", json!({}), "creator");
        assert!(!result.success);
        assert!(result.message.contains("Unknown method"));
        assert_eq!(engine.get_contract(&id).unwrap(), &before);
    }

    #[test]
    fn test_failed_call_leaves_state_untouched() {
        let mut engine = ContractEngine::new();
        let id = engine
            .deploy(ContractType::Voting, "creator", json!({ "options": ["a", "b"], "endTime": 100 }))
            .unwrap()
            .contract_id;

        assert!(engine.execute_at(&id, "vote", json!({ "option": "a" }), "v1", 50).success);
        assert!(!engine.execute_at(&id, "vote", json!({ "option": "b" }), "v1", 60).success);
        assert!(!engine.execute_at(&id, "vote", json!({ "option": "a" }), "v2", 101).success);

        let contract = engine.get_contract(&id).unwrap();
        assert_eq!(contract.execution_history.len(), 1);
        match &contract.state {
            ContractState::Voting(poll) => {
                assert_eq!(poll.votes["a"], 1);
                assert_eq!(poll.votes["b"], 0);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_deploy_with_invalid_params_fails() {
        let mut engine = ContractEngine::new();
        let err = engine.deploy(ContractType::Escrow, "buyer", json!({})).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
        assert!(engine.is_empty());
    }

    fn block_at(timestamp: u64, transactions: Vec<Transaction>) -> Block {
        Block {
            timestamp,
            transactions,
            ..Block::genesis()
        }
    }

    #[test]
    fn test_payloads_apply_once() {
        let mut engine = ContractEngine::new();
        let deploy = Transaction::reward("creator", 0).with_payload(ContractCall::Deploy {
            contract_type: ContractType::Token,
            params: json!({ "totalSupply": 5 }),
        });
        let contract_id = format!("contract_{}", deploy.id);
        let transfer = Transaction::reward("unused", 0).with_payload(ContractCall::Execute {
            contract_id: contract_id.clone(),
            method: "transfer".to_string(),
            params: json!({ "to": "bob", "amount": 2 }),
        });

        // Reward transactions are sent by "00", so the deploy's creator is "00".
        let blocks = vec![block_at(10, vec![deploy, transfer])];
        assert_eq!(engine.apply_blocks(&blocks), 2);
        assert_eq!(engine.apply_blocks(&blocks), 0);

        let contract = engine.get_contract(&contract_id).unwrap();
        assert_eq!(contract.execution_history[0].timestamp, 10);
        match &contract.state {
            ContractState::Token(token) => {
                assert_eq!(token.balance_of("00"), 3);
                assert_eq!(token.balance_of("bob"), 2);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_execute_before_its_deploy_is_retried() {
        let mut engine = ContractEngine::new();
        let deploy = Transaction::reward("creator", 0).with_payload(ContractCall::Deploy {
            contract_type: ContractType::Token,
            params: json!({ "totalSupply": 5 }),
        });
        let contract_id = format!("contract_{}", deploy.id);
        let transfer = block_at(
            20,
            vec![Transaction::reward("unused", 0).with_payload(ContractCall::Execute {
                contract_id: contract_id.clone(),
                method: "transfer".to_string(),
                params: json!({ "to": "bob", "amount": 2 }),
            })],
        );

        assert_eq!(engine.apply_blocks([&transfer]), 0);
        assert_eq!(engine.apply_blocks([&block_at(10, vec![deploy])]), 1);
        assert_eq!(engine.apply_blocks([&transfer]), 1);

        match &engine.get_contract(&contract_id).unwrap().state {
            ContractState::Token(token) => assert_eq!(token.balance_of("bob"), 2),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_replay_uses_block_time_not_wall_clock() {
        let deploy = Transaction::reward("creator", 0).with_payload(ContractCall::Deploy {
            contract_type: ContractType::Voting,
            params: json!({ "options": ["a", "b"], "endTime": 1_000 }),
        });
        let contract_id = format!("contract_{}", deploy.id);
        let vote = Transaction::reward("unused", 0).with_payload(ContractCall::Execute {
            contract_id: contract_id.clone(),
            method: "vote".to_string(),
            params: json!({ "option": "a" }),
        });
        // Both blocks predate endTime, which is long past by the wall clock.
        let blocks = vec![block_at(500, vec![deploy]), block_at(900, vec![vote])];

        let mut live = ContractEngine::new();
        let mut replayed = ContractEngine::new();
        assert_eq!(live.apply_blocks(&blocks), 2);
        assert_eq!(replayed.apply_blocks(&blocks), 2);

        let live = live.get_contract(&contract_id).unwrap();
        assert_eq!(live, replayed.get_contract(&contract_id).unwrap());
        match &live.state {
            ContractState::Voting(poll) => assert_eq!(poll.votes["a"], 1),
            other => panic!("unexpected state {:?}", other),
        }
    }
}
