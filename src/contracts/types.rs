//! Contract data model shared by every contract kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::escrow::EscrowState;
use super::registry::RegistryState;
use super::token::TokenState;
use super::voting::VotingState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    Token,
    Escrow,
    Voting,
    UserRegistry,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Token => "TOKEN",
            ContractType::Escrow => "ESCROW",
            ContractType::Voting => "VOTING",
            ContractType::UserRegistry => "USER_REGISTRY",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TOKEN" => Ok(ContractType::Token),
            "ESCROW" => Ok(ContractType::Escrow),
            "VOTING" => Ok(ContractType::Voting),
            "USER_REGISTRY" => Ok(ContractType::UserRegistry),
            other => Err(format!("Unknown contract type: {}", other)),
        }
    }
}

/// Per-kind contract state. The variant always matches the contract's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractState {
    Token(TokenState),
    Escrow(EscrowState),
    Voting(VotingState),
    UserRegistry(RegistryState),
}

impl ContractState {
    /// Runs the type-specific constructor.
    pub fn deploy(
        contract_type: ContractType,
        creator: &str,
        params: &Value,
        now: u64,
    ) -> Result<Self, String> {
        Ok(match contract_type {
            ContractType::Token => ContractState::Token(TokenState::deploy(creator, params)?),
            ContractType::Escrow => ContractState::Escrow(EscrowState::deploy(creator, params)?),
            ContractType::Voting => ContractState::Voting(VotingState::deploy(params, now)?),
            ContractType::UserRegistry => ContractState::UserRegistry(RegistryState::default()),
        })
    }

    pub fn contract_type(&self) -> ContractType {
        match self {
            ContractState::Token(_) => ContractType::Token,
            ContractState::Escrow(_) => ContractType::Escrow,
            ContractState::Voting(_) => ContractType::Voting,
            ContractState::UserRegistry(_) => ContractType::UserRegistry,
        }
    }

    pub(crate) fn logic_mut(&mut self) -> &mut dyn ContractLogic {
        match self {
            ContractState::Token(state) => state,
            ContractState::Escrow(state) => state,
            ContractState::Voting(state) => state,
            ContractState::UserRegistry(state) => state,
        }
    }
}

/// Who is calling, on whose contract, and when.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub caller: &'a str,
    pub creator: &'a str,
    /// Milliseconds since the Unix epoch.
    pub now: u64,
}

/// What a successful method call did.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub message: String,
    pub data: Option<Value>,
    pub mutated: bool,
}

impl Effect {
    pub fn read(message: impl Into<String>, data: Value) -> Self {
        Effect {
            message: message.into(),
            data: Some(data),
            mutated: false,
        }
    }

    pub fn write(message: impl Into<String>, data: Option<Value>) -> Self {
        Effect {
            message: message.into(),
            data,
            mutated: true,
        }
    }
}

/// The state-transition table of one contract kind.
///
/// Implementations may leave `self` partially modified when they return
/// `Err`; the engine runs them against a scratch copy and only commits on
/// success.
pub trait ContractLogic {
    fn execute(&mut self, method: &str, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub method: String,
    pub params: Value,
    pub caller: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub contract_id: String,
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub creator: String,
    pub params: Value,
    pub state: ContractState,
    pub execution_history: Vec<ExecutionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<ContractState>,
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        ExecutionResult {
            success: false,
            message: message.into(),
            data: None,
            new_state: None,
        }
    }
}

/// A contract operation carried in a transaction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ContractCall {
    Deploy {
        #[serde(rename = "contractType")]
        contract_type: ContractType,
        #[serde(default)]
        params: Value,
    },
    Execute {
        #[serde(rename = "contractId")]
        contract_id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },
}

pub(crate) fn param_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing or invalid parameter '{}'", key))
}

pub(crate) fn param_u64(params: &Value, key: &str) -> Result<u64, String> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("Missing or invalid parameter '{}'", key))
}

pub(crate) fn unknown_method(contract_type: ContractType, method: &str) -> String {
    format!("Unknown method '{}' for {} contract", method, contract_type)
}
