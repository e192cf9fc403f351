//! Fungible token: the creator starts with the whole supply and may mint more.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::types::{param_str, param_u64, unknown_method, CallContext, ContractLogic, ContractType, Effect};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub name: String,
    pub symbol: String,
    pub total_supply: u64,
    pub balances: BTreeMap<String, u64>,
}

impl TokenState {
    pub fn deploy(creator: &str, params: &Value) -> Result<Self, String> {
        let total_supply = match params.get("totalSupply") {
            None | Some(Value::Null) => 0,
            Some(_) => param_u64(params, "totalSupply")?,
        };

        let mut balances = BTreeMap::new();
        balances.insert(creator.to_string(), total_supply);

        Ok(TokenState {
            name: params.get("name").and_then(Value::as_str).unwrap_or("Token").to_string(),
            symbol: params.get("symbol").and_then(Value::as_str).unwrap_or("TKN").to_string(),
            total_supply,
            balances,
        })
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn transfer(&mut self, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        let to = param_str(params, "to")?;
        let amount = param_u64(params, "amount")?;

        let from_balance = self.balance_of(ctx.caller);
        if from_balance < amount {
            return Err(format!(
                "Insufficient balance: {} has {} but tried to send {}",
                ctx.caller, from_balance, amount
            ));
        }

        self.balances.insert(ctx.caller.to_string(), from_balance - amount);
        let to_balance = self.balances.entry(to.to_string()).or_insert(0);
        *to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| "Recipient balance overflow".to_string())?;

        Ok(Effect::write(
            format!("Transferred {} {} to {}", amount, self.symbol, to),
            Some(json!({ "from": ctx.caller, "to": to, "amount": amount })),
        ))
    }

    fn mint(&mut self, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        if ctx.caller != ctx.creator {
            return Err("Only the contract creator can mint".to_string());
        }
        let amount = param_u64(params, "amount")?;
        let to = params.get("to").and_then(Value::as_str).unwrap_or(ctx.creator);

        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| "Total supply overflow".to_string())?;
        let balance = self.balances.entry(to.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| "Recipient balance overflow".to_string())?;

        Ok(Effect::write(
            format!("Minted {} {} to {}", amount, self.symbol, to),
            Some(json!({ "to": to, "amount": amount, "totalSupply": self.total_supply })),
        ))
    }
}

impl ContractLogic for TokenState {
    fn execute(&mut self, method: &str, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        match method {
            "transfer" => self.transfer(params, ctx),
            "mint" => self.mint(params, ctx),
            "balanceOf" => {
                let address = params.get("address").and_then(Value::as_str).unwrap_or(ctx.caller);
                Ok(Effect::read(
                    format!("Balance of {}", address),
                    json!({ "address": address, "balance": self.balance_of(address) }),
                ))
            }
            other => Err(unknown_method(ContractType::Token, other)),
        }
    }
}
