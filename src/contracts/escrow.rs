//! Two-party escrow. Funds are deposited by the buyer and settle exactly once,
//! either released to the seller or refunded to the buyer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{param_str, param_u64, unknown_method, CallContext, ContractLogic, ContractType, Effect};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowState {
    pub buyer: String,
    pub seller: String,
    pub amount: u64,
    pub deposited: bool,
    pub released: bool,
    pub refunded: bool,
}

impl EscrowState {
    pub fn deploy(creator: &str, params: &Value) -> Result<Self, String> {
        let buyer = params.get("buyer").and_then(Value::as_str).unwrap_or(creator);
        Ok(EscrowState {
            buyer: buyer.to_string(),
            seller: param_str(params, "seller")?.to_string(),
            amount: param_u64(params, "amount")?,
            deposited: false,
            released: false,
            refunded: false,
        })
    }

    fn ensure_unsettled(&self) -> Result<(), String> {
        if self.released {
            return Err("Funds already released".to_string());
        }
        if self.refunded {
            return Err("Funds already refunded".to_string());
        }
        Ok(())
    }

    fn deposit(&mut self, ctx: &CallContext<'_>) -> Result<Effect, String> {
        if ctx.caller != self.buyer {
            return Err("Only the buyer can deposit".to_string());
        }
        self.ensure_unsettled()?;
        if self.deposited {
            return Err("Funds already deposited".to_string());
        }
        self.deposited = true;
        Ok(Effect::write(
            format!("Deposited {} into escrow", self.amount),
            Some(json!({ "amount": self.amount })),
        ))
    }

    fn release(&mut self, ctx: &CallContext<'_>) -> Result<Effect, String> {
        if ctx.caller != self.buyer && ctx.caller != self.seller {
            return Err("Only the buyer or seller can release funds".to_string());
        }
        self.ensure_unsettled()?;
        if !self.deposited {
            return Err("No funds deposited".to_string());
        }
        self.released = true;
        Ok(Effect::write(
            format!("Released {} to {}", self.amount, self.seller),
            Some(json!({ "recipient": self.seller, "amount": self.amount })),
        ))
    }

    fn refund(&mut self, ctx: &CallContext<'_>) -> Result<Effect, String> {
        if ctx.caller != self.seller {
            return Err("Only the seller can refund".to_string());
        }
        self.ensure_unsettled()?;
        if !self.deposited {
            return Err("No funds deposited".to_string());
        }
        self.refunded = true;
        Ok(Effect::write(
            format!("Refunded {} to {}", self.amount, self.buyer),
            Some(json!({ "recipient": self.buyer, "amount": self.amount })),
        ))
    }
}

impl ContractLogic for EscrowState {
    fn execute(&mut self, method: &str, _params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        match method {
            "deposit" => self.deposit(ctx),
            "release" => self.release(ctx),
            "refund" => self.refund(ctx),
            other => Err(unknown_method(ContractType::Escrow, other)),
        }
    }
}
