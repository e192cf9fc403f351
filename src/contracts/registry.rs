//! Username registry: one username per address, one address per username.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::types::{param_str, unknown_method, CallContext, ContractLogic, ContractType, Effect};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub address: String,
    pub profile: Map<String, Value>,
    pub registered_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryState {
    pub users: BTreeMap<String, UserRecord>,
    /// address -> username
    pub addresses: BTreeMap<String, String>,
}

fn profile_param(params: &Value) -> Map<String, Value> {
    params
        .get("profile")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

impl RegistryState {
    pub fn find_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    pub fn find_by_address(&self, address: &str) -> Option<&UserRecord> {
        self.addresses
            .get(address)
            .and_then(|username| self.users.get(username))
    }

    fn register(&mut self, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        let username = param_str(params, "username")?;
        let len = username.chars().count();
        if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
            return Err(format!(
                "Username must be between {} and {} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            ));
        }
        if self.users.contains_key(username) {
            return Err(format!("Username {} is already taken", username));
        }
        if self.addresses.contains_key(ctx.caller) {
            return Err(format!("{} is already registered", ctx.caller));
        }

        let record = UserRecord {
            username: username.to_string(),
            address: ctx.caller.to_string(),
            profile: profile_param(params),
            registered_at: ctx.now,
            updated_at: ctx.now,
        };
        let data = json!(record);
        self.addresses.insert(ctx.caller.to_string(), username.to_string());
        self.users.insert(username.to_string(), record);

        Ok(Effect::write(format!("Registered {}", username), Some(data)))
    }

    fn get_user(&self, params: &Value) -> Result<Effect, String> {
        let record = if let Some(username) = params.get("username").and_then(Value::as_str) {
            self.find_by_username(username)
        } else if let Some(address) = params.get("address").and_then(Value::as_str) {
            self.find_by_address(address)
        } else {
            return Err("Provide a 'username' or an 'address'".to_string());
        };

        record
            .map(|user| Effect::read(format!("Found {}", user.username), json!(user)))
            .ok_or_else(|| "User not found".to_string())
    }

    fn update_profile(&mut self, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        let username = self
            .addresses
            .get(ctx.caller)
            .cloned()
            .ok_or_else(|| format!("{} is not registered", ctx.caller))?;
        let record = self
            .users
            .get_mut(&username)
            .ok_or_else(|| "User not found".to_string())?;

        for (key, value) in profile_param(params) {
            record.profile.insert(key, value);
        }
        record.updated_at = ctx.now;

        Ok(Effect::write(format!("Updated profile of {}", username), Some(json!(record))))
    }
}

impl ContractLogic for RegistryState {
    fn execute(&mut self, method: &str, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        match method {
            "register" => self.register(params, ctx),
            "getUser" => self.get_user(params),
            "updateProfile" => self.update_profile(params, ctx),
            other => Err(unknown_method(ContractType::UserRegistry, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(registry: &mut RegistryState, method: &str, params: Value, caller: &str) -> Result<Effect, String> {
        let ctx = CallContext {
            caller,
            creator: "admin",
            now: 42,
        };
        registry.execute(method, &params, &ctx)
    }

    #[test]
    fn test_username_length_bounds() {
        let mut registry = RegistryState::default();
        assert!(call(&mut registry, "register", json!({ "username": "ab" }), "a1").is_err());
        assert!(call(&mut registry, "register", json!({ "username": "x".repeat(21) }), "a1").is_err());
        assert!(call(&mut registry, "register", json!({ "username": "abc" }), "a1").is_ok());
        assert!(call(&mut registry, "register", json!({ "username": "y".repeat(20) }), "a2").is_ok());
    }

    #[test]
    fn test_duplicate_username_and_address_rejected() {
        let mut registry = RegistryState::default();
        call(&mut registry, "register", json!({ "username": "alice" }), "addr1").unwrap();

        let err = call(&mut registry, "register", json!({ "username": "alice" }), "addr2").unwrap_err();
        assert!(err.contains("already taken"));
        let err = call(&mut registry, "register", json!({ "username": "alice2" }), "addr1").unwrap_err();
        assert!(err.contains("already registered"));
    }

    #[test]
    fn test_lookup_by_username_or_address() {
        let mut registry = RegistryState::default();
        call(&mut registry, "register", json!({ "username": "alice" }), "addr1").unwrap();

        let by_name = call(&mut registry, "getUser", json!({ "username": "alice" }), "x").unwrap();
        assert_eq!(by_name.data.unwrap()["address"], "addr1");
        let by_addr = call(&mut registry, "getUser", json!({ "address": "addr1" }), "x").unwrap();
        assert!(!by_addr.mutated);
        assert_eq!(by_addr.data.unwrap()["username"], "alice");

        assert_eq!(
            call(&mut registry, "getUser", json!({ "username": "bob" }), "x").unwrap_err(),
            "User not found"
        );
    }

    #[test]
    fn test_update_profile_merges_fields() {
        let mut registry = RegistryState::default();
        call(
            &mut registry,
            "register",
            json!({ "username": "alice", "profile": { "bio": "hi" } }),
            "addr1",
        )
        .unwrap();

        assert!(call(&mut registry, "updateProfile", json!({ "profile": { "x": 1 } }), "addr2").is_err());
        call(&mut registry, "updateProfile", json!({ "profile": { "avatar": "cat.png" } }), "addr1").unwrap();

        let user = registry.find_by_username("alice").unwrap();
        assert_eq!(user.profile["bio"], "hi");
        assert_eq!(user.profile["avatar"], "cat.png");
    }
}
