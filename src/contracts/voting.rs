//! Single-question poll with a fixed option set and a closing time.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::types::{param_str, unknown_method, CallContext, ContractLogic, ContractType, Effect};

/// Poll length used when neither `endTime` nor `duration` is given.
pub const DEFAULT_VOTING_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingState {
    pub question: String,
    pub options: Vec<String>,
    pub votes: BTreeMap<String, u64>,
    /// caller -> chosen option
    pub voters: BTreeMap<String, String>,
    pub end_time: u64,
}

impl VotingState {
    pub fn deploy(params: &Value, now: u64) -> Result<Self, String> {
        let options: Vec<String> = params
            .get("options")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if options.is_empty() {
            return Err("Voting contract needs a non-empty 'options' list".to_string());
        }

        let end_time = match params.get("endTime").and_then(Value::as_u64) {
            Some(end_time) => end_time,
            None => {
                let duration = params
                    .get("duration")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_VOTING_DURATION_MS);
                now.saturating_add(duration)
            }
        };

        let votes = options.iter().map(|option| (option.clone(), 0)).collect();

        Ok(VotingState {
            question: params.get("question").and_then(Value::as_str).unwrap_or_default().to_string(),
            options,
            votes,
            voters: BTreeMap::new(),
            end_time,
        })
    }

    fn vote(&mut self, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        if ctx.now > self.end_time {
            return Err("Voting has ended".to_string());
        }
        if self.voters.contains_key(ctx.caller) {
            return Err(format!("{} has already voted", ctx.caller));
        }
        let option = param_str(params, "option")?;
        if !self.options.iter().any(|o| o == option) {
            return Err(format!("Invalid option: {}", option));
        }

        *self.votes.entry(option.to_string()).or_insert(0) += 1;
        self.voters.insert(ctx.caller.to_string(), option.to_string());

        Ok(Effect::write(
            format!("Vote recorded for {}", option),
            Some(json!({ "option": option, "votes": self.votes[option] })),
        ))
    }

    fn results(&self, ctx: &CallContext<'_>) -> Effect {
        let total: u64 = self.votes.values().sum();
        Effect::read(
            "Current results",
            json!({
                "question": self.question,
                "results": self.votes,
                "totalVotes": total,
                "ended": ctx.now > self.end_time,
            }),
        )
    }
}

impl ContractLogic for VotingState {
    fn execute(&mut self, method: &str, params: &Value, ctx: &CallContext<'_>) -> Result<Effect, String> {
        match method {
            "vote" => self.vote(params, ctx),
            "getResults" => Ok(self.results(ctx)),
            other => Err(unknown_method(ContractType::Voting, other)),
        }
    }
}
