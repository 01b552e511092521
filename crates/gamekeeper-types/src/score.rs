use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel stored in `winner` for a tied game.
pub const DRAW: &str = "DRAW";

/// Who won a game, as declared by the participant who entered the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Outcome {
    Draw,
    Winner(String),
}

impl From<String> for Outcome {
    fn from(value: String) -> Self {
        if value == DRAW {
            Outcome::Draw
        } else {
            Outcome::Winner(value)
        }
    }
}

impl From<Outcome> for String {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Draw => DRAW.to_string(),
            Outcome::Winner(id) => id,
        }
    }
}

/// Score payload attached to a result.
///
/// Stored exactly as submitted. `winner` is read as a user id or `"DRAW"` and
/// `scores` as numbers per participant; values of any other shape are kept but
/// ignored by those views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSheet(Map<String, Value>);

/// How a settled game went for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerOutcome {
    Win,
    Loss,
    Draw,
    Unknown,
}

impl ScoreSheet {
    /// Fails only when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn winner(&self) -> Option<Outcome> {
        match self.0.get("winner") {
            Some(Value::String(s)) => Some(Outcome::from(s.clone())),
            _ => None,
        }
    }

    pub fn scores(&self) -> BTreeMap<String, f64> {
        match self.0.get("scores") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(player, v)| v.as_f64().map(|n| (player.clone(), n)))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn outcome_for(&self, user_id: &str) -> PlayerOutcome {
        match self.winner() {
            Some(Outcome::Draw) => PlayerOutcome::Draw,
            Some(Outcome::Winner(id)) if id == user_id => PlayerOutcome::Win,
            Some(Outcome::Winner(_)) => PlayerOutcome::Loss,
            None => PlayerOutcome::Unknown,
        }
    }
}
