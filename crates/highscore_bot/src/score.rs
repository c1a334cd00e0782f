//! Score values and the raw payloads they are decoded from.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

/// A validated, non-negative score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(i64);

impl Score {
    /// The score every new player starts with.
    pub const ZERO: Score = Score(0);

    /// Wraps `value` if it is non-negative.
    pub fn new(value: i64) -> Option<Self> {
        (value >= 0).then_some(Self(value))
    }

    /// Converts a value read back from the `players` table.
    ///
    /// The column carries a `CHECK (high_score >= 0)` constraint, so negative
    /// values cannot occur; they are clamped to zero all the same.
    pub fn from_stored(value: i64) -> Self {
        Self(value.max(0))
    }

    /// The raw integer.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("negative score: {value}"))
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// A score as it arrives from outside, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    /// A bare token, e.g. the argument of a text command.
    Token(String),
    /// A structured game-result payload carrying a `score` field.
    Structured(Value),
}

impl RawScore {
    /// Decodes the payload into a [`Score`].
    ///
    /// Returns `None` for any shape other than a digit-only token or an object
    /// with a valid `score` field. A JSON string holding such an object is
    /// unwrapped first, since web-app data is delivered as text.
    #[instrument(level = "debug")]
    pub fn parse(&self) -> Option<Score> {
        match self {
            RawScore::Token(token) => parse_token(token),
            RawScore::Structured(Value::String(text)) => {
                let inner: Value = serde_json::from_str(text).ok()?;
                parse_object(&inner)
            }
            RawScore::Structured(value) => parse_object(value),
        }
    }
}

/// Base-10, digits only: no sign, no separators, no surrounding space.
fn parse_token(token: &str) -> Option<Score> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<i64>().ok().and_then(Score::new)
}

fn parse_object(value: &Value) -> Option<Score> {
    match value.as_object()?.get("score")? {
        Value::Number(n) => n.as_i64().and_then(Score::new),
        Value::String(s) => parse_token(s),
        _ => None,
    }
}
